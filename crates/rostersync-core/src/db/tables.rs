//! Row mapping between entity structs and their `SQLite` tables
//!
//! Every table starts with the five meta columns; [`TableRecord::COLUMNS`]
//! lists the payload columns that follow, in binding order. Column names
//! equal serialized field names so a [`Filter`](crate::Filter) can address
//! either side.

use rusqlite::types::{FromSql, Type, Value};
use rusqlite::Row;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::{
    Attendance, AttendanceStatus, Broadcast, BroadcastStatus, Event, EventKind, Lineup,
    MatchEvent, Notification, RecordId, RecordMeta, SyncedRecord, Team, User,
};

pub const META_COLUMNS: [&str; 5] = ["id", "created_at", "updated_at", "stained_at", "stashed_at"];

/// An entity with a fixed column layout in its table
pub trait TableRecord: SyncedRecord {
    const COLUMNS: &'static [&'static str];

    /// Payload values in `COLUMNS` order
    fn to_columns(&self) -> Result<Vec<Value>>;

    /// Rebuild the entity from its payload columns
    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self>;

    fn has_column(name: &str) -> bool {
        META_COLUMNS.contains(&name) || Self::COLUMNS.contains(&name)
    }
}

/// Sequential reader over a result row
pub struct Cells<'a, 'stmt> {
    row: &'a Row<'stmt>,
    index: usize,
}

impl<'a, 'stmt> Cells<'a, 'stmt> {
    pub const fn new(row: &'a Row<'stmt>) -> Self {
        Self { row, index: 0 }
    }

    pub fn next<V: FromSql>(&mut self) -> rusqlite::Result<V> {
        let value = self.row.get(self.index)?;
        self.index += 1;
        Ok(value)
    }

    pub fn next_id(&mut self) -> rusqlite::Result<RecordId> {
        self.next::<String>().map(RecordId::from)
    }

    pub fn next_opt_id(&mut self) -> rusqlite::Result<Option<RecordId>> {
        Ok(self.next::<Option<String>>()?.map(RecordId::from))
    }

    /// Column holding JSON text
    pub fn next_json<V: DeserializeOwned>(&mut self) -> rusqlite::Result<V> {
        let index = self.index;
        let text: String = self.next()?;
        serde_json::from_str(&text)
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
    }
}

/// Read a full row (meta columns first) into an entity.
pub fn read_record<T: TableRecord>(row: &Row<'_>) -> rusqlite::Result<T> {
    let mut cells = Cells::new(row);
    let meta = RecordMeta {
        id: cells.next_id()?,
        created_at: cells.next()?,
        updated_at: cells.next()?,
        stained_at: cells.next()?,
        stashed_at: cells.next()?,
    };
    T::from_columns(meta, &mut cells)
}

/// All column values of a record, meta first
pub fn record_values<T: TableRecord>(record: &T) -> Result<Vec<Value>> {
    let meta = record.meta();
    let mut values = vec![
        id(&meta.id),
        Value::Integer(meta.created_at),
        Value::Integer(meta.updated_at),
        opt_int(meta.stained_at),
        opt_int(meta.stashed_at),
    ];
    values.extend(record.to_columns()?);
    Ok(values)
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

fn id(value: &RecordId) -> Value {
    text(value.as_str())
}

fn opt_id(value: Option<&RecordId>) -> Value {
    value.map_or(Value::Null, id)
}

fn opt_int(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

impl TableRecord for Team {
    const COLUMNS: &'static [&'static str] = &["name", "sport", "season"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.name),
            text(&self.sport),
            opt_text(self.season.as_deref()),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            name: cells.next()?,
            sport: cells.next()?,
            season: cells.next()?,
        })
    }
}

impl TableRecord for User {
    const COLUMNS: &'static [&'static str] = &["display_name", "email", "team_id", "role"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.display_name),
            opt_text(self.email.as_deref()),
            opt_id(self.team_id.as_ref()),
            text(&self.role),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            display_name: cells.next()?,
            email: cells.next()?,
            team_id: cells.next_opt_id()?,
            role: cells.next()?,
        })
    }
}

impl TableRecord for Event {
    const COLUMNS: &'static [&'static str] =
        &["team_id", "title", "kind", "location", "starts_at", "ends_at"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            id(&self.team_id),
            text(&self.title),
            text(self.kind.as_str()),
            opt_text(self.location.as_deref()),
            Value::Integer(self.starts_at),
            opt_int(self.ends_at),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            team_id: cells.next_id()?,
            title: cells.next()?,
            kind: EventKind::from_tag(&cells.next::<String>()?),
            location: cells.next()?,
            starts_at: cells.next()?,
            ends_at: cells.next()?,
        })
    }
}

impl TableRecord for Attendance {
    const COLUMNS: &'static [&'static str] = &["event_id", "user_id", "status", "note"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            id(&self.event_id),
            id(&self.user_id),
            text(self.status.as_str()),
            opt_text(self.note.as_deref()),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            event_id: cells.next_id()?,
            user_id: cells.next_id()?,
            status: AttendanceStatus::from_tag(&cells.next::<String>()?),
            note: cells.next()?,
        })
    }
}

impl TableRecord for Lineup {
    const COLUMNS: &'static [&'static str] = &["event_id", "formation", "positions"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            id(&self.event_id),
            text(&self.formation),
            Value::Text(serde_json::to_string(&self.positions)?),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            event_id: cells.next_id()?,
            formation: cells.next()?,
            positions: cells.next_json()?,
        })
    }
}

impl TableRecord for MatchEvent {
    const COLUMNS: &'static [&'static str] =
        &["event_id", "player_id", "kind", "minute", "sequence"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            id(&self.event_id),
            opt_id(self.player_id.as_ref()),
            text(&self.kind),
            Value::Integer(self.minute),
            Value::Integer(self.sequence),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            event_id: cells.next_id()?,
            player_id: cells.next_opt_id()?,
            kind: cells.next()?,
            minute: cells.next()?,
            sequence: cells.next()?,
        })
    }
}

impl TableRecord for Broadcast {
    const COLUMNS: &'static [&'static str] = &["team_id", "author_id", "title", "body"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            id(&self.team_id),
            opt_id(self.author_id.as_ref()),
            text(&self.title),
            text(&self.body),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            team_id: cells.next_id()?,
            author_id: cells.next_opt_id()?,
            title: cells.next()?,
            body: cells.next()?,
        })
    }
}

impl TableRecord for BroadcastStatus {
    const COLUMNS: &'static [&'static str] = &["broadcast_id", "user_id", "delivered_at", "read_at"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            id(&self.broadcast_id),
            id(&self.user_id),
            opt_int(self.delivered_at),
            opt_int(self.read_at),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            broadcast_id: cells.next_id()?,
            user_id: cells.next_id()?,
            delivered_at: cells.next()?,
            read_at: cells.next()?,
        })
    }
}

impl TableRecord for Notification {
    const COLUMNS: &'static [&'static str] = &["user_id", "team_id", "title", "body", "read_at"];

    fn to_columns(&self) -> Result<Vec<Value>> {
        Ok(vec![
            id(&self.user_id),
            opt_id(self.team_id.as_ref()),
            text(&self.title),
            text(&self.body),
            opt_int(self.read_at),
        ])
    }

    fn from_columns(meta: RecordMeta, cells: &mut Cells<'_, '_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            user_id: cells.next_id()?,
            team_id: cells.next_opt_id()?,
            title: cells.next()?,
            body: cells.next()?,
            read_at: cells.next()?,
        })
    }
}
