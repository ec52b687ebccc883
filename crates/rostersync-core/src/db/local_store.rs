//! `SQLite`-backed [`LocalStore`] for any entity with a table mapping

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::marker::PhantomData;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use super::connection::Database;
use super::tables::{read_record, record_values, TableRecord, META_COLUMNS};
use crate::error::{Error, Result};
use crate::filter::{Clause, Filter, FilterValue};
use crate::models::{RecordId, RecordMeta};
use crate::sync::{reconcile_with, LocalObservation, LocalStore, Reconciliation, SyncBatch};

/// One table of the local store, typed by entity
pub struct SqliteLocalStore<T> {
    db: Database,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for SqliteLocalStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for SqliteLocalStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLocalStore")
            .field("db", &self.db)
            .finish()
    }
}

impl<T: TableRecord> SqliteLocalStore<T> {
    pub const fn new(db: Database) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }

    pub const fn database(&self) -> &Database {
        &self.db
    }

    fn columns() -> Vec<&'static str> {
        META_COLUMNS.iter().chain(T::COLUMNS).copied().collect()
    }

    fn select_sql() -> String {
        format!(
            "SELECT {} FROM {}",
            Self::columns().join(", "),
            T::KIND.table()
        )
    }

    fn upsert_sql() -> String {
        let columns = Self::columns();
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = columns
            .iter()
            .filter(|column| !matches!(**column, "id" | "created_at"))
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT(id) DO UPDATE SET {updates}",
            T::KIND.table(),
            columns.join(", ")
        )
    }

    /// `WHERE` clause and bindings for a filter, checking field names
    fn where_clause(filter: &Filter) -> Result<(String, Vec<Value>)> {
        if filter.is_empty() {
            return Ok((String::new(), Vec::new()));
        }
        let mut conditions = Vec::with_capacity(filter.clauses().len());
        let mut values = Vec::new();
        for clause in filter.clauses() {
            let field = clause.field();
            if !T::has_column(field) {
                return Err(Error::InvalidInput(format!(
                    "{} has no field '{field}'",
                    T::KIND
                )));
            }
            match clause {
                Clause::Eq(_, value) => {
                    values.push(sql_value(value));
                    conditions.push(format!("{field} = ?{}", values.len()));
                }
                Clause::IsNull(_) => conditions.push(format!("{field} IS NULL")),
                Clause::NotNull(_) => conditions.push(format!("{field} IS NOT NULL")),
            }
        }
        Ok((format!(" WHERE {}", conditions.join(" AND ")), values))
    }

    fn query(conn: &Connection, filter: &Filter) -> Result<Vec<T>> {
        let (condition, values) = Self::where_clause(filter)?;
        let mut stmt = conn.prepare_cached(&format!("{}{condition}", Self::select_sql()))?;
        let mut records = stmt
            .query_map(params_from_iter(values), read_record::<T>)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        records.sort_by(T::display_order);
        Ok(records)
    }

    fn write(conn: &Connection, record: &T) -> Result<()> {
        conn.prepare_cached(&Self::upsert_sql())?
            .execute(params_from_iter(record_values(record)?))?;
        Ok(())
    }

    fn remove(conn: &Connection, id: &RecordId) -> Result<bool> {
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", T::KIND.table()),
            [id.as_str()],
        )?;
        Ok(removed > 0)
    }
}

fn sql_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::Text(text) => Value::Text(text.clone()),
        FilterValue::Integer(number) => Value::Integer(*number),
        FilterValue::Bool(flag) => Value::Integer(i64::from(*flag)),
    }
}

#[async_trait]
impl<T: TableRecord> LocalStore<T> for SqliteLocalStore<T> {
    async fn upsert(&self, record: &T) -> Result<()> {
        {
            let conn = self.db.lock().await;
            Self::write(&conn, record)?;
        }
        tracing::debug!("Upserted {} {}", T::KIND, record.id());
        self.db.notify(T::KIND);
        Ok(())
    }

    async fn get_by_id(&self, id: &RecordId) -> Result<Option<T>> {
        let conn = self.db.lock().await;
        let record = conn
            .query_row(
                &format!("{} WHERE id = ?1", Self::select_sql()),
                [id.as_str()],
                read_record::<T>,
            )
            .optional()?;
        Ok(record)
    }

    async fn fetch(&self, filter: &Filter) -> Result<Vec<T>> {
        let conn = self.db.lock().await;
        Self::query(&conn, filter)
    }

    async fn observe_all(&self, filter: Filter) -> Result<LocalObservation<T>> {
        // Subscribe before the first read so no change can slip between them
        let mut changes = self.db.subscribe_changes();
        let initial = self.fetch(&filter).await?;
        let (tx, rx) = watch::channel(initial);
        let store = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tx.closed() => break,
                    change = changes.recv() => match change {
                        Ok(kind) if kind != T::KIND => continue,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }

                match store.fetch(&filter).await {
                    Ok(records) => {
                        tx.send_if_modified(|current| {
                            if *current == records {
                                false
                            } else {
                                *current = records;
                                true
                            }
                        });
                    }
                    Err(error) => {
                        tracing::warn!("Re-query of {} failed: {error}", T::KIND);
                    }
                }
            }
            tracing::debug!("Stopped observing {}", T::KIND);
        });

        Ok(LocalObservation::new(rx))
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let removed = {
            let conn = self.db.lock().await;
            Self::remove(&conn, id)?
        };
        if removed {
            self.db.notify(T::KIND);
        }
        Ok(removed)
    }

    async fn delete_matching(&self, filter: &Filter) -> Result<usize> {
        let (condition, values) = Self::where_clause(filter)?;
        let removed = {
            let conn = self.db.lock().await;
            conn.execute(
                &format!("DELETE FROM {}{condition}", T::KIND.table()),
                params_from_iter(values),
            )?
        };
        if removed > 0 {
            tracing::debug!("Deleted {removed} {} rows", T::KIND);
            self.db.notify(T::KIND);
        }
        Ok(removed)
    }

    async fn commit_batch(&self, batch: SyncBatch<T>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        {
            let mut conn = self.db.lock().await;
            let tx = conn.transaction()?;
            for record in &batch.upserts {
                Self::write(&tx, record)?;
            }
            for id in &batch.deletes {
                Self::remove(&tx, id)?;
            }
            tx.commit()?;
        }
        tracing::debug!(
            "Committed {} upserts and {} deletes to {}",
            batch.upserts.len(),
            batch.deletes.len(),
            T::KIND
        );
        self.db.notify(T::KIND);
        Ok(())
    }

    async fn apply_remote(
        &self,
        scope: &Filter,
        remote: Vec<T>,
        keep_local: &(dyn for<'r> Fn(&'r RecordId) -> bool + Send + Sync),
    ) -> Result<Reconciliation<T>> {
        let plan = {
            let mut conn = self.db.lock().await;
            let tx = conn.transaction()?;
            let current = Self::query(&tx, scope)?;
            let plan = reconcile_with(&current, remote, keep_local);
            for record in &plan.batch.upserts {
                Self::write(&tx, record)?;
            }
            for id in &plan.batch.deletes {
                Self::remove(&tx, id)?;
            }
            tx.commit()?;
            plan
        };
        if !plan.batch.is_empty() {
            tracing::debug!(
                "Applied {} remote upserts and {} deletes to {}",
                plan.batch.upserts.len(),
                plan.batch.deletes.len(),
                T::KIND
            );
            self.db.notify(T::KIND);
        }
        Ok(plan)
    }

    async fn clear_stain(&self, meta: &RecordMeta) -> Result<bool> {
        let Some(stained_at) = meta.stained_at else {
            return Ok(false);
        };
        let cleared = {
            let conn = self.db.lock().await;
            conn.execute(
                &format!(
                    "UPDATE {} SET stained_at = NULL
                     WHERE id = ?1 AND stained_at = ?2 AND updated_at = ?3",
                    T::KIND.table()
                ),
                rusqlite::params![meta.id.as_str(), stained_at, meta.updated_at],
            )?
        };
        if cleared > 0 {
            self.db.notify(T::KIND);
        }
        Ok(cleared > 0)
    }
}
