//! Shipped local schema history
//!
//! | Version | Change |
//! |---|---|
//! | 1 | teams, users, events, attendances (integer status), broadcasts, notifications |
//! | 2 | attendance status recoded to tags; broadcast_statuses |
//! | 3 | events gain `kind` (default `practice`) and `location`; lineups, match_events |
//!
//! Foreign keys are declared with explicit actions but only enforced when
//! the store is opened with `enforce_foreign_keys`.

use rusqlite::Transaction;

use super::migrations::{CodeMapping, IndexShape, MigrationStep, SchemaMigrator, TableShape};
use crate::error::Result;

/// Schema version produced by the shipped steps
pub const CURRENT_VERSION: u32 = 3;

/// Legacy attendance status codes (v1) and their tags (v2+)
pub const ATTENDANCE_STATUS_CODES: CodeMapping = CodeMapping {
    codes: &[
        (0, "unknown"),
        (1, "present"),
        (2, "absent"),
        (3, "late"),
        (4, "excused"),
    ],
    fallback: "unknown",
};

/// Kind given to events that predate the `kind` column
pub const DEFAULT_EVENT_KIND: &str = "practice";

macro_rules! meta_columns {
    () => {
        "id TEXT PRIMARY KEY NOT NULL, \
         created_at INTEGER NOT NULL, \
         updated_at INTEGER NOT NULL, \
         stained_at INTEGER, \
         stashed_at INTEGER"
    };
}

const META: [&str; 5] = ["id", "created_at", "updated_at", "stained_at", "stashed_at"];

const TEAMS: TableShape = TableShape {
    name: "teams",
    columns: concat!(
        meta_columns!(),
        ", name TEXT NOT NULL, sport TEXT NOT NULL, season TEXT"
    ),
    indexes: &[
        IndexShape {
            name: "idx_teams_updated",
            columns: "updated_at DESC",
        },
        IndexShape {
            name: "idx_teams_stained",
            columns: "stained_at",
        },
    ],
};

const USERS: TableShape = TableShape {
    name: "users",
    columns: concat!(
        meta_columns!(),
        ", display_name TEXT NOT NULL, email TEXT, \
         team_id TEXT REFERENCES teams(id) ON DELETE SET NULL ON UPDATE NO ACTION, \
         role TEXT NOT NULL DEFAULT 'player'"
    ),
    indexes: &[
        IndexShape {
            name: "idx_users_team",
            columns: "team_id",
        },
        IndexShape {
            name: "idx_users_stained",
            columns: "stained_at",
        },
    ],
};

const EVENTS_V1: TableShape = TableShape {
    name: "events",
    columns: concat!(
        meta_columns!(),
        ", team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         title TEXT NOT NULL, starts_at INTEGER NOT NULL, ends_at INTEGER"
    ),
    indexes: &[
        IndexShape {
            name: "idx_events_team",
            columns: "team_id",
        },
        IndexShape {
            name: "idx_events_starts",
            columns: "starts_at",
        },
    ],
};

const EVENTS: TableShape = TableShape {
    name: "events",
    columns: concat!(
        meta_columns!(),
        ", team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         title TEXT NOT NULL, kind TEXT NOT NULL DEFAULT 'practice', location TEXT, \
         starts_at INTEGER NOT NULL, ends_at INTEGER"
    ),
    indexes: &[
        IndexShape {
            name: "idx_events_team",
            columns: "team_id",
        },
        IndexShape {
            name: "idx_events_starts",
            columns: "starts_at",
        },
        IndexShape {
            name: "idx_events_stained",
            columns: "stained_at",
        },
    ],
};

const ATTENDANCES_V1: TableShape = TableShape {
    name: "attendances",
    columns: concat!(
        meta_columns!(),
        ", event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         status INTEGER NOT NULL DEFAULT 0, note TEXT"
    ),
    indexes: &[
        IndexShape {
            name: "idx_attendances_event",
            columns: "event_id",
        },
        IndexShape {
            name: "idx_attendances_user",
            columns: "user_id",
        },
    ],
};

const ATTENDANCES: TableShape = TableShape {
    name: "attendances",
    columns: concat!(
        meta_columns!(),
        ", event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         status TEXT NOT NULL DEFAULT 'unknown', note TEXT"
    ),
    indexes: &[
        IndexShape {
            name: "idx_attendances_event",
            columns: "event_id",
        },
        IndexShape {
            name: "idx_attendances_user",
            columns: "user_id",
        },
        IndexShape {
            name: "idx_attendances_stained",
            columns: "stained_at",
        },
    ],
};

const BROADCASTS: TableShape = TableShape {
    name: "broadcasts",
    columns: concat!(
        meta_columns!(),
        ", team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         author_id TEXT REFERENCES users(id) ON DELETE SET NULL ON UPDATE NO ACTION, \
         title TEXT NOT NULL, body TEXT NOT NULL"
    ),
    indexes: &[
        IndexShape {
            name: "idx_broadcasts_team",
            columns: "team_id",
        },
        IndexShape {
            name: "idx_broadcasts_created",
            columns: "created_at DESC",
        },
    ],
};

const BROADCAST_STATUSES: TableShape = TableShape {
    name: "broadcast_statuses",
    columns: concat!(
        meta_columns!(),
        ", broadcast_id TEXT NOT NULL REFERENCES broadcasts(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         delivered_at INTEGER, read_at INTEGER"
    ),
    indexes: &[
        IndexShape {
            name: "idx_broadcast_statuses_broadcast",
            columns: "broadcast_id",
        },
        IndexShape {
            name: "idx_broadcast_statuses_user",
            columns: "user_id",
        },
    ],
};

const NOTIFICATIONS: TableShape = TableShape {
    name: "notifications",
    columns: concat!(
        meta_columns!(),
        ", user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         team_id TEXT REFERENCES teams(id) ON DELETE SET NULL ON UPDATE NO ACTION, \
         title TEXT NOT NULL, body TEXT NOT NULL, read_at INTEGER"
    ),
    indexes: &[
        IndexShape {
            name: "idx_notifications_user",
            columns: "user_id",
        },
        IndexShape {
            name: "idx_notifications_created",
            columns: "created_at DESC",
        },
    ],
};

const LINEUPS: TableShape = TableShape {
    name: "lineups",
    columns: concat!(
        meta_columns!(),
        ", event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         formation TEXT NOT NULL, positions TEXT NOT NULL DEFAULT '[]'"
    ),
    indexes: &[IndexShape {
        name: "idx_lineups_event",
        columns: "event_id",
    }],
};

const MATCH_EVENTS: TableShape = TableShape {
    name: "match_events",
    columns: concat!(
        meta_columns!(),
        ", event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE ON UPDATE NO ACTION, \
         player_id TEXT REFERENCES users(id) ON DELETE SET NULL ON UPDATE NO ACTION, \
         kind TEXT NOT NULL, minute INTEGER NOT NULL, sequence INTEGER NOT NULL"
    ),
    indexes: &[IndexShape {
        name: "idx_match_events_feed",
        columns: "event_id, sequence DESC",
    }],
};

/// Tables present in the current schema
pub const TABLES: [&TableShape; 9] = [
    &TEAMS,
    &USERS,
    &EVENTS,
    &ATTENDANCES,
    &LINEUPS,
    &MATCH_EVENTS,
    &BROADCASTS,
    &BROADCAST_STATUSES,
    &NOTIFICATIONS,
];

/// Migration to version 1: Initial schema
fn migrate_v1(tx: &Transaction<'_>) -> Result<()> {
    for table in [
        &TEAMS,
        &USERS,
        &EVENTS_V1,
        &ATTENDANCES_V1,
        &BROADCASTS,
        &NOTIFICATIONS,
    ] {
        table.create(tx)?;
    }
    Ok(())
}

/// Migration to version 2: attendance status tags, broadcast delivery status
fn migrate_v2(tx: &Transaction<'_>) -> Result<()> {
    let status = ATTENDANCE_STATUS_CODES.case_sql("status");
    let carried = [&META[..], &["event_id", "user_id", "note"][..]].concat();
    ATTENDANCES.rebuild(tx, &carried, &[("status", status.as_str())])?;
    BROADCAST_STATUSES.create(tx)
}

/// Migration to version 3: event kinds and locations, lineups, match feed
fn migrate_v3(tx: &Transaction<'_>) -> Result<()> {
    let kind = format!("'{DEFAULT_EVENT_KIND}'");
    let carried = [&META[..], &["team_id", "title", "starts_at", "ends_at"][..]].concat();
    EVENTS.rebuild(
        tx,
        &carried,
        &[("kind", kind.as_str()), ("location", "NULL")],
    )?;
    LINEUPS.create(tx)?;
    MATCH_EVENTS.create(tx)
}

impl SchemaMigrator {
    /// Migrator for the schema history shipped with this release
    pub fn shipped() -> Result<Self> {
        Self::new(vec![
            MigrationStep {
                from: 0,
                to: 1,
                name: "initial_schema",
                apply: migrate_v1,
            },
            MigrationStep {
                from: 1,
                to: 2,
                name: "attendance_status_tags",
                apply: migrate_v2,
            },
            MigrationStep {
                from: 2,
                to: 3,
                name: "event_kinds_and_match_feed",
                apply: migrate_v3,
            },
        ])
    }
}
