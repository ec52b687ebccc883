//! Versioned schema migration engine
//!
//! A [`SchemaMigrator`] owns an ordered list of [`MigrationStep`]s. At store
//! open it reads the persisted version and applies each step whose `from`
//! equals the current version, one transaction per step, recording the new
//! version inside the same transaction. Any failure rolls the step back and
//! aborts the open.
//!
//! Steps run with foreign key enforcement off, since a table rebuild drops
//! the old table and would otherwise fire `ON DELETE` actions on its
//! children. The connection's setting is restored afterwards.

use rusqlite::{Connection, Transaction};

use crate::error::{Error, Result};

/// Transformation executed inside the step's transaction
pub type MigrationFn = fn(&Transaction<'_>) -> Result<()>;

/// One schema transition
#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub from: u32,
    pub to: u32,
    pub name: &'static str,
    pub apply: MigrationFn,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered, validated set of migration steps
#[derive(Debug, Clone)]
pub struct SchemaMigrator {
    steps: Vec<MigrationStep>,
}

impl SchemaMigrator {
    /// Build a migrator, rejecting steps that go backwards or share a `from`.
    pub fn new(mut steps: Vec<MigrationStep>) -> Result<Self> {
        steps.sort_by_key(|step| step.from);
        for step in &steps {
            if step.to <= step.from {
                return Err(Error::Migration(format!(
                    "step '{}' must move forward (v{} -> v{})",
                    step.name, step.from, step.to
                )));
            }
        }
        if let Some(pair) = steps.windows(2).find(|pair| pair[0].from == pair[1].from) {
            return Err(Error::Migration(format!(
                "steps '{}' and '{}' both start at v{}",
                pair[0].name, pair[1].name, pair[0].from
            )));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Highest version any step reaches
    pub fn latest_version(&self) -> u32 {
        self.steps.iter().map(|step| step.to).max().unwrap_or(0)
    }

    /// Run all pending migrations
    pub fn migrate(&self, conn: &mut Connection) -> Result<u32> {
        self.migrate_to(conn, self.latest_version())
    }

    /// Migrate up to `target`, returning the version the store ends at.
    pub fn migrate_to(&self, conn: &mut Connection, target: u32) -> Result<u32> {
        ensure_version_table(conn)?;
        let version = current_version(conn)?;

        if version > target {
            return Err(Error::Migration(format!(
                "store is at v{version}, newer than supported v{target}"
            )));
        }

        if version == target {
            return Ok(version);
        }

        // The pragma is a no-op inside a transaction, so it is set per run
        let enforced: bool = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
        if enforced {
            conn.pragma_update(None, "foreign_keys", false)?;
        }
        let migrated = self.run_steps(conn, version, target);
        if enforced {
            conn.pragma_update(None, "foreign_keys", true)?;
        }
        migrated
    }

    fn run_steps(&self, conn: &mut Connection, mut version: u32, target: u32) -> Result<u32> {
        while version < target {
            let step = self
                .steps
                .iter()
                .find(|step| step.from == version)
                .ok_or_else(|| {
                    Error::Migration(format!("no migration step starts at v{version}"))
                })?;
            if step.to > target {
                return Err(Error::Migration(format!(
                    "step '{}' (v{} -> v{}) overshoots target v{target}",
                    step.name, step.from, step.to
                )));
            }

            apply_step(conn, step)?;
            tracing::info!("Migrated database to version {} ({})", step.to, step.name);
            version = step.to;
        }

        Ok(version)
    }
}

fn apply_step(conn: &mut Connection, step: &MigrationStep) -> Result<()> {
    let tx = conn.transaction()?;
    let dangling_before = dangling_references(&tx)?;
    (step.apply)(&tx).map_err(|error| {
        Error::Migration(format!(
            "step '{}' (v{} -> v{}) failed: {error}",
            step.name, step.from, step.to
        ))
    })?;
    // Orphans synced ahead of their parents are tolerated; new ones are not
    let dangling_after = dangling_references(&tx)?;
    if dangling_after > dangling_before {
        return Err(Error::Migration(format!(
            "step '{}' (v{} -> v{}) left {} rows pointing at missing parents",
            step.name,
            step.from,
            step.to,
            dangling_after - dangling_before
        )));
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [step.to],
    )?;
    tx.commit()?;
    Ok(())
}

/// Rows whose foreign keys point at no parent row
fn dangling_references(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.len())
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;
    Ok(())
}

/// Get the persisted schema version (0 for a fresh store)
pub fn current_version(conn: &Connection) -> Result<u32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }

    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Secondary index declared for a table
#[derive(Debug, Clone, Copy)]
pub struct IndexShape {
    pub name: &'static str,
    pub columns: &'static str,
}

/// Declared shape of a table: column definitions plus secondary indexes
#[derive(Debug, Clone, Copy)]
pub struct TableShape {
    pub name: &'static str,
    pub columns: &'static str,
    pub indexes: &'static [IndexShape],
}

impl TableShape {
    /// Create the table and its indexes
    pub fn create(&self, tx: &Transaction<'_>) -> Result<()> {
        tx.execute(
            &format!("CREATE TABLE IF NOT EXISTS {} ({})", self.name, self.columns),
            [],
        )?;
        self.create_indexes(tx)
    }

    fn create_indexes(&self, tx: &Transaction<'_>) -> Result<()> {
        for index in self.indexes {
            tx.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    index.name, self.name, index.columns
                ),
                [],
            )?;
        }
        Ok(())
    }

    /// Rebuild an existing table into this shape.
    ///
    /// `carried` columns are copied unchanged; `derived` pairs are
    /// `(target column, SQL expression over the old row)`. The old table is
    /// dropped and the new one renamed into place, then indexes are rebuilt.
    /// Fails if the copy does not preserve the row count.
    pub fn rebuild(
        &self,
        tx: &Transaction<'_>,
        carried: &[&str],
        derived: &[(&str, &str)],
    ) -> Result<()> {
        let staging = format!("{}__new", self.name);
        tx.execute(
            &format!("CREATE TABLE {staging} ({})", self.columns),
            [],
        )?;

        let targets = carried
            .iter()
            .copied()
            .chain(derived.iter().map(|(column, _)| *column))
            .collect::<Vec<_>>()
            .join(", ");
        let sources = carried
            .iter()
            .copied()
            .chain(derived.iter().map(|(_, expression)| *expression))
            .collect::<Vec<_>>()
            .join(", ");

        let before = count_rows(tx, self.name)?;
        tx.execute(
            &format!(
                "INSERT INTO {staging} ({targets}) SELECT {sources} FROM {}",
                self.name
            ),
            [],
        )?;
        let after = count_rows(tx, &staging)?;
        if before != after {
            return Err(Error::Migration(format!(
                "rebuilding {} copied {after} of {before} rows",
                self.name
            )));
        }

        tx.execute(&format!("DROP TABLE {}", self.name), [])?;
        tx.execute(
            &format!("ALTER TABLE {staging} RENAME TO {}", self.name),
            [],
        )?;
        self.create_indexes(tx)?;
        tracing::debug!("Rebuilt table {} ({after} rows)", self.name);
        Ok(())
    }
}

fn count_rows(tx: &Transaction<'_>, table: &str) -> Result<i64> {
    Ok(tx.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?)
}

/// Exhaustive recoding table from a legacy integer code to a string tag.
#[derive(Debug, Clone, Copy)]
pub struct CodeMapping {
    pub codes: &'static [(i64, &'static str)],
    /// Tag used for any code missing from `codes` (including NULL)
    pub fallback: &'static str,
}

impl CodeMapping {
    pub fn map(&self, code: i64) -> &'static str {
        self.codes
            .iter()
            .find(|(known, _)| *known == code)
            .map_or(self.fallback, |(_, tag)| tag)
    }

    /// SQL `CASE` expression applying this mapping to `column`
    pub fn case_sql(&self, column: &str) -> String {
        let arms = self
            .codes
            .iter()
            .map(|(code, tag)| format!("WHEN {code} THEN {}", quote(tag)))
            .collect::<Vec<_>>()
            .join(" ");
        format!("CASE {column} {arms} ELSE {} END", quote(self.fallback))
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn create_items(tx: &Transaction<'_>) -> Result<()> {
        tx.execute(
            "CREATE TABLE items (id TEXT PRIMARY KEY, size INTEGER NOT NULL)",
            [],
        )?;
        Ok(())
    }

    fn add_label(tx: &Transaction<'_>) -> Result<()> {
        const ITEMS: TableShape = TableShape {
            name: "items",
            columns: "id TEXT PRIMARY KEY, size TEXT NOT NULL, label TEXT NOT NULL",
            indexes: &[IndexShape {
                name: "idx_items_label",
                columns: "label",
            }],
        };
        const SIZES: CodeMapping = CodeMapping {
            codes: &[(1, "small"), (2, "large")],
            fallback: "unknown",
        };
        let size = SIZES.case_sql("size");
        ITEMS.rebuild(tx, &["id"], &[("size", size.as_str()), ("label", "'none'")])
    }

    fn broken(tx: &Transaction<'_>) -> Result<()> {
        tx.execute("CREATE TABLE half_done (id TEXT)", [])?;
        Err(Error::Database("boom".into()))
    }

    fn migrator() -> SchemaMigrator {
        SchemaMigrator::new(vec![
            MigrationStep {
                from: 1,
                to: 2,
                name: "add_label",
                apply: add_label,
            },
            MigrationStep {
                from: 0,
                to: 1,
                name: "create_items",
                apply: create_items,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_steps_are_sorted_and_latest_version_known() {
        let migrator = migrator();
        assert_eq!(migrator.steps()[0].name, "create_items");
        assert_eq!(migrator.latest_version(), 2);
    }

    #[test]
    fn test_rejects_backward_and_duplicate_steps() {
        let backward = SchemaMigrator::new(vec![MigrationStep {
            from: 2,
            to: 1,
            name: "back",
            apply: create_items,
        }]);
        assert!(matches!(backward, Err(Error::Migration(_))));

        let duplicate = SchemaMigrator::new(vec![
            MigrationStep {
                from: 0,
                to: 1,
                name: "a",
                apply: create_items,
            },
            MigrationStep {
                from: 0,
                to: 2,
                name: "b",
                apply: create_items,
            },
        ]);
        assert!(matches!(duplicate, Err(Error::Migration(_))));
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        assert_eq!(migrator().migrate(&mut conn).unwrap(), 2);
        assert_eq!(migrator().migrate(&mut conn).unwrap(), 2);
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_rebuild_recodes_and_defaults() {
        let mut conn = setup();
        migrator().migrate_to(&mut conn, 1).unwrap();
        conn.execute_batch(
            "INSERT INTO items VALUES ('a', 1);
             INSERT INTO items VALUES ('b', 2);
             INSERT INTO items VALUES ('c', 7);",
        )
        .unwrap();

        migrator().migrate(&mut conn).unwrap();

        let mut stmt = conn
            .prepare("SELECT id, size, label FROM items ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        let expected: Vec<(String, String, String)> = vec![
            ("a".into(), "small".into(), "none".into()),
            ("b".into(), "large".into(), "none".into()),
            ("c".into(), "unknown".into(), "none".into()),
        ];
        assert_eq!(rows, expected);

        let index_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='index' AND name='idx_items_label')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(index_exists);
    }

    #[test]
    fn test_failed_step_rolls_back_and_keeps_version() {
        let mut conn = setup();
        let migrator = SchemaMigrator::new(vec![
            MigrationStep {
                from: 0,
                to: 1,
                name: "create_items",
                apply: create_items,
            },
            MigrationStep {
                from: 1,
                to: 2,
                name: "broken",
                apply: broken,
            },
        ])
        .unwrap();

        let error = migrator.migrate(&mut conn).unwrap_err();
        assert!(error.to_string().contains("broken"));
        assert_eq!(current_version(&conn).unwrap(), 1);

        let half_done: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name='half_done')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!half_done);
    }

    #[test]
    fn test_refuses_newer_store_and_missing_path() {
        let mut conn = setup();
        migrator().migrate(&mut conn).unwrap();
        let error = migrator().migrate_to(&mut conn, 1).unwrap_err();
        assert!(error.to_string().contains("newer"));

        let gap = SchemaMigrator::new(vec![MigrationStep {
            from: 1,
            to: 2,
            name: "orphan",
            apply: add_label,
        }])
        .unwrap();
        let mut fresh = setup();
        assert!(matches!(gap.migrate(&mut fresh), Err(Error::Migration(_))));
    }

    fn create_family(tx: &Transaction<'_>) -> Result<()> {
        tx.execute_batch(
            "CREATE TABLE parents (id TEXT PRIMARY KEY);
             CREATE TABLE children (
                 id TEXT PRIMARY KEY,
                 parent_id TEXT REFERENCES parents(id) ON DELETE CASCADE
             );",
        )?;
        Ok(())
    }

    fn rebuild_parents(tx: &Transaction<'_>) -> Result<()> {
        const PARENTS: TableShape = TableShape {
            name: "parents",
            columns: "id TEXT PRIMARY KEY, label TEXT NOT NULL",
            indexes: &[],
        };
        PARENTS.rebuild(tx, &["id"], &[("label", "'none'")])
    }

    fn drop_parents(tx: &Transaction<'_>) -> Result<()> {
        tx.execute("DELETE FROM parents", [])?;
        Ok(())
    }

    fn family(second: MigrationFn) -> SchemaMigrator {
        SchemaMigrator::new(vec![
            MigrationStep {
                from: 0,
                to: 1,
                name: "create_family",
                apply: create_family,
            },
            MigrationStep {
                from: 1,
                to: 2,
                name: "second",
                apply: second,
            },
        ])
        .unwrap()
    }

    fn foreign_keys(conn: &Connection) -> bool {
        conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_rebuild_keeps_children_with_enforcement_on() {
        let mut conn = setup();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        family(rebuild_parents).migrate_to(&mut conn, 1).unwrap();
        conn.execute_batch(
            "INSERT INTO parents VALUES ('p1');
             INSERT INTO children VALUES ('c1', 'p1');
             INSERT INTO children VALUES ('c2', 'p1');",
        )
        .unwrap();

        assert_eq!(family(rebuild_parents).migrate(&mut conn).unwrap(), 2);

        let children: i64 = conn
            .query_row("SELECT COUNT(*) FROM children", [], |row| row.get(0))
            .unwrap();
        assert_eq!(children, 2);
        assert!(foreign_keys(&conn));
    }

    #[test]
    fn test_step_orphaning_children_is_rolled_back() {
        let mut conn = setup();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        family(drop_parents).migrate_to(&mut conn, 1).unwrap();
        conn.execute_batch(
            "INSERT INTO parents VALUES ('p1');
             INSERT INTO children VALUES ('c1', 'p1');",
        )
        .unwrap();

        let error = family(drop_parents).migrate(&mut conn).unwrap_err();
        assert!(error.to_string().contains("missing parents"));
        assert_eq!(current_version(&conn).unwrap(), 1);
        assert!(foreign_keys(&conn));

        let parents: i64 = conn
            .query_row("SELECT COUNT(*) FROM parents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(parents, 1);
    }

    #[test]
    fn test_existing_orphans_do_not_block_migration() {
        let mut conn = setup();
        family(rebuild_parents).migrate_to(&mut conn, 1).unwrap();
        conn.pragma_update(None, "foreign_keys", false).unwrap();
        conn.execute("INSERT INTO children VALUES ('c1', 'not-yet-synced')", [])
            .unwrap();

        assert_eq!(family(rebuild_parents).migrate(&mut conn).unwrap(), 2);
        assert!(!foreign_keys(&conn));
    }

    #[test]
    fn test_code_mapping() {
        const STATUS: CodeMapping = CodeMapping {
            codes: &[(0, "off"), (1, "on")],
            fallback: "unknown",
        };
        assert_eq!(STATUS.map(1), "on");
        assert_eq!(STATUS.map(42), "unknown");
        assert_eq!(
            STATUS.case_sql("state"),
            "CASE state WHEN 0 THEN 'off' WHEN 1 THEN 'on' ELSE 'unknown' END"
        );
    }
}
