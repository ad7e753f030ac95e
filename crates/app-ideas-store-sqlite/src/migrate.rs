use std::collections::BTreeSet;
use std::sync::Arc;

use rusqlite::{params, Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::{
    app_ideas_table, categories_table, schema_fingerprint, table_exists, Database,
    MIGRATION_LOG_TABLE, NOW_SQL,
};
use crate::seed::{seed_categories, seed_ideas, SeedResources};

pub const CREATE_TABLES: &str = "create_tables";
pub const SEED_CATEGORIES: &str = "seed_categories";
pub const SEED_APP_IDEAS: &str = "seed_app_ideas";

type MigrationStep = dyn Fn(&Connection) -> rusqlite::Result<()> + Send + Sync;

/// One named schema or data change, applied at most once per database.
#[derive(Clone)]
pub struct Migration {
    name: String,
    step: Arc<MigrationStep>,
}

impl Migration {
    pub fn new(
        name: impl Into<String>,
        step: impl Fn(&Connection) -> rusqlite::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            step: Arc::new(step),
        }
    }

    pub fn sql(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self::new(name, move |conn| conn.execute_batch(&sql))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub already_applied: Vec<String>,
    pub erased: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied: Vec<String>,
    pub pending: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<Migration>,
    erase_database_on_schema_change: bool,
}

impl Migrator {
    /// # Errors
    /// Returns [`SchemaError::DuplicateMigration`] when two migrations share a name.
    pub fn new(migrations: Vec<Migration>) -> Result<Self, SchemaError> {
        let mut seen = BTreeSet::new();
        for migration in &migrations {
            if !seen.insert(migration.name.as_str()) {
                return Err(SchemaError::DuplicateMigration(migration.name.clone()));
            }
        }
        Ok(Self {
            migrations,
            erase_database_on_schema_change: false,
        })
    }

    /// Table creation, category seed, then the idea library seed.
    ///
    /// # Errors
    /// Never fails for the built-in migration list; the signature mirrors
    /// [`Migrator::new`].
    pub fn app(resources: Arc<dyn SeedResources>) -> Result<Self, SchemaError> {
        Self::new(vec![
            create_tables_migration(),
            Migration::new(SEED_CATEGORIES, seed_categories),
            Migration::new(SEED_APP_IDEAS, move |conn| {
                seed_ideas(conn, resources.as_ref()).map(|_| ())
            }),
        ])
    }

    #[must_use]
    pub fn erase_database_on_schema_change(mut self, enabled: bool) -> Self {
        self.erase_database_on_schema_change = enabled;
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.migrations.iter().map(Migration::name).collect()
    }

    /// Report applied and pending migration names without writing anything.
    ///
    /// # Errors
    /// Returns an error when the migration log cannot be read.
    pub fn status(&self, db: &Database) -> Result<MigrationStatus, SchemaError> {
        let applied = applied_migrations(db.connection())?;
        let pending = self
            .migrations
            .iter()
            .filter(|migration| !applied.contains(&migration.name))
            .map(|migration| migration.name.clone())
            .collect();
        Ok(MigrationStatus { applied, pending })
    }

    /// Apply every pending migration in registration order, each in its own
    /// transaction.
    ///
    /// # Errors
    /// Returns an error when the log cannot be read, the database holds
    /// migrations this migrator does not know, or a migration fails. A failed
    /// migration leaves the database as it was before that migration.
    pub fn migrate(&self, db: &mut Database) -> Result<MigrationReport, SchemaError> {
        let mut report = MigrationReport::default();

        if self.erase_database_on_schema_change && self.schema_changed(db)? {
            tracing::warn!(
                location = %db.location().describe(),
                "schema differs from registered migrations; erasing database"
            );
            erase_database(db.connection_mut())?;
            report.erased = true;
        }

        ensure_migration_log(db.connection())?;
        let applied = applied_migrations(db.connection())?;
        if let Some(unknown) = applied.iter().find(|name| !self.is_registered(name)) {
            return Err(SchemaError::UnknownMigration(unknown.clone()));
        }

        for migration in &self.migrations {
            if applied.contains(&migration.name) {
                report.already_applied.push(migration.name.clone());
                continue;
            }
            apply_one(db.connection_mut(), migration)?;
            tracing::info!(migration = %migration.name, "applied migration");
            report.applied.push(migration.name.clone());
        }

        Ok(report)
    }

    fn is_registered(&self, name: &str) -> bool {
        self.migrations.iter().any(|migration| migration.name == name)
    }

    /// Compare the on-disk schema with a scratch database that ran the same
    /// already-applied migrations.
    fn schema_changed(&self, db: &Database) -> Result<bool, SchemaError> {
        let applied = applied_migrations(db.connection())?;
        if applied.is_empty() {
            return Ok(false);
        }
        if applied.iter().any(|name| !self.is_registered(name)) {
            return Ok(true);
        }

        let mut scratch = Database::open_in_memory()?;
        ensure_migration_log(scratch.connection())?;
        let already_applied = self
            .migrations
            .iter()
            .filter(|migration| applied.contains(&migration.name));
        for migration in already_applied {
            apply_one(scratch.connection_mut(), migration)?;
        }

        Ok(schema_fingerprint(scratch.connection())? != db.schema_fingerprint()?)
    }
}

/// First migration: both tables from their schema descriptions.
#[must_use]
pub fn create_tables_migration() -> Migration {
    Migration::sql(
        CREATE_TABLES,
        format!(
            "{}\n{}\nCREATE INDEX \"appIdeas_on_categoryID\" ON \"appIdeas\"(\"categoryID\");",
            categories_table().create_sql(),
            app_ideas_table().create_sql()
        ),
    )
}

fn ensure_migration_log(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{MIGRATION_LOG_TABLE}\" (
           name TEXT PRIMARY KEY,
           applied_at TEXT NOT NULL
         ) STRICT;"
    ))?;
    Ok(())
}

fn applied_migrations(conn: &Connection) -> Result<Vec<String>, SchemaError> {
    if !table_exists(conn, MIGRATION_LOG_TABLE)? {
        return Ok(Vec::new());
    }
    let sql = format!("SELECT name FROM \"{MIGRATION_LOG_TABLE}\" ORDER BY rowid ASC");
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    names.collect::<Result<Vec<_>, _>>().map_err(SchemaError::from)
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> Result<(), SchemaError> {
    let failed = |source| SchemaError::Migration {
        name: migration.name.clone(),
        source,
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(failed)?;
    (migration.step)(&tx).map_err(failed)?;

    let violations = {
        let mut stmt = tx.prepare("PRAGMA foreign_key_check").map_err(failed)?;
        let mut rows = stmt.query([]).map_err(failed)?;
        let mut violations = 0_usize;
        while rows.next().map_err(failed)?.is_some() {
            violations += 1;
        }
        violations
    };
    if violations > 0 {
        return Err(SchemaError::ForeignKeyViolation {
            name: migration.name.clone(),
            violations,
        });
    }

    let log = format!(
        "INSERT INTO \"{MIGRATION_LOG_TABLE}\"(name, applied_at) VALUES (?1, {NOW_SQL})"
    );
    tx.execute(&log, params![migration.name]).map_err(failed)?;
    tx.commit().map_err(failed)
}

fn erase_database(conn: &mut Connection) -> Result<(), SchemaError> {
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    let erased = drop_all_objects(conn);
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    erased
}

fn drop_all_objects(conn: &mut Connection) -> Result<(), SchemaError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let objects = {
        let mut stmt = tx.prepare(
            "SELECT type, name FROM sqlite_master
             WHERE type IN ('trigger', 'view', 'table') AND name NOT LIKE 'sqlite_%'
             ORDER BY CASE type WHEN 'trigger' THEN 0 WHEN 'view' THEN 1 ELSE 2 END",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    for (kind, name) in objects {
        let name = name.replace('"', "\"\"");
        tx.execute_batch(&format!("DROP {} IF EXISTS \"{name}\";", kind.to_uppercase()))?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;

    use super::*;
    use crate::config::StoreLocation;
    use crate::seed::NoResources;

    fn count(db: &Database, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM \"{table}\"");
        Ok(db.connection().query_row(&sql, [], |row| row.get(0))?)
    }

    #[test]
    fn fresh_database_applies_every_migration_once() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let migrator = Migrator::app(Arc::new(NoResources))?;

        let first = migrator.migrate(&mut db)?;
        assert_eq!(first.applied, vec![CREATE_TABLES, SEED_CATEGORIES, SEED_APP_IDEAS]);
        assert!(first.already_applied.is_empty());
        assert_eq!(count(&db, "categories")?, 3);
        assert_eq!(count(&db, "appIdeas")?, 87);

        let fingerprint = db.schema_fingerprint()?;
        let second = migrator.migrate(&mut db)?;
        assert!(second.applied.is_empty());
        assert_eq!(second.already_applied.len(), 3);
        assert_eq!(db.schema_fingerprint()?, fingerprint);
        assert_eq!(count(&db, "categories")?, 3);
        assert_eq!(count(&db, "appIdeas")?, 87);
        Ok(())
    }

    #[test]
    fn migration_is_idempotent_across_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let location = StoreLocation::File {
            path: dir.path().join("nested").join("db.sqlite"),
        };
        let migrator = Migrator::app(Arc::new(NoResources))?;

        let mut db = Database::open(&location, 5000)?;
        migrator.migrate(&mut db)?;
        drop(db);

        let mut reopened = Database::open(&location, 5000)?;
        let report = migrator.migrate(&mut reopened)?;
        assert!(report.applied.is_empty());
        assert_eq!(count(&reopened, "appIdeas")?, 87);
        Ok(())
    }

    #[test]
    fn status_lists_pending_names_without_writing() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let migrator = Migrator::app(Arc::new(NoResources))?;

        let before = migrator.status(&db)?;
        assert!(before.applied.is_empty());
        assert_eq!(before.pending, vec![CREATE_TABLES, SEED_CATEGORIES, SEED_APP_IDEAS]);
        assert!(!db.table_exists(MIGRATION_LOG_TABLE)?);

        migrator.migrate(&mut db)?;
        let after = migrator.status(&db)?;
        assert!(after.pending.is_empty());
        assert_eq!(after.applied.len(), 3);
        Ok(())
    }

    #[test]
    fn failed_migration_rolls_back_only_itself() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let migrator = Migrator::new(vec![
            create_tables_migration(),
            Migration::sql(
                "bad_seed",
                "INSERT INTO categories(id, title) VALUES (10, 'Fine');
                 INSERT INTO appIdeas(title, isFavorite) VALUES ('Typed wrong', 'yes');",
            ),
        ])?;

        let err = migrator.migrate(&mut db);
        assert!(
            matches!(err, Err(SchemaError::Migration { ref name, .. }) if name == "bad_seed")
        );

        assert_eq!(count(&db, "categories")?, 0);
        assert_eq!(migrator.status(&db)?.applied, vec![CREATE_TABLES]);
        Ok(())
    }

    #[test]
    fn dangling_reference_in_seed_fails_the_migration() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let migrator = Migrator::new(vec![
            create_tables_migration(),
            Migration::sql(
                "orphan",
                "INSERT INTO appIdeas(title, categoryID) VALUES ('Orphan', 42);",
            ),
        ])?;

        assert!(migrator.migrate(&mut db).is_err());
        assert_eq!(count(&db, "appIdeas")?, 0);
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = Migrator::new(vec![
            Migration::sql("one", "SELECT 1;"),
            Migration::sql("one", "SELECT 2;"),
        ]);
        assert!(matches!(result, Err(SchemaError::DuplicateMigration(name)) if name == "one"));
    }

    #[test]
    fn unknown_applied_migration_is_fatal_without_erase() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let future = Migration::sql("future", "CREATE TABLE later(x INTEGER) STRICT;");
        Migrator::new(vec![future])?.migrate(&mut db)?;

        let result = Migrator::app(Arc::new(NoResources))?.migrate(&mut db);
        assert!(matches!(result, Err(SchemaError::UnknownMigration(name)) if name == "future"));
        Ok(())
    }

    #[test]
    fn erase_on_schema_change_rebuilds_the_database() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let location = StoreLocation::File {
            path: dir.path().join("db.sqlite"),
        };

        let mut db = Database::open(&location, 5000)?;
        let notes = Migration::sql("notes", "CREATE TABLE notes(body TEXT NOT NULL) STRICT;");
        Migrator::new(vec![notes])?.migrate(&mut db)?;
        db.connection().execute("INSERT INTO notes(body) VALUES ('draft')", [])?;

        let reshaped = Migrator::new(vec![Migration::sql(
            "notes",
            "CREATE TABLE notes(body TEXT NOT NULL, pinned INTEGER NOT NULL DEFAULT 0) STRICT;",
        )])?;

        let untouched = reshaped.clone().migrate(&mut db)?;
        assert!(!untouched.erased);
        assert_eq!(db.table_columns("notes")?, vec!["body"]);

        let report = reshaped.erase_database_on_schema_change(true).migrate(&mut db)?;
        assert!(report.erased);
        assert_eq!(report.applied, vec!["notes"]);
        assert_eq!(db.table_columns("notes")?, vec!["body", "pinned"]);
        assert_eq!(count(&db, "notes")?, 0);
        Ok(())
    }

    #[test]
    fn erase_leaves_matching_schema_alone() -> Result<()> {
        let mut db = Database::open_in_memory()?;
        let resources: BTreeMap<String, String> = BTreeMap::new();
        let migrator = Migrator::app(Arc::new(resources))?.erase_database_on_schema_change(true);

        migrator.migrate(&mut db)?;
        db.connection().execute("UPDATE appIdeas SET isFavorite = 1 WHERE id = 1", [])?;

        let report = migrator.migrate(&mut db)?;
        assert!(!report.erased);
        let favorites: i64 = db.connection().query_row(
            "SELECT COUNT(*) FROM appIdeas WHERE isFavorite = 1",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(favorites, 1);
        Ok(())
    }
}
