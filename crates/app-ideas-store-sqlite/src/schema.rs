use std::fmt::Write as _;
use std::fs;

use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use crate::config::StoreLocation;
use crate::error::SchemaError;

pub const CATEGORIES_TABLE: &str = "categories";
pub const APP_IDEAS_TABLE: &str = "appIdeas";
pub const MIGRATION_LOG_TABLE: &str = "schema_migrations";

/// Millisecond UTC timestamp in RFC 3339 form.
pub const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const UPDATED_AT_TRIGGER: &str = "appIdeas_touch_updatedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    /// Stored as INTEGER restricted to 0 and 1.
    Boolean,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    None,
    Integer(i64),
    Text(&'static str),
    CurrentTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    SetNull,
    Cascade,
    Restrict,
}

impl OnDelete {
    fn sql(self) -> &'static str {
        match self {
            Self::SetNull => "SET NULL",
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub default: ColumnDefault,
    pub references: Option<ForeignKey>,
}

impl Column {
    /// Auto-assigned key that is never reused within the database lifetime.
    #[must_use]
    pub fn primary_key(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Integer,
            primary_key: true,
            nullable: false,
            default: ColumnDefault::None,
            references: None,
        }
    }

    #[must_use]
    pub fn new(name: &'static str, column_type: ColumnType, default: ColumnDefault) -> Self {
        Self {
            name,
            column_type,
            primary_key: false,
            nullable: false,
            default,
            references: None,
        }
    }

    #[must_use]
    pub fn nullable_reference(name: &'static str, references: ForeignKey) -> Self {
        Self {
            name,
            column_type: ColumnType::Integer,
            primary_key: false,
            nullable: true,
            default: ColumnDefault::None,
            references: Some(references),
        }
    }

    fn definition_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.column_type.sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
            return sql;
        }
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        match &self.default {
            ColumnDefault::None => {}
            ColumnDefault::Integer(value) => {
                let _ = write!(sql, " DEFAULT {value}");
            }
            ColumnDefault::Text(value) => {
                let _ = write!(sql, " DEFAULT '{}'", value.replace('\'', "''"));
            }
            ColumnDefault::CurrentTimestamp => {
                let _ = write!(sql, " DEFAULT ({NOW_SQL})");
            }
        }
        if self.column_type == ColumnType::Boolean {
            let _ = write!(sql, " CHECK (\"{}\" IN (0, 1))", self.name);
        }
        if let Some(reference) = &self.references {
            let _ = write!(
                sql,
                " REFERENCES \"{}\"(\"{}\") ON DELETE {}",
                reference.table,
                reference.column,
                reference.on_delete.sql()
            );
        }
        sql
    }
}

/// Plain-data description of one STRICT table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: Vec<Column>,
}

impl TableSchema {
    #[must_use]
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| format!("  {}", column.definition_sql()))
            .collect::<Vec<_>>();
        format!("CREATE TABLE \"{}\" (\n{}\n) STRICT;", self.name, columns.join(",\n"))
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|column| column.name).collect()
    }
}

#[must_use]
pub fn categories_table() -> TableSchema {
    TableSchema {
        name: CATEGORIES_TABLE,
        columns: vec![
            Column::primary_key("id"),
            Column::new("title", ColumnType::Text, ColumnDefault::Text("")),
        ],
    }
}

#[must_use]
pub fn app_ideas_table() -> TableSchema {
    TableSchema {
        name: APP_IDEAS_TABLE,
        columns: vec![
            Column::primary_key("id"),
            Column::new("title", ColumnType::Text, ColumnDefault::Text("")),
            Column::new(
                "icon",
                ColumnType::Text,
                ColumnDefault::Text(app_ideas_core::DEFAULT_ICON),
            ),
            Column::new("shortDescription", ColumnType::Text, ColumnDefault::Text("")),
            Column::new("detail", ColumnType::Text, ColumnDefault::Text("")),
            Column::new("isFavorite", ColumnType::Boolean, ColumnDefault::Integer(0)),
            Column::new("updatedAt", ColumnType::Text, ColumnDefault::CurrentTimestamp),
            Column::nullable_reference(
                "categoryID",
                ForeignKey {
                    table: CATEGORIES_TABLE,
                    column: "id",
                    on_delete: OnDelete::SetNull,
                },
            ),
        ],
    }
}

/// Connection to the single embedded database file.
pub struct Database {
    conn: Connection,
    location: StoreLocation,
}

impl Database {
    /// Open the database and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened, pragmas cannot be
    /// applied, or the connection does not enforce foreign keys.
    pub fn open(location: &StoreLocation, busy_timeout_ms: u32) -> Result<Self, SchemaError> {
        let conn = match location {
            StoreLocation::File { path } => {
                let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
                if let Some(parent) = parent {
                    fs::create_dir_all(parent).map_err(|source| SchemaError::Directory {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                let conn = Connection::open(path).map_err(|source| SchemaError::Open {
                    location: location.describe(),
                    source,
                })?;
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                conn
            }
            StoreLocation::InMemory => {
                Connection::open_in_memory().map_err(|source| SchemaError::Open {
                    location: location.describe(),
                    source,
                })?
            }
        };

        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {busy_timeout_ms};"
        ))?;

        let foreign_keys: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(SchemaError::ForeignKeysUnavailable);
        }

        tracing::debug!(location = %location.describe(), "database opened");
        Ok(Self {
            conn,
            location: location.clone(),
        })
    }

    /// # Errors
    /// Returns an error when the in-memory connection cannot be configured.
    pub fn open_in_memory() -> Result<Self, SchemaError> {
        Self::open(&StoreLocation::InMemory, 0)
    }

    #[must_use]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    #[must_use]
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// # Errors
    /// Returns an error when `sqlite_master` cannot be queried.
    pub fn table_exists(&self, table_name: &str) -> Result<bool, SchemaError> {
        table_exists(&self.conn, table_name)
    }

    /// Column names of `table` in declaration order.
    ///
    /// # Errors
    /// Returns an error when the table cannot be inspected.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>, SchemaError> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt.query_map(params![table], |row| row.get::<_, String>(0))?;
        names.collect::<Result<Vec<_>, _>>().map_err(SchemaError::from)
    }

    /// Digest of every user table and index definition.
    ///
    /// # Errors
    /// Returns an error when `sqlite_master` cannot be queried.
    pub fn schema_fingerprint(&self) -> Result<String, SchemaError> {
        schema_fingerprint(&self.conn)
    }
}

pub(crate) fn table_exists(conn: &Connection, table_name: &str) -> Result<bool, SchemaError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table_name],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn schema_fingerprint(conn: &Connection) -> Result<String, SchemaError> {
    let mut stmt = conn.prepare(
        "SELECT type, name, COALESCE(sql, '')
         FROM sqlite_master
         WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%'
         ORDER BY type ASC, name ASC",
    )?;
    let mut rows = stmt.query([])?;
    let mut hasher = Sha256::new();

    while let Some(row) = rows.next()? {
        for index in 0..3 {
            let value: String = row.get(index)?;
            hasher.update(value.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\n");
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Install the trigger that stamps `updatedAt` on every row update, whatever
/// statement performed it. The stamp never moves backwards.
///
/// Stamps are compared as instants through `julianday`, so a stored value in
/// another offset or without fractional seconds still orders correctly. A
/// stamp `julianday` cannot read is replaced. The trigger is recreated on
/// every open so its definition always matches this build.
///
/// # Errors
/// Returns an error when the trigger cannot be created.
pub fn install_updated_at_trigger(db: &Database) -> Result<(), SchemaError> {
    db.conn
        .execute_batch(&format!(
            "DROP TRIGGER IF EXISTS \"{UPDATED_AT_TRIGGER}\";
             CREATE TRIGGER \"{UPDATED_AT_TRIGGER}\"
             AFTER UPDATE ON \"{APP_IDEAS_TABLE}\"
             FOR EACH ROW
             BEGIN
               UPDATE \"{APP_IDEAS_TABLE}\"
               SET \"updatedAt\" = CASE
                 WHEN julianday(OLD.\"updatedAt\") > julianday('now') THEN OLD.\"updatedAt\"
                 ELSE {NOW_SQL}
               END
               WHERE \"id\" = NEW.\"id\";
             END;"
        ))
        .map_err(SchemaError::Trigger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_ideas_table_renders_strict_sql_with_set_null_reference() {
        let sql = app_ideas_table().create_sql();

        assert!(sql.starts_with("CREATE TABLE \"appIdeas\""));
        assert!(sql.ends_with(") STRICT;"));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains(
            "\"isFavorite\" INTEGER NOT NULL DEFAULT 0 CHECK (\"isFavorite\" IN (0, 1))"
        ));
        assert!(sql.contains(
            "\"categoryID\" INTEGER REFERENCES \"categories\"(\"id\") ON DELETE SET NULL"
        ));
        assert!(sql.contains(&format!("\"updatedAt\" TEXT NOT NULL DEFAULT ({NOW_SQL})")));
    }

    #[test]
    fn text_defaults_are_quoted() {
        let column = Column::new("note", ColumnType::Text, ColumnDefault::Text("it's"));
        assert_eq!(column.definition_sql(), "\"note\" TEXT NOT NULL DEFAULT 'it''s'");
    }

    #[test]
    fn rendered_tables_match_their_description() -> anyhow::Result<()> {
        let db = Database::open_in_memory()?;
        let categories = categories_table();
        let ideas = app_ideas_table();
        db.connection().execute_batch(&categories.create_sql())?;
        db.connection().execute_batch(&ideas.create_sql())?;

        assert_eq!(db.table_columns(CATEGORIES_TABLE)?, categories.column_names());
        assert_eq!(db.table_columns(APP_IDEAS_TABLE)?, ideas.column_names());
        Ok(())
    }

    #[test]
    fn fingerprint_tracks_table_shape() -> anyhow::Result<()> {
        let a = Database::open_in_memory()?;
        let b = Database::open_in_memory()?;
        a.connection().execute_batch(&categories_table().create_sql())?;
        b.connection().execute_batch(&categories_table().create_sql())?;
        assert_eq!(a.schema_fingerprint()?, b.schema_fingerprint()?);

        b.connection().execute_batch("ALTER TABLE categories ADD COLUMN color TEXT")?;
        assert_ne!(a.schema_fingerprint()?, b.schema_fingerprint()?);
        Ok(())
    }

    #[test]
    fn opened_connections_enforce_foreign_keys() -> anyhow::Result<()> {
        let db = Database::open_in_memory()?;
        let enabled: i64 = db
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        assert_eq!(enabled, 1);
        Ok(())
    }
}
