use app_ideas_core::{
    validate_category_title, AppIdea, AppIdeaId, Category, CategoryDraft, CategoryId, IdeaDraft,
    IdeaFields,
};
use rusqlite::types::Type;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Params, Row, Transaction,
    TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::live::ChangeTracker;

mod config;
mod error;
mod live;
mod migrate;
mod schema;
mod seed;

pub use config::{StoreConfig, StoreLocation};
pub use error::{report_mutation, NotFoundExt, SchemaError, StoreError};
pub use live::{LiveQueryHub, Subscription, Table};
pub use migrate::{
    create_tables_migration, Migration, MigrationReport, MigrationStatus, Migrator, CREATE_TABLES,
    SEED_APP_IDEAS, SEED_CATEGORIES,
};
pub use schema::{
    app_ideas_table, categories_table, install_updated_at_trigger, Column, ColumnDefault,
    ColumnType, Database, ForeignKey, OnDelete, TableSchema, APP_IDEAS_TABLE, CATEGORIES_TABLE,
    MIGRATION_LOG_TABLE,
};
pub use seed::{
    resource_name, seed_catalog, DirectoryResources, NoResources, SeedCategory, SeedIdea,
    SeedResources, Tier, SEED_CATEGORIES as SEED_CATEGORY_ROWS,
};

const IDEA_COLUMNS: &str = "\"id\", \"title\", \"icon\", \"shortDescription\", \"detail\", \
     \"isFavorite\", \"updatedAt\", \"categoryID\"";

/// Row filter for idea reads and live queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IdeaPredicate {
    #[default]
    All,
    Favorites,
    Id(AppIdeaId),
    /// `None` selects uncategorized ideas.
    Category(Option<CategoryId>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CategoryPredicate {
    #[default]
    All,
    Id(CategoryId),
}

/// Handle to a migrated database. Obtainable only through [`AppIdeaStore::open`]
/// or [`AppIdeaStore::with_migrator`], both of which finish migration first.
pub struct AppIdeaStore {
    db: Database,
    migrator: Migrator,
    live: LiveQueryHub,
    changes: ChangeTracker,
}

impl AppIdeaStore {
    /// Open, migrate and seed the configured database.
    ///
    /// # Errors
    /// Returns [`SchemaError`] when the database cannot be opened or migrated.
    /// The store must not be used in that case.
    pub fn open(config: &StoreConfig) -> Result<Self, SchemaError> {
        let db = Database::open(&config.location, config.busy_timeout_ms)?;
        let migrator = Migrator::app(config.seed_resources())?
            .erase_database_on_schema_change(config.erase_database_on_schema_change);
        Self::with_migrator(db, migrator)
    }

    /// # Errors
    /// Returns [`SchemaError`] when a migration or the updatedAt trigger fails.
    pub fn with_migrator(mut db: Database, migrator: Migrator) -> Result<Self, SchemaError> {
        let report = migrator.migrate(&mut db)?;
        install_updated_at_trigger(&db)?;
        tracing::info!(
            location = %db.location().describe(),
            applied = report.applied.len(),
            erased = report.erased,
            "app idea store ready"
        );
        let changes = ChangeTracker::install(db.connection());
        Ok(Self {
            db,
            migrator,
            live: LiveQueryHub::new(),
            changes,
        })
    }

    /// # Errors
    /// Returns an error when the migration log cannot be read.
    pub fn migration_status(&self) -> Result<MigrationStatus, SchemaError> {
        self.migrator.status(&self.db)
    }

    /// Run `op` in one immediate transaction, then republish live queries on
    /// `tables` and on every table the transaction changed once it has
    /// committed.
    fn write<T>(
        &mut self,
        tables: &[Table],
        op: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.changes.clear();
        let tx = self
            .db
            .connection_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;

        let mut touched = self.changes.take();
        touched.extend(tables.iter().copied());
        let touched = touched.into_iter().collect::<Vec<_>>();
        self.live.publish(self.db.connection(), &touched);
        Ok(value)
    }

    /// Run one raw SQL statement in its own immediate transaction and return
    /// the number of rows it changed. Live queries on every table it changed
    /// are republished, rows rewritten by triggers or foreign-key actions
    /// included.
    ///
    /// # Errors
    /// Returns [`StoreError::Constraint`] when the statement violates a
    /// constraint; nothing is written then.
    pub fn execute_bulk<P: Params>(&mut self, sql: &str, params: P) -> Result<usize, StoreError> {
        self.write(&[], |tx| Ok(tx.execute(sql, params)?))
    }

    // Ideas

    /// # Errors
    /// Returns [`StoreError::Constraint`] when `category_id` names a missing category.
    pub fn insert_idea(&mut self, fields: &IdeaFields) -> Result<AppIdea, StoreError> {
        self.write(&[Table::AppIdeas], |tx| {
            tx.execute(
                "INSERT INTO \"appIdeas\"(
                     \"title\", \"icon\", \"shortDescription\", \"detail\",
                     \"isFavorite\", \"categoryID\"
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    fields.title,
                    fields.icon,
                    fields.short_description,
                    fields.detail,
                    fields.is_favorite,
                    fields.category_id.map(|id| id.0)
                ],
            )?;
            require_idea(tx, AppIdeaId(tx.last_insert_rowid()))
        })
    }

    /// Replace every mutable field of an existing idea. `updatedAt` is stamped
    /// by the store.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when `id` does not exist and
    /// [`StoreError::Constraint`] for a dangling category reference.
    pub fn update_idea(
        &mut self,
        id: AppIdeaId,
        fields: &IdeaFields,
    ) -> Result<AppIdea, StoreError> {
        self.write(&[Table::AppIdeas], |tx| {
            let changed = tx.execute(
                "UPDATE \"appIdeas\"
                 SET \"title\" = ?2, \"icon\" = ?3, \"shortDescription\" = ?4, \"detail\" = ?5,
                     \"isFavorite\" = ?6, \"categoryID\" = ?7
                 WHERE \"id\" = ?1",
                params![
                    id.0,
                    fields.title,
                    fields.icon,
                    fields.short_description,
                    fields.detail,
                    fields.is_favorite,
                    fields.category_id.map(|id| id.0)
                ],
            )?;
            if changed == 0 {
                return Err(idea_not_found(id));
            }
            require_idea(tx, id)
        })
    }

    /// # Errors
    /// See [`AppIdeaStore::insert_idea`] and [`AppIdeaStore::update_idea`].
    pub fn upsert_idea(&mut self, draft: &IdeaDraft) -> Result<AppIdea, StoreError> {
        match draft {
            IdeaDraft::New(fields) => self.insert_idea(fields),
            IdeaDraft::Existing(id, fields) => self.update_idea(*id, fields),
        }
    }

    /// # Errors
    /// Returns [`StoreError::NotFound`] when `id` does not exist.
    pub fn delete_idea(&mut self, id: AppIdeaId) -> Result<(), StoreError> {
        self.write(&[Table::AppIdeas], |tx| {
            match tx.execute("DELETE FROM \"appIdeas\" WHERE \"id\" = ?1", params![id.0])? {
                0 => Err(idea_not_found(id)),
                _ => Ok(()),
            }
        })
    }

    /// Flip `isFavorite` in place and return the updated idea.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when `id` does not exist.
    pub fn toggle_favorite(&mut self, id: AppIdeaId) -> Result<AppIdea, StoreError> {
        self.write(&[Table::AppIdeas], |tx| {
            let changed = tx.execute(
                "UPDATE \"appIdeas\" SET \"isFavorite\" = 1 - \"isFavorite\" WHERE \"id\" = ?1",
                params![id.0],
            )?;
            if changed == 0 {
                return Err(idea_not_found(id));
            }
            require_idea(tx, id)
        })
    }

    /// Ideas matching `predicate` in primary-key order.
    ///
    /// # Errors
    /// Returns an error when the read fails or a row cannot be decoded.
    pub fn fetch_ideas(&self, predicate: IdeaPredicate) -> Result<Vec<AppIdea>, StoreError> {
        query_ideas(self.db.connection(), predicate)
    }

    /// # Errors
    /// Returns an error when the read fails or a row cannot be decoded.
    pub fn fetch_idea(&self, predicate: IdeaPredicate) -> Result<Option<AppIdea>, StoreError> {
        Ok(query_ideas(self.db.connection(), predicate)?.into_iter().next())
    }

    /// # Errors
    /// Returns an error when the read fails.
    pub fn count_ideas(&self) -> Result<usize, StoreError> {
        count_rows(self.db.connection(), APP_IDEAS_TABLE)
    }

    // Categories

    /// # Errors
    /// Returns [`StoreError::Validation`] for a blank title.
    pub fn insert_category(&mut self, title: &str) -> Result<Category, StoreError> {
        validate_category_title(title)?;
        self.write(&[Table::Categories], |tx| {
            tx.execute("INSERT INTO \"categories\"(\"title\") VALUES (?1)", params![title])?;
            Ok(Category {
                id: CategoryId(tx.last_insert_rowid()),
                title: title.to_string(),
            })
        })
    }

    /// # Errors
    /// Returns [`StoreError::Validation`] for a blank title and
    /// [`StoreError::NotFound`] when the category does not exist.
    pub fn update_category(&mut self, category: &Category) -> Result<Category, StoreError> {
        validate_category_title(&category.title)?;
        self.write(&[Table::Categories], |tx| {
            let changed = tx.execute(
                "UPDATE \"categories\" SET \"title\" = ?2 WHERE \"id\" = ?1",
                params![category.id.0, category.title],
            )?;
            if changed == 0 {
                return Err(category_not_found(category.id));
            }
            Ok(category.clone())
        })
    }

    /// # Errors
    /// See [`AppIdeaStore::insert_category`] and [`AppIdeaStore::update_category`].
    pub fn upsert_category(&mut self, draft: &CategoryDraft) -> Result<Category, StoreError> {
        match draft {
            CategoryDraft::New { title } => self.insert_category(title),
            CategoryDraft::Existing(category) => self.update_category(category),
        }
    }

    /// Rename a category. An unchanged title writes nothing.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] for a blank title and
    /// [`StoreError::NotFound`] when the category does not exist.
    pub fn rename_category(&mut self, id: CategoryId, title: &str) -> Result<Category, StoreError> {
        validate_category_title(title)?;
        let current = self
            .fetch_category(CategoryPredicate::Id(id))?
            .ok_or_else(|| category_not_found(id))?;
        if current.title == title {
            return Ok(current);
        }
        self.update_category(&Category {
            id,
            title: title.to_string(),
        })
    }

    /// Delete a category. Ideas that referenced it become uncategorized.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when `id` does not exist.
    pub fn delete_category(&mut self, id: CategoryId) -> Result<(), StoreError> {
        self.write(&[Table::Categories, Table::AppIdeas], |tx| {
            match tx.execute("DELETE FROM \"categories\" WHERE \"id\" = ?1", params![id.0])? {
                0 => Err(category_not_found(id)),
                _ => Ok(()),
            }
        })
    }

    /// # Errors
    /// Returns an error when the read fails.
    pub fn fetch_categories(
        &self,
        predicate: CategoryPredicate,
    ) -> Result<Vec<Category>, StoreError> {
        query_categories(self.db.connection(), predicate)
    }

    /// # Errors
    /// Returns an error when the read fails.
    pub fn fetch_category(
        &self,
        predicate: CategoryPredicate,
    ) -> Result<Option<Category>, StoreError> {
        Ok(query_categories(self.db.connection(), predicate)?.into_iter().next())
    }

    /// The category an idea belongs to, if any.
    ///
    /// # Errors
    /// Returns an error when the read fails.
    pub fn category_of(&self, idea: &AppIdea) -> Result<Option<Category>, StoreError> {
        match idea.category_id {
            Some(id) => self.fetch_category(CategoryPredicate::Id(id)),
            None => Ok(None),
        }
    }

    /// # Errors
    /// Returns an error when the read fails.
    pub fn count_categories(&self) -> Result<usize, StoreError> {
        count_rows(self.db.connection(), CATEGORIES_TABLE)
    }

    // Live queries

    /// # Errors
    /// Returns an error when the initial evaluation fails.
    pub fn subscribe_ideas(
        &self,
        predicate: IdeaPredicate,
    ) -> Result<Subscription<Vec<AppIdea>>, StoreError> {
        self.live.register(self.db.connection(), Table::AppIdeas, move |conn| {
            query_ideas(conn, predicate)
        })
    }

    /// # Errors
    /// Returns an error when the initial evaluation fails.
    pub fn subscribe_categories(&self) -> Result<Subscription<Vec<Category>>, StoreError> {
        self.live.register(self.db.connection(), Table::Categories, |conn| {
            query_categories(conn, CategoryPredicate::All)
        })
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.live.subscriber_count()
    }
}

fn idea_not_found(id: AppIdeaId) -> StoreError {
    StoreError::NotFound {
        entity: "app idea",
        id: id.0,
    }
}

fn category_not_found(id: CategoryId) -> StoreError {
    StoreError::NotFound {
        entity: "category",
        id: id.0,
    }
}

fn query_ideas(conn: &Connection, predicate: IdeaPredicate) -> Result<Vec<AppIdea>, StoreError> {
    let (clause, bound) = match predicate {
        IdeaPredicate::All => ("", None),
        IdeaPredicate::Favorites => ("WHERE \"isFavorite\" = 1", None),
        IdeaPredicate::Id(id) => ("WHERE \"id\" = ?1", Some(id.0)),
        IdeaPredicate::Category(Some(id)) => ("WHERE \"categoryID\" = ?1", Some(id.0)),
        IdeaPredicate::Category(None) => ("WHERE \"categoryID\" IS NULL", None),
    };

    let sql = format!("SELECT {IDEA_COLUMNS} FROM \"appIdeas\" {clause} ORDER BY \"id\" ASC");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params_from_iter(bound), idea_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn require_idea(conn: &Connection, id: AppIdeaId) -> Result<AppIdea, StoreError> {
    conn.query_row(
        &format!("SELECT {IDEA_COLUMNS} FROM \"appIdeas\" WHERE \"id\" = ?1"),
        params![id.0],
        idea_from_row,
    )
    .optional()?
    .ok_or_else(|| idea_not_found(id))
}

fn idea_from_row(row: &Row<'_>) -> rusqlite::Result<AppIdea> {
    let updated_at: String = row.get(6)?;
    let updated_at = OffsetDateTime::parse(&updated_at, &Rfc3339)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(err)))?;

    Ok(AppIdea {
        id: AppIdeaId(row.get(0)?),
        title: row.get(1)?,
        icon: row.get(2)?,
        short_description: row.get(3)?,
        detail: row.get(4)?,
        is_favorite: row.get(5)?,
        updated_at,
        category_id: row.get::<_, Option<i64>>(7)?.map(CategoryId),
    })
}

fn query_categories(
    conn: &Connection,
    predicate: CategoryPredicate,
) -> Result<Vec<Category>, StoreError> {
    let (clause, bound) = match predicate {
        CategoryPredicate::All => ("", None),
        CategoryPredicate::Id(id) => ("WHERE \"id\" = ?1", Some(id.0)),
    };

    let sql = format!("SELECT \"id\", \"title\" FROM \"categories\" {clause} ORDER BY \"id\" ASC");
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params_from_iter(bound), |row| {
        Ok(Category {
            id: CategoryId(row.get(0)?),
            title: row.get(1)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM \"{table}\"");
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    usize::try_from(count).map_err(|err| StoreError::Decode(err.to_string()))
}
