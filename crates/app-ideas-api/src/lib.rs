use app_ideas_store_sqlite::report_mutation;
use tracing_subscriber::EnvFilter;

mod executor;

pub use app_ideas_core::{
    apply, quick_launch_link, quick_launch_links, suggest_icon, AppIdea, AppIdeaId, Category,
    CategoryDraft, CategoryId, IdeaDraft, IdeaFields, IdeaQuery, LlmProvider, QuickLaunchLink,
    SortOption,
};
pub use app_ideas_store_sqlite::{
    AppIdeaStore, CategoryPredicate, IdeaPredicate, MigrationStatus, NotFoundExt, StoreConfig,
    StoreError, StoreLocation, Subscription,
};
pub use executor::{ExecutorError, StoreExecutor};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl ApiError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }
}

/// Install a console subscriber filtered by `RUST_LOG`, defaulting to `info`.
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

/// Collaborator-facing entry point. Every call hops to the store thread and
/// resolves once the operation has committed.
pub struct AppIdeasApi {
    executor: StoreExecutor,
}

impl AppIdeasApi {
    /// Open and migrate the store. Nothing else can reach the database
    /// before this returns.
    ///
    /// # Errors
    /// Returns [`ApiError::Executor`] when the store thread cannot start or
    /// migration fails.
    pub async fn start(config: StoreConfig) -> Result<Self, ApiError> {
        let executor = StoreExecutor::start(config).await?;
        Ok(Self { executor })
    }

    async fn call<F, T>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut AppIdeaStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.executor.run(op).await??)
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the insert violates a constraint.
    pub async fn create_idea(&self, fields: IdeaFields) -> Result<AppIdea, ApiError> {
        self.call(move |store| store.insert_idea(&fields)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the idea is missing or a constraint fails.
    pub async fn update_idea(
        &self,
        id: AppIdeaId,
        fields: IdeaFields,
    ) -> Result<AppIdea, ApiError> {
        self.call(move |store| store.update_idea(id, &fields)).await
    }

    /// # Errors
    /// See [`AppIdeasApi::create_idea`] and [`AppIdeasApi::update_idea`].
    pub async fn save_idea(&self, draft: IdeaDraft) -> Result<AppIdea, ApiError> {
        self.call(move |store| store.upsert_idea(&draft)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the idea is missing.
    pub async fn delete_idea(&self, id: AppIdeaId) -> Result<(), ApiError> {
        self.call(move |store| store.delete_idea(id)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the idea is missing.
    pub async fn toggle_favorite(&self, id: AppIdeaId) -> Result<AppIdea, ApiError> {
        self.call(move |store| store.toggle_favorite(id)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] for a blank title.
    pub async fn create_category(&self, title: String) -> Result<Category, ApiError> {
        self.call(move |store| store.insert_category(&title)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] for a blank title or a missing category.
    pub async fn update_category(&self, category: Category) -> Result<Category, ApiError> {
        self.call(move |store| store.update_category(&category))
            .await
    }

    /// # Errors
    /// See [`AppIdeasApi::create_category`] and [`AppIdeasApi::update_category`].
    pub async fn save_category(&self, draft: CategoryDraft) -> Result<Category, ApiError> {
        self.call(move |store| store.upsert_category(&draft)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] for a blank title or a missing category.
    pub async fn rename_category(
        &self,
        id: CategoryId,
        title: String,
    ) -> Result<Category, ApiError> {
        self.call(move |store| store.rename_category(id, &title))
            .await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the category is missing.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), ApiError> {
        self.call(move |store| store.delete_category(id)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the read fails.
    pub async fn ideas(&self, predicate: IdeaPredicate) -> Result<Vec<AppIdea>, ApiError> {
        self.call(move |store| store.fetch_ideas(predicate)).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the read fails.
    pub async fn idea(&self, id: AppIdeaId) -> Result<Option<AppIdea>, ApiError> {
        self.call(move |store| store.fetch_idea(IdeaPredicate::Id(id)))
            .await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the read fails.
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.call(|store| store.fetch_categories(CategoryPredicate::All))
            .await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the read fails.
    pub async fn category_of(&self, idea: AppIdea) -> Result<Option<Category>, ApiError> {
        self.call(move |store| store.category_of(&idea)).await
    }

    /// All ideas narrowed and ordered by `query`.
    ///
    /// # Errors
    /// Returns [`ApiError::Store`] when the read fails. Filtering itself
    /// cannot fail.
    pub async fn filtered(&self, query: IdeaQuery) -> Result<Vec<AppIdea>, ApiError> {
        let ideas = self.ideas(IdeaPredicate::All).await?;
        Ok(query.apply(&ideas))
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the initial evaluation fails.
    pub async fn live_ideas(&self) -> Result<Subscription<Vec<AppIdea>>, ApiError> {
        self.call(|store| store.subscribe_ideas(IdeaPredicate::All))
            .await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the initial evaluation fails.
    pub async fn live_favorites(&self) -> Result<Subscription<Vec<AppIdea>>, ApiError> {
        self.call(|store| store.subscribe_ideas(IdeaPredicate::Favorites))
            .await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the initial evaluation fails.
    pub async fn live_categories(&self) -> Result<Subscription<Vec<Category>>, ApiError> {
        self.call(|store| store.subscribe_categories()).await
    }

    /// # Errors
    /// Returns [`ApiError::Store`] when the migration log cannot be read.
    pub async fn migration_status(&self) -> Result<MigrationStatus, ApiError> {
        self.call(|store| store.migration_status().map_err(StoreError::from))
            .await
    }

    // UI-triggered mutations: a failure is logged and the mutation abandoned.

    pub async fn save_idea_logged(&self, draft: IdeaDraft) -> Option<AppIdea> {
        abandon_on_error("save idea", self.save_idea(draft).await)
    }

    pub async fn delete_idea_logged(&self, id: AppIdeaId) -> Option<()> {
        abandon_on_error("delete idea", self.delete_idea(id).await)
    }

    pub async fn toggle_favorite_logged(&self, id: AppIdeaId) -> Option<AppIdea> {
        abandon_on_error("toggle favorite", self.toggle_favorite(id).await)
    }

    pub async fn save_category_logged(&self, draft: CategoryDraft) -> Option<Category> {
        abandon_on_error("save category", self.save_category(draft).await)
    }

    pub async fn delete_category_logged(&self, id: CategoryId) -> Option<()> {
        abandon_on_error("delete category", self.delete_category(id).await)
    }

    /// Drain queued operations and close the database.
    ///
    /// # Errors
    /// Returns [`ApiError::Executor`] when the store thread panicked.
    pub fn shutdown(self) -> Result<(), ApiError> {
        Ok(self.executor.shutdown()?)
    }
}

fn abandon_on_error<T>(operation: &str, result: Result<T, ApiError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ApiError::Store(err)) => report_mutation(operation, Err(err)),
        Err(err) => {
            tracing::warn!(operation, error = %err, "mutation abandoned");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;

    use super::*;

    #[tokio::test]
    async fn startup_seeds_and_reports_migrations() -> Result<()> {
        let api = AppIdeasApi::start(StoreConfig::in_memory()).await?;

        assert!(api.migration_status().await?.pending.is_empty());
        assert_eq!(api.categories().await?.len(), 3);
        assert_eq!(api.ideas(IdeaPredicate::All).await?.len(), 87);
        api.shutdown()?;
        Ok(())
    }

    #[tokio::test]
    async fn live_favorites_follow_mutations() -> Result<()> {
        let api = AppIdeasApi::start(StoreConfig::in_memory()).await?;
        let mut favorites = api.live_favorites().await?;
        assert!(favorites.current().is_empty());

        let kudos = IdeaFields::new("Kudos Slackbot").with_favorite(true);
        let idea = api.create_idea(kudos).await?;
        let latest = tokio::time::timeout(Duration::from_secs(5), favorites.changed())
            .await?;
        assert_eq!(latest.map(|ideas| ideas.len()), Some(1));

        api.toggle_favorite(idea.id).await?;
        assert!(favorites.try_next().is_some_and(|ideas| ideas.is_empty()));

        favorites.unsubscribe();
        api.toggle_favorite(idea.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn live_categories_and_ideas_see_category_changes() -> Result<()> {
        let api = AppIdeasApi::start(StoreConfig::in_memory()).await?;
        let mut categories = api.live_categories().await?;
        let mut ideas = api.live_ideas().await?;
        assert_eq!(categories.current().len(), 3);

        api.rename_category(CategoryId(2), "Weekend Builds".to_string())
            .await?;
        let renamed = categories
            .try_next()
            .ok_or_else(|| anyhow::anyhow!("expected categories"))?;
        assert_eq!(renamed[1].title, "Weekend Builds");
        assert!(!ideas.has_changed());

        api.delete_category(CategoryId(1)).await?;
        assert_eq!(categories.try_next().map(|all| all.len()), Some(2));
        let refreshed = ideas
            .try_next()
            .ok_or_else(|| anyhow::anyhow!("expected ideas"))?;
        let uncategorized = refreshed
            .iter()
            .filter(|idea| idea.category_id.is_none())
            .count();
        assert_eq!(uncategorized, 34);
        Ok(())
    }

    #[tokio::test]
    async fn filtered_applies_category_search_and_sort() -> Result<()> {
        let api = AppIdeasApi::start(StoreConfig::in_memory()).await?;
        let category = api.create_category("Utilities".to_string()).await?;
        for title in ["Unit Converter", "unit tester", "Alarm"] {
            api.create_idea(IdeaFields::new(title).with_category(Some(category.id)))
                .await?;
        }

        let query = IdeaQuery {
            category: Some(category.id),
            search: "UNIT".to_string(),
            sort: SortOption::Title,
        };
        let titles = api
            .filtered(query)
            .await?
            .into_iter()
            .map(|idea| idea.title)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Unit Converter", "unit tester"]);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_a_category_keeps_its_ideas() -> Result<()> {
        let api = AppIdeasApi::start(StoreConfig::in_memory()).await?;
        let before = api.ideas(IdeaPredicate::Category(Some(CategoryId(3)))).await?;
        assert_eq!(before.len(), 20);

        api.delete_category(CategoryId(3)).await?;
        let uncategorized = api.ideas(IdeaPredicate::Category(None)).await?;
        assert_eq!(uncategorized.len(), 20);
        assert_eq!(api.ideas(IdeaPredicate::All).await?.len(), 87);
        assert_eq!(api.category_of(uncategorized[0].clone()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn logged_mutations_abandon_failures() -> Result<()> {
        let api = AppIdeasApi::start(StoreConfig::in_memory()).await?;

        let orphan = IdeaFields::new("Orphan").with_category(Some(CategoryId(404)));
        assert_eq!(api.save_idea_logged(IdeaDraft::New(orphan)).await, None);
        assert_eq!(api.delete_idea_logged(AppIdeaId(9_999)).await, None);
        let blank = CategoryDraft::New {
            title: String::new(),
        };
        assert_eq!(api.save_category_logged(blank).await, None);
        assert_eq!(api.ideas(IdeaPredicate::All).await?.len(), 87);

        let side_quests = CategoryDraft::New {
            title: "Side Quests".to_string(),
        };
        let saved = api.save_category_logged(side_quests).await;
        assert_eq!(
            saved.map(|category| category.title).as_deref(),
            Some("Side Quests")
        );
        let toggled = api.toggle_favorite_logged(AppIdeaId(1)).await;
        assert!(toggled.is_some_and(|idea| idea.is_favorite));
        Ok(())
    }

    #[tokio::test]
    async fn not_found_is_the_callers_choice() -> Result<()> {
        let api = AppIdeasApi::start(StoreConfig::in_memory()).await?;

        let err = api.delete_category(CategoryId(77)).await;
        assert!(err.is_err_and(|err| err.is_not_found()));

        assert!(api.idea(AppIdeaId(77)).await?.is_some());
        assert_eq!(api.idea(AppIdeaId(9_999)).await?, None);
        let missing = api.delete_idea(AppIdeaId(9_999)).await;
        assert!(missing.is_err_and(|err| err.is_not_found()));
        Ok(())
    }

    #[tokio::test]
    async fn file_store_survives_restart() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = StoreConfig::file(dir.path().join("ideas").join("db.sqlite"));

        let api = AppIdeasApi::start(config.clone()).await?;
        let battleship = IdeaFields::new("Battleship Bot").with_detail("Play over chat");
        let idea = api.create_idea(battleship).await?;
        api.shutdown()?;

        let api = AppIdeasApi::start(config).await?;
        let reloaded = api.idea(idea.id).await?;
        assert_eq!(reloaded.map(|idea| idea.detail).as_deref(), Some("Play over chat"));
        Ok(())
    }

    #[test]
    fn tracing_initialises_once() {
        init_tracing();
        assert!(!init_tracing());
    }
}
