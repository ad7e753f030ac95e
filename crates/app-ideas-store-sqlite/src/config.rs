use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::seed::{DirectoryResources, NoResources, SeedResources};

const DEFAULT_DATABASE_FILE: &str = "db.sqlite";
const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreLocation {
    File { path: PathBuf },
    /// Private, process-local database used for tests and previews.
    InMemory,
}

impl StoreLocation {
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::InMemory => ":memory:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// Wipe and rebuild the database when its schema no longer matches the
    /// registered migrations. Development only.
    pub erase_database_on_schema_change: bool,
    /// Directory holding the bundled `<Title-With-Hyphens>.md` seed documents.
    pub seed_resources_dir: Option<PathBuf>,
    pub busy_timeout_ms: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::File {
                path: PathBuf::from(DEFAULT_DATABASE_FILE),
            },
            erase_database_on_schema_change: false,
            seed_resources_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File {
                path: path.as_ref().to_path_buf(),
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::InMemory,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seed_resources_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.seed_resources_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_erase_database_on_schema_change(mut self, enabled: bool) -> Self {
        self.erase_database_on_schema_change = enabled;
        self
    }

    /// Parse a JSON config document; omitted keys take their defaults.
    ///
    /// # Errors
    /// Returns an error when the document is not valid JSON for this shape.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub fn seed_resources(&self) -> Arc<dyn SeedResources> {
        match &self.seed_resources_dir {
            Some(dir) => Arc::new(DirectoryResources::new(dir)),
            None => Arc::new(NoResources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_missing_keys_with_defaults() -> anyhow::Result<()> {
        let config = StoreConfig::from_json_str(
            r#"{
                "location": { "kind": "file", "path": "/data/ideas.sqlite" },
                "erase_database_on_schema_change": true
            }"#,
        )?;

        let expected = StoreLocation::File {
            path: PathBuf::from("/data/ideas.sqlite"),
        };
        assert_eq!(config.location, expected);
        assert!(config.erase_database_on_schema_change);
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.seed_resources_dir, None);
        Ok(())
    }

    #[test]
    fn production_default_never_erases() {
        let config = StoreConfig::default();
        assert!(!config.erase_database_on_schema_change);
        assert_eq!(config.location.describe(), DEFAULT_DATABASE_FILE);
        assert_eq!(StoreConfig::in_memory().location.describe(), ":memory:");
    }
}
