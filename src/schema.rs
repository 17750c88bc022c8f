//! Database schema description used to ground model prompts.

use crate::cache::{LoadState, OnceCache};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub database: String,
    pub tables: BTreeMap<String, TableDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnMeta>,
}

/// Column metadata as found in the schema document. Unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Schema {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| PipelineError::SchemaLoad(format!("malformed schema: {}", e)))
    }

    /// Compact prompt form: one `table(col, col)` line per table.
    pub fn summary(&self) -> String {
        let lines: Vec<String> = self
            .tables
            .iter()
            .map(|(name, table)| {
                let columns = if table.columns.is_empty() {
                    "unknown columns".to_string()
                } else {
                    table.columns.keys().cloned().collect::<Vec<_>>().join(", ")
                };
                format!("{}({})", name, columns)
            })
            .collect();

        format!("Database: {}\nTables:\n{}", self.database, lines.join("\n"))
    }
}

/// Backing resource the schema is read from.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn read(&self) -> Result<Schema>;

    fn describe(&self) -> String;
}

pub struct FileSchemaSource {
    path: PathBuf,
}

impl FileSchemaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SchemaSource for FileSchemaSource {
    async fn read(&self) -> Result<Schema> {
        let data = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::SchemaLoad(format!("{}: {}", self.path.display(), e))
        })?;
        Schema::from_json(&data)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Memoizing schema loader shared by every request.
pub struct SchemaProvider {
    source: Box<dyn SchemaSource>,
    cache: OnceCache<Schema>,
}

impl SchemaProvider {
    pub fn new(source: impl SchemaSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: OnceCache::new(),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSchemaSource::new(path))
    }

    pub async fn load(&self) -> Result<Arc<Schema>> {
        if let Some(schema) = self.cache.get() {
            debug!("Using cached schema");
            return Ok(schema);
        }

        self.cache
            .get_or_try_load(|| async {
                info!("Loading schema from {}", self.source.describe());
                let schema = self.source.read().await?;
                info!(
                    "Schema cached: database={}, {} tables",
                    schema.database,
                    schema.tables.len()
                );
                Ok(schema)
            })
            .await
    }

    pub fn state(&self) -> LoadState {
        self.cache.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FILM_SCHEMA: &str = r#"{
        "database": "sakila",
        "tables": {
            "film": {"columns": {"film_id": {"type": "smallint"}, "title": {"type": "varchar(128)"}}},
            "actor": {"columns": {"actor_id": {}, "first_name": {}, "last_name": {}}},
            "staging": {}
        }
    }"#;

    struct CountingSource {
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SchemaSource for CountingSource {
        async fn read(&self) -> Result<Schema> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Schema::from_json(FILM_SCHEMA)
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn test_summary_lists_tables_and_columns() {
        let schema = Schema::from_json(FILM_SCHEMA).unwrap();
        assert_eq!(
            schema.summary(),
            "Database: sakila\nTables:\n\
             actor(actor_id, first_name, last_name)\n\
             film(film_id, title)\n\
             staging(unknown columns)"
        );
    }

    #[test]
    fn test_column_metadata_keeps_unknown_keys() {
        let schema = Schema::from_json(
            r#"{"database": "d", "tables": {"t": {"columns": {"c": {"type": "int", "comment": "id"}}}}}"#,
        )
        .unwrap();
        let column = &schema.tables["t"].columns["c"];
        assert_eq!(column.data_type.as_deref(), Some("int"));
        assert_eq!(column.extra["comment"], "id");
    }

    #[tokio::test]
    async fn test_missing_file_is_schema_load_error() {
        let provider = SchemaProvider::from_file("/nonexistent/schema.json");
        let err = provider.load().await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaLoad(_)));
        assert_eq!(provider.state(), LoadState::NotLoaded);
    }

    #[tokio::test]
    async fn test_malformed_file_is_schema_load_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"database\": \"sakila\"").unwrap();

        let provider = SchemaProvider::from_file(file.path());
        let err = provider.load().await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaLoad(msg) if msg.contains("malformed")));
    }

    #[tokio::test]
    async fn test_file_schema_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", FILM_SCHEMA).unwrap();

        let provider = SchemaProvider::from_file(file.path());
        let schema = provider.load().await.unwrap();
        assert_eq!(schema.database, "sakila");
        assert_eq!(schema.tables.len(), 3);
        assert_eq!(provider.state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_concurrent_loads_read_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(SchemaProvider::new(CountingSource {
            reads: Arc::clone(&reads),
        }));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.load().await.map(|s| s.tables.len()) })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 3);
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }
}
