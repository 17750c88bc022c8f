#![allow(dead_code)]

use askdb::config::PipelineSettings;
use askdb::db::{Database, ResultSet, Row, Value};
use askdb::error::{ModelError, PipelineError, Result};
use askdb::llm::ModelClient;
use askdb::schema::{Schema, SchemaProvider, SchemaSource};
use askdb::QueryPipeline;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FILM_SCHEMA: &str = r#"{
    "database": "sakila",
    "tables": {
        "film": {"columns": {"film_id": {}, "title": {}, "release_year": {}, "rating": {}}},
        "category": {"columns": {"category_id": {}, "name": {}}},
        "film_category": {"columns": {"film_id": {}, "category_id": {}}},
        "rental": {"columns": {"rental_id": {}, "customer_id": {}, "inventory_id": {}}}
    }
}"#;

pub struct StaticSchema;

#[async_trait]
impl SchemaSource for StaticSchema {
    async fn read(&self) -> Result<Schema> {
        Schema::from_json(FILM_SCHEMA)
    }

    fn describe(&self) -> String {
        "inline film schema".to_string()
    }
}

/// Replies with queued answers in order and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, u16>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<std::result::Result<&str, u16>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(status)) => Err(ModelError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Err(ModelError::Decode("no scripted reply left".to_string())),
        }
    }
}

pub enum DbBehavior {
    Rows(ResultSet),
    Fail(String),
    Hang(Duration),
}

/// Returns a fixed outcome and records the SQL it was asked to run.
pub struct FakeDatabase {
    behavior: DbBehavior,
    executed: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn new(behavior: DbBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn fetch_all(&self, sql: &str) -> Result<ResultSet> {
        self.executed.lock().unwrap().push(sql.to_string());
        match &self.behavior {
            DbBehavior::Rows(rows) => Ok(rows.clone()),
            DbBehavior::Fail(msg) => Err(PipelineError::Execution(msg.clone())),
            DbBehavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }
}

pub fn matrix_row() -> Row {
    [
        ("title", Value::from("Matrix")),
        ("release_year", Value::from(1999)),
        ("rating", Value::from("R")),
    ]
    .into_iter()
    .collect()
}

pub fn pipeline_with(
    settings: PipelineSettings,
    model: Arc<ScriptedModel>,
    db: Arc<FakeDatabase>,
) -> QueryPipeline {
    QueryPipeline::new(
        &settings,
        Arc::new(SchemaProvider::new(StaticSchema)),
        model,
        db,
    )
}

pub fn pipeline(model: Arc<ScriptedModel>, db: Arc<FakeDatabase>) -> QueryPipeline {
    pipeline_with(PipelineSettings::default(), model, db)
}
