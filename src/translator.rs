//! Natural-language question to candidate SQL.
//!
//! Common questions are answered from a fixed template table without touching
//! the model. Everything else costs exactly one model call.

use crate::error::{PipelineError, Result};
use crate::llm::ModelClient;
use crate::schema::Schema;
use crate::sql::CandidateSql;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Phrase → canonical SQL. Order matters: the first contained phrase wins.
pub const SQL_TEMPLATES: &[(&str, &str)] = &[
    (
        "action movies",
        r#"SELECT title, release_year, rating FROM film f JOIN film_category fc ON f.film_id = fc.film_id JOIN category c ON fc.category_id = c.category_id WHERE c.name = "Action" ORDER BY release_year DESC LIMIT 50"#,
    ),
    (
        "comedy movies",
        r#"SELECT title, release_year, rating FROM film f JOIN film_category fc ON f.film_id = fc.film_id JOIN category c ON fc.category_id = c.category_id WHERE c.name = "Comedy" ORDER BY release_year DESC LIMIT 50"#,
    ),
    (
        "drama movies",
        r#"SELECT title, release_year, rating FROM film f JOIN film_category fc ON f.film_id = fc.film_id JOIN category c ON fc.category_id = c.category_id WHERE c.name = "Drama" ORDER BY release_year DESC LIMIT 50"#,
    ),
    (
        "horror movies",
        r#"SELECT title, release_year, rating FROM film f JOIN film_category fc ON f.film_id = fc.film_id JOIN category c ON fc.category_id = c.category_id WHERE c.name = "Horror" ORDER BY release_year DESC LIMIT 50"#,
    ),
    (
        "recent movies",
        "SELECT title, release_year, rating FROM film WHERE release_year >= 2000 ORDER BY release_year DESC LIMIT 50",
    ),
    (
        "old movies",
        "SELECT title, release_year, rating FROM film WHERE release_year < 2000 ORDER BY release_year ASC LIMIT 50",
    ),
    (
        "top actors",
        "SELECT a.first_name, a.last_name, COUNT(fa.film_id) as film_count FROM actor a JOIN film_actor fa ON a.actor_id = fa.actor_id GROUP BY a.actor_id ORDER BY film_count DESC LIMIT 50",
    ),
    (
        "popular categories",
        "SELECT c.name, COUNT(fc.film_id) as film_count FROM category c JOIN film_category fc ON c.category_id = fc.category_id GROUP BY c.category_id ORDER BY film_count DESC LIMIT 20",
    ),
    (
        "rental statistics",
        "SELECT COUNT(*) as total_rentals, COUNT(DISTINCT customer_id) as unique_customers, COUNT(DISTINCT film_id) as unique_films FROM rental LIMIT 1",
    ),
];

/// Canonical SQL for the first template phrase contained in the question.
pub fn template_sql(question: &str) -> Option<&'static str> {
    let question = question.to_lowercase();
    SQL_TEMPLATES
        .iter()
        .find(|(phrase, _)| question.contains(phrase))
        .map(|(phrase, sql)| {
            info!("Using SQL template for: {}", phrase);
            *sql
        })
}

pub fn build_translation_prompt(question: &str, schema_summary: &str) -> String {
    format!(
        "Database schema:\n{}\n\nConvert this query to SQL: \"{}\"\n\nReturn only the SQL query, no explanations.",
        schema_summary, question
    )
}

pub struct QueryTranslator {
    model: Arc<dyn ModelClient>,
}

impl QueryTranslator {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    pub async fn translate(&self, question: &str, schema: &Schema) -> Result<CandidateSql> {
        if let Some(sql) = template_sql(question) {
            return Ok(CandidateSql::new(sql));
        }

        let prompt = build_translation_prompt(question, &schema.summary());
        info!("SQL generation prompt length: {}", prompt.len());

        let started = Instant::now();
        let sql = self
            .model
            .generate(&prompt)
            .await
            .map_err(PipelineError::Translation)?;
        info!("SQL generated by model in {}ms", started.elapsed().as_millis());

        Ok(CandidateSql::new(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records prompts and answers with a fixed reply.
    struct RecordingModel {
        reply: std::result::Result<String, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelClient for RecordingModel {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(ModelError::Status {
                    status: *status,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }

    fn film_schema() -> Schema {
        Schema::from_json(
            r#"{"database": "sakila", "tables": {
                "film": {"columns": {"film_id": {}, "title": {}, "release_year": {}}},
                "customer": {"columns": {"customer_id": {}, "first_name": {}}}
            }}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_template_questions_skip_model() {
        let model = Arc::new(RecordingModel::replying("SELECT 'model'"));
        let translator = QueryTranslator::new(model.clone());
        let schema = film_schema();

        for (phrase, sql) in SQL_TEMPLATES {
            let candidate = translator.translate(phrase, &schema).await.unwrap();
            assert_eq!(candidate.as_str(), *sql);
        }
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_template_match_is_case_insensitive_substring() {
        assert_eq!(
            template_sql("Could you show me the Action Movies from last year?"),
            Some(SQL_TEMPLATES[0].1)
        );
        assert_eq!(template_sql("RENTAL STATISTICS please"), Some(SQL_TEMPLATES[8].1));
        assert_eq!(template_sql("action movie"), None);
    }

    #[test]
    fn test_first_template_wins() {
        // "top actors" appears after "old movies" in the table.
        let sql = template_sql("top actors in old movies").unwrap();
        assert!(sql.contains("release_year < 2000"));
    }

    #[tokio::test]
    async fn test_model_path_sends_schema_summary() {
        let model = Arc::new(RecordingModel::replying("```sql\nSELECT first_name FROM customer\n```"));
        let translator = QueryTranslator::new(model.clone());

        let candidate = translator
            .translate("who are our customers?", &film_schema())
            .await
            .unwrap();
        assert_eq!(candidate.cleaned(), "SELECT first_name FROM customer");
        assert_eq!(model.calls(), 1);

        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Database: sakila"));
        assert!(prompt.contains("customer(customer_id, first_name)"));
        assert!(prompt.contains("film(film_id, release_year, title)"));
        assert!(prompt.contains("\"who are our customers?\""));
    }

    #[tokio::test]
    async fn test_model_failure_is_translation_error() {
        let model = Arc::new(RecordingModel::failing(500));
        let translator = QueryTranslator::new(model.clone());

        let err = translator
            .translate("how many customers?", &film_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Translation(ModelError::Status { status: 500, .. })));
        assert_eq!(model.calls(), 1);
    }
}
