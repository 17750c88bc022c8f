//! Result rows to user-facing text or HTML.

use crate::config::PipelineSettings;
use crate::db::{Row, Value};
use crate::error::{ModelError, PipelineError, Result};
use crate::llm::ModelClient;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const ELLIPSIS: &str = "...";

lazy_static! {
    static ref NARRATIVE: Regex = Regex::new(r"(?i)family").expect("valid regex");
    static ref SIMPLE_QUESTIONS: Vec<(Regex, SimpleQuestion)> = vec![
        (r"^(list|show|get)\s+(all\s+)?(movies?|films?)$", SimpleQuestion::Films("Movies Found:")),
        (r"^action\s+movies?$", SimpleQuestion::Films("Action Movies Found:")),
        (r"^comedy\s+movies?$", SimpleQuestion::Films("Comedy Movies Found:")),
        (r"^drama\s+movies?$", SimpleQuestion::Films("Drama Movies Found:")),
        (r"^horror\s+movies?$", SimpleQuestion::Films("Horror Movies Found:")),
        (r"^recent\s+movies?$", SimpleQuestion::Films("Recent Movies Found:")),
        (r"^old\s+movies?$", SimpleQuestion::Films("Older Movies Found:")),
        (r"^top\s+actors?$", SimpleQuestion::Actors),
        (r"^popular\s+categor(y|ies)$", SimpleQuestion::Categories),
        (r"^rental\s+statistics?$", SimpleQuestion::Generic("Rental Statistics:")),
    ]
    .into_iter()
    .map(|(pattern, kind)| {
        let regex = Regex::new(&format!("(?i){}", pattern)).expect("valid regex");
        (regex, kind)
    })
    .collect();
}

/// Short questions whose rows have a known shape and can be rendered without the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimpleQuestion {
    Films(&'static str),
    Actors,
    Categories,
    Generic(&'static str),
}

fn simple_question(question: &str) -> Option<SimpleQuestion> {
    let question = question.trim();
    SIMPLE_QUESTIONS
        .iter()
        .find(|(regex, _)| regex.is_match(question))
        .map(|(_, kind)| *kind)
}

/// Escape text for interpolation into HTML element content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn no_results_message(question: &str) -> String {
    format!(
        "<div>No results found for your query: \"{}\".</div>",
        escape_html(question)
    )
}

pub fn is_narrative(question: &str) -> bool {
    NARRATIVE.is_match(question)
}

/// Cap the row count and shorten long strings. Only for the formatting prompt.
pub fn prepare_rows(rows: &[Row], max_rows: usize, max_field_chars: usize) -> Vec<Row> {
    if rows.len() > max_rows {
        info!("Limiting results from {} to {}", rows.len(), max_rows);
    }
    rows.iter()
        .take(max_rows)
        .map(|row| {
            row.map_values(|value| match value {
                Value::Text(s) if s.chars().count() > max_field_chars => {
                    let mut short: String = s.chars().take(max_field_chars).collect();
                    short.push_str(ELLIPSIS);
                    Value::Text(short)
                }
                other => other.clone(),
            })
        })
        .collect()
}

pub fn build_format_prompt(question: &str, results_json: &str) -> String {
    if is_narrative(question) {
        format!(
            "User: {}\nResults: {}\nOutput: Write a short, clear paragraph that answers the user's question in natural language. Do not use lists, tables, or HTML formatting. Do not use markdown. Do not explain.",
            question, results_json
        )
    } else {
        format!(
            "User: {}\nResults: {}\nOutput: Simple, clean HTML for direct display. Use only basic HTML tags (like <h3>, <ul>, <li>, <table>, <tr>, <td>, <strong>, <em>). Do not use CSS classes or inline styles. Do not use markdown. Do not explain.",
            question, results_json
        )
    }
}

fn cell(row: &Row, column: &str, fallback: &str) -> String {
    match row.get(column) {
        Some(value) if !value.is_null() => escape_html(&value.to_string()),
        _ => fallback.to_string(),
    }
}

fn render_simple_html(kind: SimpleQuestion, rows: &[Row]) -> String {
    let (heading, items): (&str, Vec<String>) = match kind {
        SimpleQuestion::Films(heading) => (
            heading,
            rows.iter()
                .map(|row| {
                    format!(
                        "<li><strong>{}</strong> ({}) - Rating: {}</li>",
                        cell(row, "title", "Unknown"),
                        cell(row, "release_year", "N/A"),
                        cell(row, "rating", "N/A")
                    )
                })
                .collect(),
        ),
        SimpleQuestion::Actors => (
            "Top Actors Found:",
            rows.iter()
                .map(|row| {
                    format!(
                        "<li><strong>{} {}</strong> - {} films</li>",
                        cell(row, "first_name", ""),
                        cell(row, "last_name", ""),
                        cell(row, "film_count", "0")
                    )
                })
                .collect(),
        ),
        SimpleQuestion::Categories => (
            "Popular Categories:",
            rows.iter()
                .map(|row| {
                    format!(
                        "<li><strong>{}</strong> - {} films</li>",
                        cell(row, "name", "Unknown"),
                        cell(row, "film_count", "0")
                    )
                })
                .collect(),
        ),
        SimpleQuestion::Generic(heading) => (
            heading,
            rows.iter()
                .map(|row| {
                    let fields: Vec<String> = row
                        .iter()
                        .map(|(name, value)| {
                            format!("{}: {}", escape_html(name), escape_html(&value.to_string()))
                        })
                        .collect();
                    format!("<li>{}</li>", fields.join(", "))
                })
                .collect(),
        ),
    };

    format!("<div><h3>{}</h3><ul>{}</ul></div>", heading, items.concat())
}

pub struct ResponseFormatter {
    model: Arc<dyn ModelClient>,
    max_rows: usize,
    max_field_chars: usize,
    template_formatting: bool,
}

impl ResponseFormatter {
    pub fn new(model: Arc<dyn ModelClient>, settings: &PipelineSettings) -> Self {
        Self {
            model,
            max_rows: settings.max_result_rows,
            max_field_chars: settings.max_field_chars,
            template_formatting: settings.template_formatting,
        }
    }

    pub async fn format(&self, question: &str, rows: &[Row]) -> Result<String> {
        if rows.is_empty() {
            debug!("No rows; skipping model formatting");
            return Ok(no_results_message(question));
        }

        let limited = prepare_rows(rows, self.max_rows, self.max_field_chars);

        if self.template_formatting {
            if let Some(kind) = simple_question(question) {
                info!("Using template HTML for simple question");
                return Ok(render_simple_html(kind, &limited));
            }
        }

        let results_json = serde_json::to_string(&limited)
            .map_err(|e| PipelineError::Formatting(ModelError::Decode(e.to_string())))?;
        let prompt = build_format_prompt(question, &results_json);
        info!("Response formatting prompt length: {}", prompt.len());

        let started = Instant::now();
        let content = self
            .model
            .generate(&prompt)
            .await
            .map_err(PipelineError::Formatting)?;
        info!("Response formatted in {}ms", started.elapsed().as_millis());

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelClient for EchoModel {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("<ul><li>formatted</li></ul>".to_string())
        }
    }

    fn film_row(title: &str, year: i64) -> Row {
        [
            ("title", Value::from(title)),
            ("release_year", Value::from(year)),
            ("rating", Value::from("PG")),
        ]
        .into_iter()
        .collect()
    }

    fn formatter(model: Arc<EchoModel>, template_formatting: bool) -> ResponseFormatter {
        let settings = PipelineSettings {
            template_formatting,
            ..PipelineSettings::default()
        };
        ResponseFormatter::new(model, &settings)
    }

    #[tokio::test]
    async fn test_empty_rows_skip_model() {
        let model = Arc::new(EchoModel::default());
        let content = formatter(model.clone(), false)
            .format("rental statistics", &[])
            .await
            .unwrap();

        assert_eq!(
            content,
            "<div>No results found for your query: \"rental statistics\".</div>"
        );
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_results_escapes_markup() {
        assert_eq!(
            no_results_message("<script>x</script> & co"),
            "<div>No results found for your query: \"&lt;script&gt;x&lt;/script&gt; &amp; co\".</div>"
        );
    }

    #[test]
    fn test_prepare_rows_caps_and_truncates() {
        let long_title = "A".repeat(120);
        let rows: Vec<Row> = (0..60).map(|i| film_row(&long_title, 2000 + i)).collect();

        let prepared = prepare_rows(&rows, 50, 100);
        assert_eq!(prepared.len(), 50);

        let title = prepared[0].get("title").unwrap().as_str().unwrap();
        assert_eq!(title.len(), 103);
        assert!(title.ends_with("..."));
        assert_eq!(prepared[0].get("release_year"), Some(&Value::Integer(2000)));

        // The caller's rows are untouched.
        assert_eq!(rows[0].get("title").unwrap().as_str().unwrap().len(), 120);
    }

    #[test]
    fn test_truncation_counts_characters() {
        let row: Row = [("name", Value::from("é".repeat(101)))].into_iter().collect();
        let prepared = prepare_rows(&[row], 50, 100);
        let name = prepared[0].get("name").unwrap().as_str().unwrap();
        assert_eq!(name.chars().count(), 103);
    }

    #[test]
    fn test_prompt_choice() {
        let prose = build_format_prompt("Which films suit the Family?", "[]");
        assert!(prose.contains("Do not use lists, tables, or HTML formatting"));

        let html = build_format_prompt("top rated films", "[]");
        assert!(html.contains("Do not use CSS classes or inline styles"));
        assert!(html.contains("Results: []"));
    }

    #[tokio::test]
    async fn test_model_receives_limited_json() {
        let model = Arc::new(EchoModel::default());
        let rows = vec![film_row("Matrix", 1999)];

        let content = formatter(model.clone(), false)
            .format("action movies", &rows)
            .await
            .unwrap();
        assert_eq!(content, "<ul><li>formatted</li></ul>");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(r#"[{"title":"Matrix","release_year":1999,"rating":"PG"}]"#));
    }

    #[tokio::test]
    async fn test_template_html_for_simple_question() {
        let model = Arc::new(EchoModel::default());
        let rows = vec![film_row("Matrix & Co", 1999)];

        let content = formatter(model.clone(), true)
            .format("Action Movies", &rows)
            .await
            .unwrap();
        assert_eq!(
            content,
            "<div><h3>Action Movies Found:</h3><ul><li><strong>Matrix &amp; Co</strong> (1999) - Rating: PG</li></ul></div>"
        );
        assert!(model.prompts.lock().unwrap().is_empty());

        // Longer phrasings still go to the model.
        formatter(model.clone(), true)
            .format("show me action movies with Keanu", &rows)
            .await
            .unwrap();
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_simple_question_kinds() {
        assert_eq!(simple_question("top actor"), Some(SimpleQuestion::Actors));
        assert_eq!(simple_question("popular categories"), Some(SimpleQuestion::Categories));
        assert_eq!(
            simple_question("list all films"),
            Some(SimpleQuestion::Films("Movies Found:"))
        );
        assert_eq!(simple_question("who acted in the most films"), None);
    }

}
