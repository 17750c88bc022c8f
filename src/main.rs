use anyhow::{Context, Result};
use askdb::config::PipelineSettings;
use askdb::db::MySqlDatabase;
use askdb::llm::GeminiClient;
use askdb::schema::SchemaProvider;
use askdb::{QueryPipeline, QueryResponse};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask questions about the film rental database in plain English")]
struct Args {
    /// The question to answer (reads questions from stdin when omitted)
    question: Option<String>,

    /// Path to the schema description
    #[arg(long, default_value = "config/schema.json")]
    schema: PathBuf,

    /// Path to the model config (apiEndpoint, apiKey, model)
    #[arg(long, default_value = "config/aiConfig.json")]
    model_config: PathBuf,

    /// MySQL connection string (or set DATABASE_URL env var)
    #[arg(long)]
    database_url: Option<String>,

    /// Print the response as JSON
    #[arg(long)]
    json: bool,
}

fn print_response(response: &QueryResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        match &response.html_response {
            Some(html) => println!("{}", html),
            None => println!("{}", response.response),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askdb=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let database_url = args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("DATABASE_URL environment variable is not set")?;

    let settings = PipelineSettings::from_env();
    info!("Pipeline settings: {:?}", settings);

    let db = MySqlDatabase::connect(&database_url)
        .await
        .context("Database connection failed")?;
    let pipeline = QueryPipeline::new(
        &settings,
        Arc::new(SchemaProvider::from_file(&args.schema)),
        Arc::new(GeminiClient::from_config_file(&args.model_config)),
        Arc::new(db),
    );

    if let Some(question) = args.question {
        let response = pipeline.process_user_query(&question).await;
        return print_response(&response, args.json);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        let response = pipeline.process_user_query(question).await;
        print_response(&response, args.json)?;
    }

    Ok(())
}
