pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod llm;
pub mod markup;
pub mod pipeline;
pub mod schema;
pub mod sql;
pub mod translator;

pub use error::{PipelineError, Result};
pub use pipeline::{QueryPipeline, QueryResponse};
