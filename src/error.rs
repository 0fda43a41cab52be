//! One error type for the whole task pipeline. Nothing is caught on the way
//! up; the dispatch binary turns any of these into an error-trace artifact.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("environment variable {0} is not set")]
    MissingTaskId(String),
    #[error("task id {0:?} is not a positive number")]
    BadTaskId(String),
    #[error("task {task_id}: instance table exhausted at row {row}")]
    Exhausted { task_id: usize, row: usize },
    #[error("instance table line {line} is malformed: {text:?}")]
    BadRow { line: usize, text: String },
    #[error("the suite defines no configurations")]
    NoConfigurations,
    #[error("minizinc: {0}")]
    Solver(String),
    #[error("unexpected solver output line: {0:?}")]
    BadEvent(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
