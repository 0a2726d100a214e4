use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Decode error: {message}")]
    Decode { message: String },
    #[error("Unknown condition family: {0}")]
    UnknownFamily(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, QueryError>;

// Helper conversions
impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for QueryError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self { Self::Decode { message: e.to_string() } }
}
