use thiserror::Error;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("not a healthcheck workspace (run `healthcheck init` first)")]
    NotInitialized,

    #[error("healthcheck already initialized in this directory")]
    AlreadyInitialized,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upgrade task '{0}' is not registered")]
    UnknownTask(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl HealthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::Configuration(_) => "configuration_error",
            Self::Db(_) => "storage_error",
            Self::UnknownTask(_) => "unknown_task",
            Self::InvalidInput(_) => "invalid_input",
            Self::Locked(_) => "locked",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, HealthError>;
