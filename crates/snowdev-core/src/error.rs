use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnowdevError {
    #[error("not initialized: run 'snowdev init'")]
    NotInitialized,

    #[error("{kind} not found: {path}")]
    ComponentNotFound { kind: String, path: String },

    #[error("{kind} already exists: {name}")]
    ComponentExists { kind: String, name: String },

    #[error("invalid component name '{0}': must contain only letters, digits and underscores")]
    InvalidComponentName(String),

    #[error("invalid component kind: {0}")]
    InvalidKind(String),

    #[error("invalid handler in {path}: {reason}")]
    InvalidHandler { path: String, reason: String },

    #[error("invalid manifest {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error(
        "packages not available in the Snowflake Anaconda channel: {}",
        .0.join(", ")
    )]
    PackagesUnavailable(Vec<String>),

    #[error("platform error: {message}")]
    Platform {
        code: Option<String>,
        message: String,
    },

    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("current database is '{actual}', expected '{expected}'")]
    WrongDatabase { expected: String, actual: String },

    #[error("pipe not found in pipes.yml: {0}")]
    PipeNotFound(String),

    #[error("SQL file is empty: {0}")]
    EmptySql(String),

    #[error("invalid task action '{0}': expected execute, resume or suspend")]
    InvalidTaskAction(String),

    #[error("'{0}' not found on PATH")]
    ToolNotFound(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SnowdevError>;
