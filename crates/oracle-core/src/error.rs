use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Upstream request failed: {0}")]
    FetchError(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Parse failed: {0}")]
    ParseError(String),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("A sync run is already in progress")]
    SyncInProgress,
}

impl AppError {
    /// Credential problems abort a whole aggregation call or sync run.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_is_fatal_class() {
        assert!(AppError::Auth("expired".into()).is_auth());
        assert!(!AppError::Upstream("503".into()).is_auth());
        assert!(!AppError::DbError("locked".into()).is_auth());
    }
}
