use thiserror::Error;

/// Coarse classification of every [`ApiError`], used by callers to decide
/// how to react (re-authenticate, report per entity, or show a message).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Conflict,
    Transport,
    Validation,
}

#[derive(Error, Debug)]
pub enum ApiError {
    /* mapped errors */
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    SerdeYaml(#[from] serde_yml::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    SetLoggerError(#[from] log::SetLoggerError),

    #[error(transparent)]
    StageParseError(#[from] growlink_api::StageParseError),

    /* growlink errors */
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    #[must_use]
    pub const fn service_error(msg: String) -> Self {
        Self::Transport(msg)
    }

    #[must_use]
    pub fn entity_not_found(entity_id: &str) -> Self {
        Self::NotFound(format!("entity {entity_id} is not reported by the gateway"))
    }

    #[must_use]
    pub fn in_flight(entity_id: &str) -> Self {
        Self::Conflict(format!("a command for {entity_id} is already in flight"))
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_)
            | Self::SerdeJson(_)
            | Self::SerdeYaml(_)
            | Self::UrlParseError(_)
            | Self::ConfigError(_)
            | Self::StageParseError(_) => ErrorKind::Validation,
            Self::ReqwestError(err) if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) => {
                ErrorKind::Unauthorized
            }
            Self::Transport(_)
            | Self::ReqwestError(_)
            | Self::IOError(_)
            | Self::SetLoggerError(_) => ErrorKind::Transport,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{ApiError, ErrorKind};

    #[test]
    fn taxonomy() {
        assert_eq!(
            ApiError::Unauthorized("x".into()).kind(),
            ErrorKind::Unauthorized
        );
        assert!(ApiError::Unauthorized("x".into()).is_unauthorized());
        assert_eq!(ApiError::entity_not_found("switch.fan").kind(), ErrorKind::NotFound);
        assert_eq!(ApiError::in_flight("switch.fan").kind(), ErrorKind::Conflict);
        assert_eq!(
            ApiError::service_error("boom".into()).kind(),
            ErrorKind::Transport
        );
        assert!(!ApiError::Validation("nan".into()).is_unauthorized());
    }

    #[test]
    fn parse_errors_are_validation() {
        let err: ApiError = "pinning".parse::<growlink_api::Stage>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: ApiError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
