use std::fmt;

pub const NO_DATA_FOUND: &str = "No data found for the specified ID";
pub const ID_IN_USE: &str = "Id specified is already in use";
pub const INVALID_REQUEST: &str = "Invalid request parameters specified";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Failure taxonomy of the request pipelines.
/// Validation and conflict failures are raised where they are detected;
/// anything unexpected from storage becomes `Backend`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// `cause` is kept for the log record and never sent to clients.
    #[error("backend failure: {cause}")]
    Backend { cause: String },
}

impl ApiError {
    pub fn invalid_request() -> Self {
        Self::Validation(INVALID_REQUEST.to_string())
    }

    pub fn id_in_use() -> Self {
        Self::Conflict(ID_IN_USE.to_string())
    }

    pub fn no_data_found() -> Self {
        Self::NotFound(NO_DATA_FOUND.to_string())
    }

    pub fn backend(cause: impl fmt::Display) -> Self {
        Self::Backend {
            cause: cause.to_string(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Conflict(_) => 400,
            Self::NotFound(_) => 404,
            Self::Backend { .. } => 500,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Backend { .. } => "backend",
        }
    }

    /// Reason string safe to return to a client.
    pub fn client_message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::Conflict(m) | Self::NotFound(m) => m,
            Self::Backend { .. } => INTERNAL_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::invalid_request().status_code(), 400);
        assert_eq!(ApiError::id_in_use().status_code(), 400);
        assert_eq!(ApiError::no_data_found().status_code(), 404);
        assert_eq!(ApiError::backend("disk full").status_code(), 500);
    }

    #[test]
    fn backend_cause_stays_out_of_client_message() {
        let err = ApiError::backend("UNIQUE constraint failed: books.isbn");
        assert_eq!(err.client_message(), "Internal server error");
        assert!(err.to_string().contains("UNIQUE constraint"));
    }

    #[test]
    fn conflict_message_is_passed_through() {
        let err = ApiError::Conflict("Author does not exist".into());
        assert_eq!(err.client_message(), "Author does not exist");
        assert_eq!(err.error_kind(), "conflict");
    }

    #[test]
    fn not_found_detection() {
        assert!(ApiError::no_data_found().is_not_found());
        assert!(!ApiError::invalid_request().is_not_found());
    }
}
