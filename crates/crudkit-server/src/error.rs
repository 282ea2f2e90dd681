use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crudkit_core::errors::INTERNAL_ERROR;
use crudkit_core::ApiError;
use crudkit_store::StoreError;
use crudkit_telemetry::{report, LogSeverity};

/// Convert a storage failure into the opaque 500 the client sees, logging the
/// cause at fatal severity.
pub fn backend_failure(err: StoreError) -> ApiError {
    report(LogSeverity::Fatal, INTERNAL_ERROR, Some(&err));
    ApiError::backend(err)
}

/// Raise a client error that was detected by the pipeline itself.
pub(crate) fn rejected(err: ApiError) -> ApiError {
    report(LogSeverity::DebugInfo, err.client_message(), None);
    err
}

/// HTTP rendering of an [`ApiError`]: status code plus a plain-text reason.
#[derive(Debug)]
pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.0.client_message().to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failure_hides_cause() {
        let err = backend_failure(StoreError::Database("disk I/O error".into()));
        assert_eq!(err.client_message(), "Internal server error");
        assert!(matches!(err, ApiError::Backend { ref cause } if cause.contains("disk I/O")));
    }

    #[test]
    fn http_error_status_matches_taxonomy() {
        let resp = HttpError(ApiError::no_data_found()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = HttpError(ApiError::id_in_use()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = HttpError(ApiError::backend("x")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn http_error_body_is_plain_text() {
        let resp = HttpError(ApiError::invalid_request()).into_response();
        let content_type = resp.headers()[axum::http::header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }
}
