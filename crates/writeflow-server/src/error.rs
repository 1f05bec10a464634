use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use writeflow_core::PipelineError;
use writeflow_core::progress::ErrorPayload;

/// Failure returned before a stream opens, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    error: PipelineError,
    diagnostics: bool,
}

impl ApiError {
    pub fn new(error: PipelineError, diagnostics: bool) -> Self {
        Self { error, diagnostics }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorPayload::from_error(&self.error, self.diagnostics);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use writeflow_ai_harness::ProviderError;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (PipelineError::missing_credential("Editor", "anthropic"), 422),
            (PipelineError::WorkflowNotFound("wf".into()), 404),
            (PipelineError::Invalid("topic".into()), 400),
            (PipelineError::Provider(ProviderError::unknown_provider("acme")), 400),
            (PipelineError::Cancelled, 499),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::new(error, false).status().as_u16(), expected);
        }
    }
}
