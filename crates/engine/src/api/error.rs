//! Error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use playbymail_shared::{ErrorBody, ErrorCode};

use crate::infrastructure::correlation::CorrelationId;
use crate::infrastructure::ports::RepoError;
use crate::use_cases::error::{repo_reason, ErrorKind};
use crate::use_cases::{
    AuthoringError, ImageError, RenderSheetError, SheetQueryError, TemplateError,
    TransitionError, UploadError,
};

#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    reason: &'static str,
    message: String,
    details: Option<serde_json::Value>,
    correlation_id: Option<CorrelationId>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason,
            message: message.into(),
            details: None,
            correlation_id: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, "Unauthorized", message)
    }

    pub fn bad_request(reason: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, reason, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn reason(&self) -> &'static str {
        self.reason
    }

    /// Tie the error to the request's log lines.
    pub fn correlated(mut self, correlation_id: CorrelationId) -> Self {
        if self.kind == ErrorKind::Internal {
            tracing::error!(
                correlation_id = %correlation_id,
                reason = self.reason,
                error = %self.message,
                "Request failed"
            );
        }
        self.correlation_id = Some(correlation_id);
        self
    }
}

pub fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_of(kind: ErrorKind) -> ErrorCode {
    match kind {
        ErrorKind::BadRequest => ErrorCode::BadRequest,
        ErrorKind::NotFound => ErrorCode::NotFound,
        ErrorKind::Conflict => ErrorCode::Conflict,
        ErrorKind::Unprocessable => ErrorCode::Unprocessable,
        ErrorKind::Unauthorized => ErrorCode::Unauthorized,
        ErrorKind::Forbidden => ErrorCode::Forbidden,
        ErrorKind::Internal => ErrorCode::Internal,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal causes stay in the logs.
        let message = match self.kind {
            ErrorKind::Internal => "Internal error".to_string(),
            _ => self.message,
        };
        let mut body = ErrorBody::new(code_of(self.kind), self.reason, message);
        if let Some(details) = self.details {
            body = body.with_details(details);
        }
        if let Some(id) = self.correlation_id {
            body = body.with_correlation_id(id.to_string());
        }
        (status_of(self.kind), Json(body)).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        ApiError::new(ErrorKind::of_repo(&e), repo_reason(&e), e.to_string())
    }
}

macro_rules! from_use_case_error {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for ApiError {
                fn from(e: $error) -> Self {
                    ApiError::new(e.kind(), e.reason(), e.to_string())
                }
            }
        )*
    };
}

from_use_case_error!(
    AuthoringError,
    ImageError,
    RenderSheetError,
    SheetQueryError,
    TemplateError,
    UploadError,
);

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        let details = e
            .issues()
            .and_then(|issues| serde_json::to_value(issues).ok())
            .map(|issues| serde_json::json!({ "issues": issues }));
        ApiError {
            details,
            ..ApiError::new(e.kind(), e.reason(), e.to_string())
        }
    }
}
