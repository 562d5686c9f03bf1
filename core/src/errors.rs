use common_http_errors::ApiError;
use common_auth::AuthError;

/// Every fallible operation in this crate returns `AppError`, a thin
/// wrapper that maps onto `common_http_errors::ApiError`'s seven kinds.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl AppError {
    pub fn unauthenticated<E: std::fmt::Display>(e: E) -> Self {
        ApiError::unauthenticated(e, None).into()
    }

    pub fn forbidden(required: Vec<String>) -> Self {
        ApiError::forbidden(required, None).into()
    }

    pub fn bad_request(code: &'static str) -> Self {
        ApiError::bad_request(code, None).into()
    }

    pub fn not_found(code: &'static str) -> Self {
        ApiError::NotFound { code, trace_id: None }.into()
    }

    pub fn balance_exceeded(balance_type: &'static str) -> Self {
        ApiError::balance_exceeded(balance_type, None).into()
    }

    pub fn conflict(code: &'static str) -> Self {
        ApiError::conflict(code, None).into()
    }

    pub fn resource_exhausted() -> Self {
        ApiError::ResourceExhausted { trace_id: None }.into()
    }

    /// The balance type a `CONFLICT BALANCE_EXCEEDED` error was raised for,
    /// if this is one. Lets callers with access to `CoreMetrics` record the
    /// rejection without `core::balance` itself needing to know about
    /// metrics.
    pub fn balance_exceeded_type(&self) -> Option<&'static str> {
        match self {
            AppError::Api(ApiError::Conflict { balance_type: Some(bt), .. }) => Some(bt),
            _ => None,
        }
    }

    /// Whether this is the `UNAUTHENTICATED` raised specifically by refresh
    /// token reuse detection, as opposed to an ordinary missing or expired
    /// token. Same rationale as `balance_exceeded_type`.
    pub fn is_refresh_reuse_detected(&self) -> bool {
        matches!(
            self,
            AppError::Api(ApiError::Unauthenticated { message: Some(m), .. })
                if m.contains("reuse detected")
        )
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::Api(e) => e.into_response(),
            AppError::Auth(e) => e.into_response(),
            AppError::Sqlx(e) => {
                tracing::error!(error = %e, "unhandled database error");
                ApiError::internal(e, None).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
