use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// The seven error kinds this crate distinguishes, each mapped to exactly
/// one HTTP status.
#[derive(Debug)]
pub enum ApiError {
    /// 401 — missing/invalid/expired/replayed token, deleted user, blocked
    /// mobile user, or any token-extractor failure.
    Unauthenticated { trace_id: Option<Uuid>, message: Option<String> },
    /// 403 — permission/role check failure, scope violation.
    Forbidden {
        required: Vec<String>,
        trace_id: Option<Uuid>,
    },
    /// 400 — invalid invite, expired invite, username taken, ambiguous
    /// mobile login missing companyId.
    BadRequest {
        code: &'static str,
        trace_id: Option<Uuid>,
        message: Option<String>,
    },
    /// 404 — missing entity inside current tenant scope.
    NotFound {
        code: &'static str,
        trace_id: Option<Uuid>,
    },
    /// 409 — balance exhausted or an active invite already exists.
    Conflict {
        code: &'static str,
        trace_id: Option<Uuid>,
        balance_type: Option<&'static str>,
    },
    /// 503 — DB pool saturated.
    ResourceExhausted { trace_id: Option<Uuid> },
    /// 500 — everything else.
    Internal {
        trace_id: Option<Uuid>,
        message: Option<String>,
    },
}

impl ApiError {
    pub fn unauthenticated<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self {
        Self::Unauthenticated {
            trace_id,
            message: Some(e.to_string()),
        }
    }

    pub fn forbidden(required: Vec<String>, trace_id: Option<Uuid>) -> Self {
        Self::Forbidden { required, trace_id }
    }

    pub fn bad_request(code: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::BadRequest {
            code,
            trace_id,
            message: None,
        }
    }

    pub fn balance_exceeded(balance_type: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::Conflict {
            code: "BALANCE_EXCEEDED",
            trace_id,
            balance_type: Some(balance_type),
        }
    }

    pub fn conflict(code: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::Conflict {
            code,
            trace_id,
            balance_type: None,
        }
    }

    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self {
        Self::Internal {
            trace_id,
            message: Some(e.to_string()),
        }
    }
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<Vec<String>>,
    #[serde(rename = "balanceType", skip_serializing_if = "Option::is_none")]
    balance_type: Option<&'static str>,
    #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
    trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, body) = match self {
            ApiError::Unauthenticated { trace_id, message } => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                ErrorBody {
                    code: "UNAUTHENTICATED".into(),
                    required: None,
                    balance_type: None,
                    trace_id,
                    message,
                },
            ),
            ApiError::Forbidden { required, trace_id } => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                ErrorBody {
                    code: "FORBIDDEN".into(),
                    required: if required.is_empty() {
                        None
                    } else {
                        Some(required)
                    },
                    balance_type: None,
                    trace_id,
                    message: None,
                },
            ),
            ApiError::BadRequest {
                code,
                trace_id,
                message,
            } => (
                StatusCode::BAD_REQUEST,
                code,
                ErrorBody {
                    code: code.into(),
                    required: None,
                    balance_type: None,
                    trace_id,
                    message,
                },
            ),
            ApiError::NotFound { code, trace_id } => (
                StatusCode::NOT_FOUND,
                code,
                ErrorBody {
                    code: code.into(),
                    required: None,
                    balance_type: None,
                    trace_id,
                    message: None,
                },
            ),
            ApiError::Conflict {
                code,
                trace_id,
                balance_type,
            } => (
                StatusCode::CONFLICT,
                code,
                ErrorBody {
                    code: code.into(),
                    required: None,
                    balance_type,
                    trace_id,
                    message: None,
                },
            ),
            ApiError::ResourceExhausted { trace_id } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RESOURCE_EXHAUSTED",
                ErrorBody {
                    code: "RESOURCE_EXHAUSTED".into(),
                    required: None,
                    balance_type: None,
                    trace_id,
                    message: None,
                },
            ),
            ApiError::Internal { trace_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                ErrorBody {
                    code: "INTERNAL".into(),
                    required: None,
                    balance_type: None,
                    trace_id,
                    message,
                },
            ),
        };

        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
