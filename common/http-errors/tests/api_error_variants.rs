use axum::http::StatusCode;
use axum::response::IntoResponse;
use common_http_errors::ApiError;
use uuid::Uuid;

#[test]
fn unauthenticated_variant() {
    let err = ApiError::unauthenticated("bad token", None);
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "UNAUTHENTICATED");
}

#[test]
fn forbidden_variant_carries_required_permissions() {
    let err = ApiError::forbidden(vec!["missions:create".into()], None);
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "FORBIDDEN");
}

#[test]
fn bad_request_variant() {
    let err = ApiError::bad_request("INVALID_INVITE_CODE", None);
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers().get("X-Error-Code").unwrap(),
        "INVALID_INVITE_CODE"
    );
}

#[test]
fn not_found_variant() {
    let err = ApiError::NotFound {
        code: "MISSION_NOT_FOUND",
        trace_id: None,
    };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        resp.headers().get("X-Error-Code").unwrap(),
        "MISSION_NOT_FOUND"
    );
}

#[test]
fn balance_exceeded_is_conflict_with_balance_type() {
    let err = ApiError::balance_exceeded("per_missions", None);
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(
        resp.headers().get("X-Error-Code").unwrap(),
        "BALANCE_EXCEEDED"
    );
}

#[test]
fn resource_exhausted_variant() {
    let err = ApiError::ResourceExhausted { trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn internal_variant_carries_trace_id() {
    let trace = Some(Uuid::new_v4());
    let err = ApiError::internal("boom", trace);
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "INTERNAL");
}
