use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockroom_auth::AuthzError;
use stockroom_infra::{ServiceError, StoreError};

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::Csv(e) => json_error(StatusCode::BAD_REQUEST, "invalid_csv", e.to_string()),
        ServiceError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Unauthenticated => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "storage backend rejected the session",
        ),
        ServiceError::Store(
            e @ (StoreError::Backend(_) | StoreError::Http { .. } | StoreError::Decode(_)),
        ) => {
            tracing::error!(error = %e, "storage backend failure");
            json_error(StatusCode::BAD_GATEWAY, "backend_error", e.to_string())
        }
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "unexpected storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        }
    }
}

pub fn forbidden(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (ServiceError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                ServiceError::Store(StoreError::Http { status: 503, body: String::new() }),
                StatusCode::BAD_GATEWAY,
            ),
            (ServiceError::Store(StoreError::Decode("x".into())), StatusCode::BAD_GATEWAY),
            (ServiceError::Store(StoreError::Backend("x".into())), StatusCode::BAD_GATEWAY),
            (ServiceError::Store(StoreError::NotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(service_error_to_response(err).status(), status);
        }
    }
}
