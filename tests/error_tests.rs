// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use academy_api::db::RepoError;
use academy_api::error::AppError;
use academy_api::services::ReconcileError;
use axum::http::StatusCode;
use axum::response::IntoResponse;

async fn status_and_body(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn test_repo_errors_map_to_http_errors() {
    assert!(matches!(
        AppError::from(RepoError::Conflict("email".into())),
        AppError::Conflict(_)
    ));
    assert!(matches!(
        AppError::from(RepoError::NotFound("user".into())),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        AppError::from(RepoError::InvalidReference("program p9".into())),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        AppError::from(RepoError::Store("connection reset".into())),
        AppError::Database(_)
    ));
}

#[test]
fn test_reconcile_errors_map_to_http_errors() {
    assert!(matches!(
        AppError::from(ReconcileError::Unauthenticated),
        AppError::Unauthorized
    ));
    assert!(matches!(
        AppError::from(ReconcileError::Forbidden("x".into())),
        AppError::Forbidden(_)
    ));
    assert!(matches!(
        AppError::from(ReconcileError::Store(RepoError::Store("down".into()))),
        AppError::Database(_)
    ));
}

#[tokio::test]
async fn test_database_error_hides_details() {
    let (status, body) = status_and_body(AppError::Database("password=hunter2".into())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "database_error");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_conflict_response() {
    let (status, body) =
        status_and_body(AppError::Conflict("Email address is already in use".into())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["details"], "Email address is already in use");
}
