// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User administration and self-lookup route tests.

use academy_api::db::{GroupRepository, UserRepository};
use academy_api::models::{NewGroup, Role};
use axum::http::{Method, StatusCode};
use serde_json::json;

mod common;

use common::{create_test_app, create_test_jwt, seed_user, send, token_for, TestApp};

async fn app_with_admin() -> (TestApp, String) {
    let app = create_test_app();
    seed_user(&app.store, "admin", Some("admin@x.com"), Role::Admin).await;
    (app, token_for("admin", "admin@x.com"))
}

// ─── Listing & Creation ──────────────────────────────────────

#[tokio::test]
async fn test_coach_lists_users_newest_first() {
    let app = create_test_app();
    seed_user(&app.store, "coach", Some("coach@x.com"), Role::Coach).await;
    seed_user(&app.store, "m1", Some("m1@x.com"), Role::Member).await;
    let token = token_for("coach", "coach@x.com");

    let (status, body) = send(&app, Method::GET, "/api/users", &token, None).await;

    assert_eq!(status, StatusCode::OK);
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["id"], "m1");
    assert_eq!(users[1]["role"], "COACH");
}

#[tokio::test]
async fn test_member_cannot_list_users() {
    let app = create_test_app();
    seed_user(&app.store, "m1", Some("m1@x.com"), Role::Member).await;

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/users",
        &token_for("m1", "m1@x.com"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_user_without_identity() {
    let (app, token) = app_with_admin().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users",
        &token,
        Some(json!({ "name": "Deniz", "studentName": "Little Deniz", "email": "deniz@x.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User created");
    assert_eq!(body["user"]["name"], "Deniz");
    assert_eq!(body["user"]["studentName"], "Little Deniz");
    assert_eq!(body["user"]["role"], "MEMBER");

    let id = body["user"]["id"].as_str().unwrap();
    assert_ne!(id, "");
    assert!(app.store.find_by_id(id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_create_user_validation() {
    let (app, token) = app_with_admin().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users",
        &token,
        Some(json!({ "name": "D" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"], "Name must be at least 2 characters");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users",
        &token,
        Some(json!({ "name": "Deniz", "email": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_user_duplicate_email_conflicts() {
    let (app, token) = app_with_admin().await;
    seed_user(&app.store, "m1", Some("taken@x.com"), Role::Member).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users",
        &token,
        Some(json!({ "name": "Deniz", "email": "taken@x.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(app.store.user_count().unwrap(), 2);
}

#[tokio::test]
async fn test_student_names_sorted_and_unique() {
    let (app, token) = app_with_admin().await;
    for (name, student) in [("Zeynep", Some("Ali")), ("Ali", None), ("Berk", Some("Can"))] {
        let mut body = json!({ "name": name });
        if let Some(student) = student {
            body["studentName"] = json!(student);
        }
        let (status, _) = send(&app, Method::POST, "/api/users", &token, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, Method::GET, "/api/users/students", &token, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!(["Ali", "Berk", "Can", "User admin", "Zeynep"])
    );
}

// ─── Self Lookup & Reconciliation ────────────────────────────

#[tokio::test]
async fn test_first_sign_in_creates_member() {
    let app = create_test_app();
    let token = create_test_jwt("abc", Some("a@x.com"), json!({ "name": "Ana" }));

    let (status, body) = send(&app, Method::GET, "/api/users/abc", &token, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "abc");
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["name"], "Ana");
    assert_eq!(body["role"], "MEMBER");
    assert_eq!(app.store.user_count().unwrap(), 1);
}

#[tokio::test]
async fn test_first_sign_in_adopts_staff_created_record() {
    let app = create_test_app();
    seed_user(&app.store, "old1", Some("a@x.com"), Role::Coach).await;
    app.store.insert_program("p1", "Judo").unwrap();
    let group = app
        .store
        .create_group(NewGroup {
            name: "Juniors".to_string(),
            description: None,
            program_id: Some("p1".to_string()),
            member_ids: vec!["old1".to_string()],
        })
        .await
        .unwrap();

    let token = token_for("abc", "a@x.com");
    let (status, body) = send(&app, Method::GET, "/api/users/abc", &token, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "abc");
    assert_eq!(body["role"], "COACH");
    assert!(app.store.find_by_id("old1").await.unwrap().is_none());
    assert_eq!(app.store.user_count().unwrap(), 1);

    // Membership follows the migrated key.
    let group = app.store.find_group(&group.id).await.unwrap().unwrap();
    assert_eq!(group.members.len(), 1);
    assert_eq!(group.members[0].id, "abc");

    // Repeat lookups are stable.
    let (_, again) = send(&app, Method::GET, "/api/users/abc", &token, None).await;
    assert_eq!(again, body);
}

#[tokio::test]
async fn test_sign_in_adopts_record_created_with_mixed_case_email() {
    let (app, admin) = app_with_admin().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users",
        &admin,
        Some(json!({ "name": "Deniz", "email": "Deniz@X.com", "role": "COACH" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "deniz@x.com");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users",
        &admin,
        Some(json!({ "name": "Deniz K", "email": "DENIZ@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let token = token_for("abc", "deniz@x.com");
    let (status, me) = send(&app, Method::GET, "/api/users/abc", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], "abc");
    assert_eq!(me["role"], "COACH");
    assert_eq!(app.store.user_count().unwrap(), 2);
}

#[tokio::test]
async fn test_member_cannot_read_other_users() {
    let app = create_test_app();
    seed_user(&app.store, "m1", Some("m1@x.com"), Role::Member).await;
    seed_user(&app.store, "m2", Some("m2@x.com"), Role::Member).await;

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/users/m2",
        &token_for("m1", "m1@x.com"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_reads_other_users() {
    let (app, token) = app_with_admin().await;
    seed_user(&app.store, "m1", Some("m1@x.com"), Role::Member).await;

    let (status, body) = send(&app, Method::GET, "/api/users/m1", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "m1@x.com");

    let (status, _) = send(&app, Method::GET, "/api/users/ghost", &token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_self_lookup_without_email_is_not_found() {
    let app = create_test_app();
    let token = create_test_jwt("phone-user", None, json!({}));

    let (status, _) = send(&app, Method::GET, "/api/users/phone-user", &token, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.user_count().unwrap(), 0);
}

// ─── Session User ────────────────────────────────────────────

#[tokio::test]
async fn test_me_reports_database_role() {
    let app = create_test_app();
    seed_user(&app.store, "abc", Some("a@x.com"), Role::Coach).await;
    let token = create_test_jwt("abc", Some("a@x.com"), json!({ "role": "MEMBER" }));

    let (status, body) = send(&app, Method::GET, "/api/me", &token, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "COACH");
    assert_eq!(body["source"], "database");
    assert_eq!(body["name"], "User abc");
}

#[tokio::test]
async fn test_me_falls_back_to_metadata() {
    let app = create_test_app();
    let token = create_test_jwt("phone-user", None, json!({ "role": "COACH", "name": "Ana" }));

    let (status, body) = send(&app, Method::GET, "/api/me", &token, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "phone-user");
    assert_eq!(body["email"], "");
    assert_eq!(body["role"], "COACH");
    assert_eq!(body["source"], "metadata");
}

// ─── Profile Update ──────────────────────────────────────────

#[tokio::test]
async fn test_update_profile_without_role() {
    let (app, token) = app_with_admin().await;
    app.store
        .create(academy_api::models::NewUser {
            id: "m1".to_string(),
            email: None,
            display_name: Some("Deniz".to_string()),
            student_alias: Some("Little Deniz".to_string()),
            role: Role::Member,
        })
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/users/m1",
        &token,
        Some(json!({ "name": "Deniz K", "studentName": null })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User updated");
    assert_eq!(body["user"]["name"], "Deniz K");
    assert!(body["user"]["studentName"].is_null());
    assert!(body.get("sync").is_none());
    assert_eq!(app.provider.metadata_writes(), 0);
}

#[tokio::test]
async fn test_update_rejects_short_name() {
    let (app, token) = app_with_admin().await;
    seed_user(&app.store, "m1", None, Role::Member).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/users/m1",
        &token,
        Some(json!({ "name": "D" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_missing_user_is_not_found() {
    let (app, token) = app_with_admin().await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/users/ghost",
        &token,
        Some(json!({ "role": "COACH" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_coach_cannot_update_users() {
    let app = create_test_app();
    seed_user(&app.store, "coach", Some("coach@x.com"), Role::Coach).await;
    seed_user(&app.store, "m1", None, Role::Member).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/users/m1",
        &token_for("coach", "coach@x.com"),
        Some(json!({ "role": "ADMIN" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let m1 = app.store.find_by_id("m1").await.unwrap().unwrap();
    assert_eq!(m1.role, Role::Member);
}
