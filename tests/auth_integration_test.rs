mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn register_login_and_fetch_profile() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "email": "Pat@Example.Com",
                "name": "Pat",
                "password": "a-long-password",
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["success"], json!(true));
    // Emails are stored lowercased and the hash never leaves the server
    assert_eq!(body["data"]["email"], json!("pat@example.com"));
    assert_eq!(body["data"]["role"], json!("CUSTOMER"));
    assert!(body["data"].get("password_hash").is_none());

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "pat@example.com", "password": "a-long-password" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let response = app.request(Method::GET, "/auth/me", None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["email"], json!("pat@example.com"));
    assert_eq!(body["data"]["name"], json!("Pat"));
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let app = TestApp::new().await;
    app.register_and_login("dup@test.example", "CUSTOMER").await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "email": "dup@test.example",
                "name": "Other",
                "password": "another-password",
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn wrong_password_and_unknown_email_fail_the_same_way() {
    let app = TestApp::new().await;
    app.register_and_login("login@test.example", "CUSTOMER")
        .await;

    let wrong_password = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "login@test.example", "password": "not-the-password" })),
            None,
        )
        .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_body = read_json(wrong_password).await;

    let unknown_email = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "nobody@test.example", "password": "not-the-password" })),
            None,
        )
        .await;
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let unknown_body = read_json(unknown_email).await;

    assert_eq!(wrong_body["message"], unknown_body["message"]);
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/auth/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/auth/me", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_customers() {
    let app = TestApp::new().await;
    let customer = app.customer_token().await;

    let response = app
        .request(
            Method::POST,
            "/api/categories",
            Some(json!({ "name": "Starters" })),
            Some(&customer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            "/auth/assign-role",
            Some(json!({ "email": "whoever@test.example", "role": "ADMIN" })),
            Some(&customer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn assigned_role_takes_effect_on_next_login() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.register_and_login("promote@test.example", "CUSTOMER")
        .await;

    let response = app
        .request(
            Method::POST,
            "/auth/assign-role",
            Some(json!({ "email": "promote@test.example", "role": "ADMIN" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["role"], json!("ADMIN"));

    // A fresh token carries the new role
    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "promote@test.example", "password": "correct-horse-battery" })),
            None,
        )
        .await;
    let body = read_json(response).await;
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            "/api/categories",
            Some(json!({ "name": "Mains" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let app = TestApp::new().await;
    let token = app
        .register_and_login("rotate@test.example", "CUSTOMER")
        .await;

    let response = app
        .request(
            Method::POST,
            "/auth/change-password",
            Some(json!({ "current_password": "wrong", "new_password": "a-brand-new-password" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/auth/change-password",
            Some(json!({
                "current_password": "correct-horse-battery",
                "new_password": "a-brand-new-password",
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "rotate@test.example", "password": "a-brand-new-password" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
