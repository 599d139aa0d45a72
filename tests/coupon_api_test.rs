mod common;

use axum::http::{Method, StatusCode};
use common::{money, read_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn admins_create_coupons_and_the_provider_mirror_follows() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(json!({ "code": "LUNCH10", "discount_amount": "10", "min_amount": "25" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["data"]["code"], json!("LUNCH10"));
    let id = body["data"]["id"].as_i64().unwrap();

    assert_eq!(
        app.provider.mirrored_coupons.lock().unwrap().as_slice(),
        &["LUNCH10".to_string()]
    );

    // Deleting removes the mirror too
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/coupons/{}", id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(app.provider.mirrored_coupons.lock().unwrap().is_empty());
}

#[tokio::test]
async fn coupon_reads_are_public() {
    let app = TestApp::new().await;
    app.seed_coupon("WELCOME5", rust_decimal_macros::dec!(5), rust_decimal_macros::dec!(15))
        .await;

    let response = app.request(Method::GET, "/api/coupons", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Lookup by code matches case-insensitively
    let response = app
        .request(Method::GET, "/api/coupons/code/welcome5", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["code"], json!("WELCOME5"));
    assert_eq!(money(&body["data"]["discount_amount"]), 5.0);
}

#[tokio::test]
async fn coupon_writes_are_admin_only() {
    let app = TestApp::new().await;
    let customer = app.customer_token().await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(json!({ "code": "SNEAKY", "discount_amount": "99", "min_amount": "0" })),
            Some(&customer),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(json!({ "code": "ANON", "discount_amount": "1", "min_amount": "0" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_positive_discounts_and_duplicate_codes_are_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(json!({ "code": "ZERO", "discount_amount": "0", "min_amount": "10" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.seed_coupon("TWICE", rust_decimal_macros::dec!(2), rust_decimal_macros::dec!(10))
        .await;
    let response = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(json!({ "code": "TWICE", "discount_amount": "2", "min_amount": "10" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(Method::DELETE, "/api/coupons/424242", None, Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
