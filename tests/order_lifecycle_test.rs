mod common;

use axum::http::{Method, StatusCode};
use common::{read_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

/// Seed a product, fill the cart and place an order, returning its id.
async fn place_order(app: &TestApp, token: &str) -> i64 {
    let product = app
        .seed_product(&format!("Special-{}", uuid::Uuid::new_v4()), dec!(10.00))
        .await;
    app.add_to_cart(token, product.id, 1).await;
    let response = app
        .request(
            Method::POST,
            "/api/orders/checkout",
            Some(json!({
                "name": "Pat Diner",
                "phone": "555-0100",
                "email": "pat@test.example",
            })),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    body["data"]["order_id"].as_i64().unwrap()
}

async fn set_status(app: &TestApp, token: &str, order_id: i64, status: &str) -> (StatusCode, Value) {
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/status", order_id),
            Some(json!({ "status": status })),
            Some(token),
        )
        .await;
    let code = response.status();
    (code, read_json(response).await)
}

#[tokio::test]
async fn a_paid_session_approves_the_order() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let order_id = place_order(&app, &token).await;
    app.provider.set_paid(true);

    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{}/validate", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], json!("Approved"));
    assert!(body["data"]["payment_intent_id"].is_string());
}

#[tokio::test]
async fn an_unpaid_session_leaves_the_order_pending() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let order_id = place_order(&app, &token).await;
    app.provider.set_paid(false);

    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{}/validate", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], json!("Pending"));
    assert_eq!(body["data"]["payment_intent_id"], json!(null));
}

#[tokio::test]
async fn customers_are_held_to_the_transition_table() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let order_id = place_order(&app, &token).await;

    // Pending cannot jump straight to Completed
    let (code, _) = set_status(&app, &token, order_id, "Completed").await;
    assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);

    // Pending -> Cancelled is allowed; nothing was paid, so no refund
    let (code, body) = set_status(&app, &token, order_id, "Cancelled").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("Cancelled"));
    assert_eq!(app.provider.refund_count(), 0);
}

#[tokio::test]
async fn admins_may_force_any_status() {
    let app = TestApp::new().await;
    let customer = app.customer_token().await;
    let admin = app.admin_token().await;
    let order_id = place_order(&app, &customer).await;

    let (code, body) = set_status(&app, &admin, order_id, "Completed").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("Completed"));
}

#[tokio::test]
async fn cancelling_a_paid_order_refunds_it() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let order_id = place_order(&app, &token).await;

    app.provider.set_paid(true);
    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{}/validate", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (code, body) = set_status(&app, &token, order_id, "Cancelled").await;
    assert_eq!(code, StatusCode::OK);
    // The refund lands and the order records it
    assert_eq!(body["data"]["status"], json!("Refunded"));
    assert_eq!(app.provider.refund_count(), 1);

    // Refunded is terminal, even for the cancel that produced it
    let (code, _) = set_status(&app, &token, order_id, "Pending").await;
    assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn full_pickup_lifecycle() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let order_id = place_order(&app, &token).await;

    app.provider.set_paid(true);
    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{}/validate", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    for status in ["ReadyForPickup", "Completed"] {
        let (code, body) = set_status(&app, &token, order_id, status).await;
        assert_eq!(code, StatusCode::OK, "transition to {}", status);
        assert_eq!(body["data"]["status"], json!(status));
    }
}

#[tokio::test]
async fn orders_are_scoped_to_their_owner() {
    let app = TestApp::new().await;
    let owner = app.customer_token().await;
    let other = app.customer_token().await;
    let admin = app.admin_token().await;
    let order_id = place_order(&app, &owner).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{}", order_id),
            None,
            Some(&other),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.request(Method::GET, "/api/orders", None, Some(&other)).await;
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    // Admins see every order
    let response = app.request(Method::GET, "/api/orders", None, Some(&admin)).await;
    let body = read_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn order_list_filters_by_status() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let first = place_order(&app, &token).await;
    let _second = place_order(&app, &token).await;

    let (code, _) = set_status(&app, &token, first, "Cancelled").await;
    assert_eq!(code, StatusCode::OK);

    let response = app
        .request(
            Method::GET,
            "/api/orders?status=Pending",
            None,
            Some(&token),
        )
        .await;
    let body = read_json(response).await;
    let orders = body["data"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["status"], json!("Pending"));
}
