mod common;

use axum::http::{Method, StatusCode};
use common::{money, read_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn cart_totals_aggregate_lines_and_counts() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let margherita = app.seed_product("Margherita", dec!(12.50)).await;
    let tiramisu = app.seed_product("Tiramisu", dec!(6.25)).await;

    app.add_to_cart(&token, margherita.id, 2).await;
    let body = app.add_to_cart(&token, tiramisu.id, 1).await;

    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
    // 2 x 12.50 + 1 x 6.25
    assert_eq!(money(&body["data"]["cart_total"]), 31.25);
    assert_eq!(money(&body["data"]["discount"]), 0.0);
}

#[tokio::test]
async fn adding_the_same_product_increments_the_line() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let product = app.seed_product("Calzone", dec!(10.00)).await;

    app.add_to_cart(&token, product.id, 1).await;
    let body = app.add_to_cart(&token, product.id, 3).await;

    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["count"], json!(4));
}

#[tokio::test]
async fn adding_an_unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;

    let response = app
        .request(
            Method::POST,
            "/api/cart/items",
            Some(json!({ "product_id": 9999, "count": 1 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quantity_steps_up_and_down_but_never_below_one() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let product = app.seed_product("Lasagna", dec!(14.00)).await;

    let body = app.add_to_cart(&token, product.id, 1).await;
    let item_id = body["data"]["items"][0]["id"].as_i64().unwrap();

    let response = app
        .request(
            Method::POST,
            &format!("/api/cart/items/{}/increase", item_id),
            None,
            Some(&token),
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["data"]["items"][0]["count"], json!(2));

    let response = app
        .request(
            Method::POST,
            &format!("/api/cart/items/{}/decrease", item_id),
            None,
            Some(&token),
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["data"]["items"][0]["count"], json!(1));

    // At one, decrement is refused instead of silently removing the line
    let response = app
        .request(
            Method::POST,
            &format!("/api/cart/items/{}/decrease", item_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn removing_the_last_item_leaves_no_cart_behind() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let product = app.seed_product("Bruschetta", dec!(5.00)).await;

    let body = app.add_to_cart(&token, product.id, 1).await;
    let item_id = body["data"]["items"][0]["id"].as_i64().unwrap();

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/cart/items/{}", item_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["cart_header_id"], json!(null));
    assert_eq!(body["data"]["items"], json!([]));
}

#[tokio::test]
async fn cart_items_are_not_visible_or_editable_across_users() {
    let app = TestApp::new().await;
    let owner = app.customer_token().await;
    let intruder = app.customer_token().await;
    let product = app.seed_product("Carbonara", dec!(13.00)).await;

    let body = app.add_to_cart(&owner, product.id, 1).await;
    let item_id = body["data"]["items"][0]["id"].as_i64().unwrap();

    let response = app
        .request(
            Method::POST,
            &format!("/api/cart/items/{}/increase", item_id),
            None,
            Some(&intruder),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.request(Method::GET, "/api/cart", None, Some(&intruder)).await;
    let body = read_json(response).await;
    assert_eq!(body["data"]["items"], json!([]));
}

#[tokio::test]
async fn coupon_application_follows_the_minimum_rules() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let product = app.seed_product("Quattro Formaggi", dec!(10.00)).await;
    app.seed_coupon("10OFF", dec!(10.00), dec!(20.00)).await;

    app.add_to_cart(&token, product.id, 1).await;

    // 10.00 is below the 20.00 minimum
    let response = app
        .request(
            Method::POST,
            "/api/cart/coupon",
            Some(json!({ "code": "10OFF" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // An unknown code gets the storefront's fixed message
    let response = app
        .request(
            Method::POST,
            "/api/cart/coupon",
            Some(json!({ "code": "NOPE" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["message"], json!("Invalid coupon code."));

    app.add_to_cart(&token, product.id, 1).await;

    // 20.00 meets the minimum exactly: the coupon sticks, but the
    // discount only kicks in above the minimum
    let response = app
        .request(
            Method::POST,
            "/api/cart/coupon",
            Some(json!({ "code": "10OFF" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["coupon_code"], json!("10OFF"));
    assert_eq!(money(&body["data"]["discount"]), 0.0);
    assert_eq!(money(&body["data"]["cart_total"]), 20.0);

    app.add_to_cart(&token, product.id, 1).await;

    // 30.00 clears the minimum; codes match case-insensitively
    let response = app
        .request(
            Method::POST,
            "/api/cart/coupon",
            Some(json!({ "code": "10off" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["coupon_code"], json!("10OFF"));
    assert_eq!(money(&body["data"]["discount"]), 10.0);
    assert_eq!(money(&body["data"]["cart_total"]), 20.0);

    // An empty code clears the coupon without validation
    let response = app
        .request(
            Method::POST,
            "/api/cart/coupon",
            Some(json!({ "code": "" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["coupon_code"], json!(null));
    assert_eq!(money(&body["data"]["cart_total"]), 30.0);
}

#[tokio::test]
async fn a_deleted_coupon_quietly_drops_its_discount() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let product = app.seed_product("Calzone", dec!(12.00)).await;
    app.seed_coupon("BYE5", dec!(5.00), dec!(10.00)).await;
    app.add_to_cart(&token, product.id, 2).await;

    let response = app
        .request(
            Method::POST,
            "/api/cart/coupon",
            Some(json!({ "code": "BYE5" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let coupon = app
        .state
        .services
        .coupons
        .get_coupon_by_code("BYE5")
        .await
        .unwrap();
    app.state.services.coupons.delete_coupon(coupon.id).await.unwrap();

    // The stored code is stale now; the cart still loads, undiscounted
    let response = app.request(Method::GET, "/api/cart", None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["coupon_code"], json!("BYE5"));
    assert_eq!(money(&body["data"]["discount"]), 0.0);
    assert_eq!(money(&body["data"]["cart_total"]), 24.0);
}

#[tokio::test]
async fn clearing_the_cart_is_idempotent() {
    let app = TestApp::new().await;
    let token = app.customer_token().await;
    let product = app.seed_product("Focaccia", dec!(4.00)).await;
    app.add_to_cart(&token, product.id, 2).await;

    let response = app.request(Method::DELETE, "/api/cart", None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Clearing an absent cart still succeeds
    let response = app.request(Method::DELETE, "/api/cart", None, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.request(Method::GET, "/api/cart", None, Some(&token)).await;
    let body = read_json(response).await;
    assert_eq!(body["data"]["items"], json!([]));
}
