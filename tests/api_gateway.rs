use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use matchbook::api::{create_app, AppState};
use matchbook::asset_catalog::AssetCatalog;
use matchbook::bus::{EventBus, MemoryBus};
use matchbook::engine::MatchingEngine;
use matchbook::store::{BalanceCommand, MemoryStore, Store};

const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

struct TestApp {
    app: Router,
    catalog: Arc<AssetCatalog>,
    store: Arc<dyn Store>,
}

fn setup() -> TestApp {
    let catalog = Arc::new(AssetCatalog::new());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(catalog.clone()));
    let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
    let engine = Arc::new(MatchingEngine::new(store.clone(), catalog.clone()));

    let state = Arc::new(AppState {
        store: store.clone(),
        bus,
        engine,
        catalog: catalog.clone(),
    });
    TestApp { app: create_app(state), catalog, store }
}

impl TestApp {
    async fn deposit(&self, address: &str, asset: &str, amount: &str) {
        let raw = self.catalog.to_raw(asset, dec(amount)).unwrap();
        self.store
            .apply(BalanceCommand::Deposit {
                address: address.to_string(),
                asset: asset.to_string(),
                amount: raw,
            })
            .await
            .unwrap();
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    async fn post(&self, uri: &str, payload: Value) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }
}

fn as_dec(value: &Value) -> Decimal {
    value.as_str().expect("decimal fields serialize as strings").parse().unwrap()
}

#[tokio::test]
async fn test_health() {
    let t = setup();
    let (status, body) = t.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_trace_id_header_present() {
    let t = setup();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-trace-id"));
}

#[tokio::test]
async fn test_assets_catalogue() {
    let t = setup();
    let (status, body) = t.get("/api/assets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 5);
    let symbols: Vec<&str> =
        body["assets"].as_array().unwrap().iter().map(|a| a["symbol"].as_str().unwrap()).collect();
    assert_eq!(symbols, vec!["USDC", "USDT", "ETH", "BTC", "DAI"]);
    assert_eq!(body["assets"][0]["type"], "stablecoin");
    assert!(body["assets"][2]["decimals"].is_number());
}

#[tokio::test]
async fn test_create_order_insufficient_balance() {
    let t = setup();
    let (status, body) = t
        .post(
            "/api/orders",
            json!({
                "address": BOB,
                "asset": "ETH",
                "side": "buy",
                "amount": "1",
                "price": "2000",
                "type": "limit",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "INSUFFICIENT_BALANCE");
}

#[tokio::test]
async fn test_order_lifecycle_over_http() {
    let t = setup();
    t.deposit(BOB, "USDC", "10000").await;

    let (status, body) = t
        .post(
            "/api/orders",
            json!({
                "address": BOB,
                "asset": "ETH",
                "side": "buy",
                "amount": "1",
                "price": "2000",
                "type": "limit",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert!(data["tradeId"].is_null());
    assert_eq!(as_dec(&data["remainingAmount"]), dec("1"));
    assert!(data["trades"].as_array().unwrap().is_empty());
    let order_id = data["orderId"].as_str().unwrap().to_string();

    // Listed, retrievable, on the book
    let (_, body) = t.get(&format!("/api/orders?address={}", BOB)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["status"], "pending");

    let (status, body) = t.get(&format!("/api/orders/{}", order_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["side"], "buy");
    assert_eq!(body["data"]["type"], "limit");
    assert_eq!(as_dec(&body["data"]["price"]), dec("2000"));

    let (status, body) = t.get("/api/orders/book/ETH").await;
    assert_eq!(status, StatusCode::OK);
    let bids = body["data"]["bids"].as_array().unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(as_dec(&bids[0]["price"]), dec("2000"));
    assert_eq!(as_dec(&bids[0]["totalRemaining"]), dec("1"));
    assert_eq!(bids[0]["orderCount"], 1);

    // Cancel once, then try again
    let (status, body) = t.post(&format!("/api/orders/{}/cancel", order_id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = t.post(&format!("/api/orders/{}/cancel", order_id), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("Current status: cancelled"));

    // Book is clear again
    let (_, body) = t.get("/api/orders/book/ETH").await;
    assert!(body["data"]["bids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_matched_orders_report_trades() {
    let t = setup();
    t.deposit(ALICE, "ETH", "1").await;
    t.deposit(BOB, "USDC", "10000").await;

    t.post(
        "/api/orders",
        json!({
            "address": ALICE, "asset": "ETH", "side": "sell",
            "amount": "1", "price": "1999", "type": "limit",
        }),
    )
    .await;

    let (status, body) = t
        .post(
            "/api/orders",
            json!({
                "address": BOB, "asset": "ETH", "side": "buy",
                "amount": "1", "price": "2000", "type": "limit",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    let trades = data["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(data["tradeId"], trades[0]["tradeId"]);
    assert_eq!(as_dec(&trades[0]["price"]), dec("1999"));
    assert_eq!(as_dec(&data["remainingAmount"]), Decimal::ZERO);

    let (_, body) = t.get(&format!("/api/trades?asset=ETH&address={}", ALICE)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["sellerAddress"], ALICE);

    let (_, body) = t.get(&format!("/api/balance/{}?asset=USDC", ALICE)).await;
    assert_eq!(as_dec(&body["balance"]), dec("1999"));
}

#[tokio::test]
async fn test_order_validation_errors() {
    let t = setup();

    // Malformed address
    let (status, body) = t
        .post(
            "/api/orders",
            json!({
                "address": "0x123", "asset": "ETH", "side": "buy",
                "amount": "1", "price": "2000", "type": "limit",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    // Market orders carry no price
    let (status, body) = t
        .post(
            "/api/orders",
            json!({
                "address": BOB, "asset": "ETH", "side": "buy",
                "amount": "1", "price": "2000", "type": "market",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Market orders"));

    // Unknown asset
    let (status, _) = t
        .post(
            "/api/orders",
            json!({
                "address": BOB, "asset": "XRP", "side": "buy",
                "amount": "1", "price": "2000", "type": "limit",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Quote currency is not tradable
    let (status, body) = t
        .post(
            "/api/orders",
            json!({
                "address": BOB, "asset": "USDC", "side": "buy",
                "amount": "1", "price": "1", "type": "limit",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("quote currency"));
}

#[tokio::test]
async fn test_unknown_order_returns_404() {
    let t = setup();
    let (status, body) = t.get("/api/orders/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn test_settle_and_query_settlements() {
    let t = setup();
    t.deposit(ALICE, "USDC", "500").await;

    let (status, body) = t
        .post(
            "/api/settle",
            json!({ "from": ALICE, "to": BOB, "amount": "100", "asset": "USDC" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let settlement_id = body["settlementId"].as_str().unwrap().to_string();

    // No worker is attached here, so the record stays pending
    let (status, body) = t.get(&format!("/api/settlements/{}", settlement_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(as_dec(&body["amount"]), dec("100"));

    let (status, body) = t.get("/api/settlements").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = t.get(&format!("/api/settlements/address/{}", ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["settlements"][0]["role"], "sender");

    let (status, body) = t
        .get(&format!("/api/settlements/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
    assert_eq!(body["error"], "SETTLEMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_settle_validation() {
    let t = setup();

    // Sender and receiver must differ
    let (status, body) = t
        .post(
            "/api/settle",
            json!({ "from": ALICE, "to": ALICE, "amount": "100", "asset": "USDC" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["statusCode"], 400);

    // Non-positive amount
    let (status, _) = t
        .post(
            "/api/settle",
            json!({ "from": ALICE, "to": BOB, "amount": "0", "asset": "USDC" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_balance_endpoints() {
    let t = setup();
    t.deposit(ALICE, "USDC", "500").await;
    t.deposit(ALICE, "ETH", "2").await;

    let (status, body) = t.get(&format!("/api/balance/{}?asset=USDC", ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], ALICE);
    assert_eq!(body["asset"], "USDC");
    assert_eq!(as_dec(&body["balance"]), dec("500"));

    // Unfunded pair reads as zero
    let (status, body) = t.get(&format!("/api/balance/{}?asset=BTC", BOB)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_dec(&body["balance"]), Decimal::ZERO);

    // Missing asset query parameter
    let (status, body) = t.get(&format!("/api/balance/{}", ALICE)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = t.get(&format!("/api/balance/{}/all", ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    // Sorted by asset
    assert_eq!(body["balances"][0]["asset"], "ETH");
    assert_eq!(body["balances"][1]["asset"], "USDC");
    assert_eq!(as_dec(&body["balances"][0]["balance"]), dec("2"));
}

#[tokio::test]
async fn test_addresses_are_normalized() {
    let t = setup();
    t.deposit(ALICE, "USDC", "500").await;

    let upper = ALICE.to_uppercase().replace("0X", "0x");
    let (status, body) = t.get(&format!("/api/balance/{}?asset=USDC", upper)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], ALICE);
    assert_eq!(as_dec(&body["balance"]), dec("500"));
}
