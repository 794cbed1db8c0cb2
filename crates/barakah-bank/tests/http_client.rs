use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use barakah_bank::{BankClient, BankConfig, BankError, HttpBankClient, TransactionFilter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

// "client:secret" base64-encoded
const BASIC: &str = "Basic Y2xpZW50OnNlY3JldA==";

async fn token(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth != BASIC {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad client"})));
    }
    if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "grant"})));
    }
    if form.get("code").map(String::as_str) != Some("good-code") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})));
    }
    (
        StatusCode::OK,
        Json(json!({"access_token": "at-1", "refresh_token": "rt-1", "expires_in": 3600})),
    )
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer at-1")
}

async fn accounts(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({"accounts": [
            {"account_id": "acc-1", "institution_name": "Demo Bank", "account_number": "00112233"}
        ]})),
    )
}

async fn transactions(
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let mut txns = vec![
        json!({"transaction_id": "t1", "merchant_name": "Tesco", "amount": -12.5,
               "posted_date": "2024-03-01", "categories": ["Groceries"]}),
        json!({"transaction_id": "t2", "description": "THE RED LION PUB", "amount": -30.0,
               "posted_date": "2024-03-02"}),
    ];
    if let Some(from) = q.get("from_date") {
        txns.retain(|t| t["posted_date"].as_str().unwrap_or_default() >= from.as_str());
    }
    (StatusCode::OK, Json(json!({ "transactions": txns })))
}

async fn spawn_bank() -> String {
    let app = Router::new()
        .route("/v1/auth/token", post(token))
        .route("/v1/accounts", get(accounts))
        .route("/v1/transactions", get(transactions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

fn client(base_url: String, secret: &str) -> HttpBankClient {
    HttpBankClient::new(BankConfig {
        base_url,
        client_id: "client".to_string(),
        client_secret: secret.to_string(),
        redirect_uri: "barakah://bank/callback".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn exchange_list_accounts_and_transactions() {
    let bank = client(spawn_bank().await, "secret");

    let tokens = bank.exchange_code("good-code").await.unwrap();
    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));

    let accounts = bank.list_accounts(&tokens.access_token).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].mask(), "2233");

    let all = bank
        .list_transactions(&tokens.access_token, &TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].display_merchant(), "THE RED LION PUB");

    let filtered = bank
        .list_transactions(
            &tokens.access_token,
            &TransactionFilter {
                from_date: Some("2024-03-02".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].transaction_id, "t2");
}

#[tokio::test]
async fn non_success_status_is_surfaced() {
    let base = spawn_bank().await;

    let err = client(base.clone(), "wrong").exchange_code("good-code").await.unwrap_err();
    assert!(matches!(err, BankError::Status { status: 401, .. }));

    let bank = client(base, "secret");
    let err = bank.exchange_code("bad-code").await.unwrap_err();
    match err {
        BankError::Status { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = bank.list_accounts("expired").await.unwrap_err();
    assert!(matches!(err, BankError::Status { status: 401, .. }));
}

#[tokio::test]
async fn unreachable_host_is_http_error() {
    let bank = client("http://127.0.0.1:9/v1".to_string(), "secret");
    let err = bank.list_accounts("at-1").await.unwrap_err();
    assert!(matches!(err, BankError::Http(_)));
}
