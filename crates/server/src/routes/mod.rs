use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod categories;
pub mod connections;
pub mod rules;
pub mod transactions;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/connections",
            get(connections::list).post(connections::link),
        )
        .route("/api/connections/{id}", delete(connections::disconnect))
        .route("/api/connections/{id}/sync", post(connections::sync))
        .route(
            "/api/transactions",
            get(transactions::list).post(transactions::create),
        )
        .route("/api/transactions/{id}", delete(transactions::remove))
        .route(
            "/api/categories",
            get(categories::list).post(categories::create),
        )
        .route("/api/categories/{id}", delete(categories::remove))
        .route("/api/categories/suggest", post(categories::suggest))
        .route("/api/rules", get(rules::list).post(rules::create))
        .route("/api/rules/{id}", put(rules::update).delete(rules::remove))
        .route("/api/rules/apply", post(rules::apply))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;
    use writeoff_sync::{DeltaBatch, ProviderRecord, ScriptedProvider, SyncReconciler};

    async fn test_app() -> (tempfile::TempDir, Arc<ScriptedProvider>, Router) {
        let dir = tempfile::tempdir().unwrap();
        let db = writeoff_storage::create_db(&dir.path().join("test.db"))
            .await
            .unwrap();
        writeoff_storage::seed_default_categories(&db).await.unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let reconciler = SyncReconciler::new(db.clone(), provider.clone());
        let app = router(Arc::new(AppState { db, reconciler }));
        (dir, provider, app)
    }

    fn request(
        method: &str,
        uri: &str,
        owner: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            builder = builder.header("x-owner-id", owner);
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_owner() {
        let (_dir, _provider, app) = test_app().await;
        let response = app
            .oneshot(request("GET", "/api/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn owner_header_is_required() {
        let (_dir, _provider, app) = test_app().await;
        let response = app
            .oneshot(request("GET", "/api/transactions", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn invalid_rule_pattern_is_rejected() {
        let (_dir, _provider, app) = test_app().await;
        let response = app
            .oneshot(request(
                "POST",
                "/api/rules",
                Some("u1"),
                Some(serde_json::json!({
                    "name": "broken",
                    "pattern": "([unclosed",
                    "category_id": 1
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn suggestion_matches_partial_name() {
        let (_dir, _provider, app) = test_app().await;
        let response = app
            .oneshot(request(
                "POST",
                "/api/categories/suggest",
                Some("u1"),
                Some(serde_json::json!({ "text": "software" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["name"], "Software & Subscriptions");
    }

    #[tokio::test]
    async fn link_sync_and_list_flow() {
        let (_dir, provider, app) = test_app().await;

        let link_body = serde_json::json!({
            "item_id": "item-1",
            "account_id": "acct-1",
            "access_token": "tok",
            "account_name": "Checking"
        });

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/connections",
                Some("u1"),
                Some(link_body.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = json_body(response).await;
        let id = created["id"].as_i64().unwrap();
        // The access token never leaves the server.
        assert!(created.get("access_token").is_none());

        provider.push_batch(DeltaBatch {
            added: vec![ProviderRecord {
                external_transaction_id: "tx_1".to_string(),
                external_account_id: "acct-1".to_string(),
                amount: rust_decimal::Decimal::new(4250, 2),
                date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                description: "Staples".to_string(),
                merchant_name: None,
                pending: false,
                payment_channel: "in store".to_string(),
            }],
            modified: vec![],
            removed: vec![],
            next_cursor: "c1".to_string(),
            has_more: false,
        });

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/api/connections/{id}/sync"),
                Some("u1"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = json_body(response).await;
        assert_eq!(summary["added"], 1);

        let response = app
            .clone()
            .oneshot(request("GET", "/api/transactions", Some("u1"), None))
            .await
            .unwrap();
        let rows = json_body(response).await;
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["description"], "Staples");

        // Linking the same account again is a conflict.
        let response = app
            .oneshot(request(
                "POST",
                "/api/connections",
                Some("u1"),
                Some(link_body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "CONFLICT");
    }
}
