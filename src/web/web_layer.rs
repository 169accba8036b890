//! Web layer - HTTP routes that adapt the core services to JSON.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness check
//! - `POST /api/moderation/evaluate` - Moderate content from the acting user
//! - `GET|POST /api/admin/moderation/rules` - List / create rules
//! - `POST /api/admin/moderation/rules/preview` - Dry-run an unsaved rule
//! - `GET|PUT|DELETE /api/admin/moderation/rules/{id}` - Read / replace / delete a rule
//! - `PATCH /api/admin/moderation/rules/{id}/active` - Toggle a rule
//! - `GET /api/admin/moderation/reports` - Review queue
//! - `POST /api/admin/moderation/reports/{id}/review` - Approve or remove
//! - `DELETE /api/admin/rate-limits/{user_id}/{action}` - Reset a counter

#[path = "error.rs"]
pub mod error;

#[path = "extract.rs"]
pub mod extract;

#[path = "session.rs"]
pub mod session;

#[path = "handlers/admin.rs"]
pub mod admin;

#[path = "handlers/moderation.rs"]
pub mod moderation;

use crate::core::moderation::ModerationService;
use crate::core::rate_limit::RateLimiter;
use crate::infra::moderation::SqliteModerationStore;
use crate::infra::rate_limit::SqliteRateLimitStore;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use error::ApiError;
use serde_json::{json, Value};
use session::Actor;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub moderation: Arc<ModerationService<SqliteModerationStore>>,
    pub rate_limiter: Arc<RateLimiter<SqliteRateLimitStore>>,
}

/// Count an action against the actor's limit, turning a denial into a 429.
pub async fn enforce_rate_limit(state: &AppState, actor: &Actor, action: &str) -> error::Result<()> {
    let decision = state
        .rate_limiter
        .check_rate_limit(&actor.user_id, action)
        .await;
    tracing::debug!(user_id = %actor.user_id, action, %decision, "Rate limit checked");

    if decision.allowed {
        return Ok(());
    }

    Err(ApiError::RateLimited {
        retry_after_secs: decision.retry_after_secs(Utc::now()),
    })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/moderation/evaluate", post(moderation::evaluate))
        .route(
            "/api/admin/moderation/rules",
            get(admin::list_rules).post(admin::create_rule),
        )
        .route(
            "/api/admin/moderation/rules/preview",
            post(admin::preview_rule),
        )
        .route(
            "/api/admin/moderation/rules/{id}",
            get(admin::get_rule)
                .put(admin::update_rule)
                .delete(admin::delete_rule),
        )
        .route(
            "/api/admin/moderation/rules/{id}/active",
            patch(admin::set_rule_active),
        )
        .route("/api/admin/moderation/reports", get(admin::list_reports))
        .route(
            "/api/admin/moderation/reports/{id}/review",
            post(admin::review_report),
        )
        .route(
            "/api/admin/rate-limits/{user_id}/{action}",
            delete(admin::reset_rate_limit),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate_limit::{
        RateLimitConfig, RateLimitPolicies, ADMIN_ACTION, CONTENT_SUBMISSION,
    };
    use crate::infra::database::connect_pool;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use session::{USER_ID_HEADER, USER_ROLE_HEADER};
    use tower::ServiceExt;

    async fn create_test_app(policies: RateLimitPolicies) -> Router {
        let pool = connect_pool("sqlite::memory:").await.unwrap();

        let moderation_store = SqliteModerationStore::new(pool.clone());
        moderation_store.migrate().await.unwrap();
        let rate_limit_store = SqliteRateLimitStore::new(pool);
        rate_limit_store.migrate().await.unwrap();

        router(AppState {
            moderation: Arc::new(ModerationService::new(moderation_store)),
            rate_limiter: Arc::new(RateLimiter::new(rate_limit_store, policies)),
        })
    }

    fn generous() -> RateLimitPolicies {
        RateLimitPolicies::new(RateLimitConfig::new(1000, 60))
    }

    fn request(method: &str, uri: &str, role: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder
                .header(USER_ID_HEADER, format!("{}-1", role))
                .header(USER_ROLE_HEADER, role);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn scam_rule() -> Value {
        json!({
            "name": "Scams",
            "keywords": ["scam", "wire transfer"],
            "severity": "high",
            "action": "flag",
            "exempt_roles": ["admin"]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_test_app(generous()).await;
        let response = app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_evaluate_requires_identity() {
        let app = create_test_app(generous()).await;
        let body = json!({"content_id": "1", "content_type": "listing", "text": "hi"});

        let response = app
            .oneshot(request("POST", "/api/moderation/evaluate", None, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_evaluate_flow() {
        let app = create_test_app(generous()).await;

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/admin/moderation/rules",
                Some("admin"),
                Some(scam_rule()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let rule = json_body(response).await;

        let body = json!({
            "content_id": "listing-9",
            "content_type": "listing",
            "text": "Payment by Wire Transfer only"
        });
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/moderation/evaluate",
                Some("user"),
                Some(body.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = json_body(response).await;
        assert_eq!(result["action"], "flag");
        assert_eq!(result["rule_id"], rule["id"]);
        assert_eq!(result["severity"], "high");

        // Exempt role bypasses the rule
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/moderation/evaluate",
                Some("admin"),
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["action"], "allow");

        // Flagged content is queued for review
        let response = app
            .clone()
            .oneshot(request(
                "GET",
                "/api/admin/moderation/reports?status=pending",
                Some("moderator"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reports = json_body(response).await;
        let reports = reports["reports"].as_array().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["content_id"], "listing-9");
        assert_eq!(reports[0]["author_id"], "user-1");

        let uri = format!(
            "/api/admin/moderation/reports/{}/review",
            reports[0]["id"].as_i64().unwrap()
        );
        let response = app
            .oneshot(request(
                "POST",
                &uri,
                Some("moderator"),
                Some(json!({"decision": "approve"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reviewed = json_body(response).await;
        assert_eq!(reviewed["status"], "approved");
        assert_eq!(reviewed["reviewed_by"], "moderator-1");
    }

    #[tokio::test]
    async fn test_admin_routes_require_staff() {
        let app = create_test_app(generous()).await;
        let response = app
            .oneshot(request(
                "GET",
                "/api/admin/moderation/rules",
                Some("user"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_rate_limit_reset_requires_admin() {
        let app = create_test_app(generous()).await;
        let response = app
            .oneshot(request(
                "DELETE",
                "/api/admin/rate-limits/u1/admin_action",
                Some("moderator"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_invalid_rule_is_bad_request() {
        let app = create_test_app(generous()).await;
        let body = json!({
            "name": "broken",
            "regex": "(unclosed",
            "severity": "low",
            "action": "flag"
        });

        let response = app
            .oneshot(request(
                "POST",
                "/api/admin/moderation/rules",
                Some("admin"),
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_preview_rule_is_not_saved() {
        let app = create_test_app(generous()).await;
        let body = json!({
            "rule": scam_rule(),
            "content_type": "listing",
            "text": "Send a WIRE TRANSFER first"
        });

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/admin/moderation/rules/preview",
                Some("moderator"),
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = json_body(response).await;
        assert_eq!(result["action"], "flag");
        assert_eq!(result["matched_term"], "wire transfer");

        let response = app
            .oneshot(request(
                "GET",
                "/api/admin/moderation/rules",
                Some("moderator"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["rules"], json!([]));
    }

    #[tokio::test]
    async fn test_malformed_input_is_json_bad_request() {
        let app = create_test_app(generous()).await;
        let mut rule = scam_rule();
        rule["severity"] = json!("extreme");

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/admin/moderation/rules",
                Some("admin"),
                Some(rule),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_request");

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                "/api/admin/moderation/rules/abc",
                Some("admin"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_request");

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                "/api/admin/moderation/reports?limit=lots",
                Some("admin"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_request");

        let response = app
            .oneshot(request(
                "POST",
                "/api/moderation/evaluate",
                Some("user"),
                Some(json!({"content_id": "1"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_unknown_rule_is_not_found() {
        let app = create_test_app(generous()).await;
        let response = app
            .oneshot(request(
                "GET",
                "/api/admin/moderation/rules/404",
                Some("admin"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rule_toggle_and_delete() {
        let app = create_test_app(generous()).await;
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/admin/moderation/rules",
                Some("admin"),
                Some(scam_rule()),
            ))
            .await
            .unwrap();
        let id = json_body(response).await["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/admin/moderation/rules/{}/active", id),
                Some("admin"),
                Some(json!({"active": false})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["active"], false);

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/api/admin/moderation/rules/{}", id),
                Some("admin"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(
                "DELETE",
                &format!("/api/admin/moderation/rules/{}", id),
                Some("admin"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_actions_are_rate_limited() {
        let policies = generous().with_action(ADMIN_ACTION, RateLimitConfig::new(2, 3600));
        let app = create_test_app(policies).await;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request(
                    "GET",
                    "/api/admin/moderation/rules",
                    Some("admin"),
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(request(
                "GET",
                "/api/admin/moderation/rules",
                Some("admin"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after >= 1 && retry_after <= 3600);
        assert_eq!(json_body(response).await["code"], "rate_limited");
    }

    #[tokio::test]
    async fn test_submissions_are_rate_limited() {
        let policies =
            generous().with_action(CONTENT_SUBMISSION, RateLimitConfig::new(1, 600).sliding());
        let app = create_test_app(policies).await;
        let body = json!({"content_id": "c", "content_type": "comment", "text": "hello"});

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/moderation/evaluate",
                Some("user"),
                Some(body.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request(
                "POST",
                "/api/moderation/evaluate",
                Some("user"),
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }
}
