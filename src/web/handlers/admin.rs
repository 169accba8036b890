// Admin moderation endpoints. Every call passes the staff check and the
// `admin_action` rate limit before touching the store.

use crate::core::moderation::{
    ContentItem, ModerationReport, ModerationResult, ModerationRule, ReportStatus,
    ReviewDecision, RuleDraft,
};
use crate::core::rate_limit::ADMIN_ACTION;
use crate::web::error::{ApiError, Result};
use crate::web::extract::{ApiJson, ApiPath, ApiQuery};
use crate::web::session::Actor;
use crate::web::{enforce_rate_limit, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

async fn staff_gate(state: &AppState, actor: &Actor) -> Result<()> {
    actor.require_staff()?;
    enforce_rate_limit(state, actor, ADMIN_ACTION).await
}

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<ModerationRule>,
}

pub async fn list_rules(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<RulesResponse>> {
    staff_gate(&state, &actor).await?;
    let rules = state.moderation.list_rules().await?;
    Ok(Json(RulesResponse { rules }))
}

pub async fn get_rule(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ModerationRule>> {
    staff_gate(&state, &actor).await?;
    Ok(Json(state.moderation.get_rule(id).await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(draft): ApiJson<RuleDraft>,
) -> Result<(StatusCode, Json<ModerationRule>)> {
    staff_gate(&state, &actor).await?;
    let rule = state.moderation.create_rule(draft).await?;
    tracing::info!(rule_id = rule.id, by = %actor.user_id, "Rule created via API");
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(draft): ApiJson<RuleDraft>,
) -> Result<Json<ModerationRule>> {
    staff_gate(&state, &actor).await?;
    Ok(Json(state.moderation.update_rule(id, draft).await?))
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub rule: RuleDraft,
    pub content_type: String,
    pub text: String,
}

/// Try an unsaved rule against sample text.
pub async fn preview_rule(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(req): ApiJson<PreviewRequest>,
) -> Result<Json<ModerationResult>> {
    staff_gate(&state, &actor).await?;
    let sample = ContentItem::new("preview", req.content_type, req.text);
    Ok(Json(state.moderation.preview_draft(req.rule, &sample)?))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

pub async fn set_rule_active(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<SetActiveRequest>,
) -> Result<Json<ModerationRule>> {
    staff_gate(&state, &actor).await?;
    Ok(Json(state.moderation.set_rule_active(id, req.active).await?))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode> {
    staff_gate(&state, &actor).await?;
    state.moderation.delete_rule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub reports: Vec<ModerationReport>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    actor: Actor,
    ApiQuery(query): ApiQuery<ReportsQuery>,
) -> Result<Json<ReportsResponse>> {
    staff_gate(&state, &actor).await?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(
            ReportStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status '{}'", raw)))?,
        ),
        None => None,
    };

    let reports = state.moderation.list_reports(status, query.limit).await?;
    Ok(Json(ReportsResponse { reports }))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
}

pub async fn review_report(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<Json<ModerationReport>> {
    staff_gate(&state, &actor).await?;
    let report = state
        .moderation
        .review_report(id, req.decision, &actor.user_id)
        .await?;
    Ok(Json(report))
}

/// Clear a user's rate limit counter. Admins only.
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath((user_id, action)): ApiPath<(String, String)>,
) -> Result<StatusCode> {
    actor.require_admin()?;
    enforce_rate_limit(&state, &actor, ADMIN_ACTION).await?;
    state.rate_limiter.reset(&user_id, &action).await?;
    Ok(StatusCode::NO_CONTENT)
}
