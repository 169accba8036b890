// Content evaluation endpoint used by submission flows.

use crate::core::moderation::{ContentItem, ModerationResult};
use crate::core::rate_limit::CONTENT_SUBMISSION;
use crate::web::error::Result;
use crate::web::extract::ApiJson;
use crate::web::session::Actor;
use crate::web::{enforce_rate_limit, AppState};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub content_id: String,
    pub content_type: String,
    pub text: String,
}

/// Moderate a piece of content authored by the acting user.
pub async fn evaluate(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(req): ApiJson<EvaluateRequest>,
) -> Result<Json<ModerationResult>> {
    enforce_rate_limit(&state, &actor, CONTENT_SUBMISSION).await?;

    let item = ContentItem::new(req.content_id, req.content_type, req.text)
        .with_author(actor.user_id, actor.role);
    let result = state.moderation.moderate(&item).await?;

    Ok(Json(result))
}
