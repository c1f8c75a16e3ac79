use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use pulseboard_core::ignore::is_valid_rule;

use crate::{error::AppError, state::AppState};

/// `GET /api/ignore-rules` - the rules currently applied, read-only.
///
/// `valid: false` marks a rule whose pattern does not compile; it matches
/// nothing.
pub async fn list_ignore_rules(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.ignore_rules().await?;
    let rules: Vec<_> = snapshot
        .rules
        .iter()
        .map(|rule| {
            json!({
                "id": rule.id,
                "pattern": rule.pattern,
                "kind": rule.kind,
                "note": rule.note,
                "valid": is_valid_rule(rule),
            })
        })
        .collect();

    Ok(Json(json!({
        "data": rules,
        "fingerprint": snapshot.fingerprint,
    })))
}
