//! `POST /hangup-reason`: the one bearer-authenticated endpoint.
//! Pure logging sink - the original had no feedback path from this back
//! into the rendezvous engine, and this keeps that, per the Open Question
//! decision recorded in DESIGN.md.

use crate::error::{Error, Result};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Form;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct HangupReasonRequest {
    pub sip_user_id: String,
    pub unique_key: String,
    pub reason: String,
}

pub async fn hangup_reason(
    State(state): State<AppState>,
    Form(req): Form<HangupReasonRequest>,
) -> Result<StatusCode> {
    let device = state.devices.find_by_sip_user_id(&req.sip_user_id).await?;
    if device.is_none() {
        return Err(Error::NotFound);
    }

    tracing::info!(
        sip_user_id = %req.sip_user_id,
        call_id = %req.unique_key,
        reason = %req.reason,
        "call hangup reason reported"
    );

    Ok(StatusCode::OK)
}
