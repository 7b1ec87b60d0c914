//! `POST /incoming-call`: the switch's call notice. Returns the
//! plain-text body `status=ACK`/`status=NAK` the switch expects - grounded
//! on `original_source/api/views.py`'s `IncomingCallView.post`, which built
//! the same two-word response.

use crate::error::{Error, Result};
use crate::state::AppState;
use crate::validation::{validate_phonenumber, validate_sip_user_id, validate_unique_key};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct IncomingCallRequest {
    pub sip_user_id: String,
    #[serde(default)]
    pub caller_id: String,
    pub phonenumber: String,
    pub call_id: Option<String>,
}

pub async fn incoming_call(
    State(state): State<AppState>,
    Form(req): Form<IncomingCallRequest>,
) -> Result<Response> {
    let sip_user_id = validate_sip_user_id(&req.sip_user_id).ok_or(Error::BadRequest)?;
    if !validate_phonenumber(&req.phonenumber) {
        return Err(Error::BadRequest);
    }
    if let Some(ref call_id) = req.call_id {
        if !validate_unique_key(call_id) {
            return Err(Error::BadRequest);
        }
    }

    let outcome = state
        .coordinator
        .handle_incoming_call(&sip_user_id, &req.caller_id, &req.phonenumber, req.call_id)
        .await?;

    Ok(outcome.verdict.as_status_body().into_response())
}
