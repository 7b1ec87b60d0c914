//! `POST /call-response`: the device's out-of-band callback.
//! Empty body, 202 on success, 404 if the call is unknown or the response
//! arrived too late - grounded on `original_source/api/views.py`'s
//! `CallResponseView.post`.

use crate::error::{Error, Result};
use crate::intake::IntakeOutcome;
use crate::state::AppState;
use crate::validation::validate_unique_key;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Form;
use serde::Deserialize;

fn default_available() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CallResponseRequest {
    pub unique_key: String,
    pub message_start_time: f64,
    #[serde(default = "default_available")]
    pub available: bool,
}

pub async fn call_response(
    State(state): State<AppState>,
    Form(req): Form<CallResponseRequest>,
) -> Result<StatusCode> {
    if !validate_unique_key(&req.unique_key) {
        return Err(Error::BadRequest);
    }

    let outcome = state
        .intake
        .handle_call_response(&req.unique_key, req.available, req.message_start_time)
        .await?;

    match outcome {
        IntakeOutcome::Accepted => Ok(StatusCode::ACCEPTED),
        IntakeOutcome::TooLate => Err(Error::NotFound),
    }
}
