//! Device registration endpoints (a minimal upsert, not a full lifecycle),
//! grounded on `original_source/api/views.py`'s `DeviceView`.

use crate::error::{Error, Result};
use crate::models::Platform;
use crate::state::AppState;
use crate::validation::{validate_sip_user_id, validate_token};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Form;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub sip_user_id: String,
    pub token: String,
    pub platform: String,
    #[serde(default)]
    pub sandbox: bool,
}

pub async fn register_device(
    State(state): State<AppState>,
    Form(req): Form<RegisterDeviceRequest>,
) -> Result<StatusCode> {
    let sip_user_id = validate_sip_user_id(&req.sip_user_id).ok_or(Error::BadRequest)?;
    if !validate_token(&req.token) {
        return Err(Error::BadRequest);
    }

    let platform = Platform::from_db_str(&req.platform.to_lowercase());
    if platform == Platform::Unknown {
        return Err(Error::BadRequest);
    }

    let created = state
        .devices
        .upsert(&sip_user_id, &req.token, platform.as_store_str(), req.sandbox)
        .await?;

    Ok(if created { StatusCode::CREATED } else { StatusCode::OK })
}

#[derive(Debug, Deserialize)]
pub struct UnregisterDeviceRequest {
    pub sip_user_id: String,
    pub token: String,
}

pub async fn unregister_device(
    State(state): State<AppState>,
    Form(req): Form<UnregisterDeviceRequest>,
) -> Result<StatusCode> {
    let sip_user_id = validate_sip_user_id(&req.sip_user_id).ok_or(Error::BadRequest)?;
    if !validate_token(&req.token) {
        return Err(Error::BadRequest);
    }

    state.devices.delete(&sip_user_id, &req.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
