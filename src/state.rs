//! Shared application state threaded through axum's `State` extractor.

use crate::coordinator::Coordinator;
use crate::device::DeviceRepository;
use crate::intake::ResponseIntake;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub intake: Arc<ResponseIntake>,
    pub devices: DeviceRepository,
    pub db_pool: PgPool,
}
