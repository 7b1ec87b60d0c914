//! Device lookup and the minimal registration/deletion CRUD the Coordinator
//! depends on (a full lifecycle is out of scope; this is the "simple upsert
//! against a device table" it still requires). Grounded on
//! `original_source/api/views.py`'s `DeviceView` and
//! `server/src/db.rs`'s pool-and-query style.

use crate::error::{Error, Result};
use crate::models::Device;
use sqlx::PgPool;

#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve a device by `sip_user_id`. Absent ⇒ the Coordinator must NAK
    /// immediately without dispatching a push.
    pub async fn find_by_sip_user_id(&self, sip_user_id: &str) -> Result<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            SELECT sip_user_id, push_token, platform, sandbox, app_push_credential_ref
            FROM devices
            WHERE sip_user_id = $1
            "#,
        )
        .bind(sip_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    /// Upsert keyed on `sip_user_id`, mirroring `DeviceView.post` in the
    /// original: create on first registration, otherwise update the token
    /// and platform in place.
    pub async fn upsert(
        &self,
        sip_user_id: &str,
        push_token: &str,
        platform: &str,
        sandbox: bool,
    ) -> Result<bool> {
        let existing = self.find_by_sip_user_id(sip_user_id).await?;
        let created = existing.is_none();

        sqlx::query(
            r#"
            INSERT INTO devices (sip_user_id, push_token, platform, sandbox)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sip_user_id)
            DO UPDATE SET push_token = EXCLUDED.push_token,
                          platform = EXCLUDED.platform,
                          sandbox = EXCLUDED.sandbox
            "#,
        )
        .bind(sip_user_id)
        .bind(push_token)
        .bind(platform)
        .bind(sandbox)
        .execute(&self.pool)
        .await?;

        Ok(created)
    }

    /// Mirrors `DeviceView.delete`: only removes the row if the token still
    /// matches, so a stale unregister request can't evict a newer device.
    pub async fn delete(&self, sip_user_id: &str, push_token: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM devices WHERE sip_user_id = $1 AND push_token = $2")
            .bind(sip_user_id)
            .bind(push_token)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }

        Ok(())
    }
}
