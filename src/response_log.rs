//! Durable response log: a row-oriented store receiving
//! `{platform, roundtrip_time, available, date}` records. Grounded on
//! `original_source/app/models.py`'s `ResponseLog` and
//! `original_source/app/tasks.py`'s `log_to_db`, which is fire-and-forget so
//! it never delays the HTTP reply.

use sqlx::PgPool;

#[derive(Clone)]
pub struct ResponseLogWriter {
    pool: PgPool,
}

impl ResponseLogWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist one response-log row. Callers should `tokio::spawn` this -
    /// this write must never block the HTTP reply.
    pub async fn record(&self, platform: &str, roundtrip_secs: f64, available: bool) {
        let result = sqlx::query(
            r#"
            INSERT INTO response_log (platform, roundtrip_time, available, date)
            VALUES ($1, $2, $3, now())
            "#,
        )
        .bind(platform)
        .bind(roundtrip_secs)
        .bind(available)
        .execute(&self.pool)
        .await;

        // Lossy on process crash is acceptable; a query failure here is
        // logged, never propagated.
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist response log entry");
        }
    }
}
