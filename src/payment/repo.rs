use anyhow::Context;
use sqlx::PgPool;

use super::dto::PaymentEvent;

/// Stores an event once. Returns `false` when the id was already recorded.
pub async fn record_event(
    db: &PgPool,
    event: &PaymentEvent,
    payload: &serde_json::Value,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        INSERT INTO payment_events (id, event_type, livemode, payload)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&event.id)
    .bind(&event.event_type)
    .bind(event.livemode)
    .bind(payload)
    .execute(db)
    .await
    .context("insert payment event")?;

    Ok(res.rows_affected() == 1)
}
