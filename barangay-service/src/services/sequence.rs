//! Atomic per-scope counters backing certificate, payment and receipt numbers.

use crate::models::numbering;
use crate::services::error::WorkflowError;
use crate::services::metrics::{record_number_allocated, DB_QUERY_DURATION};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

/// Increments the counter for `scope` and returns the new value.
///
/// Runs on the caller's transaction: the counter row stays locked until commit,
/// so concurrent writers queue on it and a rollback returns the value.
pub async fn next_value(conn: &mut PgConnection, scope: &str) -> Result<i64, WorkflowError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["next_sequence_value"])
        .start_timer();

    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequence_counters (scope, last_value)
        VALUES ($1, 1)
        ON CONFLICT (scope)
        DO UPDATE SET last_value = sequence_counters.last_value + 1, updated_utc = NOW()
        RETURNING last_value
        "#,
    )
    .bind(scope)
    .fetch_one(&mut *conn)
    .await?;

    timer.observe_duration();
    Ok(value)
}

pub async fn next_certificate_number(
    conn: &mut PgConnection,
    type_code: &str,
    now: DateTime<Utc>,
) -> Result<String, WorkflowError> {
    let scope = numbering::certificate_scope(type_code, now);
    let seq = next_value(conn, &scope).await?;
    record_number_allocated("certificate");
    Ok(numbering::format_number(&scope, seq))
}

pub async fn next_payment_number(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<String, WorkflowError> {
    let scope = numbering::payment_scope(now);
    let seq = next_value(conn, &scope).await?;
    record_number_allocated("payment");
    Ok(numbering::format_number(&scope, seq))
}

pub async fn next_receipt_number(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<String, WorkflowError> {
    let scope = numbering::receipt_scope(now);
    let seq = next_value(conn, &scope).await?;
    record_number_allocated("receipt");
    Ok(numbering::format_number(&scope, seq))
}
