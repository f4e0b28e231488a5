//! Statement logging
//!
//! One event per chain: trace for normal runs, warn for failures and for
//! statements slower than `orm.slow_threshold_ms`.

use crate::callbacks::CallbackKind;
use crate::statement::Statement;
use std::time::Duration;

pub(crate) fn log_statement(stmt: &Statement, kind: CallbackKind, elapsed: Duration) {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let threshold = stmt.engine.config.slow_threshold_ms;
    match &stmt.error {
        Some(err) if !err.is_not_found() => {
            tracing::warn!(
                kind = kind.name(),
                rows = stmt.rows_affected,
                elapsed_ms,
                sql = %stmt.explain(),
                "statement failed: {}",
                err
            );
        }
        _ if threshold > 0 && elapsed > Duration::from_millis(threshold) => {
            tracing::warn!(
                kind = kind.name(),
                rows = stmt.rows_affected,
                elapsed_ms,
                sql = %stmt.explain(),
                "slow statement >= {}ms",
                threshold
            );
        }
        _ => {
            tracing::trace!(
                kind = kind.name(),
                rows = stmt.rows_affected,
                elapsed_ms,
                sql = %stmt.explain(),
                "statement executed"
            );
        }
    }
}
