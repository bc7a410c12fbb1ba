//! Headless notification sink.
//!
//! Used by the binary when no chat frontend is wired up: every wager
//! lifecycle event is logged, and freshly announced wagers get a
//! generated display handle so persistence behaves exactly as it would
//! with a real frontend.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{NotificationSink, WagerEvent, WagerEventKind};

pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, tenant_id: &str, event: WagerEvent) -> Result<Option<String>> {
        let view = &event.wager;
        info!(
            tenant = %tenant_id,
            kind = ?event.kind,
            wager = %view.key,
            blue_odds = view.blue_odds,
            red_odds = view.red_odds,
            pot = view.pot,
            "Wager event"
        );

        match event.kind {
            WagerEventKind::Created | WagerEventKind::Restored if view.display_handle.is_none() => {
                Ok(Some(uuid::Uuid::new_v4().to_string()))
            }
            _ => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
