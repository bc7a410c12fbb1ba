//! External collaborators.
//!
//! Defines the three traits the watcher depends on and provides:
//! - `http` — reqwest-backed game-data client (directory + stats)
//! - `log_sink` — headless notification sink for binary runs
//!
//! Everything behind these traits is replaceable: unit tests mock them,
//! integration tests use in-memory fakes.

pub mod http;
pub mod log_sink;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Identity, MatchKey, MatchSnapshot, MatchType, Outcome, Participant, Payout, Side, TrackedIdentity};
use crate::wager::{Wager, WagerState};

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// Read-only view of the match directory: identity resolution, live
/// match detection, and finished-match results.
///
/// "Not found" is a normal answer (`Ok(None)`); only transport and
/// provider failures surface as errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchDirectory: Send + Sync {
    /// Resolve a handle/region pair to a provider identity.
    async fn resolve_identity(&self, handle: &str, region: &str) -> Result<Option<Identity>>;

    /// The live match the identity is currently playing in, if any.
    async fn find_active_match(&self, identity: &TrackedIdentity) -> Result<Option<MatchSnapshot>>;

    /// The outcome of a match, once it has finished.
    async fn find_finished_match(&self, region: &str, key: &MatchKey) -> Result<Option<Outcome>>;
}

/// Historical win-probability lookup for one player on one character.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Win probability in [0, 1]. Callers fall back to 0.5 on error.
    async fn win_probability(
        &self,
        identity_id: &str,
        match_type: MatchType,
        character_id: i64,
    ) -> Result<f64>;
}

/// Where wager lifecycle events go (a chat frontend, a log, a test
/// recorder). The sink may return a display handle for the wager, which
/// the watcher records and persists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, tenant_id: &str, event: WagerEvent) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WagerEventKind {
    /// A new wager was opened for a freshly detected match.
    Created,
    /// A wager was rebuilt from a save file after a restart.
    Restored,
    /// The wager changed (a bet landed).
    Updated,
    /// The betting window closed.
    Locked,
    /// The match finished and payouts were settled.
    Ended,
}

/// One lifecycle notification, carrying a self-contained snapshot of
/// the wager so the sink never needs to reach back into watcher state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerEvent {
    pub kind: WagerEventKind,
    pub wager: WagerView,
}

/// Read-only snapshot of a wager at event time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerView {
    pub key: MatchKey,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub locked: bool,
    pub participants: Vec<Participant>,
    pub blue_odds: f64,
    pub red_odds: f64,
    pub blue_total: u64,
    pub red_total: u64,
    pub pot: u64,
    pub display_handle: Option<String>,
    pub outcome: Option<Outcome>,
    pub payouts: Option<Vec<Payout>>,
}

impl WagerView {
    pub fn of(wager: &Wager) -> Self {
        let odds = wager.odds();
        Self {
            key: wager.key.clone(),
            mode: wager.mode.clone(),
            started_at: wager.started_at,
            locked: wager.state() != WagerState::Open,
            participants: wager.participants.clone(),
            blue_odds: odds.blue,
            red_odds: odds.red,
            blue_total: wager.side_total(Side::Blue),
            red_total: wager.side_total(Side::Red),
            pot: wager.pot(),
            display_handle: wager.display_handle.clone(),
            outcome: wager.outcome().cloned(),
            payouts: None,
        }
    }

    pub fn with_payouts(mut self, payouts: Vec<Payout>) -> Self {
        self.payouts = Some(payouts);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
