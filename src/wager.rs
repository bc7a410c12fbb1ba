//! Wager — the betting pool attached to one live match.
//!
//! State machine: OPEN → LOCKED → RESOLVED. Odds are a pure function of
//! the current state and are recomputed on every call, never cached.
//! The lock timer is a one-shot tokio task holding only a `Weak`
//! reference to the wager; its abort handle is kept on the wager so an
//! early resolution cancels the pending lock instead of leaving it to
//! fire on a dead pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::types::{Bet, BetRejection, MatchKey, MatchType, Outcome, Participant, Payout, Side};

/// Fraction of winning payouts retained by the house.
pub const HOUSE_EDGE: f64 = 0.05;

const MIN_ODDS: f64 = 1.1;
const MAX_ODDS: f64 = 5.0;
const PROB_FLOOR: f64 = 0.1;
const PROB_CEIL: f64 = 0.9;
/// How much the bet distribution skews the odds (0–1).
const BET_SKEW_WEIGHT: f64 = 0.5;
const EARLY_GAME_SECS: i64 = 300;
const MID_GAME_SECS: i64 = 900;

// ---------------------------------------------------------------------------
// State & odds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerState {
    Open,
    Locked,
    Resolved,
}

/// A pair of decimal odds, one per side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Odds {
    pub blue: f64,
    pub red: f64,
}

impl Odds {
    pub fn for_side(&self, side: Side) -> f64 {
        match side {
            Side::Blue => self.blue,
            Side::Red => self.red,
        }
    }
}

// ---------------------------------------------------------------------------
// Wager
// ---------------------------------------------------------------------------

pub struct Wager {
    pub key: MatchKey,
    pub mode: String,
    pub match_type: MatchType,
    pub started_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    /// Handle assigned by the notification sink; wagers without one are
    /// not yet visible anywhere and are skipped by persistence.
    pub display_handle: Option<String>,
    bets: HashMap<String, Bet>,
    locked: bool,
    outcome: Option<Outcome>,
    payouts: Option<Vec<Payout>>,
    lock_timer: Option<AbortHandle>,
}

impl Wager {
    pub fn new(
        key: MatchKey,
        mode: impl Into<String>,
        started_at: DateTime<Utc>,
        participants: Vec<Participant>,
    ) -> Self {
        let mode = mode.into();
        let match_type = MatchType::from_mode(&mode);
        Self {
            key,
            mode,
            match_type,
            started_at,
            participants,
            display_handle: None,
            bets: HashMap::new(),
            locked: false,
            outcome: None,
            payouts: None,
            lock_timer: None,
        }
    }

    pub fn state(&self) -> WagerState {
        if self.payouts.is_some() {
            WagerState::Resolved
        } else if self.locked {
            WagerState::Locked
        } else {
            WagerState::Open
        }
    }

    /// Wall-clock seconds since the match started.
    pub fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    pub fn bets(&self) -> &HashMap<String, Bet> {
        &self.bets
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Total staked across both sides.
    pub fn pot(&self) -> u64 {
        self.bets.values().map(|b| b.amount).sum()
    }

    pub fn side_total(&self, side: Side) -> u64 {
        self.bets
            .values()
            .filter(|b| b.side == side)
            .map(|b| b.amount)
            .sum()
    }

    /// Record a bet. At most one per user; rejected once the pool is no
    /// longer open. A rejection is a value, never a panic, and leaves
    /// the wager untouched.
    pub fn place_bet(&mut self, user_id: &str, amount: u64, side: Side) -> Result<(), BetRejection> {
        if self.state() != WagerState::Open {
            return Err(BetRejection::Locked);
        }
        if self.bets.contains_key(user_id) {
            return Err(BetRejection::AlreadyPlaced);
        }
        self.bets.insert(user_id.to_string(), Bet { side, amount });
        Ok(())
    }

    /// Flip the pool to LOCKED. No-op on a resolved wager.
    pub fn lock(&mut self) {
        if self.payouts.is_none() {
            self.locked = true;
        }
    }

    pub fn set_lock_timer(&mut self, handle: AbortHandle) {
        self.lock_timer = Some(handle);
    }

    fn cancel_lock_timer(&mut self) {
        if let Some(handle) = self.lock_timer.take() {
            handle.abort();
        }
    }

    /// Current odds, derived from team strength, bet distribution, and
    /// how far into the match we are.
    pub fn odds(&self) -> Odds {
        self.odds_at(self.elapsed_secs())
    }

    fn odds_at(&self, elapsed_secs: i64) -> Odds {
        let base = base_odds(&self.participants);

        // Side totals floored at 1 so an empty side still yields a
        // well-defined fraction.
        let blue_total = self.side_total(Side::Blue).max(1) as f64;
        let red_total = self.side_total(Side::Red).max(1) as f64;
        let total = blue_total + red_total;

        // More money on one side improves the odds of the other.
        let blue = base.blue * (1.0 + (red_total / total) * BET_SKEW_WEIGHT);
        let red = base.red * (1.0 + (blue_total / total) * BET_SKEW_WEIGHT);

        // Early game carries more uncertainty.
        let time_factor = if elapsed_secs < EARLY_GAME_SECS {
            1.2
        } else if elapsed_secs < MID_GAME_SECS {
            1.1
        } else {
            1.0
        };

        Odds {
            blue: (blue * time_factor).clamp(MIN_ODDS, MAX_ODDS),
            red: (red * time_factor).clamp(MIN_ODDS, MAX_ODDS),
        }
    }

    /// Settle the pool. Snapshots the odds, computes one payout per
    /// bettor, cancels any pending lock timer, and marks the wager
    /// terminal. Idempotent: a second call returns the stored payouts
    /// unchanged.
    pub fn resolve(&mut self, outcome: Outcome) -> Vec<Payout> {
        if let Some(payouts) = &self.payouts {
            return payouts.clone();
        }

        self.cancel_lock_timer();
        let odds = self.odds();
        let payouts = compute_payouts(&self.bets, outcome.winner, odds);

        debug!(
            wager = %self.key,
            winner = %outcome.winner,
            pot = self.pot(),
            "Wager resolved"
        );

        self.outcome = Some(outcome);
        self.payouts = Some(payouts.clone());
        self.locked = true;
        payouts
    }
}

// ---------------------------------------------------------------------------
// Odds & payout math
// ---------------------------------------------------------------------------

/// Base odds from team strength alone: per-side mean win probability
/// (0.5 for a side with no known participants), normalized to sum to 1,
/// then inverted with the probability clamped away from the extremes.
fn base_odds(participants: &[Participant]) -> Odds {
    let side_probability = |side: Side| -> f64 {
        let probs: Vec<f64> = participants
            .iter()
            .filter(|p| p.side == side)
            .map(|p| p.win_probability)
            .collect();
        if probs.is_empty() {
            0.5
        } else {
            probs.iter().sum::<f64>() / probs.len() as f64
        }
    };

    let blue = side_probability(Side::Blue);
    let red = side_probability(Side::Red);
    let total = blue + red;

    Odds {
        blue: 1.0 / (blue / total).clamp(PROB_FLOOR, PROB_CEIL),
        red: 1.0 / (red / total).clamp(PROB_FLOOR, PROB_CEIL),
    }
}

/// One entry per bettor: winners get their stake times the winning odds
/// less the house edge, truncated down; losers get an explicit zero.
fn compute_payouts(bets: &HashMap<String, Bet>, winner: Side, odds: Odds) -> Vec<Payout> {
    bets.iter()
        .map(|(user_id, bet)| {
            let amount = if bet.side == winner {
                (bet.amount as f64 * odds.for_side(winner) * (1.0 - HOUSE_EDGE)) as u64
            } else {
                0
            };
            Payout {
                user_id: user_id.clone(),
                amount,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Lock timer
// ---------------------------------------------------------------------------

/// Callback invoked exactly once when the betting window closes.
pub type LockCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Arm the betting-lock timer on a freshly created or restored wager.
///
/// The remaining window is `threshold − |elapsed|`. A match already past
/// the threshold locks immediately (the restart-recovery case) and the
/// callback runs before this returns. Otherwise a one-shot task is
/// spawned; it holds only a `Weak` reference, so a wager evicted before
/// the timer fires makes the callback a no-op, and the stored abort
/// handle lets resolution cancel it outright.
pub async fn arm_lock(wager: &Arc<Mutex<Wager>>, threshold_secs: i64, on_locked: LockCallback) {
    let remaining = {
        let w = wager.lock().unwrap();
        threshold_secs - w.elapsed_secs().abs()
    };

    if remaining <= 0 {
        {
            let mut w = wager.lock().unwrap();
            if w.state() == WagerState::Resolved {
                return;
            }
            w.lock();
        }
        on_locked().await;
        return;
    }

    let weak = Arc::downgrade(wager);
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(remaining as u64)).await;
        let Some(wager) = weak.upgrade() else { return };
        {
            let mut w = wager.lock().unwrap();
            if w.state() != WagerState::Open {
                return;
            }
            w.lock();
        }
        on_locked().await;
    });
    wager.lock().unwrap().set_lock_timer(handle.abort_handle());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
