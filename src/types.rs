//! Shared types for the BETWATCH watcher.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that provider, wager,
//! and watcher modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sides & match enums
// ---------------------------------------------------------------------------

/// One of the two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Blue,
    Red,
}

impl Side {
    /// The opposing side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Blue => Side::Red,
            Side::Red => Side::Blue,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Blue => write!(f, "BLUE"),
            Side::Red => write!(f, "RED"),
        }
    }
}

/// How a finished match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndType {
    Normal,
    Surrender,
    Remake,
}

impl fmt::Display for EndType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndType::Normal => write!(f, "normal"),
            EndType::Surrender => write!(f, "surrender"),
            EndType::Remake => write!(f, "remake"),
        }
    }
}

/// Queue classification used when asking the stats provider for a
/// historical win probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    SoloRanked,
    FlexRanked,
    Aram,
    Normal,
    Unknown,
}

impl MatchType {
    /// Map the raw mode string of a match snapshot to a queue type.
    pub fn from_mode(mode: &str) -> Self {
        match mode {
            "CLASSIC" => MatchType::SoloRanked,
            "FLEX" => MatchType::FlexRanked,
            "ARAM" => MatchType::Aram,
            "NORMAL" => MatchType::Normal,
            _ => MatchType::Unknown,
        }
    }

    /// Stable identifier used in stats queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::SoloRanked => "SOLORANKED",
            MatchType::FlexRanked => "FLEXRANKED",
            MatchType::Aram => "ARAM",
            MatchType::Normal => "NORMAL",
            MatchType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Match key
// ---------------------------------------------------------------------------

/// The authoritative key for a match: region-prefixed composite id.
///
/// A bare numeric match id is not unique across regions, so this is the
/// only form ever used to key the active-wager map, the resolution queue,
/// and the persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    pub region: String,
    pub game_id: u64,
}

impl MatchKey {
    pub fn new(region: impl Into<String>, game_id: u64) -> Self {
        Self {
            region: region.into(),
            game_id,
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.region, self.game_id)
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// A player identity as resolved by the match directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque provider-side identifier.
    pub id: String,
    pub handle: String,
    pub region: String,
}

/// A roster entry: a player the watcher keeps an eye on.
///
/// `current_wager` is a lookup relation only — an optional key into the
/// active-wager map, cleared when the wager resolves. It never owns the
/// wager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedIdentity {
    pub handle: String,
    pub region: String,
    /// Opaque provider-side identifier, re-resolved at add/restore time.
    pub id: String,
    pub current_wager: Option<MatchKey>,
}

impl TrackedIdentity {
    pub fn new(identity: Identity) -> Self {
        Self {
            handle: identity.handle,
            region: identity.region,
            id: identity.id,
            current_wager: None,
        }
    }

    /// Whether this roster entry matches a handle/region pair.
    pub fn matches(&self, handle: &str, region: &str) -> bool {
        self.handle.eq_ignore_ascii_case(handle) && self.region.eq_ignore_ascii_case(region)
    }
}

impl fmt::Display for TrackedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.handle, self.region)
    }
}

// ---------------------------------------------------------------------------
// Match data
// ---------------------------------------------------------------------------

/// A player slot inside a live match snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPlayer {
    pub identity_id: String,
    pub character_id: i64,
    pub side: Side,
}

/// A live match as reported by the match directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub key: MatchKey,
    /// Raw mode string, mapped to [`MatchType`] for stats lookups.
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub players: Vec<MatchPlayer>,
}

/// The result of a finished match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub winner: Side,
    pub end_type: EndType,
    pub duration_secs: i64,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} won ({}, {}s)",
            self.winner, self.end_type, self.duration_secs
        )
    }
}

// ---------------------------------------------------------------------------
// Bets & payouts
// ---------------------------------------------------------------------------

/// A single recorded bet. Immutable once recorded; at most one per user
/// per wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub side: Side,
    pub amount: u64,
}

/// One payout record per bettor. Zero amounts are legitimate (losing side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub user_id: String,
    pub amount: u64,
}

/// A tracked player confirmed to be playing in a live match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub identity_id: String,
    pub handle: String,
    pub character_id: i64,
    /// Externally supplied historical win probability in [0, 1].
    pub win_probability: f64,
    pub side: Side,
}

/// Tenant lifecycle status, persisted alongside the tenant state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantStatus {
    Created,
    Running,
    Stopped,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a bet was turned away by the wager itself. Carries the rejection
/// text shown to the bettor; never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BetRejection {
    #[error("you have already bet on this match")]
    AlreadyPlaced,

    #[error("betting is locked for this match")]
    Locked,
}

/// Domain errors surfaced at the watcher API boundary.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Caller mistake: duplicate roster entry, insufficient balance,
    /// non-positive amount, rejected bet. Surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    /// A lookup miss that is an error from the caller's point of view
    /// (unknown identity, unknown wager key).
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator call failed (network, rate limit). Transient.
    #[error("provider error: {0}")]
    Provider(#[source] anyhow::Error),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
