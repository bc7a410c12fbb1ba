//! Game-data service integration.
//!
//! A thin read-only client over the HTTP game-data service, covering
//! both directory lookups (identities, live matches, finished matches)
//! and historical win-rate stats. The service answers 404 for anything
//! that simply doesn't exist right now (no live match, unknown handle),
//! which this client maps to `Ok(None)` — only transport and server
//! failures become errors.
//!
//! Auth: `X-Api-Key` header, key resolved from the environment at
//! startup and never logged.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{MatchDirectory, StatsProvider};
use crate::types::{
    EndType, Identity, MatchKey, MatchPlayer, MatchSnapshot, MatchType, Outcome, Side,
    TrackedIdentity,
};

// ---------------------------------------------------------------------------
// API response types (game-data JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdentityDto {
    id: String,
    handle: String,
    region: String,
}

#[derive(Debug, Deserialize)]
struct LiveMatchDto {
    game_id: u64,
    /// Region shard the match runs on.
    platform_id: String,
    mode: String,
    /// Epoch milliseconds.
    start_time_ms: i64,
    players: Vec<LivePlayerDto>,
}

#[derive(Debug, Deserialize)]
struct LivePlayerDto {
    identity_id: String,
    character_id: i64,
    /// "blue" | "red"
    team: String,
}

#[derive(Debug, Deserialize)]
struct FinishedMatchDto {
    winner: String,
    /// "normal" | "surrender" | "remake"
    #[serde(default)]
    end_type: Option<String>,
    duration_secs: i64,
}

#[derive(Debug, Deserialize)]
struct WinRateDto {
    win_probability: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Read-only game-data client.
pub struct GameDataClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl GameDataClient {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("betwatch/0.1.0")
            .build()
            .context("Failed to build HTTP client for game-data service")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    // -- Internal helpers ------------------------------------------------

    /// GET a JSON resource; 404 means "doesn't exist", not failure.
    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!(url = %url, "Fetching game-data resource");

        let resp = self
            .http
            .get(url)
            .header("X-Api-Key", self.api_key.expose_secret())
            .send()
            .await
            .context("Game-data request failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Game-data API error {status}: {body}");
        }

        let value: T = resp
            .json()
            .await
            .context("Failed to parse game-data response")?;
        Ok(Some(value))
    }

    fn parse_side(team: &str) -> Option<Side> {
        match team.to_ascii_lowercase().as_str() {
            "blue" => Some(Side::Blue),
            "red" => Some(Side::Red),
            _ => None,
        }
    }

    fn parse_end_type(end_type: Option<&str>) -> EndType {
        match end_type.map(str::to_ascii_lowercase).as_deref() {
            Some("surrender") => EndType::Surrender,
            Some("remake") => EndType::Remake,
            _ => EndType::Normal,
        }
    }

    /// Convert a live-match payload to a snapshot. Players on a team
    /// the service reports unrecognisably are dropped rather than
    /// failing the whole snapshot.
    fn to_snapshot(dto: LiveMatchDto) -> MatchSnapshot {
        let started_at = Utc
            .timestamp_millis_opt(dto.start_time_ms)
            .single()
            .unwrap_or_else(Utc::now);

        let players = dto
            .players
            .into_iter()
            .filter_map(|p| {
                Self::parse_side(&p.team).map(|side| MatchPlayer {
                    identity_id: p.identity_id,
                    character_id: p.character_id,
                    side,
                })
            })
            .collect();

        MatchSnapshot {
            key: MatchKey::new(dto.platform_id, dto.game_id),
            mode: dto.mode,
            started_at,
            players,
        }
    }

    fn to_outcome(dto: FinishedMatchDto) -> Option<Outcome> {
        let winner = Self::parse_side(&dto.winner)?;
        Some(Outcome {
            winner,
            end_type: Self::parse_end_type(dto.end_type.as_deref()),
            duration_secs: dto.duration_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl MatchDirectory for GameDataClient {
    async fn resolve_identity(&self, handle: &str, region: &str) -> Result<Option<Identity>> {
        let url = format!(
            "{}/identities/{}/{}",
            self.base_url,
            urlencoding::encode(region),
            urlencoding::encode(handle),
        );

        let dto: Option<IdentityDto> = self.get_optional(&url).await?;
        Ok(dto.map(|d| Identity {
            id: d.id,
            handle: d.handle,
            region: d.region,
        }))
    }

    async fn find_active_match(&self, identity: &TrackedIdentity) -> Result<Option<MatchSnapshot>> {
        let url = format!(
            "{}/matches/live/{}/{}",
            self.base_url,
            urlencoding::encode(&identity.region),
            urlencoding::encode(&identity.id),
        );

        let dto: Option<LiveMatchDto> = self.get_optional(&url).await?;
        Ok(dto.map(Self::to_snapshot))
    }

    async fn find_finished_match(&self, region: &str, key: &MatchKey) -> Result<Option<Outcome>> {
        let url = format!(
            "{}/matches/finished/{}/{}",
            self.base_url,
            urlencoding::encode(region),
            key.game_id,
        );

        let dto: Option<FinishedMatchDto> = self.get_optional(&url).await?;
        Ok(dto.and_then(Self::to_outcome))
    }
}

#[async_trait]
impl StatsProvider for GameDataClient {
    async fn win_probability(
        &self,
        identity_id: &str,
        match_type: MatchType,
        character_id: i64,
    ) -> Result<f64> {
        let url = format!(
            "{}/stats/{}/win-probability?queue={}&character={}",
            self.base_url,
            urlencoding::encode(identity_id),
            match_type.as_str(),
            character_id,
        );

        let dto: Option<WinRateDto> = self.get_optional(&url).await?;
        match dto {
            Some(d) => Ok(d.win_probability.clamp(0.0, 1.0)),
            // No history for this player/character pair.
            None => Ok(0.5),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
