//! Mock providers for integration testing.
//!
//! Deterministic in-memory implementations of the watcher's three
//! collaborator traits. All state is fully controllable from test
//! code: which identities resolve, who is in a live match, and which
//! matches have finished.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use betwatch::providers::{
    MatchDirectory, NotificationSink, StatsProvider, WagerEvent, WagerEventKind,
};
use betwatch::types::{Identity, MatchKey, MatchSnapshot, MatchType, Outcome, TrackedIdentity};

// ---------------------------------------------------------------------------
// Match directory
// ---------------------------------------------------------------------------

/// An in-memory match directory.
pub struct FakeDirectory {
    identities: Mutex<HashMap<(String, String), Identity>>,
    /// identity_id → the live match they are in.
    live: Mutex<HashMap<String, MatchSnapshot>>,
    finished: Mutex<HashMap<MatchKey, Outcome>>,
    /// If set, all operations will return this error.
    force_error: Mutex<Option<String>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self {
            identities: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
            finished: Mutex::new(HashMap::new()),
            force_error: Mutex::new(None),
        }
    }

    fn key(handle: &str, region: &str) -> (String, String) {
        (handle.to_lowercase(), region.to_lowercase())
    }

    /// Register a resolvable identity.
    pub fn add_identity(&self, identity: Identity) {
        self.identities.lock().unwrap().insert(
            Self::key(&identity.handle, &identity.region),
            identity,
        );
    }

    /// Put an identity into a live match.
    pub fn set_live(&self, identity_id: &str, snapshot: MatchSnapshot) {
        self.live
            .lock()
            .unwrap()
            .insert(identity_id.to_string(), snapshot);
    }

    /// Finish a match: it stops being live and gains an outcome.
    pub fn finish(&self, key: &MatchKey, outcome: Outcome) {
        let mut live = self.live.lock().unwrap();
        live.retain(|_, snapshot| snapshot.key != *key);
        self.finished.lock().unwrap().insert(key.clone(), outcome);
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    fn check_error(&self) -> Result<()> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(())
    }
}

#[async_trait]
impl MatchDirectory for FakeDirectory {
    async fn resolve_identity(&self, handle: &str, region: &str) -> Result<Option<Identity>> {
        self.check_error()?;
        Ok(self
            .identities
            .lock()
            .unwrap()
            .get(&Self::key(handle, region))
            .cloned())
    }

    async fn find_active_match(&self, identity: &TrackedIdentity) -> Result<Option<MatchSnapshot>> {
        self.check_error()?;
        Ok(self.live.lock().unwrap().get(&identity.id).cloned())
    }

    async fn find_finished_match(&self, _region: &str, key: &MatchKey) -> Result<Option<Outcome>> {
        self.check_error()?;
        Ok(self.finished.lock().unwrap().get(key).cloned())
    }
}

// ---------------------------------------------------------------------------
// Stats provider
// ---------------------------------------------------------------------------

/// In-memory stats: fixed win probability per identity, 0.5 for
/// anyone unknown.
pub struct FakeStats {
    probabilities: Mutex<HashMap<String, f64>>,
    force_error: Mutex<Option<String>>,
}

impl FakeStats {
    pub fn new() -> Self {
        Self {
            probabilities: Mutex::new(HashMap::new()),
            force_error: Mutex::new(None),
        }
    }

    pub fn set_probability(&self, identity_id: &str, probability: f64) {
        self.probabilities
            .lock()
            .unwrap()
            .insert(identity_id.to_string(), probability);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl StatsProvider for FakeStats {
    async fn win_probability(
        &self,
        identity_id: &str,
        _match_type: MatchType,
        _character_id: i64,
    ) -> Result<f64> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(*self
            .probabilities
            .lock()
            .unwrap()
            .get(identity_id)
            .unwrap_or(&0.5))
    }
}

// ---------------------------------------------------------------------------
// Notification sink
// ---------------------------------------------------------------------------

/// Records every event and assigns sequential display handles to
/// freshly announced wagers.
pub struct RecordingSink {
    events: Mutex<Vec<WagerEvent>>,
    counter: AtomicU64,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    pub fn events(&self) -> Vec<WagerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<WagerEventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, _tenant_id: &str, event: WagerEvent) -> Result<Option<String>> {
        let assign = matches!(
            event.kind,
            WagerEventKind::Created | WagerEventKind::Restored
        ) && event.wager.display_handle.is_none();

        self.events.lock().unwrap().push(event);

        if assign {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Some(format!("msg-{n}")))
        } else {
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use betwatch::providers::WagerView;
    use betwatch::types::{EndType, Side};
    use betwatch::wager::Wager;
    use chrono::Utc;

    fn faker() -> Identity {
        Identity {
            id: "puid-faker".to_string(),
            handle: "Faker#KR1".to_string(),
            region: "KR".to_string(),
        }
    }

    fn snapshot(key: MatchKey) -> MatchSnapshot {
        MatchSnapshot {
            key,
            mode: "CLASSIC".to_string(),
            started_at: Utc::now(),
            players: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_directory_resolves_case_insensitive() {
        let directory = FakeDirectory::new();
        directory.add_identity(faker());

        let found = directory.resolve_identity("faker#kr1", "kr").await.unwrap();
        assert_eq!(found.unwrap().id, "puid-faker");

        let missing = directory.resolve_identity("Nobody#XX", "KR").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_directory_live_and_finish() {
        let directory = FakeDirectory::new();
        let key = MatchKey::new("KR", 1);
        directory.set_live("puid-faker", snapshot(key.clone()));

        let tracked = TrackedIdentity::new(faker());
        assert!(directory.find_active_match(&tracked).await.unwrap().is_some());
        assert!(directory
            .find_finished_match("KR", &key)
            .await
            .unwrap()
            .is_none());

        directory.finish(
            &key,
            Outcome {
                winner: Side::Blue,
                end_type: EndType::Normal,
                duration_secs: 1500,
            },
        );

        // No longer live, now has an outcome.
        assert!(directory.find_active_match(&tracked).await.unwrap().is_none());
        assert!(directory
            .find_finished_match("KR", &key)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_directory_forced_error() {
        let directory = FakeDirectory::new();
        directory.add_identity(faker());
        directory.set_error("simulated outage");

        assert!(directory.resolve_identity("Faker#KR1", "KR").await.is_err());

        directory.clear_error();
        assert!(directory.resolve_identity("Faker#KR1", "KR").await.is_ok());
    }

    #[tokio::test]
    async fn test_stats_defaults_to_even() {
        let stats = FakeStats::new();
        stats.set_probability("puid-faker", 0.72);

        let known = stats
            .win_probability("puid-faker", MatchType::SoloRanked, 1)
            .await
            .unwrap();
        let unknown = stats
            .win_probability("puid-other", MatchType::SoloRanked, 1)
            .await
            .unwrap();
        assert!((known - 0.72).abs() < 1e-9);
        assert!((unknown - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sink_assigns_sequential_handles() {
        let sink = RecordingSink::new();
        let wager = Wager::new(MatchKey::new("KR", 1), "CLASSIC", Utc::now(), vec![]);
        let view = WagerView::of(&wager);

        let first = sink
            .notify(
                "t1",
                WagerEvent {
                    kind: WagerEventKind::Created,
                    wager: view.clone(),
                },
            )
            .await
            .unwrap();
        let update = sink
            .notify(
                "t1",
                WagerEvent {
                    kind: WagerEventKind::Updated,
                    wager: view,
                },
            )
            .await
            .unwrap();

        assert_eq!(first.as_deref(), Some("msg-1"));
        assert!(update.is_none());
        assert_eq!(
            sink.kinds(),
            vec![WagerEventKind::Created, WagerEventKind::Updated]
        );
    }
}
