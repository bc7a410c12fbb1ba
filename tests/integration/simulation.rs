//! End-to-end watcher scenarios.
//!
//! Drives a real `GameWatcher` (schedulers, lock timers, persistence)
//! against the in-memory fakes under paused tokio time: detection,
//! betting, locking, settlement, and restart recovery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use betwatch::config::WatchSettings;
use betwatch::providers::WagerEventKind;
use betwatch::storage::{
    SavedBalance, SavedBet, SavedIdentity, SavedMatch, SavedParticipant, SavedWager, Store,
    TenantSave,
};
use betwatch::types::{
    EndType, Identity, MatchKey, MatchPlayer, MatchSnapshot, Outcome, Side, TenantStatus,
    WatchError,
};
use betwatch::watcher::GameWatcher;

use crate::mock_providers::{FakeDirectory, FakeStats, RecordingSink};

fn test_settings() -> WatchSettings {
    WatchSettings {
        scan_interval_secs: 60,
        resolve_interval_secs: 60,
        scan_batch_size: 5,
        resolve_batch_size: 5,
        lock_threshold_secs: 180,
        start_balance: 100,
    }
}

fn temp_store() -> Store {
    let mut dir = std::env::temp_dir();
    dir.push(format!("betwatch_simulation_{}", uuid::Uuid::new_v4()));
    Store::new(dir)
}

fn faker() -> Identity {
    Identity {
        id: "puid-faker".to_string(),
        handle: "Faker#KR1".to_string(),
        region: "KR".to_string(),
    }
}

fn chovy() -> Identity {
    Identity {
        id: "puid-chovy".to_string(),
        handle: "Chovy#KR1".to_string(),
        region: "KR".to_string(),
    }
}

fn live_snapshot(key: MatchKey, players: Vec<(&Identity, Side)>) -> MatchSnapshot {
    MatchSnapshot {
        key,
        mode: "CLASSIC".to_string(),
        started_at: Utc::now(),
        players: players
            .into_iter()
            .map(|(identity, side)| MatchPlayer {
                identity_id: identity.id.clone(),
                character_id: 103,
                side,
            })
            .collect(),
    }
}

fn blue_wins() -> Outcome {
    Outcome {
        winner: Side::Blue,
        end_type: EndType::Normal,
        duration_secs: 1500,
    }
}

struct Harness {
    directory: Arc<FakeDirectory>,
    stats: Arc<FakeStats>,
    sink: Arc<RecordingSink>,
    store: Store,
    watcher: Arc<GameWatcher>,
}

fn harness() -> Harness {
    let directory = Arc::new(FakeDirectory::new());
    let stats = Arc::new(FakeStats::new());
    let sink = Arc::new(RecordingSink::new());
    let store = temp_store();
    let watcher = GameWatcher::new(
        "guild-1",
        test_settings(),
        Arc::clone(&directory) as _,
        Arc::clone(&stats) as _,
        Arc::clone(&sink) as _,
        store.clone(),
    );
    Harness {
        directory,
        stats,
        sink,
        store,
        watcher,
    }
}

/// Full lifecycle: a tracked player enters a match, a wager opens and
/// takes bets, the betting window closes, the match ends, and payouts
/// land on the ledger.
#[tokio::test(start_paused = true)]
async fn test_full_wager_lifecycle() {
    let h = harness();
    h.directory.add_identity(faker());
    h.stats.set_probability("puid-faker", 0.7);

    h.watcher.start("chan-1", None).await.unwrap();
    h.watcher.add_identity("Faker#KR1", "KR").await.unwrap();

    let key = MatchKey::new("KR", 7_000_000_001);
    h.directory
        .set_live("puid-faker", live_snapshot(key.clone(), vec![(&faker(), Side::Blue)]));

    // First scan tick detects the match.
    tokio::time::sleep(Duration::from_secs(65)).await;
    let view = h.watcher.wager_view(&key).expect("wager should be open");
    assert!(!view.locked);
    assert_eq!(view.participants.len(), 1);
    assert_eq!(view.display_handle.as_deref(), Some("msg-1"));
    assert_eq!(h.sink.kinds(), vec![WagerEventKind::Created]);

    // Both sides take a bet while the window is open.
    h.watcher.place_bet(&key, "alice", 50, Side::Blue).await.unwrap();
    h.watcher.place_bet(&key, "bob", 50, Side::Red).await.unwrap();
    assert_eq!(h.watcher.balance("alice"), 50);
    assert_eq!(h.watcher.balance("bob"), 50);

    // The lock timer fires 180s after match start.
    tokio::time::sleep(Duration::from_secs(185)).await;
    assert!(h.watcher.wager_view(&key).unwrap().locked);
    let err = h
        .watcher
        .place_bet(&key, "carol", 10, Side::Blue)
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::Validation(_)));

    // The match ends; the next resolution pass settles it.
    h.directory.finish(&key, blue_wins());
    tokio::time::sleep(Duration::from_secs(125)).await;

    assert!(h.watcher.wager_view(&key).is_none());
    assert!(h.watcher.identities()[0].current_wager.is_none());
    assert_eq!(
        h.sink.kinds(),
        vec![
            WagerEventKind::Created,
            WagerEventKind::Updated,
            WagerEventKind::Updated,
            WagerEventKind::Locked,
            WagerEventKind::Ended,
        ]
    );

    // Winner credited, loser not.
    assert!(h.watcher.balance("alice") > 50);
    assert_eq!(h.watcher.balance("bob"), 50);

    let ended = h.sink.events().pop().unwrap();
    let payouts = ended.wager.payouts.expect("ended event carries payouts");
    let of = |user: &str| payouts.iter().find(|p| p.user_id == user).unwrap().amount;
    assert!(of("alice") > 0);
    assert_eq!(of("bob"), 0);

    // The settled wager is gone from the save file.
    let save = h.store.load("guild-1").unwrap().unwrap();
    assert!(save.in_flight.is_empty());
    assert!(save.ledger.iter().any(|b| b.user_id == "alice" && b.amount > 50));

    h.watcher.stop().unwrap();
}

/// Two tracked players in the same match produce a single wager with
/// both back-references set.
#[tokio::test(start_paused = true)]
async fn test_shared_match_opens_one_wager() {
    let h = harness();
    h.directory.add_identity(faker());
    h.directory.add_identity(chovy());

    h.watcher.start("chan-1", None).await.unwrap();
    h.watcher.add_identity("Faker#KR1", "KR").await.unwrap();
    h.watcher.add_identity("Chovy#KR1", "KR").await.unwrap();

    let key = MatchKey::new("KR", 7_000_000_002);
    let snapshot = live_snapshot(key.clone(), vec![(&faker(), Side::Blue), (&chovy(), Side::Red)]);
    h.directory.set_live("puid-faker", snapshot.clone());
    h.directory.set_live("puid-chovy", snapshot);

    tokio::time::sleep(Duration::from_secs(65)).await;

    assert_eq!(h.sink.kinds(), vec![WagerEventKind::Created]);
    let view = h.watcher.wager_view(&key).unwrap();
    assert_eq!(view.participants.len(), 2);
    for tracked in h.watcher.identities() {
        assert_eq!(tracked.current_wager, Some(key.clone()));
    }

    h.watcher.stop().unwrap();
}

/// A directory outage during scanning is retried, not fatal: the
/// identity stays in rotation and the wager opens once the provider
/// recovers, with stats failures degrading to even odds.
#[tokio::test(start_paused = true)]
async fn test_scan_retries_after_provider_outage() {
    let h = harness();
    h.directory.add_identity(faker());

    h.watcher.start("chan-1", None).await.unwrap();
    h.watcher.add_identity("Faker#KR1", "KR").await.unwrap();

    let key = MatchKey::new("KR", 7_000_000_004);
    h.directory
        .set_live("puid-faker", live_snapshot(key.clone(), vec![(&faker(), Side::Blue)]));
    h.directory.set_error("gateway timeout");
    h.stats.set_error("stats backend down");

    // The first scan hits the outage and opens nothing.
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(h.watcher.wager_view(&key).is_none());
    assert!(h.sink.kinds().is_empty());

    // Once the directory recovers, the next pass detects the match; the
    // stats outage only costs the win probability.
    h.directory.clear_error();
    tokio::time::sleep(Duration::from_secs(120)).await;

    let view = h.watcher.wager_view(&key).expect("wager after recovery");
    assert_eq!(h.sink.kinds(), vec![WagerEventKind::Created]);
    assert!((view.participants[0].win_probability - 0.5).abs() < 1e-9);

    h.watcher.stop().unwrap();
}

/// Restart recovery: a save with an in-flight wager 400s into its match
/// comes back as `Restored`, already locked (180s threshold), with its
/// bets replayed — and still settles normally.
#[tokio::test(start_paused = true)]
async fn test_restart_recovery_locks_stale_wager() {
    let h = harness();
    h.directory.add_identity(faker());
    h.stats.set_probability("puid-faker", 0.7);

    let key = MatchKey::new("KR", 7_000_000_003);
    let save = TenantSave {
        tenant_id: "guild-1".to_string(),
        channel_ref: "chan-1".to_string(),
        status: TenantStatus::Running,
        roster: vec![SavedIdentity {
            handle: "Faker#KR1".to_string(),
            region: "KR".to_string(),
        }],
        ledger: vec![
            SavedBalance {
                user_id: "alice".to_string(),
                amount: 70,
            },
            SavedBalance {
                user_id: "bob".to_string(),
                amount: 100,
            },
        ],
        in_flight: vec![SavedWager {
            message_ref: "msg-old".to_string(),
            match_info: SavedMatch {
                key: key.clone(),
                mode: "CLASSIC".to_string(),
                started_at: Utc::now() - chrono::Duration::seconds(400),
            },
            participants: vec![SavedParticipant {
                identity_id: "puid-faker".to_string(),
                side: Side::Blue,
                character_id: 103,
            }],
            bets: vec![SavedBet {
                user_id: "alice".to_string(),
                amount: 30,
                side: Side::Blue,
            }],
        }],
    };

    h.watcher.start("chan-1", Some(save)).await.unwrap();

    // Restored, not Created — and immediately locked.
    assert_eq!(
        h.sink.kinds(),
        vec![WagerEventKind::Restored, WagerEventKind::Locked]
    );
    let view = h.watcher.wager_view(&key).unwrap();
    assert!(view.locked);
    assert_eq!(view.pot, 30);
    assert_eq!(view.display_handle.as_deref(), Some("msg-old"));
    assert_eq!(h.watcher.balance("alice"), 70);

    // The replayed bet is binding: no double bet, no late bets.
    let err = h
        .watcher
        .place_bet(&key, "bob", 10, Side::Red)
        .await
        .unwrap_err();
    assert_eq!(format!("{err}"), "betting is locked for this match");

    // The restored wager still settles.
    h.directory.finish(&key, blue_wins());
    tokio::time::sleep(Duration::from_secs(65)).await;

    assert!(h.watcher.wager_view(&key).is_none());
    assert!(h.sink.kinds().contains(&WagerEventKind::Ended));
    assert!(h.watcher.balance("alice") > 70);

    h.watcher.stop().unwrap();
}
