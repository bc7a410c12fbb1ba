//! Game watcher — per-tenant orchestration.
//!
//! One `GameWatcher` per tenant owns the roster, the ledger, and the
//! active wagers, and drives two schedulers: an identity scan that
//! detects tracked players entering live matches, and a resolution loop
//! that settles wagers once matches finish. Every externally visible
//! mutation is persisted through the store, and every wager lifecycle
//! change is dispatched to the notification sink.

pub mod registry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::WatchSettings;
use crate::providers::{
    MatchDirectory, NotificationSink, StatsProvider, WagerEvent, WagerEventKind, WagerView,
};
use crate::scheduler::{BatchScheduler, ProcessFn, RefillFn};
use crate::storage::{
    SavedBalance, SavedBet, SavedIdentity, SavedMatch, SavedParticipant, SavedWager, Store,
    TenantSave,
};
use crate::types::{
    MatchKey, MatchSnapshot, MatchType, Participant, Payout, Side, TenantStatus, TrackedIdentity,
    WatchError,
};
use crate::wager::{arm_lock, LockCallback, Wager};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Scan queue item: enough to find the roster entry again at drain time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub handle: String,
    pub region: String,
}

/// Everything a tenant owns, behind one mutex. The wagers themselves
/// are separately locked so the lock timer and schedulers can reach
/// them without the whole tenant; lock order is always state → wager.
struct TenantState {
    channel_ref: Option<String>,
    status: TenantStatus,
    roster: Vec<TrackedIdentity>,
    ledger: HashMap<String, i64>,
    wagers: HashMap<MatchKey, Arc<Mutex<Wager>>>,
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

pub struct GameWatcher {
    tenant_id: String,
    settings: WatchSettings,
    directory: Arc<dyn MatchDirectory>,
    stats: Arc<dyn StatsProvider>,
    sink: Arc<dyn NotificationSink>,
    store: Store,
    state: Mutex<TenantState>,
    scan: BatchScheduler<ScanTarget>,
    resolution: BatchScheduler<MatchKey>,
    self_weak: Weak<GameWatcher>,
}

impl GameWatcher {
    pub fn new(
        tenant_id: impl Into<String>,
        settings: WatchSettings,
        directory: Arc<dyn MatchDirectory>,
        stats: Arc<dyn StatsProvider>,
        sink: Arc<dyn NotificationSink>,
        store: Store,
    ) -> Arc<Self> {
        let tenant_id = tenant_id.into();

        Arc::new_cyclic(|weak: &Weak<GameWatcher>| {
            let scan_process: ProcessFn<ScanTarget> = {
                let weak = weak.clone();
                Arc::new(move |batch| {
                    let weak = weak.clone();
                    Box::pin(async move {
                        if let Some(watcher) = weak.upgrade() {
                            watcher.scan_batch(batch).await;
                        }
                        Ok(())
                    })
                })
            };
            let scan_refill: RefillFn<ScanTarget> = {
                let weak = weak.clone();
                Arc::new(move || {
                    weak.upgrade()
                        .map(|w| w.idle_scan_targets())
                        .unwrap_or_default()
                })
            };

            let resolve_process: ProcessFn<MatchKey> = {
                let weak = weak.clone();
                Arc::new(move |batch| {
                    let weak = weak.clone();
                    Box::pin(async move {
                        if let Some(watcher) = weak.upgrade() {
                            watcher.resolve_batch(batch).await;
                        }
                        Ok(())
                    })
                })
            };
            let resolve_refill: RefillFn<MatchKey> = {
                let weak = weak.clone();
                Arc::new(move || {
                    weak.upgrade()
                        .map(|w| w.active_wager_keys())
                        .unwrap_or_default()
                })
            };

            GameWatcher {
                scan: BatchScheduler::new(
                    format!("{tenant_id}/scan"),
                    settings.scan_batch_size,
                    Duration::from_secs(settings.scan_interval_secs),
                    scan_process,
                    scan_refill,
                ),
                resolution: BatchScheduler::new(
                    format!("{tenant_id}/resolve"),
                    settings.resolve_batch_size,
                    Duration::from_secs(settings.resolve_interval_secs),
                    resolve_process,
                    resolve_refill,
                ),
                tenant_id,
                settings,
                directory,
                stats,
                sink,
                store,
                state: Mutex::new(TenantState {
                    channel_ref: None,
                    status: TenantStatus::Created,
                    roster: Vec::new(),
                    ledger: HashMap::new(),
                    wagers: HashMap::new(),
                }),
                self_weak: weak.clone(),
            }
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    // -- Lifecycle -------------------------------------------------------

    /// Bind to a notification channel and begin watching. With a save,
    /// the roster, ledger, and in-flight wagers are rebuilt first.
    pub async fn start(
        &self,
        channel_ref: impl Into<String>,
        from_save: Option<TenantSave>,
    ) -> Result<(), WatchError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.status == TenantStatus::Running {
                return Err(WatchError::Validation("watcher already running".to_string()));
            }
            state.channel_ref = Some(channel_ref.into());
        }

        if let Some(save) = from_save {
            info!(tenant = %self.tenant_id, "Restoring watcher from save");
            self.restore_roster(&save.roster).await;
            {
                let mut state = self.state.lock().unwrap();
                for entry in &save.ledger {
                    state.ledger.insert(entry.user_id.clone(), entry.amount);
                }
            }
            for saved in &save.in_flight {
                if let Err(e) = self.restore_wager(saved).await {
                    warn!(
                        tenant = %self.tenant_id,
                        wager = %saved.match_info.key,
                        error = %e,
                        "Failed to restore wager"
                    );
                }
            }
        }

        self.state.lock().unwrap().status = TenantStatus::Running;
        self.scan.initialize(self.idle_scan_targets());
        self.resolution.initialize(self.active_wager_keys());
        self.scan.start();
        self.resolution.start();
        self.save_state()?;

        info!(tenant = %self.tenant_id, "Watcher running");
        Ok(())
    }

    /// Stop both loops and unbind the channel. Active wagers stay in
    /// the save file for the next start.
    pub fn stop(&self) -> Result<(), WatchError> {
        self.scan.stop();
        self.resolution.stop();
        {
            let mut state = self.state.lock().unwrap();
            state.channel_ref = None;
            state.status = TenantStatus::Stopped;
        }
        self.save_state()?;
        info!(tenant = %self.tenant_id, "Watcher stopped");
        Ok(())
    }

    // -- Roster ----------------------------------------------------------

    /// Track a new player. The handle is resolved against the match
    /// directory before it enters the roster.
    pub async fn add_identity(
        &self,
        handle: &str,
        region: &str,
    ) -> Result<TrackedIdentity, WatchError> {
        {
            let state = self.state.lock().unwrap();
            if state.roster.iter().any(|t| t.matches(handle, region)) {
                return Err(WatchError::Validation("identity already tracked".to_string()));
            }
        }

        let identity = self
            .directory
            .resolve_identity(handle, region)
            .await
            .map_err(WatchError::Provider)?
            .ok_or_else(|| WatchError::NotFound(format!("identity {handle} ({region})")))?;

        let tracked = TrackedIdentity::new(identity);
        info!(tenant = %self.tenant_id, identity = %tracked, "Tracking identity");

        {
            let mut state = self.state.lock().unwrap();
            // A concurrent add may have won the race.
            if state.roster.iter().any(|t| t.matches(handle, region)) {
                return Err(WatchError::Validation("identity already tracked".to_string()));
            }
            state.roster.push(tracked.clone());
        }
        self.scan.add_to_queue([ScanTarget {
            handle: tracked.handle.clone(),
            region: tracked.region.clone(),
        }]);
        self.save_state()?;
        Ok(tracked)
    }

    /// Stop tracking a player. Any wager they are in keeps running.
    pub fn remove_identity(&self, handle: &str, region: &str) -> Result<(), WatchError> {
        {
            let mut state = self.state.lock().unwrap();
            let before = state.roster.len();
            state.roster.retain(|t| !t.matches(handle, region));
            if state.roster.len() == before {
                return Err(WatchError::NotFound(format!("identity {handle} ({region})")));
            }
        }
        self.scan
            .remove_from_queue(|t| t.handle.eq_ignore_ascii_case(handle) && t.region.eq_ignore_ascii_case(region));
        info!(tenant = %self.tenant_id, handle, region, "Identity removed");
        self.save_state()?;
        Ok(())
    }

    pub fn identities(&self) -> Vec<TrackedIdentity> {
        self.state.lock().unwrap().roster.clone()
    }

    // -- Ledger ----------------------------------------------------------

    /// Current balance, lazily seeded with the starting amount on first
    /// access. A fresh seed is a ledger change, so it is persisted.
    pub fn balance(&self, user_id: &str) -> i64 {
        let (amount, seeded) = {
            let mut state = self.state.lock().unwrap();
            match state.ledger.get(user_id) {
                Some(amount) => (*amount, false),
                None => {
                    let start = self.settings.start_balance;
                    state.ledger.insert(user_id.to_string(), start);
                    (start, true)
                }
            }
        };
        if seeded {
            if let Err(e) = self.save_state() {
                warn!(
                    tenant = %self.tenant_id,
                    user = user_id,
                    error = %e,
                    "Failed to persist seeded balance"
                );
            }
        }
        amount
    }

    /// All known balances, richest first.
    pub fn scoreboard(&self) -> Vec<(String, i64)> {
        let state = self.state.lock().unwrap();
        let mut board: Vec<_> = state
            .ledger
            .iter()
            .map(|(user, amount)| (user.clone(), *amount))
            .collect();
        board.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        board
    }

    // -- Betting ---------------------------------------------------------

    /// Place a bet on an active wager. The stake is only deducted once
    /// the wager has accepted the bet.
    pub async fn place_bet(
        &self,
        key: &MatchKey,
        user_id: &str,
        amount: u64,
        side: Side,
    ) -> Result<(), WatchError> {
        if amount == 0 {
            return Err(WatchError::Validation("bet amount must be positive".to_string()));
        }
        // Stakes live on an i64 ledger; an amount that doesn't fit can
        // never be covered by any balance.
        let stake = i64::try_from(amount).map_err(|_| {
            WatchError::Validation("you can't wager more than you own".to_string())
        })?;

        let wager = {
            let mut state = self.state.lock().unwrap();
            let wager = state
                .wagers
                .get(key)
                .cloned()
                .ok_or_else(|| WatchError::NotFound(format!("wager {key}")))?;

            let start = self.settings.start_balance;
            let balance = state.ledger.entry(user_id.to_string()).or_insert(start);
            if *balance < stake {
                return Err(WatchError::Validation(
                    "you can't wager more than you own".to_string(),
                ));
            }

            wager
                .lock()
                .unwrap()
                .place_bet(user_id, amount, side)
                .map_err(|rejection| WatchError::Validation(rejection.to_string()))?;

            *state.ledger.get_mut(user_id).unwrap() -= stake;
            wager
        };

        info!(
            tenant = %self.tenant_id,
            wager = %key,
            user = user_id,
            amount,
            side = %side,
            "Bet placed"
        );
        self.dispatch(WagerEventKind::Updated, &wager, None).await
    }

    pub fn wager_view(&self, key: &MatchKey) -> Option<WagerView> {
        let state = self.state.lock().unwrap();
        state
            .wagers
            .get(key)
            .map(|w| WagerView::of(&w.lock().unwrap()))
    }

    // -- Scan loop -------------------------------------------------------

    /// Roster entries not currently attached to a wager.
    fn idle_scan_targets(&self) -> Vec<ScanTarget> {
        let state = self.state.lock().unwrap();
        state
            .roster
            .iter()
            .filter(|t| t.current_wager.is_none())
            .map(|t| ScanTarget {
                handle: t.handle.clone(),
                region: t.region.clone(),
            })
            .collect()
    }

    fn active_wager_keys(&self) -> Vec<MatchKey> {
        self.state.lock().unwrap().wagers.keys().cloned().collect()
    }

    fn is_running(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.status == TenantStatus::Running && state.channel_ref.is_some()
    }

    /// Probe a batch of idle identities for live matches. Per-item
    /// failures are logged and retried on a later pass; they never
    /// abort the batch.
    async fn scan_batch(&self, batch: Vec<ScanTarget>) {
        if !self.is_running() {
            return;
        }
        debug!(tenant = %self.tenant_id, targets = batch.len(), "Scanning identities");

        for target in batch {
            let tracked = {
                let state = self.state.lock().unwrap();
                match state
                    .roster
                    .iter()
                    .find(|t| t.matches(&target.handle, &target.region))
                {
                    // Removed from the roster, or already in a game.
                    None => continue,
                    Some(t) if t.current_wager.is_some() => continue,
                    Some(t) => t.clone(),
                }
            };

            let snapshot = match self.directory.find_active_match(&tracked).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        tenant = %self.tenant_id,
                        identity = %tracked,
                        error = %e,
                        "Live-match probe failed"
                    );
                    continue;
                }
            };

            if let Err(e) = self.open_wager(snapshot).await {
                warn!(
                    tenant = %self.tenant_id,
                    identity = %tracked,
                    error = %e,
                    "Failed to open wager"
                );
            }
        }
    }

    /// Open a wager for a freshly detected match: gather participant
    /// stats, then insert the wager, set the roster back-references,
    /// and enqueue the resolution key in one critical section.
    async fn open_wager(&self, snapshot: MatchSnapshot) -> Result<(), WatchError> {
        {
            let state = self.state.lock().unwrap();
            if state.wagers.contains_key(&snapshot.key) {
                return Ok(());
            }
        }

        let participants = self.build_participants(&snapshot).await;

        let wager = {
            let mut state = self.state.lock().unwrap();
            // The map may have changed while stats were fetched.
            if state.wagers.contains_key(&snapshot.key) {
                return Ok(());
            }

            let wager = Arc::new(Mutex::new(Wager::new(
                snapshot.key.clone(),
                snapshot.mode.clone(),
                snapshot.started_at,
                participants,
            )));

            let tracked_ids: Vec<&str> = snapshot
                .players
                .iter()
                .map(|p| p.identity_id.as_str())
                .collect();
            for entry in state.roster.iter_mut() {
                if tracked_ids.contains(&entry.id.as_str()) && entry.current_wager.is_none() {
                    entry.current_wager = Some(snapshot.key.clone());
                }
            }

            state.wagers.insert(snapshot.key.clone(), Arc::clone(&wager));
            self.resolution.add_to_queue([snapshot.key.clone()]);
            wager
        };

        info!(
            tenant = %self.tenant_id,
            wager = %snapshot.key,
            mode = %snapshot.mode,
            started_at = %snapshot.started_at,
            "Match detected, wager opened"
        );

        self.dispatch(WagerEventKind::Created, &wager, None).await?;
        self.arm_wager_lock(&wager).await;
        Ok(())
    }

    /// Participants for a snapshot: the intersection of the match's
    /// players and the roster, each with a historical win probability.
    /// A stats failure degrades to a coin flip, never blocks the wager.
    async fn build_participants(&self, snapshot: &MatchSnapshot) -> Vec<Participant> {
        let match_type = MatchType::from_mode(&snapshot.mode);
        let roster_by_id: HashMap<String, String> = {
            let state = self.state.lock().unwrap();
            state
                .roster
                .iter()
                .map(|t| (t.id.clone(), t.handle.clone()))
                .collect()
        };

        let mut participants = Vec::new();
        for player in &snapshot.players {
            let Some(handle) = roster_by_id.get(&player.identity_id) else {
                continue;
            };

            let win_probability = match self
                .stats
                .win_probability(&player.identity_id, match_type, player.character_id)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        tenant = %self.tenant_id,
                        identity = %handle,
                        error = %e,
                        "Stats lookup failed, assuming even odds"
                    );
                    0.5
                }
            };

            info!(
                tenant = %self.tenant_id,
                wager = %snapshot.key,
                identity = %handle,
                character = player.character_id,
                win_probability,
                "Tracked player in match"
            );
            participants.push(Participant {
                identity_id: player.identity_id.clone(),
                handle: handle.clone(),
                character_id: player.character_id,
                win_probability,
                side: player.side,
            });
        }
        participants
    }

    /// Arm the betting-lock timer; the callback re-fetches the wager
    /// from the map, so an evicted wager makes it a no-op.
    async fn arm_wager_lock(&self, wager: &Arc<Mutex<Wager>>) {
        let key = wager.lock().unwrap().key.clone();
        let weak = self.self_weak.clone();
        let on_locked: LockCallback = Arc::new(move || {
            let weak = weak.clone();
            let key = key.clone();
            Box::pin(async move {
                let Some(watcher) = weak.upgrade() else { return };
                let wager = {
                    let state = watcher.state.lock().unwrap();
                    state.wagers.get(&key).cloned()
                };
                let Some(wager) = wager else { return };
                if let Err(e) = watcher.dispatch(WagerEventKind::Locked, &wager, None).await {
                    warn!(
                        tenant = %watcher.tenant_id,
                        wager = %key,
                        error = %e,
                        "Failed to dispatch lock event"
                    );
                }
            })
        });

        arm_lock(wager, self.settings.lock_threshold_secs, on_locked).await;
    }

    // -- Resolution loop -------------------------------------------------

    /// Probe a batch of active wagers for finished matches. A key whose
    /// match is still running simply returns to the queue on the next
    /// refill.
    async fn resolve_batch(&self, batch: Vec<MatchKey>) {
        if !self.is_running() {
            return;
        }
        debug!(tenant = %self.tenant_id, wagers = batch.len(), "Checking wagers for finished matches");

        for key in batch {
            let outcome = match self.directory.find_finished_match(&key.region, &key).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        tenant = %self.tenant_id,
                        wager = %key,
                        error = %e,
                        "Finished-match probe failed"
                    );
                    continue;
                }
            };

            if let Err(e) = self.settle_wager(&key, outcome).await {
                warn!(
                    tenant = %self.tenant_id,
                    wager = %key,
                    error = %e,
                    "Failed to settle wager"
                );
            }
        }
    }

    /// Settle one wager: compute payouts, credit the ledger, clear the
    /// roster back-references, and evict — all in one critical section.
    async fn settle_wager(
        &self,
        key: &MatchKey,
        outcome: crate::types::Outcome,
    ) -> Result<(), WatchError> {
        let (wager, payouts) = {
            let mut state = self.state.lock().unwrap();
            let Some(wager) = state.wagers.get(key).cloned() else {
                // Already settled by an earlier pass.
                return Ok(());
            };

            info!(tenant = %self.tenant_id, wager = %key, outcome = %outcome, "Match ended");
            let payouts = wager.lock().unwrap().resolve(outcome);

            let start = self.settings.start_balance;
            for payout in &payouts {
                let balance = state
                    .ledger
                    .entry(payout.user_id.clone())
                    .or_insert(start);
                *balance += payout.amount as i64;
            }

            for entry in state.roster.iter_mut() {
                if entry.current_wager.as_ref() == Some(key) {
                    entry.current_wager = None;
                }
            }
            state.wagers.remove(key);
            (wager, payouts)
        };
        // Freed identities return to scanning on the next queue refill.
        self.resolution.remove_from_queue(|k| k == key);

        self.dispatch(WagerEventKind::Ended, &wager, Some(payouts)).await
    }

    // -- Recovery --------------------------------------------------------

    /// Re-resolve the persisted roster. An identity that fails its
    /// lookup is dropped, not fatal: the rest of the tenant survives.
    async fn restore_roster(&self, saved: &[SavedIdentity]) {
        for entry in saved {
            match self.directory.resolve_identity(&entry.handle, &entry.region).await {
                Ok(Some(identity)) => {
                    let mut state = self.state.lock().unwrap();
                    state.roster.push(TrackedIdentity::new(identity));
                }
                Ok(None) => {
                    warn!(
                        tenant = %self.tenant_id,
                        handle = %entry.handle,
                        region = %entry.region,
                        "Saved identity no longer resolves, dropping"
                    );
                }
                Err(e) => {
                    warn!(
                        tenant = %self.tenant_id,
                        handle = %entry.handle,
                        region = %entry.region,
                        error = %e,
                        "Identity restore failed, dropping"
                    );
                }
            }
        }
    }

    /// Rebuild one in-flight wager from its save. Elapsed time comes
    /// from the persisted start timestamp, so a match already past the
    /// betting threshold locks as soon as the timer is armed.
    async fn restore_wager(&self, saved: &SavedWager) -> Result<(), WatchError> {
        info!(
            tenant = %self.tenant_id,
            wager = %saved.match_info.key,
            "Restoring wager from save"
        );

        let snapshot = MatchSnapshot {
            key: saved.match_info.key.clone(),
            mode: saved.match_info.mode.clone(),
            started_at: saved.match_info.started_at,
            players: saved
                .participants
                .iter()
                .map(|p| crate::types::MatchPlayer {
                    identity_id: p.identity_id.clone(),
                    character_id: p.character_id,
                    side: p.side,
                })
                .collect(),
        };
        let participants = self.build_participants(&snapshot).await;

        let wager = {
            let mut state = self.state.lock().unwrap();
            let mut wager = Wager::new(
                snapshot.key.clone(),
                snapshot.mode.clone(),
                snapshot.started_at,
                participants,
            );
            wager.display_handle = Some(saved.message_ref.clone());
            for bet in &saved.bets {
                if let Err(e) = wager.place_bet(&bet.user_id, bet.amount, bet.side) {
                    warn!(
                        tenant = %self.tenant_id,
                        wager = %snapshot.key,
                        user = %bet.user_id,
                        error = %e,
                        "Dropped saved bet during restore"
                    );
                }
            }

            let wager = Arc::new(Mutex::new(wager));
            let tracked_ids: Vec<&str> = snapshot
                .players
                .iter()
                .map(|p| p.identity_id.as_str())
                .collect();
            for entry in state.roster.iter_mut() {
                if tracked_ids.contains(&entry.id.as_str()) {
                    entry.current_wager = Some(snapshot.key.clone());
                }
            }
            state.wagers.insert(snapshot.key.clone(), Arc::clone(&wager));
            self.resolution.add_to_queue([snapshot.key.clone()]);
            wager
        };

        self.dispatch(WagerEventKind::Restored, &wager, None).await?;
        self.arm_wager_lock(&wager).await;
        Ok(())
    }

    // -- Persistence & dispatch ------------------------------------------

    /// Persist the full tenant state. Wagers without a display handle
    /// are skipped: nothing observable references them yet.
    fn save_state(&self) -> Result<(), WatchError> {
        let save = {
            let state = self.state.lock().unwrap();
            let mut in_flight = Vec::new();
            for wager in state.wagers.values() {
                let w = wager.lock().unwrap();
                let Some(message_ref) = w.display_handle.clone() else {
                    continue;
                };
                in_flight.push(SavedWager {
                    message_ref,
                    match_info: SavedMatch {
                        key: w.key.clone(),
                        mode: w.mode.clone(),
                        started_at: w.started_at,
                    },
                    participants: w
                        .participants
                        .iter()
                        .map(|p| SavedParticipant {
                            identity_id: p.identity_id.clone(),
                            side: p.side,
                            character_id: p.character_id,
                        })
                        .collect(),
                    bets: w
                        .bets()
                        .iter()
                        .map(|(user_id, bet)| SavedBet {
                            user_id: user_id.clone(),
                            amount: bet.amount,
                            side: bet.side,
                        })
                        .collect(),
                });
            }

            TenantSave {
                tenant_id: self.tenant_id.clone(),
                channel_ref: state.channel_ref.clone().unwrap_or_default(),
                status: state.status,
                roster: state
                    .roster
                    .iter()
                    .map(|t| SavedIdentity {
                        handle: t.handle.clone(),
                        region: t.region.clone(),
                    })
                    .collect(),
                ledger: state
                    .ledger
                    .iter()
                    .map(|(user_id, amount)| SavedBalance {
                        user_id: user_id.clone(),
                        amount: *amount,
                    })
                    .collect(),
                in_flight,
            }
        };

        self.store.save(&save).map_err(WatchError::Storage)
    }

    /// Persist, then hand the event to the sink. A returned display
    /// handle is recorded on the wager and persisted immediately.
    async fn dispatch(
        &self,
        kind: WagerEventKind,
        wager: &Arc<Mutex<Wager>>,
        payouts: Option<Vec<Payout>>,
    ) -> Result<(), WatchError> {
        let (key, view) = {
            let w = wager.lock().unwrap();
            let mut view = WagerView::of(&w);
            if let Some(payouts) = payouts {
                view = view.with_payouts(payouts);
            }
            (w.key.clone(), view)
        };

        info!(tenant = %self.tenant_id, wager = %key, event = ?kind, "Dispatching wager event");
        self.save_state()?;

        let handle = self
            .sink
            .notify(&self.tenant_id, WagerEvent { kind, wager: view })
            .await
            .map_err(WatchError::Provider)?;

        if let Some(handle) = handle {
            wager.lock().unwrap().display_handle = Some(handle);
            self.save_state()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
