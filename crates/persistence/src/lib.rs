#![deny(warnings)]

//! Save/load pipeline: key-value storage abstraction, sanitizing writes with
//! an emergency fallback, versioned merge migration guarded by a marker and
//! backup, rotating timestamped snapshots, corruption recovery, and base64
//! export/import.
//!
//! The storage medium is a synchronous string key-value store with finite
//! capacity. Write failures are caught and degrade the save, never the
//! caller: `save_game` reports an outcome instead of erroring.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sim_core::{sanitize_state, GameState, CURRENT_VERSION};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Main save slot.
pub const SAVE_KEY: &str = "botnet_empire_v1";
/// Schema version marker, stored separately from the document.
pub const VERSION_KEY: &str = "botnet_empire_version";
/// Rotating snapshots live under `botnet_backup_<epoch-ms>`.
pub const BACKUP_PREFIX: &str = "botnet_backup_";
/// Present while a migration is in flight; a stale marker at startup means
/// the previous migration was interrupted.
pub const MIGRATION_FLAG_KEY: &str = "botnet_migration_in_progress";
/// One-shot copy of the pre-migration raw document.
pub const MIGRATION_BACKUP_KEY: &str = "botnet_migration_backup";
/// Offline-reconciliation bookkeeping (timestamp + idempotency flag).
pub const OFFLINE_KEY: &str = "offline_system";

/// Serialized documents above this size are never written.
pub const MAX_SAVE_BYTES: usize = 5_000_000;
/// Cadence of rotating snapshots.
pub const BACKUP_INTERVAL_MS: i64 = 300_000;
/// Snapshots retained; older ones are deleted by key order.
pub const MAX_BACKUPS: usize = 5;
/// Debounce window between tick-driven saves.
pub const SAVE_INTERVAL_MS: i64 = 5_000;

/// Errors surfaced by the storage medium and the import path.
#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    /// The store rejected a write for capacity reasons.
    #[error("storage capacity exceeded")]
    Full,
    /// Underlying medium failure (filesystem and friends).
    #[error("io error: {0}")]
    Io(String),
    /// An import blob failed decoding or validation.
    #[error("invalid import blob: {0}")]
    InvalidImport(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

/// Synchronous key-value storage with enumeration, the shape of a browser's
/// localStorage. Implementations must tolerate repeated removes and report
/// capacity exhaustion as [`StorageError::Full`].
pub trait KvStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str);
    fn keys(&self) -> Vec<String>;
}

/// In-memory store with an optional byte budget, used by tests and benches.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: BTreeMap<String, String>,
    capacity_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once keys plus values exceed `bytes`.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            map: BTreeMap::new(),
            capacity_bytes: Some(bytes),
        }
    }

    fn used_bytes(&self) -> usize {
        self.map.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(cap) = self.capacity_bytes {
            let existing = self.map.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            if self.used_bytes() - existing + key.len() + value.len() > cap {
                return Err(StorageError::Full);
            }
        }
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }
}

/// Directory-backed store: one file per key. The production medium for the
/// headless CLI.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

impl KvStore for DirStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.root.join(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::write(self.root.join(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        let _ = fs::remove_file(self.root.join(key));
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        keys.sort();
        keys
    }
}

/// Offline-reconciliation bookkeeping persisted under [`OFFLINE_KEY`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineRecord {
    pub last_online_time: i64,
    /// Set once a gap has been awarded so a reload cannot re-award it.
    pub offline_processed: bool,
}

/// What a save attempt accomplished. Saving never errors to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Full document written.
    Written,
    /// Storage rejected the full document; the minimal emergency payload
    /// (money/prestige/lifetime earnings) was written instead.
    Emergency,
    /// Nothing could be written; the previous save is left untouched.
    Dropped,
    /// Coalesced behind an in-flight save.
    Deferred,
}

/// Minimal payload written when the full document cannot be stored.
#[derive(Serialize)]
struct EmergencySave<'a> {
    version: &'a str,
    money: f64,
    prestige: u32,
    total_earned: f64,
    total_bots_sold: f64,
}

/// Owns the storage medium and the save/load/migration/backup pipeline.
pub struct SaveManager<S: KvStore> {
    store: S,
    save_in_flight: bool,
    save_pending: bool,
    last_backup_time: i64,
}

impl<S: KvStore> SaveManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            save_in_flight: false,
            save_pending: false,
            last_backup_time: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Persists the full state. Requests arriving while a save is in flight
    /// are coalesced into at most one trailing save; intermediate requests
    /// are dropped, bounding write amplification under bursts.
    pub fn save_game(&mut self, state: &mut GameState, now: i64) -> SaveOutcome {
        if self.save_in_flight {
            self.save_pending = true;
            return SaveOutcome::Deferred;
        }
        self.save_in_flight = true;
        let mut outcome = self.write_save(state, now);
        if std::mem::take(&mut self.save_pending) {
            outcome = self.write_save(state, now);
        }
        self.save_in_flight = false;
        outcome
    }

    fn write_save(&mut self, state: &mut GameState, now: i64) -> SaveOutcome {
        sanitize_state(state);
        state.last_tick = now;
        let mut json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "state serialization failed");
                return self.write_emergency(state);
            }
        };
        if json.len() > MAX_SAVE_BYTES {
            warn!(bytes = json.len(), "save exceeds size ceiling, trimming money graph");
            let keep = sim_core::GRAPH_MAX_POINTS / 8;
            if state.money_graph.len() > keep {
                let excess = state.money_graph.len() - keep;
                state.money_graph.drain(..excess);
            }
            json = match serde_json::to_string(state) {
                Ok(json) if json.len() <= MAX_SAVE_BYTES => json,
                _ => return self.write_emergency(state),
            };
        }
        if self.store.set(SAVE_KEY, &json).is_err() {
            warn!("storage rejected save, evicting stale backups and retrying");
            self.evict_backups();
            if self.store.set(SAVE_KEY, &json).is_err() {
                return self.write_emergency(state);
            }
        }
        if let Err(e) = self.store.set(VERSION_KEY, CURRENT_VERSION) {
            warn!(error = %e, "could not write version marker");
        }
        SaveOutcome::Written
    }

    fn write_emergency(&mut self, state: &GameState) -> SaveOutcome {
        let payload = EmergencySave {
            version: CURRENT_VERSION,
            money: state.money,
            prestige: state.prestige,
            total_earned: state.total_earned,
            total_bots_sold: state.total_bots_sold,
        };
        let Ok(json) = serde_json::to_string(&payload) else {
            return SaveOutcome::Dropped;
        };
        match self.store.set(SAVE_KEY, &json) {
            Ok(()) => {
                warn!("wrote emergency save with critical fields only");
                SaveOutcome::Emergency
            }
            Err(e) => {
                warn!(error = %e, "emergency save failed, dropping");
                SaveOutcome::Dropped
            }
        }
    }

    /// Snapshots the full document under a timestamped key on a multi-minute
    /// interval, retaining only the newest [`MAX_BACKUPS`].
    pub fn maybe_backup(&mut self, state: &GameState, now: i64) -> bool {
        if now - self.last_backup_time <= BACKUP_INTERVAL_MS {
            return false;
        }
        let Ok(json) = serde_json::to_string(state) else {
            return false;
        };
        if json.len() > MAX_SAVE_BYTES {
            warn!("backup too large, skipping");
            return false;
        }
        let key = format!("{BACKUP_PREFIX}{now}");
        if let Err(e) = self.store.set(&key, &json) {
            warn!(error = %e, "failed to write backup");
            return false;
        }
        self.last_backup_time = now;
        let keys = self.backup_keys();
        for stale in keys.iter().take(keys.len().saturating_sub(MAX_BACKUPS)) {
            self.store.remove(stale);
        }
        true
    }

    fn backup_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(BACKUP_PREFIX))
            .collect();
        keys.sort();
        keys
    }

    fn evict_backups(&mut self) {
        for key in self.backup_keys() {
            self.store.remove(&key);
        }
    }

    /// Loads the persisted state, running the recovery and migration
    /// cascade: interrupted-migration restore, parse, version merge
    /// migration, backup restore, full defaults. Never fails.
    pub fn load_game(&mut self, now: i64) -> GameState {
        if self.store.get(MIGRATION_FLAG_KEY).is_some() {
            warn!("interrupted migration detected, restoring pre-migration backup");
            if let Some(backup) = self.store.get(MIGRATION_BACKUP_KEY) {
                if let Err(e) = self.store.set(SAVE_KEY, &backup) {
                    warn!(error = %e, "could not restore migration backup");
                }
            }
            self.store.remove(MIGRATION_FLAG_KEY);
        }
        let Some(raw) = self.store.get(SAVE_KEY) else {
            info!("no save found, starting fresh");
            let state = GameState::new(now);
            if let Err(e) = self.store.set(VERSION_KEY, CURRENT_VERSION) {
                warn!(error = %e, "could not write version marker");
            }
            return state;
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "save parse failed, attempting recovery");
                return self.recover_corrupt(now);
            }
        };
        let stored_version = value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if stored_version != CURRENT_VERSION {
            info!(from = %stored_version, to = CURRENT_VERSION, "migrating save document");
            return self.migrate(&raw, &value, now);
        }
        match serde_json::from_value::<GameState>(value.clone()) {
            Ok(mut state) => {
                sanitize_state(&mut state);
                state
            }
            Err(e) => {
                warn!(error = %e, "typed parse failed, merging over defaults");
                let mut state = merge_document(&value, now);
                sanitize_state(&mut state);
                state
            }
        }
    }

    /// Merge migration: defaults of the current schema, overlaid field by
    /// field from the stored document. The raw pre-migration data is kept
    /// under a backup key with an in-progress marker until the migrated
    /// document is safely written.
    fn migrate(&mut self, raw: &str, value: &Value, now: i64) -> GameState {
        if let Err(e) = self.store.set(MIGRATION_BACKUP_KEY, raw) {
            warn!(error = %e, "could not write migration backup");
        }
        if let Err(e) = self.store.set(MIGRATION_FLAG_KEY, "1") {
            warn!(error = %e, "could not set migration marker");
        }
        let mut state = merge_document(value, now);
        state.version = CURRENT_VERSION.to_string();
        sanitize_state(&mut state);
        if let Ok(json) = serde_json::to_string(&state) {
            if let Err(e) = self.store.set(SAVE_KEY, &json) {
                warn!(error = %e, "could not persist migrated save");
            }
        }
        if let Err(e) = self.store.set(VERSION_KEY, CURRENT_VERSION) {
            warn!(error = %e, "could not write version marker");
        }
        self.store.remove(MIGRATION_FLAG_KEY);
        self.store.remove(MIGRATION_BACKUP_KEY);
        state
    }

    fn recover_corrupt(&mut self, now: i64) -> GameState {
        let mut candidates = vec![MIGRATION_BACKUP_KEY.to_string()];
        let mut backups = self.backup_keys();
        backups.reverse();
        candidates.extend(backups);
        for key in candidates {
            let Some(raw) = self.store.get(&key) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            info!(key = %key, "restored state from backup");
            let mut state = merge_document(&value, now);
            state.version = CURRENT_VERSION.to_string();
            sanitize_state(&mut state);
            if let Ok(json) = serde_json::to_string(&state) {
                if let Err(e) = self.store.set(SAVE_KEY, &json) {
                    warn!(error = %e, "could not rewrite restored save");
                }
            }
            return state;
        }
        warn!("all recovery sources failed, resetting to defaults");
        self.reset(now)
    }

    /// Full reset: deletes every game-owned key including backups and the
    /// offline record, then reinstalls defaults.
    pub fn reset(&mut self, now: i64) -> GameState {
        let owned = [
            SAVE_KEY,
            VERSION_KEY,
            MIGRATION_FLAG_KEY,
            MIGRATION_BACKUP_KEY,
            OFFLINE_KEY,
        ];
        for key in self.store.keys() {
            if owned.contains(&key.as_str()) || key.starts_with(BACKUP_PREFIX) {
                self.store.remove(&key);
            }
        }
        self.last_backup_time = 0;
        let mut state = GameState::new(now);
        if let Err(e) = self.store.set(VERSION_KEY, CURRENT_VERSION) {
            warn!(error = %e, "could not write version marker");
        }
        let _ = self.write_save(&mut state, now);
        state
    }

    /// Base64 blob of the raw save document, for manual backup/transfer.
    pub fn export_save(&self) -> Option<String> {
        self.store.get(SAVE_KEY).map(|raw| BASE64.encode(raw))
    }

    /// Validates and installs an exported blob wholesale. The caller must
    /// reload ([`SaveManager::load_game`]) afterward.
    pub fn import_save(&mut self, blob: &str) -> Result<(), StorageError> {
        let bytes = BASE64
            .decode(blob.trim())
            .map_err(|e| StorageError::InvalidImport(e.to_string()))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| StorageError::InvalidImport(e.to_string()))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| StorageError::InvalidImport(e.to_string()))?;
        for field in ["bots", "money", "skills", "upgrades", "tools"] {
            if value.get(field).is_none() {
                return Err(StorageError::InvalidImport(format!(
                    "missing required field: {field}"
                )));
            }
        }
        let bots = value
            .get("bots")
            .and_then(Value::as_object)
            .ok_or_else(|| StorageError::InvalidImport("bots is not an object".into()))?;
        let mobile_unlocked = value
            .pointer("/unlocks/mobile")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut tiers = vec!["t1", "t2", "t3"];
        if mobile_unlocked {
            tiers.push("mobile");
        }
        for tier in tiers {
            let count = bots.get(tier).and_then(Value::as_f64);
            match count {
                Some(n) if n >= 0.0 && n.is_finite() => {}
                _ => {
                    return Err(StorageError::InvalidImport(format!(
                        "invalid bot count for {tier}"
                    )))
                }
            }
        }
        match value.get("money").and_then(Value::as_f64) {
            Some(n) if n >= 0.0 && n.is_finite() => {}
            _ => return Err(StorageError::InvalidImport("invalid money value".into())),
        }
        self.store.set(SAVE_KEY, &raw)?;
        Ok(())
    }

    /// Offline bookkeeping, sanitized against clock skew.
    pub fn load_offline_record(&self, now: i64) -> OfflineRecord {
        let fallback = OfflineRecord {
            last_online_time: now,
            offline_processed: false,
        };
        let Some(raw) = self.store.get(OFFLINE_KEY) else {
            return fallback;
        };
        match serde_json::from_str::<OfflineRecord>(&raw) {
            Ok(mut record) => {
                record.last_online_time = record.last_online_time.clamp(0, now + 86_400_000);
                record
            }
            Err(e) => {
                warn!(error = %e, "offline record unreadable, using current time");
                fallback
            }
        }
    }

    pub fn store_offline_record(&mut self, record: &OfflineRecord) {
        let Ok(json) = serde_json::to_string(record) else {
            return;
        };
        if let Err(e) = self.store.set(OFFLINE_KEY, &json) {
            warn!(error = %e, "could not persist offline record");
        }
    }
}

/// Builds a current-schema state from defaults, overlaying each top-level
/// field of `value` when present and type-compatible. Object fields merge
/// key-by-key through their serde defaults; scalar and array fields
/// overwrite. Total: malformed fields keep their defaults.
pub fn merge_document(value: &Value, now: i64) -> GameState {
    let mut state = GameState::new(now);
    merge_field(&mut state.bots, value, "bots");
    merge_field(&mut state.money, value, "money");
    merge_field(&mut state.prestige, value, "prestige");
    merge_field(&mut state.skills, value, "skills");
    merge_field(&mut state.tools, value, "tools");
    merge_field(&mut state.upgrades, value, "upgrades");
    merge_field(&mut state.prices, value, "prices");
    merge_field(&mut state.price_time, value, "price_time");
    merge_field(&mut state.price_direction, value, "price_direction");
    merge_field(&mut state.click_cooldowns, value, "click_cooldowns");
    merge_field(&mut state.achievements, value, "achievements");
    merge_field(&mut state.unlocks, value, "unlocks");
    merge_field(&mut state.total_earned, value, "total_earned");
    merge_field(&mut state.total_clicks, value, "total_clicks");
    merge_field(&mut state.total_bots_sold, value, "total_bots_sold");
    merge_field(&mut state.active_event, value, "active_event");
    merge_field(&mut state.event_effect, value, "event_effect");
    merge_field(&mut state.event_duration_ms, value, "event_duration_ms");
    merge_field(&mut state.event_end_time, value, "event_end_time");
    merge_field(&mut state.event_acknowledged, value, "event_acknowledged");
    merge_field(&mut state.next_event_time, value, "next_event_time");
    merge_field(&mut state.money_graph, value, "money_graph");
    merge_field(&mut state.last_tick, value, "last_tick");
    merge_field(&mut state.last_graph_sample, value, "last_graph_sample");
    merge_field(&mut state.last_save_time, value, "last_save_time");
    merge_field(&mut state.mining, value, "mining");
    state
}

fn merge_field<T: serde::de::DeserializeOwned>(slot: &mut T, doc: &Value, key: &str) {
    let Some(v) = doc.get(key) else {
        return;
    };
    match serde_json::from_value::<T>(v.clone()) {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(field = key, "skipping type-incompatible field during merge"),
    }
}
