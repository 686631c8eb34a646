#![deny(warnings)]

//! Core domain model and invariants for Botnet Tycoon.
//!
//! This crate defines the serializable [`GameState`] aggregate shared by the
//! economy, runtime, and persistence crates, the numeric sanitizer every
//! component routes writes through, and validation helpers that guarantee
//! basic invariants after any mutation.

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Largest magnitude any counter may reach: the f64 exact-integer ceiling.
/// Past it, additions silently lose precision.
pub const MAX_SAFE_NUMBER: f64 = 9_007_199_254_740_991.0;

/// Upper bound for skill levels and the prestige level.
pub const LEVEL_CAP: u32 = 10_000;

/// Per-unit sale prices stay inside this range after every roll.
pub const PRICE_MIN: f64 = 0.01;
/// See [`PRICE_MIN`].
pub const PRICE_MAX: f64 = 100.0;

/// Achievement rate multipliers are clamped to `[1, RATE_BONUS_MAX]`.
pub const RATE_BONUS_MAX: f64 = 1_000.0;

/// Cadence of `total_earned` samples appended to the money graph.
pub const GRAPH_SAMPLE_INTERVAL_MS: i64 = 10_000;
/// Retention limit of the money graph; older samples are evicted.
pub const GRAPH_MAX_POINTS: usize = 6_048;

/// Clickable tools recharge after this many clicks.
pub const TOOL_CLICKS_PER_COOLDOWN: u32 = 50;

/// Bounds applied to event durations loaded from saves or the catalog.
pub const MIN_EVENT_DURATION_MS: i64 = 60_000;
/// See [`MIN_EVENT_DURATION_MS`].
pub const MAX_EVENT_DURATION_MS: i64 = 300_000;

/// Schema version written into every save document.
pub const CURRENT_VERSION: &str = "1.2.3";

/// Returns `value` clamped to `[min, max]` when it is a finite number,
/// otherwise `default`. The single gate through which every numeric write
/// into [`GameState`] passes.
pub fn sanitize_number(value: f64, default: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return default;
    }
    value.max(min).min(max)
}

/// Quality grade of a bot. New generation always lands in the base tier
/// ([`Tier::T3`]); [`Tier::Mobile`] stays inactive until unlocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    T1,
    T2,
    T3,
    Mobile,
}

impl Tier {
    /// All tiers in display order.
    pub const ALL: [Tier; 4] = [Tier::T1, Tier::T2, Tier::T3, Tier::Mobile];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::T1 => "t1",
            Tier::T2 => "t2",
            Tier::T3 => "t3",
            Tier::Mobile => "mobile",
        }
    }
}

/// Inventory counters per tier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotCounts {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub mobile: f64,
}

impl BotCounts {
    pub fn amount(&self, tier: Tier) -> f64 {
        match tier {
            Tier::T1 => self.t1,
            Tier::T2 => self.t2,
            Tier::T3 => self.t3,
            Tier::Mobile => self.mobile,
        }
    }

    pub fn amount_mut(&mut self, tier: Tier) -> &mut f64 {
        match tier {
            Tier::T1 => &mut self.t1,
            Tier::T2 => &mut self.t2,
            Tier::T3 => &mut self.t3,
            Tier::Mobile => &mut self.mobile,
        }
    }
}

/// Player skill tracks, each with an exponential next-level cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    /// Shifts manual-spread rolls toward higher tiers.
    TierDistribution,
    /// Raises sale revenue.
    MarketEfficiency,
    /// Raises passive bot generation.
    GenerationRate,
    /// Smaller passive generation boost stacking with [`Skill::GenerationRate`].
    AutomationEfficiency,
}

impl Skill {
    pub const ALL: [Skill; 4] = [
        Skill::TierDistribution,
        Skill::MarketEfficiency,
        Skill::GenerationRate,
        Skill::AutomationEfficiency,
    ];

    /// Cost of the first level; each further level multiplies by 1.6.
    pub fn base_cost(self) -> f64 {
        match self {
            Skill::TierDistribution => 5e5,
            Skill::MarketEfficiency => 1e6,
            Skill::GenerationRate => 2e6,
            Skill::AutomationEfficiency => 5e6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Skill::TierDistribution => "tier_distribution",
            Skill::MarketEfficiency => "market_efficiency",
            Skill::GenerationRate => "generation_rate",
            Skill::AutomationEfficiency => "automation_efficiency",
        }
    }
}

/// Current level of each skill track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillLevels {
    pub tier_distribution: u32,
    pub market_efficiency: u32,
    pub generation_rate: u32,
    pub automation_efficiency: u32,
}

impl SkillLevels {
    pub fn level(&self, skill: Skill) -> u32 {
        match skill {
            Skill::TierDistribution => self.tier_distribution,
            Skill::MarketEfficiency => self.market_efficiency,
            Skill::GenerationRate => self.generation_rate,
            Skill::AutomationEfficiency => self.automation_efficiency,
        }
    }

    pub fn level_mut(&mut self, skill: Skill) -> &mut u32 {
        match skill {
            Skill::TierDistribution => &mut self.tier_distribution,
            Skill::MarketEfficiency => &mut self.market_efficiency,
            Skill::GenerationRate => &mut self.generation_rate,
            Skill::AutomationEfficiency => &mut self.automation_efficiency,
        }
    }
}

/// Per-unit sale price of each tier, re-rolled on a fixed period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
    pub mobile: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            t1: 1.0,
            t2: 0.5,
            t3: 0.15,
            mobile: 1.5,
        }
    }
}

impl PriceTable {
    pub fn price(&self, tier: Tier) -> f64 {
        match tier {
            Tier::T1 => self.t1,
            Tier::T2 => self.t2,
            Tier::T3 => self.t3,
            Tier::Mobile => self.mobile,
        }
    }

    pub fn price_mut(&mut self, tier: Tier) -> &mut f64 {
        match tier {
            Tier::T1 => &mut self.t1,
            Tier::T2 => &mut self.t2,
            Tier::T3 => &mut self.t3,
            Tier::Mobile => &mut self.mobile,
        }
    }

    /// Fail-safe price substituted when a roll produces garbage.
    pub fn fallback(tier: Tier) -> f64 {
        match tier {
            Tier::T1 => 1.0,
            Tier::T2 => 0.5,
            Tier::T3 => 0.15,
            Tier::Mobile => 1.5,
        }
    }
}

/// Ownership record of a purchased tool. `clicks` counts manual activations
/// toward the next cooldown (0..=[`TOOL_CLICKS_PER_COOLDOWN`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOwnership {
    pub active: bool,
    pub clicks: u32,
}

/// Feature flags toggled by catalog purchases.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Unlocks {
    pub mobile: bool,
}

/// Disruptive event kinds and their economy multipliers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Raid,
    Outage,
    Boom,
    Crypto,
}

impl EventKind {
    /// Multiplier applied to bot generation while the event is active.
    pub fn bot_multiplier(self) -> f64 {
        match self {
            EventKind::Raid => 0.7,
            EventKind::Boom => 2.0,
            EventKind::Crypto => 0.5,
            EventKind::Outage => 1.0,
        }
    }

    /// Multiplier applied to money income while the event is active.
    pub fn money_multiplier(self) -> f64 {
        match self {
            EventKind::Outage => 0.5,
            _ => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Raid => "raid",
            EventKind::Outage => "outage",
            EventKind::Boom => "boom",
            EventKind::Crypto => "crypto",
        }
    }
}

/// Operating mode of the optional mining collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningMode {
    #[default]
    Low,
    High,
}

impl MiningMode {
    /// Bot-generation multiplier while mining competes for fleet capacity.
    pub fn bot_penalty(self) -> f64 {
        match self {
            MiningMode::Low => 0.7,
            MiningMode::High => 0.5,
        }
    }

    /// Baseline income per bot per second.
    pub fn base_rate(self) -> f64 {
        match self {
            MiningMode::Low => 0.0001,
            MiningMode::High => 0.0005,
        }
    }

    /// Fractional swing applied when the live rate is re-rolled.
    pub fn volatility(self) -> f64 {
        match self {
            MiningMode::Low => 0.2,
            MiningMode::High => 0.5,
        }
    }
}

/// Persisted state of the mining collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningState {
    pub active: bool,
    pub mode: MiningMode,
    pub total_mined: f64,
    pub last_update: i64,
}

/// Runtime configuration consumed by the session controller.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    /// Minimum real interval between effective ticks, in milliseconds.
    pub tick_debounce_ms: i64,
    /// Longest single tick advance, in seconds.
    pub max_delta_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            tick_debounce_ms: 50,
            max_delta_secs: 5.0,
        }
    }
}

/// The single root aggregate: every counter, ownership record, and timestamp
/// the simulation persists. Owned by the session controller and mutated in
/// place by the tick and by action handlers.
///
/// All timestamps are epoch milliseconds; all cooldowns are seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    pub version: String,
    pub bots: BotCounts,
    pub money: f64,
    pub prestige: u32,
    pub skills: SkillLevels,
    /// Catalog id -> ownership. Append-only outside of resets.
    pub tools: BTreeMap<String, ToolOwnership>,
    /// Catalog id -> owned flag. Append-only outside of resets.
    pub upgrades: BTreeMap<String, bool>,
    pub prices: PriceTable,
    pub price_time: i64,
    /// -1/0/+1 trend of the base tier versus the previous roll; only
    /// populated while the price-trend upgrade is owned.
    pub price_direction: i8,
    /// Tool id -> remaining cooldown seconds, decayed every tick.
    pub click_cooldowns: BTreeMap<String, f64>,
    /// Achievement id -> earned. Monotonic; survives prestige.
    pub achievements: BTreeMap<String, bool>,
    pub unlocks: Unlocks,
    pub total_earned: f64,
    pub total_clicks: u64,
    pub total_bots_sold: f64,
    pub active_event: Option<EventKind>,
    pub event_effect: Option<String>,
    pub event_duration_ms: i64,
    pub event_end_time: i64,
    pub event_acknowledged: bool,
    pub next_event_time: i64,
    /// Bounded history of `total_earned`, one sample per interval.
    pub money_graph: Vec<f64>,
    pub last_tick: i64,
    pub last_graph_sample: i64,
    pub last_save_time: i64,
    pub mining: MiningState,
}

impl Default for GameState {
    fn default() -> Self {
        GameState::new(0)
    }
}

impl GameState {
    /// Fresh-install defaults anchored at `now` (epoch milliseconds).
    pub fn new(now: i64) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            bots: BotCounts::default(),
            money: 0.0,
            prestige: 0,
            skills: SkillLevels::default(),
            tools: BTreeMap::new(),
            upgrades: BTreeMap::new(),
            prices: PriceTable::default(),
            price_time: now,
            price_direction: 0,
            click_cooldowns: BTreeMap::new(),
            achievements: BTreeMap::new(),
            unlocks: Unlocks::default(),
            total_earned: 0.0,
            total_clicks: 0,
            total_bots_sold: 0.0,
            active_event: None,
            event_effect: None,
            event_duration_ms: 0,
            event_end_time: 0,
            event_acknowledged: false,
            next_event_time: now + 300_000,
            money_graph: Vec::new(),
            last_tick: now,
            last_graph_sample: now,
            last_save_time: 0,
            mining: MiningState::default(),
        }
    }

    /// Total inventory across all tiers, sanitized non-negative.
    pub fn total_bots(&self) -> f64 {
        let sum = self.bots.t1 + self.bots.t2 + self.bots.t3 + self.bots.mobile;
        sanitize_number(sum, 0.0, 0.0, MAX_SAFE_NUMBER)
    }

    pub fn owns_upgrade(&self, id: &str) -> bool {
        self.upgrades.get(id).copied().unwrap_or(false)
    }
}

/// Validation errors for state invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A numeric field is NaN or infinite.
    #[error("non-finite numeric value in field {0}")]
    NonFinite(&'static str),
    /// A counter that must stay >= 0 went negative.
    #[error("negative value in field {0}")]
    Negative(&'static str),
    /// Skill level or prestige above [`LEVEL_CAP`].
    #[error("level above cap in field {0}")]
    LevelAboveCap(&'static str),
    /// A price escaped `[PRICE_MIN, PRICE_MAX]`.
    #[error("price out of range for tier {0}")]
    PriceOutOfRange(&'static str),
    /// Ownership record referencing an id missing from the catalog.
    #[error("unknown catalog id: {0}")]
    UnknownCatalogId(String),
    /// Money graph longer than [`GRAPH_MAX_POINTS`].
    #[error("money graph exceeds maximum point count")]
    GraphOverflow,
    /// `event_acknowledged` set while no event is active.
    #[error("acknowledged event without an active event")]
    AcknowledgedWithoutEvent,
}

/// Checks every documented invariant. Read-only; returns the first violation.
pub fn validate_state(state: &GameState) -> Result<(), ValidationError> {
    let counters: [(&'static str, f64); 7] = [
        ("bots.t1", state.bots.t1),
        ("bots.t2", state.bots.t2),
        ("bots.t3", state.bots.t3),
        ("bots.mobile", state.bots.mobile),
        ("money", state.money),
        ("total_earned", state.total_earned),
        ("total_bots_sold", state.total_bots_sold),
    ];
    for (name, value) in counters {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite(name));
        }
        if value < 0.0 {
            return Err(ValidationError::Negative(name));
        }
    }
    if state.prestige > LEVEL_CAP {
        return Err(ValidationError::LevelAboveCap("prestige"));
    }
    for skill in Skill::ALL {
        if state.skills.level(skill) > LEVEL_CAP {
            return Err(ValidationError::LevelAboveCap(skill.as_str()));
        }
    }
    for tier in Tier::ALL {
        let p = state.prices.price(tier);
        if !p.is_finite() || !(PRICE_MIN..=PRICE_MAX).contains(&p) {
            return Err(ValidationError::PriceOutOfRange(tier.as_str()));
        }
    }
    for id in state.tools.keys() {
        if catalog::tool(id).is_none() {
            return Err(ValidationError::UnknownCatalogId(id.clone()));
        }
    }
    for id in state.upgrades.keys() {
        if catalog::upgrade(id).is_none() {
            return Err(ValidationError::UnknownCatalogId(id.clone()));
        }
    }
    for (id, cd) in &state.click_cooldowns {
        if catalog::tool(id).is_none() {
            return Err(ValidationError::UnknownCatalogId(id.clone()));
        }
        if !cd.is_finite() {
            return Err(ValidationError::NonFinite("click_cooldowns"));
        }
        if *cd < 0.0 {
            return Err(ValidationError::Negative("click_cooldowns"));
        }
    }
    if state.money_graph.len() > GRAPH_MAX_POINTS {
        return Err(ValidationError::GraphOverflow);
    }
    if state.event_acknowledged && state.active_event.is_none() {
        return Err(ValidationError::AcknowledgedWithoutEvent);
    }
    Ok(())
}

/// Repairs a state in place so [`validate_state`] passes: clamps every
/// numeric field, drops ownership records with unknown ids, trims the money
/// graph, and clears contradictory event flags. Used before every save and
/// after every load.
pub fn sanitize_state(state: &mut GameState) {
    if state.version.trim().is_empty() {
        state.version = CURRENT_VERSION.to_string();
    }
    for tier in Tier::ALL {
        let b = state.bots.amount_mut(tier);
        *b = sanitize_number(*b, 0.0, 0.0, MAX_SAFE_NUMBER);
    }
    state.money = sanitize_number(state.money, 0.0, 0.0, MAX_SAFE_NUMBER);
    state.total_earned = sanitize_number(state.total_earned, 0.0, 0.0, MAX_SAFE_NUMBER);
    state.total_bots_sold = sanitize_number(state.total_bots_sold, 0.0, 0.0, MAX_SAFE_NUMBER);
    state.prestige = state.prestige.min(LEVEL_CAP);
    for skill in Skill::ALL {
        let lvl = state.skills.level_mut(skill);
        *lvl = (*lvl).min(LEVEL_CAP);
    }
    for tier in Tier::ALL {
        let p = state.prices.price_mut(tier);
        *p = sanitize_number(*p, PriceTable::fallback(tier), PRICE_MIN, PRICE_MAX);
    }
    state.price_direction = state.price_direction.clamp(-1, 1);
    state.tools.retain(|id, _| catalog::tool(id).is_some());
    for own in state.tools.values_mut() {
        own.clicks = own.clicks.min(TOOL_CLICKS_PER_COOLDOWN);
    }
    state.upgrades.retain(|id, _| catalog::upgrade(id).is_some());
    state
        .achievements
        .retain(|id, _| catalog::achievement(id).is_some());
    state.click_cooldowns.retain(|id, _| {
        catalog::tool(id).map(|t| t.clickable).unwrap_or(false)
    });
    for cd in state.click_cooldowns.values_mut() {
        *cd = sanitize_number(*cd, 0.0, 0.0, 86_400.0);
    }
    for sample in state.money_graph.iter_mut() {
        *sample = sanitize_number(*sample, 0.0, 0.0, MAX_SAFE_NUMBER);
    }
    if state.money_graph.len() > GRAPH_MAX_POINTS {
        let excess = state.money_graph.len() - GRAPH_MAX_POINTS;
        state.money_graph.drain(..excess);
    }
    if state.active_event.is_none() {
        state.event_acknowledged = false;
        state.event_effect = None;
        state.event_duration_ms = 0;
        state.event_end_time = 0;
    } else {
        state.event_duration_ms = state
            .event_duration_ms
            .clamp(MIN_EVENT_DURATION_MS, MAX_EVENT_DURATION_MS);
        state.event_end_time = state.event_end_time.max(0);
    }
    state.next_event_time = state.next_event_time.max(0);
    state.price_time = state.price_time.max(0);
    state.last_tick = state.last_tick.max(0);
    state.last_graph_sample = state.last_graph_sample.max(0);
    state.last_save_time = state.last_save_time.max(0);
    state.mining.total_mined = sanitize_number(state.mining.total_mined, 0.0, 0.0, MAX_SAFE_NUMBER);
    state.mining.last_update = state.mining.last_update.max(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sanitize_rejects_non_finite() {
        assert_eq!(sanitize_number(f64::NAN, 7.0, 0.0, 10.0), 7.0);
        assert_eq!(sanitize_number(f64::INFINITY, 7.0, 0.0, 10.0), 7.0);
        assert_eq!(sanitize_number(f64::NEG_INFINITY, 7.0, 0.0, 10.0), 7.0);
    }

    #[test]
    fn sanitize_clamps() {
        assert_eq!(sanitize_number(-5.0, 0.0, 0.0, 10.0), 0.0);
        assert_eq!(sanitize_number(15.0, 0.0, 0.0, 10.0), 10.0);
        assert_eq!(sanitize_number(5.0, 0.0, 0.0, 10.0), 5.0);
    }

    #[test]
    fn fresh_state_is_valid() {
        let state = GameState::new(1_700_000_000_000);
        validate_state(&state).unwrap();
        assert_eq!(state.version, CURRENT_VERSION);
        assert_eq!(state.total_bots(), 0.0);
        assert!(!state.unlocks.mobile);
    }

    #[test]
    fn state_serde_roundtrip() {
        let mut state = GameState::new(1_000);
        state.bots.t3 = 42.5;
        state.money = 123.0;
        state
            .tools
            .insert("starter".into(), ToolOwnership { active: true, clicks: 3 });
        state.upgrades.insert("buildPC".into(), true);
        state.active_event = Some(EventKind::Raid);
        state.event_acknowledged = true;
        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn partial_document_fills_defaults() {
        // Older saves omit fields added later; serde defaults must fill them.
        let back: GameState =
            serde_json::from_str(r#"{"money": 50.0, "prestige": 2}"#).unwrap();
        assert_eq!(back.money, 50.0);
        assert_eq!(back.prestige, 2);
        assert!(!back.unlocks.mobile);
        assert!(back.money_graph.is_empty());
    }

    #[test]
    fn validate_catches_negative_money() {
        let mut state = GameState::new(0);
        state.money = -1.0;
        assert_eq!(
            validate_state(&state),
            Err(ValidationError::Negative("money"))
        );
    }

    #[test]
    fn validate_catches_unknown_tool() {
        let mut state = GameState::new(0);
        state.tools.insert("bogus".into(), ToolOwnership::default());
        assert!(matches!(
            validate_state(&state),
            Err(ValidationError::UnknownCatalogId(_))
        ));
    }

    #[test]
    fn validate_catches_orphan_acknowledgement() {
        let mut state = GameState::new(0);
        state.event_acknowledged = true;
        assert_eq!(
            validate_state(&state),
            Err(ValidationError::AcknowledgedWithoutEvent)
        );
    }

    #[test]
    fn sanitize_state_repairs_corruption() {
        let mut state = GameState::new(0);
        state.money = f64::NAN;
        state.bots.t1 = -44.0;
        state.prices.t3 = 9_999.0;
        state.prestige = LEVEL_CAP + 5;
        state.tools.insert("bogus".into(), ToolOwnership::default());
        state.event_acknowledged = true;
        state.money_graph = vec![1.0; GRAPH_MAX_POINTS + 10];
        sanitize_state(&mut state);
        validate_state(&state).unwrap();
        assert_eq!(state.money, 0.0);
        assert_eq!(state.bots.t1, 0.0);
        assert_eq!(state.prices.t3, PRICE_MAX);
        assert_eq!(state.prestige, LEVEL_CAP);
        assert!(state.tools.is_empty());
        assert!(!state.event_acknowledged);
        assert_eq!(state.money_graph.len(), GRAPH_MAX_POINTS);
    }

    #[test]
    fn graph_trim_keeps_newest_samples() {
        let mut state = GameState::new(0);
        state.money_graph = (0..GRAPH_MAX_POINTS as u32 + 100).map(f64::from).collect();
        sanitize_state(&mut state);
        assert_eq!(state.money_graph.len(), GRAPH_MAX_POINTS);
        assert_eq!(state.money_graph[0], 100.0);
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(x in proptest::num::f64::ANY,
                                  min in -1e9f64..0.0,
                                  max in 0.0f64..1e9) {
            let once = sanitize_number(x, 0.0, min, max);
            let twice = sanitize_number(once, 0.0, min, max);
            prop_assert_eq!(once.to_bits(), twice.to_bits());
        }

        #[test]
        fn sanitize_output_in_bounds(x in proptest::num::f64::ANY) {
            let out = sanitize_number(x, 1.0, 0.0, 10.0);
            prop_assert!(out.is_finite());
            prop_assert!((0.0..=10.0).contains(&out) || out == 1.0);
        }
    }
}
