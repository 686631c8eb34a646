#![deny(warnings)]

//! Economy math for Botnet Tycoon: passive rate derivation, bonus stacking,
//! skill costs, sale revenue, and market price rolls.
//!
//! Everything here is read-only with respect to [`GameState`] except
//! [`roll_prices`], which owns the price fields. A computation that detects
//! corruption (non-finite or negative intermediates) clamps to a safe value
//! and logs instead of propagating it into state.

use rand::Rng;
use sim_core::catalog::{self, BonusCategory, Payout, ToolDef, UpgradeEffect};
use sim_core::{
    sanitize_number, GameState, PriceTable, Skill, Tier, LEVEL_CAP, MAX_SAFE_NUMBER, PRICE_MAX,
    PRICE_MIN, RATE_BONUS_MAX,
};
use tracing::warn;

/// Narrow read-only interface to the optional mining collaborator. The
/// economy queries it without owning its lifecycle.
pub trait RateSource {
    /// Multiplier on bot generation while mining competes for fleet capacity.
    fn generation_multiplier(&self) -> f64 {
        1.0
    }

    /// Passive money per second produced by a fleet of `total_bots`.
    fn passive_income(&self, total_bots: f64) -> f64 {
        let _ = total_bots;
        0.0
    }
}

/// Rate source used when no mining subsystem is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMining;

impl RateSource for NoMining {}

/// Rate multiplier from earned achievements of `category`, in
/// `[1, RATE_BONUS_MAX]`.
pub fn achievement_bonus(state: &GameState, category: BonusCategory) -> f64 {
    let mut bonus = 1.0;
    for def in catalog::ACHIEVEMENTS {
        if def.reward == category && state.achievements.get(def.id).copied().unwrap_or(false) {
            bonus += sanitize_number(def.bonus, 0.0, 0.0, RATE_BONUS_MAX);
        }
    }
    sanitize_number(bonus, 1.0, 1.0, RATE_BONUS_MAX)
}

/// Effective prestige level: the stored level plus whole bonus levels from
/// prestige-reward achievements, capped.
pub fn prestige_bonus(state: &GameState) -> f64 {
    let mut extra = 0.0;
    for def in catalog::ACHIEVEMENTS {
        if def.reward == BonusCategory::Prestige
            && state.achievements.get(def.id).copied().unwrap_or(false)
        {
            extra += sanitize_number(def.bonus, 0.0, 0.0, RATE_BONUS_MAX);
        }
    }
    let base = f64::from(state.prestige.min(LEVEL_CAP));
    sanitize_number(base + extra, 0.0, 0.0, f64::from(LEVEL_CAP))
}

fn generation_multiplier(state: &GameState, efficiency: f64, rates: &dyn RateSource) -> f64 {
    let generation = f64::from(state.skills.generation_rate.min(LEVEL_CAP));
    let automation = f64::from(state.skills.automation_efficiency.min(LEVEL_CAP));
    let mining = sanitize_number(rates.generation_multiplier(), 1.0, 0.0, RATE_BONUS_MAX);
    (1.0 + generation * 0.10 + automation * 0.05 + prestige_bonus(state) * 0.10)
        * achievement_bonus(state, BonusCategory::Generation)
        * mining
        * efficiency
}

/// Bots generated per second from every owned bot-producing catalog entry.
///
/// `efficiency` is a `[0, 1]` scalar: 1 for live play, the offline penalty
/// during replay. Never returns a negative or non-finite value.
pub fn calculate_bps(state: &GameState, efficiency: f64, rates: &dyn RateSource) -> f64 {
    let efficiency = sanitize_number(efficiency, 0.0, 0.0, 1.0);
    let multiplier = generation_multiplier(state, efficiency, rates);
    if !multiplier.is_finite() || multiplier < 0.0 {
        warn!(multiplier, "invalid total multiplier while deriving BPS");
        return 0.0;
    }
    let mut bps = 0.0;
    for (id, owned) in &state.upgrades {
        if !*owned {
            continue;
        }
        if let Some(def) = catalog::upgrade(id) {
            if let UpgradeEffect::BaseBots(value) = def.effect {
                bps += sanitize_number(value, 0.0, 0.0, MAX_SAFE_NUMBER) * multiplier;
            }
        }
    }
    for (id, own) in &state.tools {
        if !own.active {
            continue;
        }
        if let Some(def) = catalog::tool(id) {
            if def.payout == Some(Payout::Bots) {
                bps += sanitize_number(def.base, 0.0, 0.0, MAX_SAFE_NUMBER) * multiplier;
            }
        }
    }
    sanitize_number(bps, 0.0, 0.0, MAX_SAFE_NUMBER)
}

/// Money earned per second from owned money-producing catalog entries plus
/// the mining collaborator's passive income. Same contract as
/// [`calculate_bps`].
pub fn calculate_mps(state: &GameState, efficiency: f64, rates: &dyn RateSource) -> f64 {
    let efficiency = sanitize_number(efficiency, 0.0, 0.0, 1.0);
    let multiplier = (1.0 + prestige_bonus(state) * 0.10)
        * achievement_bonus(state, BonusCategory::Income)
        * efficiency;
    if !multiplier.is_finite() || multiplier < 0.0 {
        warn!(multiplier, "invalid total multiplier while deriving MPS");
        return 0.0;
    }
    let mut mps = 0.0;
    for (id, owned) in &state.upgrades {
        if !*owned {
            continue;
        }
        if let Some(def) = catalog::upgrade(id) {
            if let UpgradeEffect::BaseMoney(value) = def.effect {
                mps += sanitize_number(value, 0.0, 0.0, MAX_SAFE_NUMBER) * multiplier;
            }
        }
    }
    for (id, own) in &state.tools {
        if !own.active {
            continue;
        }
        if let Some(def) = catalog::tool(id) {
            if def.payout == Some(Payout::Money) {
                mps += sanitize_number(def.base, 0.0, 0.0, MAX_SAFE_NUMBER) * multiplier;
            }
        }
    }
    let mined = sanitize_number(rates.passive_income(state.total_bots()), 0.0, 0.0, MAX_SAFE_NUMBER);
    mps += mined * efficiency;
    sanitize_number(mps, 0.0, 0.0, MAX_SAFE_NUMBER)
}

/// Cost of raising `skill` from `level` to `level + 1`.
pub fn skill_upgrade_cost(skill: Skill, level: u32) -> f64 {
    skill.base_cost() * 1.6f64.powi(level.min(LEVEL_CAP) as i32)
}

/// Revenue of selling `amount` units of `tier` at the current price,
/// including market skill, prestige, and income-achievement bonuses.
pub fn sale_revenue(state: &GameState, tier: Tier, amount: f64) -> f64 {
    let amount = sanitize_number(amount, 0.0, 0.0, MAX_SAFE_NUMBER);
    let price = sanitize_number(
        state.prices.price(tier),
        PriceTable::fallback(tier),
        PRICE_MIN,
        PRICE_MAX,
    );
    let market = f64::from(state.skills.market_efficiency.min(LEVEL_CAP)) * 0.03;
    let revenue = amount
        * price
        * (1.0 + market)
        * (1.0 + prestige_bonus(state) * 0.10)
        * achievement_bonus(state, BonusCategory::Income);
    sanitize_number(revenue, 0.0, 0.0, MAX_SAFE_NUMBER)
}

/// Aggregate multiplier applied to the manual-spread batch size, floored
/// at 1.
pub fn click_multiplier(state: &GameState) -> f64 {
    let mut mult = achievement_bonus(state, BonusCategory::Click);
    for (id, owned) in &state.upgrades {
        if !*owned {
            continue;
        }
        if let Some(def) = catalog::upgrade(id) {
            if let UpgradeEffect::ClickMultiplier(value) = def.effect {
                mult *= 1.0 + sanitize_number(value, 0.0, 0.0, RATE_BONUS_MAX);
            }
        }
    }
    sanitize_number(mult, 1.0, 1.0, RATE_BONUS_MAX)
}

/// Amount granted by one manual activation of a clickable tool.
pub fn tool_click_grant(state: &GameState, def: &ToolDef) -> f64 {
    let category = match def.payout {
        Some(Payout::Money) => BonusCategory::Income,
        _ => BonusCategory::Generation,
    };
    let grant = sanitize_number(def.click_bonus, 0.0, 0.0, MAX_SAFE_NUMBER)
        * (1.0 + prestige_bonus(state) * 0.10)
        * achievement_bonus(state, category);
    sanitize_number(grant, 0.0, 0.0, MAX_SAFE_NUMBER)
}

/// Re-rolls each tier's unit price from its fixed range and stamps
/// `price_time`. The base tier's trend versus the previous roll is exposed
/// only while the price-trend upgrade is owned.
pub fn roll_prices<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, now: i64) {
    let old_t3 = state.prices.t3;
    state.prices = PriceTable {
        t1: sanitize_number(rng.gen_range(0.8..1.25), PriceTable::fallback(Tier::T1), PRICE_MIN, PRICE_MAX),
        t2: sanitize_number(rng.gen_range(0.3..0.8), PriceTable::fallback(Tier::T2), PRICE_MIN, PRICE_MAX),
        t3: sanitize_number(rng.gen_range(0.08..0.30), PriceTable::fallback(Tier::T3), PRICE_MIN, PRICE_MAX),
        mobile: sanitize_number(rng.gen_range(1.2..2.0), PriceTable::fallback(Tier::Mobile), PRICE_MIN, PRICE_MAX),
    };
    let reveals_trend = state.upgrades.iter().any(|(id, owned)| {
        *owned
            && matches!(
                catalog::upgrade(id).map(|u| u.effect),
                Some(UpgradeEffect::PriceTrend)
            )
    });
    state.price_direction = if reveals_trend {
        let old = sanitize_number(old_t3, PriceTable::fallback(Tier::T3), PRICE_MIN, PRICE_MAX);
        if state.prices.t3 > old {
            1
        } else if state.prices.t3 < old {
            -1
        } else {
            0
        }
    } else {
        0
    };
    state.price_time = now;
}
