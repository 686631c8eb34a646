//! Static catalog data: tools, upgrades, achievements, and scheduled events.
//!
//! Read-only to the rest of the workspace. Numeric values here are tuning
//! data consumed by the economy, not invariants of it.

use crate::{EventKind, GameState};

/// What a passive tool produces each second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payout {
    Bots,
    Money,
}

/// A purchasable tool definition.
#[derive(Clone, Debug)]
pub struct ToolDef {
    pub id: &'static str,
    pub name: &'static str,
    pub cost: f64,
    /// `None` for tools whose only effect is an unlock.
    pub payout: Option<Payout>,
    /// Passive output per second while owned and active.
    pub base: f64,
    pub clickable: bool,
    /// Granted per manual activation of a clickable tool.
    pub click_bonus: f64,
    /// Cooldown in seconds once the click counter fills.
    pub click_cooldown_secs: f64,
    pub unlocks_mobile: bool,
}

const fn passive(
    id: &'static str,
    name: &'static str,
    cost: f64,
    payout: Payout,
    base: f64,
) -> ToolDef {
    ToolDef {
        id,
        name,
        cost,
        payout: Some(payout),
        base,
        clickable: false,
        click_bonus: 0.0,
        click_cooldown_secs: 0.0,
        unlocks_mobile: false,
    }
}

const fn clicker(
    id: &'static str,
    name: &'static str,
    cost: f64,
    payout: Payout,
    base: f64,
    click_bonus: f64,
    click_cooldown_secs: f64,
) -> ToolDef {
    ToolDef {
        id,
        name,
        cost,
        payout: Some(payout),
        base,
        clickable: true,
        click_bonus,
        click_cooldown_secs,
        unlocks_mobile: false,
    }
}

pub const TOOLS: &[ToolDef] = &[
    clicker("starter", "Deauthentication Tool", 1_000.0, Payout::Bots, 10.0, 50.0, 60.0),
    passive("miniWorm", "Basic Propagation Script", 1_500.0, Payout::Bots, 50.0),
    passive("sqlTest", "SQL Injection Test Module", 2_000.0, Payout::Bots, 80.0),
    passive("enumScan", "Service Enumeration Scanner", 3_500.0, Payout::Bots, 150.0),
    passive("autoClick", "Automated Interaction Engine", 5_000.0, Payout::Bots, 500.0),
    clicker("phishMini", "Phishing Campaign Test", 10_000.0, Payout::Bots, 800.0, 2_000.0, 180.0),
    passive("payloadForge", "Payload Obfuscation Tool", 12_000.0, Payout::Bots, 1_100.0),
    passive("credGrab", "Information Grabber", 20_000.0, Payout::Bots, 1_500.0),
    passive("botSeed", "Botnet Seeding Framework", 30_000.0, Payout::Bots, 3_000.0),
    passive("lateralMove", "Lateral Movement Module", 40_000.0, Payout::Bots, 4_500.0),
    clicker("miniDdos", "L4 DDoS Utility", 50_000.0, Payout::Money, 200.0, 1_000.0, 120.0),
    passive("trafficSpoof", "Traffic Spoofing Engine", 75_000.0, Payout::Money, 350.0),
    clicker("sqli", "SQL Injection Automation Suite", 100_000.0, Payout::Bots, 15_000.0, 30_000.0, 300.0),
    clicker("ddos", "L7 DDoS Utility", 200_000.0, Payout::Money, 800.0, 3_000.0, 300.0),
    passive("xss", "Cross-Site Scripting Suite", 300_000.0, Payout::Bots, 35_000.0),
    passive("sessionHijack", "Session Hijacking Toolkit", 350_000.0, Payout::Bots, 50_000.0),
    passive("creds", "Credential Collection Service", 400_000.0, Payout::Bots, 70_000.0),
    passive("phishing", "Large Phishing Campaign", 500_000.0, Payout::Bots, 120_000.0),
    passive("dropService", "Data Drop Service", 750_000.0, Payout::Money, 1_000.0),
    passive("spam", "Bulk Messaging Network", 1e6, Payout::Money, 1_500.0),
    passive("cards", "Payment Data Extraction", 1.2e6, Payout::Money, 3_000.0),
    passive("crypto", "Cryptocurrency Miner", 2e6, Payout::Money, 4_000.0),
    passive("worm", "Self-Propagating Worm", 3e6, Payout::Bots, 200_000.0),
    passive("c2Mesh", "Distributed C2 Mesh", 3.2e6, Payout::Bots, 275_000.0),
    passive("proxy", "Proxy Network Service", 3.5e6, Payout::Money, 5_500.0),
    passive("exploitBroker", "Exploit Brokerage", 1.5e7, Payout::Money, 9_000.0),
    clicker("ransomware", "Ransomware Distribution", 5e8, Payout::Money, 7_000.0, 15_000.0, 300.0),
    ToolDef {
        id: "mobile",
        name: "Mobile Device Loader",
        cost: 7e8,
        payout: None,
        base: 0.0,
        clickable: false,
        click_bonus: 0.0,
        click_cooldown_secs: 0.0,
        unlocks_mobile: true,
    },
    passive("http", "HTTP Botnet Controller", 1.2e9, Payout::Bots, 350_000.0),
    passive("rootkit", "Advanced Rootkit System", 2e9, Payout::Bots, 500_000.0),
    passive("backdoor", "Persistent Backdoor System", 3.5e9, Payout::Bots, 750_000.0),
    passive("aptFramework", "APT Operations Framework", 5e9, Payout::Bots, 950_000.0),
    clicker("zeroday", "Zero-Day Exploit Kit", 6e9, Payout::Bots, 1.2e6, 5e6, 300.0),
    clicker("influenceOps", "Influence Operations Suite", 8e9, Payout::Money, 12_000.0, 30_000.0, 600.0),
];

/// Effect of a purchased upgrade on the economy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UpgradeEffect {
    /// Adds to baseline bots-per-second.
    BaseBots(f64),
    /// Adds to baseline money-per-second.
    BaseMoney(f64),
    /// Multiplies the manual-spread batch by `1 + value`.
    ClickMultiplier(f64),
    /// Reveals the base tier's price trend after each roll.
    PriceTrend,
}

/// A purchasable upgrade definition.
#[derive(Clone, Debug)]
pub struct UpgradeDef {
    pub id: &'static str,
    pub name: &'static str,
    pub cost: f64,
    pub effect: UpgradeEffect,
}

const fn up(id: &'static str, name: &'static str, cost: f64, effect: UpgradeEffect) -> UpgradeDef {
    UpgradeDef { id, name, cost, effect }
}

pub const UPGRADES: &[UpgradeDef] = &[
    up("buildPC", "Brand New Computer", 500.0, UpgradeEffect::BaseBots(2.0)),
    up("antenna", "External WiFi Antenna", 2_500.0, UpgradeEffect::ClickMultiplier(0.25)),
    up("proxygambit", "ProxyGambit", 5_000.0, UpgradeEffect::ClickMultiplier(0.5)),
    up("ramUpgrade", "High-Speed RAM Kit", 10_000.0, UpgradeEffect::BaseBots(5.0)),
    up("marketScanner", "Red Pill", 15_000.0, UpgradeEffect::PriceTrend),
    up("ssdUpgrade", "NVMe Storage Array", 20_000.0, UpgradeEffect::BaseBots(10.0)),
    up("osHardening", "Custom Hardened OS", 60_000.0, UpgradeEffect::BaseBots(25.0)),
    up("networkStack", "Optimized Network Stack", 500_000.0, UpgradeEffect::BaseBots(150.0)),
    up("serverRack", "Dedicated Server Rack", 1_500_000.0, UpgradeEffect::BaseBots(400.0)),
    up("ai", "Autonomous Spread Controller", 5_000_000.0, UpgradeEffect::ClickMultiplier(1.0)),
];

/// Which bonus pool an achievement feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BonusCategory {
    /// Multiplies passive and tool-click bot generation.
    Generation,
    /// Multiplies money income and sale revenue.
    Income,
    /// Multiplies the manual-spread batch.
    Click,
    /// Adds whole levels to the effective prestige bonus.
    Prestige,
    /// Cosmetic only.
    Special,
}

/// Earn condition of an achievement, evaluated against live state.
/// `bps` is the current passive generation rate at full efficiency.
#[derive(Clone, Copy, Debug)]
pub enum Condition {
    OwnsUpgrade(&'static str),
    OwnsAnyTool(&'static [&'static str]),
    TotalClicks(u64),
    BotsSold(f64),
    TotalBots(f64),
    Bps(f64),
    ToolsOwned(usize),
    UpgradesOwned(usize),
    TotalEarned(f64),
    PrestigeLevel(u32),
    MobileUnlocked,
    /// Passive rate reached without a single manual click.
    IdleEngine { min_bps: f64 },
    /// Earnings threshold reached while the fleet is still small.
    EarnedLean { max_bots: f64, min_earned: f64 },
    /// Click threshold reached while the fleet is still small.
    ClicksLean { max_bots: f64, min_clicks: u64 },
}

impl Condition {
    pub fn satisfied(&self, state: &GameState, bps: f64) -> bool {
        match self {
            Condition::OwnsUpgrade(id) => state.owns_upgrade(id),
            Condition::OwnsAnyTool(ids) => ids
                .iter()
                .any(|id| state.tools.get(*id).map(|t| t.active).unwrap_or(false)),
            Condition::TotalClicks(n) => state.total_clicks >= *n,
            Condition::BotsSold(n) => state.total_bots_sold >= *n,
            Condition::TotalBots(n) => state.total_bots() >= *n,
            Condition::Bps(n) => bps >= *n,
            Condition::ToolsOwned(n) => state.tools.len() >= *n,
            Condition::UpgradesOwned(n) => {
                state.upgrades.values().filter(|owned| **owned).count() >= *n
            }
            Condition::TotalEarned(n) => state.total_earned >= *n,
            Condition::PrestigeLevel(n) => state.prestige >= *n,
            Condition::MobileUnlocked => state.unlocks.mobile,
            Condition::IdleEngine { min_bps } => {
                state.total_clicks == 0 && bps >= *min_bps
            }
            Condition::EarnedLean { max_bots, min_earned } => {
                state.total_bots() < *max_bots && state.total_earned >= *min_earned
            }
            Condition::ClicksLean { max_bots, min_clicks } => {
                state.total_bots() < *max_bots && state.total_clicks >= *min_clicks
            }
        }
    }
}

/// An achievement definition. Earned flags are monotonic and survive
/// prestige resets.
#[derive(Clone, Debug)]
pub struct AchievementDef {
    pub id: &'static str,
    pub title: &'static str,
    pub reward: BonusCategory,
    pub bonus: f64,
    pub hidden: bool,
    pub condition: Condition,
}

const fn ach(
    id: &'static str,
    title: &'static str,
    reward: BonusCategory,
    bonus: f64,
    condition: Condition,
) -> AchievementDef {
    AchievementDef { id, title, reward, bonus, hidden: false, condition }
}

const fn secret(
    id: &'static str,
    title: &'static str,
    reward: BonusCategory,
    bonus: f64,
    condition: Condition,
) -> AchievementDef {
    AchievementDef { id, title, reward, bonus, hidden: true, condition }
}

pub const ACHIEVEMENTS: &[AchievementDef] = &[
    ach("first_pc", "Boot Sequence", BonusCategory::Generation, 0.01, Condition::OwnsUpgrade("buildPC")),
    ach("first_clicks", "Hands On Keyboard", BonusCategory::Click, 0.05, Condition::TotalClicks(50)),
    ach("clicks_200", "Manual Operator", BonusCategory::Click, 0.10, Condition::TotalClicks(200)),
    ach("clicks_1000", "Human Amplifier", BonusCategory::Click, 0.15, Condition::TotalClicks(1_000)),
    ach("clicks_5000", "Relentless Execution", BonusCategory::Click, 0.20, Condition::TotalClicks(5_000)),
    ach("first_sale", "First Transaction", BonusCategory::Income, 0.01, Condition::BotsSold(1.0)),
    ach("sell_1k", "Small Batch Seller", BonusCategory::Income, 0.01, Condition::BotsSold(1_000.0)),
    ach("sell_100k", "Wholesale Dealer", BonusCategory::Income, 0.02, Condition::BotsSold(100_000.0)),
    ach("sell_1m", "Industrial Scale", BonusCategory::Income, 0.03, Condition::BotsSold(1e6)),
    ach("bots_1k", "Network Seeded", BonusCategory::Generation, 0.01, Condition::TotalBots(1_000.0)),
    ach("bots_10k", "Expanding Mesh", BonusCategory::Generation, 0.015, Condition::TotalBots(10_000.0)),
    ach("bots_100k", "Autonomous Network", BonusCategory::Generation, 0.02, Condition::TotalBots(100_000.0)),
    ach("bots_1m", "Distributed Control", BonusCategory::Generation, 0.025, Condition::TotalBots(1e6)),
    ach("bots_10m", "Global Presence", BonusCategory::Generation, 0.03, Condition::TotalBots(1e7)),
    ach("bots_1b", "Planetary Scale", BonusCategory::Generation, 0.03, Condition::TotalBots(1e9)),
    ach("bps_25", "Passive Stream", BonusCategory::Generation, 0.01, Condition::Bps(25.0)),
    ach("bps_100", "Automated Engine", BonusCategory::Generation, 0.015, Condition::Bps(100.0)),
    ach("bps_1000", "Self-Sustaining Grid", BonusCategory::Generation, 0.02, Condition::Bps(1_000.0)),
    ach("tools_1", "First Exploit", BonusCategory::Generation, 0.01, Condition::ToolsOwned(1)),
    ach("tools_5", "Toolchain Built", BonusCategory::Income, 0.02, Condition::ToolsOwned(5)),
    ach("tools_10", "Operational Suite", BonusCategory::Generation, 0.025, Condition::ToolsOwned(10)),
    ach("tools_20", "Black Market Arsenal", BonusCategory::Income, 0.03, Condition::ToolsOwned(20)),
    ach("upgrades_5", "Hardware Optimized", BonusCategory::Generation, 0.015, Condition::UpgradesOwned(5)),
    ach("upgrades_10", "Overclocked", BonusCategory::Generation, 0.02, Condition::UpgradesOwned(10)),
    ach("mobile_unlock", "Mobile Expansion", BonusCategory::Generation, 0.02, Condition::MobileUnlocked),
    ach("earn_100k", "Cash Flow Positive", BonusCategory::Income, 0.01, Condition::TotalEarned(100_000.0)),
    ach("earn_1m", "Underground Profits", BonusCategory::Income, 0.02, Condition::TotalEarned(1e6)),
    ach("earn_10m", "Dark Web Tycoon", BonusCategory::Income, 0.03, Condition::TotalEarned(1e7)),
    ach("prestige_1", "System Reset", BonusCategory::Prestige, 1.0, Condition::PrestigeLevel(1)),
    ach("prestige_3", "Refined Loop", BonusCategory::Prestige, 1.0, Condition::PrestigeLevel(3)),
    ach("prestige_5", "Perfected Cycle", BonusCategory::Prestige, 1.0, Condition::PrestigeLevel(5)),
    secret("hidden_idle", "Silent Operator", BonusCategory::Generation, 0.01, Condition::IdleEngine { min_bps: 25.0 }),
    secret("hidden_first_ddos", "First Real Disruption", BonusCategory::Income, 0.01, Condition::OwnsAnyTool(&["miniDdos", "ddos"])),
    secret("impulse_buyer", "Impulse Buyer", BonusCategory::Special, 0.0, Condition::EarnedLean { max_bots: 1e6, min_earned: 1e7 }),
    secret("paid_for_knowledge", "Paid for Knowledge", BonusCategory::Special, 0.0, Condition::ClicksLean { max_bots: 50_000.0, min_clicks: 500 }),
];

/// A scheduled disruptive event as presented to the player.
#[derive(Clone, Debug)]
pub struct EventDef {
    pub kind: EventKind,
    pub title: &'static str,
    pub text: &'static str,
    pub duration_ms: i64,
    pub effect_text: &'static str,
}

/// The pool the scheduler draws from. [`EventKind::Crypto`] is reserved for
/// the mining collaborator and never scheduled here.
pub const SCHEDULED_EVENTS: &[EventDef] = &[
    EventDef {
        kind: EventKind::Raid,
        title: "SECURITY ALERT",
        text: "FBI raid detected on network infrastructure.",
        duration_ms: 120_000,
        effect_text: "Automatic generation reduced by 30% for 2 minutes.",
    },
    EventDef {
        kind: EventKind::Outage,
        title: "NETWORK OUTAGE",
        text: "Major ISP experiencing service disruption.",
        duration_ms: 90_000,
        effect_text: "Cash per second reduced by 50% for 90 seconds.",
    },
    EventDef {
        kind: EventKind::Boom,
        title: "EXPLOIT DISCOVERED",
        text: "Critical zero-day vulnerability identified.",
        duration_ms: 120_000,
        effect_text: "Automatic generation increased by 100% for 2 minutes.",
    },
];

pub fn tool(id: &str) -> Option<&'static ToolDef> {
    TOOLS.iter().find(|t| t.id == id)
}

pub fn upgrade(id: &str) -> Option<&'static UpgradeDef> {
    UPGRADES.iter().find(|u| u.id == id)
}

pub fn achievement(id: &str) -> Option<&'static AchievementDef> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

pub fn event_def(kind: EventKind) -> Option<&'static EventDef> {
    SCHEDULED_EVENTS.iter().find(|e| e.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolOwnership;

    #[test]
    fn catalog_ids_are_unique() {
        for (i, t) in TOOLS.iter().enumerate() {
            assert!(TOOLS.iter().skip(i + 1).all(|o| o.id != t.id), "{}", t.id);
        }
        for (i, u) in UPGRADES.iter().enumerate() {
            assert!(UPGRADES.iter().skip(i + 1).all(|o| o.id != u.id), "{}", u.id);
        }
        for (i, a) in ACHIEVEMENTS.iter().enumerate() {
            assert!(
                ACHIEVEMENTS.iter().skip(i + 1).all(|o| o.id != a.id),
                "{}",
                a.id
            );
        }
    }

    #[test]
    fn lookups_resolve() {
        assert_eq!(tool("starter").unwrap().base, 10.0);
        assert!(tool("starter").unwrap().clickable);
        assert!(tool("mobile").unwrap().unlocks_mobile);
        assert_eq!(upgrade("marketScanner").unwrap().effect, UpgradeEffect::PriceTrend);
        assert!(achievement("bots_1k").is_some());
        assert!(tool("nope").is_none());
    }

    #[test]
    fn achievement_conditions_reference_known_ids() {
        for a in ACHIEVEMENTS {
            match a.condition {
                Condition::OwnsUpgrade(id) => assert!(upgrade(id).is_some(), "{}", id),
                Condition::OwnsAnyTool(ids) => {
                    for id in ids {
                        assert!(tool(id).is_some(), "{}", id);
                    }
                }
                _ => {}
            }
        }
    }

    #[test]
    fn scheduled_events_have_sane_durations() {
        for e in SCHEDULED_EVENTS {
            assert!(e.duration_ms >= crate::MIN_EVENT_DURATION_MS);
            assert!(e.duration_ms <= crate::MAX_EVENT_DURATION_MS);
        }
    }

    #[test]
    fn conditions_evaluate_against_state() {
        let mut state = GameState::new(0);
        assert!(!Condition::TotalClicks(50).satisfied(&state, 0.0));
        state.total_clicks = 50;
        assert!(Condition::TotalClicks(50).satisfied(&state, 0.0));

        assert!(!Condition::IdleEngine { min_bps: 25.0 }.satisfied(&state, 30.0));
        state.total_clicks = 0;
        assert!(Condition::IdleEngine { min_bps: 25.0 }.satisfied(&state, 30.0));

        state
            .tools
            .insert("ddos".into(), ToolOwnership { active: true, clicks: 0 });
        assert!(Condition::OwnsAnyTool(&["miniDdos", "ddos"]).satisfied(&state, 0.0));
    }
}
