#![deny(warnings)]

//! Headless CLI driver: loads the save, replays offline time, runs the tick
//! loop with a scripted player, and prints a KPI summary.

use anyhow::Result;
use persistence::{DirStore, SaveManager};
use sim_core::{SimConfig, Tier};
use sim_econ::NoMining;
use sim_runtime::{Clock, Session, SystemClock};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

struct Args {
    save_dir: String,
    seconds: u64,
    seed: u64,
    export: bool,
    import: Option<String>,
}

fn parse_args() -> Args {
    let mut args = Args {
        save_dir: "./saves".to_string(),
        seconds: 30,
        seed: 42,
        export: false,
        import: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--save-dir" => {
                if let Some(v) = it.next() {
                    args.save_dir = v;
                }
            }
            "--seconds" => {
                args.seconds = it.next().and_then(|s| s.parse().ok()).unwrap_or(args.seconds)
            }
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()).unwrap_or(args.seed),
            "--export" => args.export = true,
            "--import" => args.import = it.next(),
            _ => {}
        }
    }
    args
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args();
    info!(
        save_dir = %args.save_dir,
        seconds = args.seconds,
        seed = args.seed,
        git = env!("GIT_SHA"),
        "starting headless session"
    );

    let clock = SystemClock;
    let mut saves = SaveManager::new(DirStore::new(&args.save_dir)?);
    if let Some(blob) = &args.import {
        saves.import_save(blob)?;
        info!("save imported, reloading");
    }
    if args.export {
        match saves.export_save() {
            Some(blob) => println!("{blob}"),
            None => println!("no save to export"),
        }
        return Ok(());
    }
    let now = clock.now_ms();
    let state = saves.load_game(now);
    let config = SimConfig { rng_seed: args.seed, ..SimConfig::default() };
    let mut session = Session::new(state, config, saves);

    let offline = session.reconcile_offline(now);
    if offline.was_offline {
        info!(
            eligible_hours = offline.eligible_hours,
            bots_gained = offline.bots_gained,
            cash_gained = offline.cash_gained,
            "offline progress applied"
        );
        if let Some(event) = offline.event {
            info!(
                event = event.kind.title(),
                bots = event.bots_delta,
                cash = event.cash_delta,
                "offline event"
            );
        }
    }

    // Scripted player: tick at 100ms cadence, spread twice a second,
    // acknowledge events as they appear, sell surplus base-tier inventory
    // every ten seconds.
    let start = clock.now_ms();
    for step in 0..args.seconds * 10 {
        let now = start + (step as i64) * 100;
        let report = session.tick(now);
        if let Some(transition) = report.event {
            info!(?transition, "event transition");
            let _ = session.acknowledge_event(now);
        }
        if step % 5 == 0 {
            let _ = session.spread(now);
        }
        if step % 100 == 99 {
            let surplus = session.state().bots.t3.floor();
            if surplus >= 100.0 {
                let _ = session.sell(Tier::T3, surplus, now);
            }
        }
    }

    let end = start + (args.seconds as i64) * 1_000;
    session.flush(end);

    let state = session.state();
    let bps = sim_econ::calculate_bps(state, 1.0, &NoMining);
    let mps = sim_econ::calculate_mps(state, 1.0, &NoMining);
    println!(
        "Session OK | bots: {:.0} | money: ${:.2} | earned: ${:.2} | BPS: {:.1} | MPS: {:.1} | prestige: {} | achievements: {}",
        state.total_bots(),
        state.money,
        state.total_earned,
        bps,
        mps,
        state.prestige,
        state.achievements.len()
    );

    Ok(())
}
