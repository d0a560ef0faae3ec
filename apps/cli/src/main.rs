#![deny(warnings)]

//! `destiny`: terminal front end for the Flip Your Destiny wealth game.

mod args;
mod play;
mod render;

use anyhow::{bail, Context, Result};
use args::{parse_args, Command, USAGE};
use destiny_core::AllocationPlan;
use destiny_econ::SampledReturns;
use destiny_engine::{Engine, GameSession, Stage};
use persistence::{AdminGate, CsvRecordStore, RecordStore, SqliteRecordStore};
use scenario::{GameConfig, RecordsConfig};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn open_store(records: &RecordsConfig) -> Result<Box<dyn RecordStore>> {
    Ok(match records {
        RecordsConfig::Csv { path } => Box::new(CsvRecordStore::new(path)),
        RecordsConfig::Sqlite { url } => Box::new(SqliteRecordStore::open(url)?),
    })
}

fn returns_for(seed: Option<u64>) -> SampledReturns {
    match seed {
        Some(seed) => SampledReturns::seeded(seed),
        None => SampledReturns::from_entropy(),
    }
}

fn engine_for(cfg: &GameConfig) -> Result<Engine> {
    Ok(Engine::new(cfg.rate_profile()?, cfg.event_catalog()?))
}

fn load_config(path: Option<&Path>) -> Result<GameConfig> {
    GameConfig::load(path).context("loading game config")
}

fn rates_listing(cfg: &GameConfig) -> Result<String> {
    Ok(render::rates(&cfg.rate_profile()?))
}

fn cards_listing(cfg: &GameConfig) -> Result<String> {
    let catalog = cfg.event_catalog()?;
    Ok(render::cards(&catalog))
}

fn version_line() -> String {
    format!(
        "destiny {} (rev {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("DESTINY_GIT_REV"),
        env!("DESTINY_BUILD_DATE")
    )
}

fn play(config: Option<PathBuf>, name: Option<String>, resume: Option<PathBuf>) -> Result<()> {
    let cfg = load_config(config.as_deref())?;
    let engine = engine_for(&cfg)?;
    let store = open_store(&cfg.records)?;
    let mut returns = returns_for(cfg.seed);
    let session = match resume {
        Some(path) => {
            let s = GameSession::load(&path)
                .with_context(|| format!("resuming from {}", path.display()))?;
            info!(player = %s.player(), year = s.year(), stage = %s.stage(), "session resumed");
            s
        }
        None => GameSession::new(),
    };
    let stdin = io::stdin();
    let mut game = play::Play {
        engine: &engine,
        store: store.as_ref(),
        gate: AdminGate::new(cfg.admin_secret.clone()),
        capital: cfg.starting_capital,
        returns: &mut returns,
        preset_name: name,
        input: stdin.lock(),
        out: io::stdout().lock(),
    };
    game.run(session)?;
    Ok(())
}

fn autoplay(
    config: Option<PathBuf>,
    plan: AllocationPlan,
    cards: Vec<String>,
    seed: Option<u64>,
    name: String,
) -> Result<()> {
    let cfg = load_config(config.as_deref())?;
    let engine = engine_for(&cfg)?;
    let mut returns = returns_for(seed.or(cfg.seed));

    let mut s = engine.start_session(&GameSession::new(), &name)?;
    s = engine.confirm_initial_allocation(&s, &plan, cfg.starting_capital)?;
    for code in &cards {
        s = engine.advance_decade(&s, &mut returns)?;
        s = engine.apply_event(&s, code)?;
        if s.stage() == Stage::AwaitingRebalance {
            s = engine.rebalance(&s, &plan)?;
        }
    }
    print!("{}", render::summary(&s));
    Ok(())
}

fn admin(config: Option<PathBuf>, secret: &str, export: Option<Option<PathBuf>>) -> Result<()> {
    let cfg = load_config(config.as_deref())?;
    let store = open_store(&cfg.records)?;
    let gate = AdminGate::new(cfg.admin_secret.clone());
    let Some(view) = gate.unlock(secret, store.as_ref()) else {
        bail!("admin secret rejected");
    };
    match export {
        None => println!("{}", view.record_count()?),
        Some(out) => {
            let bytes = view.export_csv()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), bytes = bytes.len(), "records exported");
                }
                None => io::stdout().lock().write_all(&bytes)?,
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr so they never mix with the game's own output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match parse_args(std::env::args().skip(1))? {
        Command::Play {
            config,
            name,
            resume,
        } => play(config, name, resume),
        Command::Autoplay {
            config,
            plan,
            cards,
            seed,
            name,
        } => autoplay(config, plan, cards, seed, name),
        Command::AdminCount { config, secret } => admin(config, &secret, None),
        Command::AdminExport {
            config,
            secret,
            out,
        } => admin(config, &secret, Some(out)),
        Command::Rates { config } => {
            print!("{}", rates_listing(&load_config(config.as_deref())?)?);
            Ok(())
        }
        Command::Cards { config } => {
            print!("{}", cards_listing(&load_config(config.as_deref())?)?);
            Ok(())
        }
        Command::Version => {
            println!("{}", version_line());
            Ok(())
        }
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
    }
}
