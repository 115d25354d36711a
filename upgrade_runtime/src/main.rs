//! upgrade-scenario: run a scenario file through a persistent session.
//!
//! Loads the runtime config, opens (or creates) the configured session,
//! applies every operation of the scenario and prints a JSON report.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use upgrade_kernel::ImplementationRegistry;
use upgrade_runtime::config::RuntimeConfig;
use upgrade_runtime::drift::verify_determinism;
use upgrade_runtime::scenario::{self, Scenario};
use upgrade_runtime::session::Session;

#[derive(Parser)]
#[command(name = "upgrade-scenario")]
#[command(about = "Run a ledger upgrade scenario through a persistent session", long_about = None)]
#[command(version)]
struct Cli {
    /// Scenario file (JSON: deployment + operations)
    scenario: PathBuf,

    /// Runtime configuration file
    #[arg(short, long, env = "UPGRADE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured session id
    #[arg(long)]
    session: Option<String>,

    /// Replay the log twice afterwards and compare fingerprints
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RuntimeConfig::load(cli.config.as_deref()).context("loading runtime config")?;
    if let Some(session) = cli.session {
        config.session_id = session;
        config.validate()?;
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let scenario = Scenario::load(&cli.scenario)
        .with_context(|| format!("loading scenario {}", cli.scenario.display()))?;

    let registry = ImplementationRegistry::builtin();
    let mut session = Session::open_or_create(&config, registry.clone(), scenario.deployment.clone())
        .with_context(|| format!("opening session {}", config.session_id))?;

    let report = scenario::run(&mut session, &scenario.operations)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if cli.verify {
        let records = session.records()?;
        let fingerprint = verify_determinism(&records, &registry)?;
        if fingerprint != report.fingerprint {
            bail!(
                "replayed fingerprint {} differs from live fingerprint {}",
                fingerprint,
                report.fingerprint
            );
        }
        tracing::info!(%fingerprint, "replay verified");
    }

    Ok(())
}
