use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use imperia_core::scenario::TITLE;
use imperia_core::{load_config_from_env, ImperiaConfig, MapKind, Scenario, ScenarioServer};
use imperia_net::ListenScope;

const DEFAULT_COLUMNS: i32 = 60;
const DEFAULT_ROWS: i32 = 30;
const IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Imperia headless scenario server", long_about = None)]
struct Cli {
    /// Scenario save to serve; a blank map is created when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Serve a battle map instead of a scenario map.
    #[arg(long)]
    battle: bool,
    /// Port to listen on (overrides the config file).
    #[arg(long)]
    port: Option<u16>,
    /// `local` or `any` (overrides the config file).
    #[arg(long)]
    scope: Option<ListenScope>,
    /// Rules directory (overrides the config file).
    #[arg(long)]
    rules_dir: Option<PathBuf>,
}

fn initial_scenario(cli: &Cli, config: &ImperiaConfig) -> Result<Scenario> {
    let kind = if cli.battle {
        MapKind::Battle
    } else {
        MapKind::Scenario
    };
    let mut scenario = match kind {
        MapKind::Battle => Scenario::new_battle(),
        MapKind::Scenario => {
            let mut scenario = Scenario::new(kind);
            scenario.set_property(TITLE, "Untitled");
            scenario.create_map(DEFAULT_COLUMNS, DEFAULT_ROWS)?;
            scenario
        }
    };
    if let Some(path) = &cli.scenario {
        let rules_dir = cli
            .rules_dir
            .clone()
            .unwrap_or_else(|| config.rules_dir(kind).to_path_buf());
        scenario
            .load(path, &rules_dir)
            .with_context(|| format!("loading scenario {}", path.display()))?;
    }
    Ok(scenario)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let (config, config_path) = load_config_from_env();
    let scenario = initial_scenario(&cli, &config)?;

    let port = cli.port.unwrap_or(config.listen_port);
    let scope = cli.scope.unwrap_or(config.listen_scope);
    let mut server = ScenarioServer::new(scenario, config.socket_options());
    let addr = server
        .start(port, scope)
        .with_context(|| format!("listening on port {port}"))?;

    info!(
        target: "imperia::server",
        %addr,
        config = ?config_path,
        columns = server.scenario().columns(),
        rows = server.scenario().rows(),
        "Imperia server ready"
    );

    loop {
        if server.tick() == 0 {
            thread::sleep(IDLE_SLEEP);
        }
    }
}
