//! MedEase - pharmacy gateway over BigQuery with an SMS-capable LLM agent.

mod cli;
mod logging;

use anyhow::Context;
use cli::{Cli, Command};
use medease::api::{self, AppState};
use medease::config::{Config, WarehouseBackend};
use medease::warehouse::TableCatalog;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let log_format = match cli.parse_log_format() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    logging::init(log_format);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match cli.command() {
        Command::Serve => {
            config.validate().context("Invalid configuration")?;
            let state = AppState::from_config(&config)
                .await
                .context("Failed to initialize services")?;
            api::serve(state, &config.server.host, config.server.port).await?;
        }
        Command::Compile(args) => {
            // Table references only need a project and dataset; fall back to
            // the local placeholders when BigQuery is not configured.
            let catalog = TableCatalog::from_config(&config.warehouse).or_else(|_| {
                let mut local = config.warehouse.clone();
                local.backend = WarehouseBackend::Mock;
                TableCatalog::from_config(&local)
            })?;
            let query = args.compile(&catalog)?;
            println!("{}", serde_json::to_string_pretty(&query)?);
        }
    }

    Ok(())
}

/// Loads the config file and applies CLI overrides, then environment defaults.
///
/// Overrides go first so `--llm` picks up the matching provider's API key.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());

    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_overrides(&mut config);
    config.apply_env_defaults();
    Ok(config)
}
