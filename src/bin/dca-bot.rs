// DCA Trading Bot - CLI
// Single entry point for placing trades, running the monitor and inspecting history

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};

use dca_trading_bot::logging::init_logging;
use dca_trading_bot::{
    BybitClient, Config, ConfigError, DcaEngine, ExchangeClient, LoggingConfig, PaperExchange, PriceSource,
    SimulatedPriceSource, SqliteTradeStore, TradeStore, TradingError, TradingResult,
};

// Load command modules from cli directory
#[path = "../cli/trade_commands.rs"]
mod trade_commands;
#[path = "../cli/inspect_commands.rs"]
mod inspect_commands;

#[derive(Parser)]
#[command(name = "dca-bot")]
#[command(version)]
#[command(about = "Dollar-cost-averaging trading bot for Bybit spot", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    /// Use the in-process paper exchange and a simulated price feed
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create config.toml and the data/log directories
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Open a DCA trade: market base order plus the safety-order ladder
    Trade {
        /// Trading pair (e.g., HBARUSDT)
        pair: String,
    },

    /// Run the monitoring loop until Ctrl-C
    Monitor {
        /// Open trades on these pairs before monitoring
        #[arg(long, value_delimiter = ',')]
        open: Vec<String>,

        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },

    /// List trades (active only unless --all)
    Trades {
        #[arg(short, long)]
        all: bool,
    },

    /// Show one trade with its safety orders and order records
    Show {
        /// Trade id
        id: i64,
    },

    /// Print the effective configuration
    Config,

    /// Manage a trade's take-profit order by hand
    #[command(subcommand)]
    TakeProfit(TakeProfitCommands),
}

#[derive(Subcommand)]
enum TakeProfitCommands {
    /// Reconcile fills and refresh the stored target
    Recompute { id: i64 },

    /// Place the take-profit order (trade must be OPEN)
    Place { id: i64 },

    /// Cancel the resting take-profit order (trade must be TAKE_PROFIT_PLACED)
    Cancel { id: i64 },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Init runs before any config exists
    if let Commands::Init { force } = cli.command {
        let guard = init_logging(&LoggingConfig::default(), cli.verbose);
        let result = init_workspace(&cli.config, force);
        finish(result, guard);
        return;
    }

    let config = match Config::from_file(&cli.config) {
        Ok(mut config) => {
            config.exchange.dry_run |= cli.dry_run;
            config
        }
        Err(e) => {
            let guard = init_logging(&LoggingConfig::default(), cli.verbose);
            finish(Err(TradingError::Config(e)), guard);
            return;
        }
    };

    let guard = init_logging(&config.logging, cli.verbose);
    info!("🚀 DCA Trading Bot v{}", env!("CARGO_PKG_VERSION"));
    info!("📁 Config: {}", cli.config);
    if config.exchange.dry_run {
        info!("🧪 DRY RUN mode (paper exchange)");
    }

    let result = run_command(cli.command, &config).await;
    finish(result, guard);
}

async fn run_command(command: Commands, config: &Config) -> TradingResult<()> {
    match command {
        Commands::Init { .. } => Ok(()),
        Commands::Trade { pair } => {
            let engine = build_engine(config)?;
            trade_commands::execute_trade(&engine, &pair).await
        }
        Commands::Monitor { open, once } => {
            let engine = build_engine(config)?;
            trade_commands::run_monitor(&engine, &open, once).await
        }
        Commands::Trades { all } => {
            let store = open_store(config)?;
            inspect_commands::list_trades(store.as_ref(), all)
        }
        Commands::Show { id } => {
            let store = open_store(config)?;
            inspect_commands::show_trade(store.as_ref(), id)
        }
        Commands::Config => inspect_commands::show_config(config),
        Commands::TakeProfit(cmd) => {
            let engine = build_engine(config)?;
            match cmd {
                TakeProfitCommands::Recompute { id } => trade_commands::recompute_take_profit(&engine, id).await,
                TakeProfitCommands::Place { id } => trade_commands::place_take_profit(&engine, id).await,
                TakeProfitCommands::Cancel { id } => trade_commands::cancel_take_profit(&engine, id).await,
            }
        }
    }
}

/// Log the outcome, flush the log file and set the exit code
fn finish(result: TradingResult<()>, guard: Option<tracing_appender::non_blocking::WorkerGuard>) {
    if let Err(e) = result {
        error!("❌ {}", e.user_message());
        drop(guard);
        std::process::exit(1);
    }
}

fn open_store(config: &Config) -> TradingResult<Arc<dyn TradeStore>> {
    let path = config.database.effective_path(config.exchange.dry_run);
    info!("💾 Database: {}", path.display());
    Ok(Arc::new(SqliteTradeStore::open(&path)?))
}

/// Exchange, price source and store are built once here and passed down
fn build_engine(config: &Config) -> TradingResult<DcaEngine> {
    let store = open_store(config)?;

    let (exchange, prices): (Arc<dyn ExchangeClient>, Arc<dyn PriceSource>) = if config.exchange.dry_run {
        let prices: Arc<dyn PriceSource> = Arc::new(SimulatedPriceSource::new(0.05, 0.002, 0.2));
        let exchange: Arc<dyn ExchangeClient> = Arc::new(PaperExchange::with_price_feed(Arc::clone(&prices)));
        (exchange, prices)
    } else {
        if !config.has_api_keys() {
            return Err(TradingError::Config(ConfigError::Validation(
                "Bybit API keys are required for live trading (or pass --dry-run)".to_string(),
            )));
        }
        if config.exchange.rest_url.contains("testnet") {
            info!("🧪 Using Bybit testnet: {}", config.exchange.rest_url);
        } else {
            warn!("⚠️  LIVE TRADING against {}", config.exchange.rest_url);
        }
        let client = Arc::new(BybitClient::new(&config.exchange)?);
        let exchange: Arc<dyn ExchangeClient> = client.clone();
        let prices: Arc<dyn PriceSource> = client;
        (exchange, prices)
    };

    Ok(DcaEngine::new(config.strategy.clone(), &config.monitor, exchange, prices, store))
}

fn init_workspace(config_path: &str, force: bool) -> TradingResult<()> {
    use std::fs;

    info!("🔧 Initializing workspace...");

    fs::create_dir_all("logs")?;
    fs::create_dir_all("data")?;

    let path = std::path::Path::new(config_path);
    if path.exists() && !force {
        warn!("⚠️  {} already exists, skipping (use --force to overwrite)", config_path);
    } else {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let default_config = include_str!("../../config.toml.example");
        fs::write(path, default_config)?;
        info!("📝 Created {}", config_path);
    }

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Set BYBIT_API_KEY / BYBIT_API_SECRET (or edit {})", config_path);
    info!("   2. Run: dca-bot --dry-run monitor --open HBARUSDT");
    info!("   3. Run: dca-bot trade HBARUSDT");

    Ok(())
}
