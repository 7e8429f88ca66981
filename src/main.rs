//! stockcast CLI - cached market data and price forecasts for equities

use clap::Parser;

use stockcast::Result;
use stockcast::cli::{self, CacheCommands, Cli, Commands, GlobalOptions};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; `--debug` turns on debug output for this crate
fn init_logging(debug: bool) {
    let default = if debug { "stockcast=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Fundamentals { symbol } => cli::stock::fundamentals(&opts, &symbol).await,
        Commands::History {
            symbol,
            range,
            limit,
        } => cli::stock::history(&opts, &symbol, &range, limit).await,
        Commands::Indicators { symbol, range } => {
            cli::stock::indicators(&opts, &symbol, &range).await
        }
        Commands::News { symbol, limit } => cli::stock::news(&opts, &symbol, limit).await,
        Commands::Market { limit } => cli::market::run(&opts, limit).await,
        Commands::Predict { symbol } => cli::stock::predict(&opts, &symbol).await,
        Commands::Analyze { symbol, limit } => cli::stock::analyze(&opts, &symbol, limit).await,
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts),
            CacheCommands::Clear { scope } => cli::cache::clear(&opts, &scope),
            CacheCommands::Path => cli::cache::path(&opts),
        },
        Commands::Init {
            news_api_key,
            force,
        } => cli::init::run(&opts, news_api_key, force),
        Commands::Version => {
            println!("stockcast version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
