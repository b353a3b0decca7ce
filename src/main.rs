use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fxtrade::core::log::init_logging;
use fxtrade::core::{CurrencyCode, SourceFilter};
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// Portfolio owner
    #[arg(short, long, global = true, default_value = fxtrade::DEFAULT_USER)]
    user: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Add funds to the portfolio, creating it if needed
    Deposit {
        currency: CurrencyCode,
        amount: Decimal,
    },
    /// Buy a currency, paying in the base currency
    Buy {
        currency: CurrencyCode,
        amount: Decimal,
        /// Settlement currency (defaults to the configured base)
        #[arg(long)]
        base: Option<CurrencyCode>,
    },
    /// Sell a currency for the base currency
    Sell {
        currency: CurrencyCode,
        amount: Decimal,
        /// Settlement currency (defaults to the configured base)
        #[arg(long)]
        base: Option<CurrencyCode>,
    },
    /// Display wallet balances and their value
    ShowPortfolio {
        /// Currency to value the portfolio in
        #[arg(long)]
        base: Option<CurrencyCode>,
    },
    /// Display a fresh rate between two currencies
    GetRate { from: CurrencyCode, to: CurrencyCode },
    /// Display cached rates
    ShowRates {
        /// Only rates of this currency
        #[arg(long)]
        currency: Option<CurrencyCode>,
        /// Only the N most valuable crypto currencies
        #[arg(long)]
        top: Option<usize>,
        /// Express rates in this currency
        #[arg(long)]
        base: Option<CurrencyCode>,
    },
    /// Fetch current rates from the providers
    UpdateRates {
        /// all, crypto or fiat
        #[arg(long, default_value = "all")]
        source: SourceFilter,
    },
    /// Display recorded rates for a pair
    History {
        from: CurrencyCode,
        to: CurrencyCode,
        /// Show only the latest N records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Refresh rates periodically until interrupted
    Schedule {
        /// Seconds between cycles (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
}

impl From<Commands> for fxtrade::AppCommand {
    fn from(cmd: Commands) -> fxtrade::AppCommand {
        match cmd {
            Commands::Deposit { currency, amount } => {
                fxtrade::AppCommand::Deposit { currency, amount }
            }
            Commands::Buy {
                currency,
                amount,
                base,
            } => fxtrade::AppCommand::Buy {
                currency,
                amount,
                base,
            },
            Commands::Sell {
                currency,
                amount,
                base,
            } => fxtrade::AppCommand::Sell {
                currency,
                amount,
                base,
            },
            Commands::ShowPortfolio { base } => fxtrade::AppCommand::ShowPortfolio { base },
            Commands::GetRate { from, to } => fxtrade::AppCommand::GetRate { from, to },
            Commands::ShowRates {
                currency,
                top,
                base,
            } => fxtrade::AppCommand::ShowRates {
                currency,
                top,
                base,
            },
            Commands::UpdateRates { source } => fxtrade::AppCommand::UpdateRates { source },
            Commands::History { from, to, limit } => {
                fxtrade::AppCommand::History { from, to, limit }
            }
            Commands::Schedule { interval } => fxtrade::AppCommand::Schedule {
                interval_seconds: interval,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fxtrade::cli::setup::setup_at_path(path),
            None => fxtrade::cli::setup::setup(),
        },
        Some(cmd) => fxtrade::run_command(cmd.into(), cli.config_path.as_deref(), &cli.user).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
