pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::{
    CurrencyCode, RateCache, RateHistoryLog, RefreshScheduler, Side, SourceFilter, TradeEngine,
};
use crate::store::DiskStore;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_USER: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Deposit {
        currency: CurrencyCode,
        amount: Decimal,
    },
    Buy {
        currency: CurrencyCode,
        amount: Decimal,
        base: Option<CurrencyCode>,
    },
    Sell {
        currency: CurrencyCode,
        amount: Decimal,
        base: Option<CurrencyCode>,
    },
    ShowPortfolio {
        base: Option<CurrencyCode>,
    },
    GetRate {
        from: CurrencyCode,
        to: CurrencyCode,
    },
    ShowRates {
        currency: Option<CurrencyCode>,
        top: Option<usize>,
        base: Option<CurrencyCode>,
    },
    UpdateRates {
        source: SourceFilter,
    },
    History {
        from: CurrencyCode,
        to: CurrencyCode,
        limit: Option<usize>,
    },
    Schedule {
        interval_seconds: Option<u64>,
    },
}

/// Everything a command needs, built once from configuration.
pub struct App {
    pub config: AppConfig,
    pub cache: Arc<RateCache>,
    pub engine: Arc<TradeEngine>,
    pub scheduler: Arc<RefreshScheduler>,
}

impl App {
    pub fn build(config: AppConfig) -> Result<Self> {
        let store_path = Self::store_path(&config)?;
        let store = Arc::new(
            DiskStore::open(&store_path)
                .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
        );

        let history = Arc::new(RateHistoryLog::new(store.clone()));
        let cache = Arc::new(
            RateCache::load(store.clone(), history, config.rates.cache_enabled)
                .context("Failed to load cached rates")?,
        );
        let engine = Arc::new(TradeEngine::new(
            cache.clone(),
            store,
            config.rates.ttl(),
            config.base_currency,
        ));
        let registry = providers::build_registry(&config.providers)?;
        let scheduler = Arc::new(RefreshScheduler::new(cache.clone(), registry));

        Ok(Self {
            config,
            cache,
            engine,
            scheduler,
        })
    }

    fn store_path(config: &AppConfig) -> Result<PathBuf> {
        Ok(config.default_data_path()?.join("store"))
    }
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>, user: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let app = App::build(config)?;
    info!(?command, user, "Running command");

    match command {
        AppCommand::Deposit { currency, amount } => {
            cli::portfolio::deposit(&app, user, currency, amount).await
        }
        AppCommand::Buy {
            currency,
            amount,
            base,
        } => cli::portfolio::trade(&app, user, Side::Buy, currency, amount, base).await,
        AppCommand::Sell {
            currency,
            amount,
            base,
        } => cli::portfolio::trade(&app, user, Side::Sell, currency, amount, base).await,
        AppCommand::ShowPortfolio { base } => cli::portfolio::show(&app, user, base).await,
        AppCommand::GetRate { from, to } => cli::rates::get_rate(&app, from, to).await,
        AppCommand::ShowRates {
            currency,
            top,
            base,
        } => cli::rates::show_rates(&app, currency, top, base).await,
        AppCommand::UpdateRates { source } => cli::rates::update_rates(&app, source).await,
        AppCommand::History { from, to, limit } => cli::rates::history(&app, from, to, limit),
        AppCommand::Schedule { interval_seconds } => {
            cli::schedule::run(&app, interval_seconds).await
        }
    }
}
