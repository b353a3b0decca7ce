//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod currency;
pub mod error;
pub mod history;
pub mod log;
pub mod portfolio;
pub mod provider;
pub mod rate;
pub mod scheduler;
pub mod trade;

// Re-export main types for cleaner imports
pub use cache::RateCache;
pub use currency::{CurrencyCode, MarketClass, RatePair};
pub use history::{RateHistoryLog, TimeRange};
pub use portfolio::Wallet;
pub use provider::{ProviderRegistry, RateProvider, SourceFilter};
pub use rate::RateObservation;
pub use scheduler::{RefreshScheduler, RefreshSummary, SchedulerState};
pub use trade::{Side, TradeEngine, TradeRequest};
