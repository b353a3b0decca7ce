//! Buy/sell execution against cached rates

use crate::core::cache::RateCache;
use crate::core::currency::{CurrencyCode, RatePair};
use crate::core::error::{RateError, TradeError};
use crate::core::log::ACTIONS_TARGET;
use crate::core::portfolio::Wallet;
use crate::core::rate::{CacheEntry, RateObservation};
use crate::store::PortfolioStore;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, field, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    pub user: String,
    pub side: Side,
    pub currency: CurrencyCode,
    pub amount: Decimal,
    /// Settlement currency; the engine default when `None`.
    pub base: Option<CurrencyCode>,
}

#[derive(Debug, Clone)]
pub struct TradeResult {
    pub user: String,
    pub side: Side,
    pub currency: CurrencyCode,
    pub base: CurrencyCode,
    pub amount: Decimal,
    /// Units of `base` per one `currency`.
    pub rate: Decimal,
    /// Cost of a buy or proceeds of a sell, in `base`.
    pub value: Decimal,
    pub wallet: Wallet,
}

/// One wallet line valued in a base currency.
#[derive(Debug, Clone)]
pub struct Holding {
    pub currency: CurrencyCode,
    pub amount: Decimal,
    pub value: Result<Decimal, RateError>,
}

#[derive(Debug, Clone)]
pub struct PortfolioValuation {
    pub user: String,
    pub base: CurrencyCode,
    pub holdings: Vec<Holding>,
    /// Sum over the holdings that could be priced.
    pub total: Decimal,
}

type WalletSlot = Arc<Mutex<Option<Wallet>>>;

/// Applies trades and deposits to user wallets.
///
/// Each user's wallet lives in its own slot; the slot mutex serializes every
/// read-modify-write of that wallet, including persisting it. Quotes are
/// resolved before the slot is locked.
pub struct TradeEngine {
    rates: Arc<RateCache>,
    portfolios: Arc<dyn PortfolioStore>,
    wallets: Mutex<HashMap<String, WalletSlot>>,
    ttl: Duration,
    base: CurrencyCode,
}

impl TradeEngine {
    pub fn new(
        rates: Arc<RateCache>,
        portfolios: Arc<dyn PortfolioStore>,
        ttl: Duration,
        base: CurrencyCode,
    ) -> Self {
        Self {
            rates,
            portfolios,
            wallets: Mutex::new(HashMap::new()),
            ttl,
            base,
        }
    }

    pub fn base(&self) -> CurrencyCode {
        self.base
    }

    pub async fn buy(
        &self,
        user: &str,
        currency: CurrencyCode,
        amount: Decimal,
    ) -> Result<TradeResult, TradeError> {
        self.execute(TradeRequest {
            user: user.to_string(),
            side: Side::Buy,
            currency,
            amount,
            base: None,
        })
        .await
    }

    pub async fn sell(
        &self,
        user: &str,
        currency: CurrencyCode,
        amount: Decimal,
    ) -> Result<TradeResult, TradeError> {
        self.execute(TradeRequest {
            user: user.to_string(),
            side: Side::Sell,
            currency,
            amount,
            base: None,
        })
        .await
    }

    pub async fn execute(&self, request: TradeRequest) -> Result<TradeResult, TradeError> {
        let base = request.base.unwrap_or(self.base);
        let result = self.apply_trade(&request, base).await;

        let rate = result.as_ref().ok().map(|r| r.rate);
        record_action(
            &request.side.to_string(),
            &request.user,
            request.currency,
            request.amount,
            rate,
            base,
            result.as_ref().err(),
        );
        result
    }

    async fn apply_trade(
        &self,
        request: &TradeRequest,
        base: CurrencyCode,
    ) -> Result<TradeResult, TradeError> {
        if request.amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(request.amount));
        }
        let quote = self.quote(request.currency, base).await?;
        let rate = quote.rate();
        let value = request
            .amount
            .checked_mul(rate)
            .ok_or(TradeError::InvalidAmount(request.amount))?;
        debug!(%quote, %value, "Resolved trade quote");

        let wallet = self
            .update_wallet(&request.user, false, |wallet| match request.side {
                Side::Buy => wallet.exchange(base, value, request.currency, request.amount),
                Side::Sell => wallet.exchange(request.currency, request.amount, base, value),
            })
            .await?;

        Ok(TradeResult {
            user: request.user.clone(),
            side: request.side,
            currency: request.currency,
            base,
            amount: request.amount,
            rate,
            value,
            wallet,
        })
    }

    /// Credits `amount` of `currency`, creating the portfolio on first use.
    pub async fn deposit(
        &self,
        user: &str,
        currency: CurrencyCode,
        amount: Decimal,
    ) -> Result<Wallet, TradeError> {
        let result = if amount <= Decimal::ZERO {
            Err(TradeError::InvalidAmount(amount))
        } else {
            self.update_wallet(user, true, |wallet| wallet.credit(currency, amount).map(|_| ()))
                .await
        };
        record_action(
            "deposit",
            user,
            currency,
            amount,
            None,
            currency,
            result.as_ref().err(),
        );
        result
    }

    pub async fn portfolio(&self, user: &str) -> Result<Wallet, TradeError> {
        let slot = self.slot(user).await;
        let mut wallet = slot.lock().await;
        if wallet.is_none() {
            *wallet = self.portfolios.load_wallet(user)?;
        }
        wallet
            .clone()
            .ok_or_else(|| TradeError::PortfolioNotFound(user.to_string()))
    }

    /// Values every holding in `base` with fresh quotes. Holdings that cannot
    /// be priced carry their error and are left out of the total.
    pub async fn portfolio_value(
        &self,
        user: &str,
        base: CurrencyCode,
    ) -> Result<PortfolioValuation, TradeError> {
        let wallet = self.portfolio(user).await?;
        let mut holdings = Vec::new();
        let mut total = Decimal::ZERO;

        for (&currency, &amount) in wallet.balances() {
            let overflow = RateError::ValueOverflow { currency, amount };
            let mut value = if currency == base || amount.is_zero() {
                Ok(amount)
            } else {
                self.quote(currency, base).await.and_then(|quote| {
                    amount.checked_mul(quote.rate()).ok_or(overflow.clone())
                })
            };
            if let Ok(v) = value {
                match total.checked_add(v) {
                    Some(sum) => total = sum,
                    None => value = Err(overflow),
                }
            }
            holdings.push(Holding {
                currency,
                amount,
                value,
            });
        }

        Ok(PortfolioValuation {
            user: user.to_string(),
            base,
            holdings,
            total,
        })
    }

    pub async fn get_rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
    ) -> Result<RateObservation, RateError> {
        self.quote(from, to).await
    }

    /// Every cached entry, fresh or not, ordered by pair.
    pub async fn list_rates(&self) -> Vec<CacheEntry> {
        self.rates.snapshot_all().await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Freshness-checked rate for `from -> to`: the cached pair, else the
    /// inverse pair, else a cross rate through USD.
    pub async fn quote(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
    ) -> Result<RateObservation, RateError> {
        let pair = RatePair::new(from, to)?;
        let now = Utc::now();

        match self.direct_or_inverse(pair, now).await {
            Err(RateError::Missing(_)) => {}
            other => return other,
        }
        if from == CurrencyCode::Usd || to == CurrencyCode::Usd {
            return Err(RateError::Missing(pair));
        }

        let from_leg = self.leg(from, now, pair).await?;
        let to_leg = self.leg(to, now, pair).await?;
        let rate = from_leg
            .rate()
            .checked_div(to_leg.rate())
            .ok_or(RateError::InvalidRate {
                pair,
                rate: from_leg.rate(),
            })?
            .normalize();
        let source = format!("derived({}, {})", from_leg.source(), to_leg.source());
        let timestamp = from_leg.timestamp().min(to_leg.timestamp());
        RateObservation::new(pair, rate, source, timestamp)
    }

    async fn leg(
        &self,
        code: CurrencyCode,
        now: DateTime<Utc>,
        requested: RatePair,
    ) -> Result<RateObservation, RateError> {
        let pair = RatePair::new(code, CurrencyCode::Usd)?;
        self.direct_or_inverse(pair, now)
            .await
            .map_err(|e| match e {
                RateError::Missing(_) => RateError::Missing(requested),
                other => other,
            })
    }

    async fn direct_or_inverse(
        &self,
        pair: RatePair,
        now: DateTime<Utc>,
    ) -> Result<RateObservation, RateError> {
        match self.rates.get(pair, now, self.ttl).await {
            Err(RateError::Missing(_)) => {}
            other => return other,
        }
        self.rates
            .get(pair.inverse(), now, self.ttl)
            .await
            .map(|obs| obs.inverted())
            .map_err(|e| match e {
                RateError::Missing(_) => RateError::Missing(pair),
                other => other,
            })
    }

    async fn slot(&self, user: &str) -> WalletSlot {
        let mut wallets = self.wallets.lock().await;
        Arc::clone(wallets.entry(user.to_string()).or_default())
    }

    /// Runs `mutate` on a copy of the wallet, persists the copy and only then
    /// makes it current. A failed mutation or write leaves the wallet as it
    /// was.
    async fn update_wallet<F>(&self, user: &str, create: bool, mutate: F) -> Result<Wallet, TradeError>
    where
        F: FnOnce(&mut Wallet) -> Result<(), TradeError>,
    {
        let slot = self.slot(user).await;
        let mut current = slot.lock().await;
        if current.is_none() {
            *current = self.portfolios.load_wallet(user)?;
        }

        let mut updated = match current.as_ref() {
            Some(wallet) => wallet.clone(),
            None if create => Wallet::default(),
            None => return Err(TradeError::PortfolioNotFound(user.to_string())),
        };
        mutate(&mut updated)?;

        self.portfolios.save_wallet(user, &updated)?;
        *current = Some(updated.clone());
        Ok(updated)
    }
}

fn record_action(
    action: &str,
    user: &str,
    currency: CurrencyCode,
    amount: Decimal,
    rate: Option<Decimal>,
    base: CurrencyCode,
    error: Option<&TradeError>,
) {
    match error {
        None => info!(
            target: ACTIONS_TARGET,
            action,
            user,
            %currency,
            %amount,
            rate = rate.map(field::display),
            %base,
            result = "OK"
        ),
        Some(e) => warn!(
            target: ACTIONS_TARGET,
            action,
            user,
            %currency,
            %amount,
            %base,
            result = "ERROR",
            error_type = e.kind(),
            error = %e
        ),
    }
}
