//! Wallet balances

use crate::core::currency::CurrencyCode;
use crate::core::error::TradeError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Non-negative balances per currency, owned by one portfolio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wallet {
    balances: BTreeMap<CurrencyCode, Decimal>,
}

impl Wallet {
    /// Builds a wallet from stored balances, rejecting negative ones.
    pub fn from_balances(balances: BTreeMap<CurrencyCode, Decimal>) -> Result<Self, String> {
        if let Some((code, balance)) = balances.iter().find(|(_, b)| **b < Decimal::ZERO) {
            return Err(format!("negative {code} balance {balance}"));
        }
        Ok(Self { balances })
    }

    pub fn balance(&self, code: CurrencyCode) -> Decimal {
        self.balances.get(&code).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn balances(&self) -> &BTreeMap<CurrencyCode, Decimal> {
        &self.balances
    }

    pub fn credit(&mut self, code: CurrencyCode, amount: Decimal) -> Result<Decimal, TradeError> {
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(amount));
        }
        let balance = self
            .balance(code)
            .checked_add(amount)
            .ok_or(TradeError::InvalidAmount(amount))?;
        self.balances.insert(code, balance);
        Ok(balance)
    }

    pub fn debit(&mut self, code: CurrencyCode, amount: Decimal) -> Result<Decimal, TradeError> {
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(amount));
        }
        let available = self.balance(code);
        if available < amount {
            return Err(TradeError::InsufficientFunds {
                currency: code,
                required: amount,
                available,
            });
        }
        let remaining = available - amount;
        self.balances.insert(code, remaining);
        Ok(remaining)
    }

    /// Moves value between two currencies in one step: `debit` leaves
    /// `from_code` and `credit` lands in `to_code`, or nothing changes.
    pub fn exchange(
        &mut self,
        from_code: CurrencyCode,
        debit: Decimal,
        to_code: CurrencyCode,
        credit: Decimal,
    ) -> Result<(), TradeError> {
        if credit <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(credit));
        }
        let mut next = self.clone();
        next.debit(from_code, debit)?;
        next.credit(to_code, credit)?;
        *self = next;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.balances.values().all(|b| b.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_credit_and_debit() {
        let mut wallet = Wallet::default();
        assert_eq!(wallet.balance(CurrencyCode::Usd), Decimal::ZERO);
        assert_eq!(wallet.credit(CurrencyCode::Usd, dec!(100)).unwrap(), dec!(100));
        assert_eq!(wallet.debit(CurrencyCode::Usd, dec!(40.5)).unwrap(), dec!(59.5));
        assert_eq!(wallet.debit(CurrencyCode::Usd, dec!(59.5)).unwrap(), Decimal::ZERO);
        assert!(wallet.is_empty());
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut wallet = Wallet::default();
        wallet.credit(CurrencyCode::Eur, dec!(10)).unwrap();
        let err = wallet.debit(CurrencyCode::Eur, dec!(10.01)).unwrap_err();
        assert!(matches!(
            err,
            TradeError::InsufficientFunds { currency: CurrencyCode::Eur, required, available }
                if required == dec!(10.01) && available == dec!(10)
        ));
        assert_eq!(wallet.balance(CurrencyCode::Eur), dec!(10));
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        let mut wallet = Wallet::default();
        assert!(matches!(
            wallet.credit(CurrencyCode::Usd, dec!(0)),
            Err(TradeError::InvalidAmount(_))
        ));
        assert!(matches!(
            wallet.debit(CurrencyCode::Usd, dec!(-1)),
            Err(TradeError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_exchange_is_all_or_nothing() {
        let mut wallet = Wallet::default();
        wallet.credit(CurrencyCode::Usd, dec!(100)).unwrap();
        let before = wallet.clone();

        assert!(wallet
            .exchange(CurrencyCode::Usd, dec!(150), CurrencyCode::Btc, dec!(0.001))
            .is_err());
        assert_eq!(wallet, before);

        wallet
            .exchange(CurrencyCode::Usd, dec!(95), CurrencyCode::Btc, dec!(0.001))
            .unwrap();
        assert_eq!(wallet.balance(CurrencyCode::Usd), dec!(5));
        assert_eq!(wallet.balance(CurrencyCode::Btc), dec!(0.001));
    }

    #[test]
    fn test_credit_overflow_is_rejected() {
        let mut wallet = Wallet::default();
        wallet.credit(CurrencyCode::Usd, Decimal::MAX).unwrap();
        assert!(matches!(
            wallet.credit(CurrencyCode::Usd, dec!(1)),
            Err(TradeError::InvalidAmount(_))
        ));
        assert_eq!(wallet.balance(CurrencyCode::Usd), Decimal::MAX);
    }

    #[test]
    fn test_exchange_rolls_back_when_credit_overflows() {
        let mut wallet = Wallet::default();
        wallet.credit(CurrencyCode::Usd, Decimal::MAX).unwrap();
        wallet.credit(CurrencyCode::Btc, dec!(1)).unwrap();
        let before = wallet.clone();

        assert!(wallet
            .exchange(CurrencyCode::Btc, dec!(1), CurrencyCode::Usd, dec!(95000))
            .is_err());
        assert_eq!(wallet, before);
    }

    #[test]
    fn test_from_balances_rejects_negative() {
        let mut balances = BTreeMap::new();
        balances.insert(CurrencyCode::Usd, dec!(-5));
        assert!(Wallet::from_balances(balances).is_err());
    }
}
