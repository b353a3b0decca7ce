use super::ui;
use crate::App;
use crate::core::trade::{PortfolioValuation, TradeResult};
use crate::core::{CurrencyCode, Side, TradeRequest, Wallet};
use anyhow::Result;
use comfy_table::Cell;
use rust_decimal::Decimal;

pub async fn deposit(app: &App, user: &str, currency: CurrencyCode, amount: Decimal) -> Result<()> {
    let wallet = app.engine.deposit(user, currency, amount).await?;
    println!(
        "Deposited {} {currency} for '{user}'",
        ui::style_text(&amount.normalize().to_string(), ui::StyleType::Success)
    );
    println!("{}", wallet_table(&wallet));
    Ok(())
}

pub async fn trade(
    app: &App,
    user: &str,
    side: Side,
    currency: CurrencyCode,
    amount: Decimal,
    base: Option<CurrencyCode>,
) -> Result<()> {
    let result = app
        .engine
        .execute(TradeRequest {
            user: user.to_string(),
            side,
            currency,
            amount,
            base,
        })
        .await?;
    println!("{}", trade_summary(&result));
    Ok(())
}

pub async fn show(app: &App, user: &str, base: Option<CurrencyCode>) -> Result<()> {
    let base = base.unwrap_or(app.engine.base());
    let valuation = app.engine.portfolio_value(user, base).await?;
    println!("{}", valuation_table(&valuation));
    Ok(())
}

pub fn trade_summary(result: &TradeResult) -> String {
    let (verb, value_label) = match result.side {
        Side::Buy => ("Bought", "Cost"),
        Side::Sell => ("Sold", "Proceeds"),
    };
    let mut output = format!(
        "{verb} {} {} at {} {} per {}\n{value_label}: {} {}\n\n",
        result.amount.normalize(),
        result.currency,
        result.rate.normalize(),
        result.base,
        result.currency,
        ui::style_text(&result.value.round_dp(8).normalize().to_string(), ui::StyleType::TotalValue),
        result.base,
    );
    output.push_str(&wallet_table(&result.wallet).to_string());
    output
}

fn wallet_table(wallet: &Wallet) -> comfy_table::Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Currency"), ui::header_cell("Balance")]);
    for (currency, balance) in wallet.balances() {
        table.add_row(vec![Cell::new(currency.to_string()), ui::decimal_cell(*balance)]);
    }
    table
}

pub fn valuation_table(valuation: &PortfolioValuation) -> String {
    let base = valuation.base;
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell("Balance"),
        ui::header_cell(&format!("Value ({base})")),
    ]);

    let mut unpriced = Vec::new();
    for holding in &valuation.holdings {
        let value = match &holding.value {
            Ok(v) => ui::decimal_cell(v.round_dp(2)),
            Err(e) => {
                unpriced.push(format!("{}: {e}", holding.currency));
                ui::na_cell(true)
            }
        };
        table.add_row(vec![
            Cell::new(holding.currency.to_string()),
            ui::decimal_cell(holding.amount),
            value,
        ]);
    }

    let mut output = format!(
        "Portfolio: {}\n\n",
        ui::style_text(&valuation.user, ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\nTotal Value ({}): {}",
        ui::style_text(base.code(), ui::StyleType::TotalLabel),
        ui::style_text(
            &valuation.total.round_dp(2).to_string(),
            ui::StyleType::TotalValue
        )
    ));
    for line in unpriced {
        output.push('\n');
        output.push_str(&ui::style_text(&line, ui::StyleType::Error));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RateError;
    use crate::core::trade::Holding;
    use crate::core::RatePair;
    use rust_decimal_macros::dec;

    #[test]
    fn test_valuation_table_lists_unpriced_holdings() {
        let valuation = PortfolioValuation {
            user: "alice".to_string(),
            base: CurrencyCode::Usd,
            holdings: vec![
                Holding {
                    currency: CurrencyCode::Btc,
                    amount: dec!(0.1),
                    value: Ok(dec!(9500)),
                },
                Holding {
                    currency: CurrencyCode::Sol,
                    amount: dec!(3),
                    value: Err(RateError::Missing(
                        RatePair::new(CurrencyCode::Sol, CurrencyCode::Usd).unwrap(),
                    )),
                },
            ],
            total: dec!(9500),
        };

        let output = console::strip_ansi_codes(&valuation_table(&valuation)).to_string();
        assert!(output.contains("alice"));
        assert!(output.contains("Value (USD)"));
        assert!(output.contains("9500"));
        assert!(output.contains("N/A"));
        assert!(output.contains("SOL: no cached rate for SOL_USD"));
    }

    #[test]
    fn test_trade_summary() {
        let mut wallet = Wallet::default();
        wallet.credit(CurrencyCode::Usd, dec!(500)).unwrap();
        wallet.credit(CurrencyCode::Btc, dec!(0.1)).unwrap();
        let result = TradeResult {
            user: "alice".to_string(),
            side: Side::Buy,
            currency: CurrencyCode::Btc,
            base: CurrencyCode::Usd,
            amount: dec!(0.1),
            rate: dec!(95000),
            value: dec!(9500.0),
            wallet,
        };

        let output = console::strip_ansi_codes(&trade_summary(&result)).to_string();
        assert!(output.contains("Bought 0.1 BTC at 95000 USD per BTC"));
        assert!(output.contains("Cost: 9500 USD"));
        assert!(output.contains("500"));
    }
}
