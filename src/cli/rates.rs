use super::ui;
use crate::App;
use crate::core::error::SchedulerError;
use crate::core::rate::{CacheEntry, format_timestamp};
use crate::core::{CurrencyCode, MarketClass, RatePair, RefreshSummary, SourceFilter, TimeRange};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use comfy_table::Cell;
use rust_decimal::Decimal;

/// One displayed rate line.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub pair: RatePair,
    pub rate: Decimal,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&CacheEntry> for RateRow {
    fn from(entry: &CacheEntry) -> Self {
        let obs = entry.observation();
        RateRow {
            pair: obs.pair(),
            rate: obs.rate(),
            source: obs.source().to_string(),
            updated_at: obs.timestamp(),
        }
    }
}

pub async fn get_rate(app: &App, from: CurrencyCode, to: CurrencyCode) -> Result<()> {
    let quote = app.engine.get_rate(from, to).await?;
    let inverse = (Decimal::ONE / quote.rate()).round_dp(8).normalize();
    println!(
        "Rate {from}→{to}: {} (updated {}, source {})",
        ui::style_text(&quote.rate().normalize().to_string(), ui::StyleType::TotalValue),
        format_timestamp(quote.timestamp()),
        quote.source()
    );
    println!(
        "{}",
        ui::style_text(&format!("Inverse {to}→{from}: {inverse}"), ui::StyleType::Subtle)
    );
    Ok(())
}

pub async fn show_rates(
    app: &App,
    currency: Option<CurrencyCode>,
    top: Option<usize>,
    base: Option<CurrencyCode>,
) -> Result<()> {
    let entries = app.engine.list_rates().await;
    if entries.is_empty() {
        println!("The rate cache is empty. Run 'update-rates' to fetch current rates.");
        return Ok(());
    }

    let all: Vec<RateRow> = entries.iter().map(RateRow::from).collect();
    let mut rows = select_rates(&all, currency, top);
    if let Some(base) = base {
        rows = rebase(&all, &rows, base)?;
    }
    if rows.is_empty() {
        println!("No cached rates match the filter.");
        return Ok(());
    }

    let last_refresh = app.cache.last_refresh().await;
    println!("{}", rates_table(&rows, Utc::now(), app.engine.ttl(), last_refresh));
    Ok(())
}

pub async fn update_rates(app: &App, source: SourceFilter) -> Result<()> {
    let spinner = ui::new_spinner(&format!("Updating {source} rates"));
    let result = app.scheduler.run_once(source).await;
    spinner.finish_and_clear();

    match result {
        Ok(summary) => {
            println!("{}", summary_text(&summary));
            Ok(())
        }
        Err(SchedulerError::Busy) => Err(anyhow!("A rate update is already running")),
        Err(e) => Err(e).context("Rate update failed"),
    }
}

pub fn history(app: &App, from: CurrencyCode, to: CurrencyCode, limit: Option<usize>) -> Result<()> {
    let pair = RatePair::new(from, to)?;
    let observations = app
        .cache
        .history()
        .query(pair, TimeRange::all())
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read rate history")?;

    if observations.is_empty() {
        println!("No history recorded for {pair}.");
        return Ok(());
    }

    let skip = limit.map_or(0, |n| observations.len().saturating_sub(n));
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Timestamp"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
    ]);
    for obs in &observations[skip..] {
        table.add_row(vec![
            Cell::new(obs.timestamp().format("%Y-%m-%d %H:%M:%S").to_string()),
            ui::decimal_cell(obs.rate()),
            Cell::new(obs.source()),
        ]);
    }
    println!(
        "History: {}\n\n{table}",
        ui::style_text(&pair.to_string(), ui::StyleType::Title)
    );
    Ok(())
}

/// Applies the `--currency` and `--top` filters. `top` keeps the most
/// valuable crypto rates.
pub fn select_rates(rows: &[RateRow], currency: Option<CurrencyCode>, top: Option<usize>) -> Vec<RateRow> {
    let mut selected: Vec<RateRow> = rows
        .iter()
        .filter(|row| currency.is_none_or(|c| row.pair.from() == c))
        .cloned()
        .collect();

    if let Some(n) = top {
        selected.retain(|row| row.pair.from().market() == MarketClass::Crypto);
        selected.sort_by(|a, b| b.rate.cmp(&a.rate));
        selected.truncate(n);
    }
    selected
}

/// Re-expresses USD quoted rows in `base`, using the cached `base`/USD rate.
pub fn rebase(all: &[RateRow], rows: &[RateRow], base: CurrencyCode) -> Result<Vec<RateRow>> {
    if base == CurrencyCode::Usd {
        return Ok(rows.to_vec());
    }
    let base_usd = all
        .iter()
        .find(|row| row.pair.from() == base && row.pair.to() == CurrencyCode::Usd)
        .ok_or_else(|| anyhow!("No cached {base}_USD rate to convert with"))?;

    let mut rebased = Vec::new();
    for row in rows {
        if row.pair.from() == base || row.pair.to() != CurrencyCode::Usd {
            continue;
        }
        let rate = row
            .rate
            .checked_div(base_usd.rate)
            .ok_or_else(|| anyhow!("Cannot convert {} to {base}", row.pair))?;
        rebased.push(RateRow {
            pair: RatePair::new(row.pair.from(), base)?,
            rate: rate.normalize(),
            source: row.source.clone(),
            updated_at: row.updated_at.min(base_usd.updated_at),
        });
    }
    Ok(rebased)
}

fn rates_table(
    rows: &[RateRow],
    now: DateTime<Utc>,
    ttl: chrono::Duration,
    last_refresh: Option<DateTime<Utc>>,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
        ui::header_cell("Updated"),
        ui::header_cell("Age"),
        ui::header_cell("Status"),
    ]);
    for row in rows {
        let age = now - row.updated_at;
        table.add_row(vec![
            Cell::new(row.pair.to_string()),
            ui::decimal_cell(row.rate.round_dp(8)),
            Cell::new(&row.source),
            Cell::new(row.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(ui::format_age(age)),
            ui::freshness_cell(age <= ttl),
        ]);
    }

    let mut output = table.to_string();
    if let Some(ts) = last_refresh {
        output.push_str(&ui::style_text(
            &format!("\nLast refresh: {}", format_timestamp(ts)),
            ui::StyleType::Subtle,
        ));
    }
    output
}

fn summary_text(summary: &RefreshSummary) -> String {
    let status = if summary.failed == 0 && summary.errors.is_empty() {
        ui::style_text("Rates updated", ui::StyleType::Success)
    } else {
        ui::style_text("Rates updated with errors", ui::StyleType::Error)
    };
    let mut output = format!("{status}: {summary}");
    for error in &summary.errors {
        output.push_str(&format!("\n  - {}", ui::style_text(error, ui::StyleType::Error)));
    }
    output
}
