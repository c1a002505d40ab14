//! Price lookup with month fallback.
//!
//! The table is searched for the reference month first. When nothing usable
//! matches, the search steps back one calendar month at a time, for at most
//! [`SEARCH_WINDOW_MONTHS`] months including the reference month. Within a
//! month, the first record in document order with a parseable price wins.

use chrono::{Datelike, Months, NaiveDate};

use crate::types::{PriceRecord, PriceVariant, ResolvedPrice, KWH_PER_MWH};

/// Reference month plus the eleven before it.
pub const SEARCH_WINDOW_MONTHS: u32 = 12;

/// Search `records` for the provider/plan price, newest month first.
///
/// Returns `None` when no month in the window has a usable match. Values are
/// normalized from per-MWh to EUR/kWh for every layout.
pub fn resolve(
    records: &[PriceRecord],
    provider: &str,
    plan: &str,
    variant: PriceVariant,
    reference: NaiveDate,
) -> Option<ResolvedPrice> {
    let mut date = reference;

    for attempt in 0..SEARCH_WINDOW_MONTHS {
        if attempt > 0 {
            date = previous_month(date);
        }
        let month = date.month();
        let month_text = month.to_string();
        tracing::debug!("searching {provider}/{plan} for {}-{month:02}", date.year());

        if let Some(per_mwh) = first_price_in_month(records, provider, plan, &month_text, variant) {
            return Some(ResolvedPrice {
                price: per_mwh / KWH_PER_MWH,
                month_found: month,
            });
        }
    }

    tracing::info!(
        "no price for {provider}/{plan} within {SEARCH_WINDOW_MONTHS} months of {reference}"
    );
    None
}

fn first_price_in_month(
    records: &[PriceRecord],
    provider: &str,
    plan: &str,
    month: &str,
    variant: PriceVariant,
) -> Option<f64> {
    records
        .iter()
        .filter(|r| r.provider == provider && r.plan == plan && r.month == month)
        .find_map(|r| match r.price_per_mwh(variant) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("skipping {provider}/{plan} record for month {month}: {e}");
                None
            }
        })
}

/// First day of the month before `date`.
///
/// Stepping back from January lands on December of the previous year.
pub fn previous_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_sub_months(Months::new(1))
        .unwrap_or(first)
}
