//! Tariff table parsing.
//!
//! The source site has published its price table in more than one markup
//! layout. Each one is a variant of [`TableLayout`]; [`TableLayout::detect`]
//! picks the variant matching the fetched page and [`parse_records`] walks the
//! table with the `scraper` crate. A page is parsed with exactly one layout.
//!
//! Parsing is synchronous because `scraper` types are `!Send`. Callers on the
//! async side pass the body in and get owned records back.

use scraper::{ElementRef, Html, Selector};

use crate::types::{PriceError, PriceRecord, PriceResult};

/// Row attribute carried by every data row of the attribute-tagged layout.
pub const INVOICE_ROW_ATTR: &str = "data-invoice-id";

/// Identifier of the table in the header-driven layout.
pub const BILLING_TABLE_ID: &str = "billing_table";

const INVOICE_ROW_SELECTOR: &str = "tr[data-invoice-id]";
const BILLING_TABLE_SELECTOR: &str = "table#billing_table";
const STANDARD_PRICE_CELL: &str = "td.price.standard";
const DISCOUNTED_PRICE_CELL: &str = "td.price.discounted";

/// Minimum cells for an attribute-tagged row: provider, year, month, plan.
const MIN_TAGGED_CELLS: usize = 4;

/// Column headings of the header-driven layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderColumns {
    pub provider: String,
    pub year: String,
    pub month: String,
    pub plan: String,
    pub standard_price: String,
    pub discounted_price: String,
}

impl Default for HeaderColumns {
    fn default() -> Self {
        Self {
            provider: "Πάροχος".to_string(),
            year: "Έτος".to_string(),
            month: "Μήνας".to_string(),
            plan: "Ονομασία Τιμολογίου".to_string(),
            standard_price: "Τελική Τιμή Προμήθειας (€/MWh)".to_string(),
            discounted_price: "Τελική Τιμή Προμήθειας με Έκπτωση (€/MWh)".to_string(),
        }
    }
}

/// Known markups of the tariff table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    /// Current layout: rows tagged with `data-invoice-id`, fixed cell
    /// positions, price cells identified by CSS class.
    AttributeTagged,
    /// Earlier layout: `<table id=billing_table>` with header cells naming
    /// the columns.
    HeaderDriven,
}

impl TableLayout {
    /// Choose the layout whose marker appears in the document.
    ///
    /// The attribute-tagged layout wins when both markers are present.
    pub fn detect(html: &str) -> Option<Self> {
        if html.contains(INVOICE_ROW_ATTR) {
            Some(TableLayout::AttributeTagged)
        } else if html.contains(BILLING_TABLE_ID) {
            Some(TableLayout::HeaderDriven)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TableLayout::AttributeTagged => "attribute-tagged",
            TableLayout::HeaderDriven => "header-driven",
        }
    }
}

/// Parse a fetched page into tariff records, in document order.
///
/// Fails only when no known layout is present. Malformed rows are skipped
/// and missing cells leave the corresponding fields empty.
pub fn parse_records(html: &str) -> PriceResult<Vec<PriceRecord>> {
    let layout = TableLayout::detect(html).ok_or(PriceError::UnknownLayout)?;
    Ok(parse_with_layout(html, layout))
}

/// Parse a page with an explicitly chosen layout.
pub fn parse_with_layout(html: &str, layout: TableLayout) -> Vec<PriceRecord> {
    let document = Html::parse_document(html);
    let records = match layout {
        TableLayout::AttributeTagged => parse_attribute_tagged(&document),
        TableLayout::HeaderDriven => parse_header_driven(&document, &HeaderColumns::default()),
    };
    tracing::debug!("parsed {} record(s) using {} layout", records.len(), layout.name());
    records
}

/// Rows of the header-driven table as ordered `(heading, cell)` pairs.
///
/// Rows without `<td>` cells (the heading row) are skipped. A row shorter
/// than the heading list maps only the cells it has.
pub fn header_table_rows(document: &Html) -> Vec<Vec<(String, String)>> {
    let table_sel = selector(BILLING_TABLE_SELECTOR);
    let th_sel = selector("th");
    let tr_sel = selector("tr");
    let td_sel = selector("td");

    let Some(table) = document.select(&table_sel).next() else {
        return Vec::new();
    };

    let headers: Vec<String> = table.select(&th_sel).map(|th| cell_text(&th)).collect();

    table
        .select(&tr_sel)
        .filter_map(|tr| {
            let cells: Vec<String> = tr.select(&td_sel).map(|td| cell_text(&td)).collect();
            if cells.is_empty() {
                return None;
            }
            Some(headers.iter().cloned().zip(cells).collect())
        })
        .collect()
}

fn parse_header_driven(document: &Html, columns: &HeaderColumns) -> Vec<PriceRecord> {
    header_table_rows(document)
        .into_iter()
        .map(|row| {
            let get = |heading: &str| {
                row.iter()
                    .find(|(h, _)| h == heading)
                    .map(|(_, v)| v.clone())
            };
            PriceRecord {
                provider: get(&columns.provider).unwrap_or_default(),
                year: get(&columns.year),
                month: normalize_month(&get(&columns.month).unwrap_or_default()),
                plan: get(&columns.plan).unwrap_or_default(),
                standard_price: get(&columns.standard_price),
                discounted_price: get(&columns.discounted_price),
            }
        })
        .collect()
}

fn parse_attribute_tagged(document: &Html) -> Vec<PriceRecord> {
    let row_sel = selector(INVOICE_ROW_SELECTOR);
    let td_sel = selector("td");
    let standard_sel = selector(STANDARD_PRICE_CELL);
    let discounted_sel = selector(DISCOUNTED_PRICE_CELL);

    let mut records = Vec::new();
    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&td_sel).collect();
        if cells.len() < MIN_TAGGED_CELLS {
            tracing::debug!(
                "skipping row {:?}: {} cell(s)",
                row.value().attr(INVOICE_ROW_ATTR).unwrap_or(""),
                cells.len()
            );
            continue;
        }

        records.push(PriceRecord {
            provider: cell_text(&cells[0]),
            year: Some(cell_text(&cells[1])),
            month: normalize_month(&cell_text(&cells[2])),
            plan: cell_text(&cells[3]),
            standard_price: row.select(&standard_sel).next().map(|td| cell_text(&td)),
            discounted_price: row.select(&discounted_sel).next().map(|td| cell_text(&td)),
        });
    }
    records
}

/// Months are compared as text without a leading zero.
fn normalize_month(raw: &str) -> String {
    match raw.parse::<u32>() {
        Ok(n) => n.to_string(),
        Err(_) => raw.to_string(),
    }
}

fn cell_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}
