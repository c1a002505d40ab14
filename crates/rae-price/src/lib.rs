//! Page acquisition, tariff table parsing, and price resolution for RAE tariffs.

pub mod cookies;
pub mod fetcher;
pub mod parser;
pub mod resolver;
pub mod types;

pub use cookies::CookieJar;
pub use fetcher::{FetchOptions, Fetcher, PageKind, RawDocument};
pub use parser::{parse_records, TableLayout};
pub use resolver::{previous_month, resolve, SEARCH_WINDOW_MONTHS};
pub use types::*;
