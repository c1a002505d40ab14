//! Persistent session cookies.
//!
//! The tariff site issues bot-mitigation cookies on the first visit and trusts
//! them on later ones. [`CookieJar`] wraps an RFC 6265 [`cookie_store`] store,
//! plugs into reqwest as the cookie provider, and can be saved to and restored
//! from a single JSON file between polls.
//!
//! Session cookies are written to disk too: the challenge cookies carry no
//! expiry, and dropping them would force a fresh challenge on every run.

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use cookie_store::{Cookie, CookieStore as Store, RawCookie};
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{PriceError, PriceResult};

/// Current file format version.
const FORMAT_VERSION: u16 = 2;

/// Cookie store shared with the HTTP client.
#[derive(Debug, Default)]
pub struct CookieJar {
    store: RwLock<Store>,
}

#[derive(Serialize, Deserialize)]
struct PersistedJar {
    version: u16,
    saved_at: DateTime<Utc>,
    cookies: Vec<Cookie<'static>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a jar previously written by [`CookieJar::save`].
    ///
    /// Cookies that expired while on disk are dropped.
    pub fn load(path: &Path) -> PriceResult<Self> {
        let bytes = std::fs::read(path)?;
        let persisted: PersistedJar = serde_json::from_slice(&bytes)?;
        if persisted.version != FORMAT_VERSION {
            return Err(PriceError::CookieJar(format!(
                "unsupported version {} in {}",
                persisted.version,
                path.display()
            )));
        }
        let store = Store::from_cookies(
            persisted.cookies.into_iter().map(Ok::<_, std::convert::Infallible>),
            false,
        )
        .unwrap_or_default();
        Ok(Self {
            store: RwLock::new(store),
        })
    }

    /// Write the unexpired cookies to `path`, replacing any earlier file.
    pub fn save(&self, path: &Path) -> PriceResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let persisted = PersistedJar {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            cookies: self.read().iter_unexpired().cloned().collect(),
        };
        let payload = serde_json::to_vec_pretty(&persisted)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Value of the unexpired cookie called `name`, whatever its domain.
    pub fn get(&self, name: &str) -> Option<String> {
        self.read()
            .iter_unexpired()
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    /// Number of unexpired cookies.
    pub fn len(&self) -> usize {
        self.read().iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply one `Set-Cookie` header value received from `url`.
    ///
    /// A value with a past `Expires` or a non-positive `Max-Age` removes the
    /// stored cookie. Values the store rejects (bad syntax, foreign domain)
    /// are logged and ignored.
    pub fn apply_set_cookie(&self, header: &str, url: &Url) {
        if let Err(e) = self.write().parse(header, url) {
            tracing::debug!("ignoring Set-Cookie from {url}: {e}");
        }
    }

    /// The `Cookie` request header for `url`.
    pub fn header_value(&self, url: &Url) -> Option<String> {
        let store = self.read();
        let pairs: Vec<String> = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies = cookie_headers
            .filter_map(|value| value.to_str().ok())
            .filter_map(|text| RawCookie::parse(text.to_owned()).ok());
        self.write().store_response_cookies(cookies, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_value(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Url {
        Url::parse("https://invoices.rae.gr/oikiako/").unwrap()
    }

    #[test]
    fn test_apply_and_header() {
        let jar = CookieJar::new();
        assert!(jar.header_value(&site()).is_none());

        jar.apply_set_cookie("b=2; Path=/", &site());
        jar.apply_set_cookie("a=1; Path=/", &site());
        let header = jar.header_value(&site()).unwrap();
        assert!(header.contains("a=1"));
        assert!(header.contains("b=2"));
        assert_eq!(jar.len(), 2);
    }

    #[test]
    fn test_max_age_zero_removes() {
        let jar = CookieJar::new();
        jar.apply_set_cookie("incap_ses=xyz; Path=/", &site());
        jar.apply_set_cookie("incap_ses=xyz; Max-Age=0; Path=/", &site());
        assert_eq!(jar.get("incap_ses"), None);
        assert!(jar.is_empty());
    }

    #[test]
    fn test_past_expires_removes() {
        let jar = CookieJar::new();
        jar.apply_set_cookie("incap_ses=live; Path=/", &site());
        jar.apply_set_cookie(
            "incap_ses=stale; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            &site(),
        );
        assert_eq!(jar.get("incap_ses"), None);
        assert!(jar.header_value(&site()).is_none());
    }

    #[test]
    fn test_cookies_scoped_to_host() {
        let jar = CookieJar::new();
        let headers = [HeaderValue::from_static("visid_incap=secret; Path=/")];
        jar.set_cookies(&mut headers.iter(), &site());

        let value = jar.cookies(&site()).unwrap();
        assert_eq!(value.to_str().unwrap(), "visid_incap=secret");

        let other = Url::parse("https://evil.example.com/").unwrap();
        assert!(jar.cookies(&other).is_none());
    }

    #[test]
    fn test_foreign_domain_rejected() {
        let jar = CookieJar::new();
        jar.apply_set_cookie("x=1; Domain=example.com; Path=/", &site());
        assert!(jar.is_empty());
    }

    #[test]
    fn test_file_roundtrip_keeps_session_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cookies.json");

        let jar = CookieJar::new();
        jar.apply_set_cookie("visid=v1; Path=/", &site());
        jar.apply_set_cookie(
            "long=l1; Path=/; Expires=Fri, 01 Jan 2100 00:00:00 GMT",
            &site(),
        );
        jar.save(&path).unwrap();

        let loaded = CookieJar::load(&path).unwrap();
        assert_eq!(loaded.get("visid").as_deref(), Some("v1"));
        assert_eq!(loaded.get("long").as_deref(), Some("l1"));
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CookieJar::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(CookieJar::load(&path), Err(PriceError::Json(_))));
    }

    #[test]
    fn test_load_wrong_version_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            br#"{"version":99,"saved_at":"2026-01-01T00:00:00Z","cookies":[]}"#,
        )
        .unwrap();
        assert!(matches!(CookieJar::load(&path), Err(PriceError::CookieJar(_))));
    }
}
