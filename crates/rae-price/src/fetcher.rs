//! Async page acquisition wrapping reqwest.
//!
//! Imitates a person opening the site: browser-like headers, a visit to the
//! root page first, a short randomized pause, then the pricing page with a
//! `Referer`. Cookies live in a [`CookieJar`] that is restored from and saved
//! to disk on a best-effort basis. 5xx responses are retried with exponential
//! backoff; a bot-challenge page earns exactly one more attempt after a
//! cooldown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::Instrument;
use url::Url;

use crate::cookies::CookieJar;
use crate::parser::TableLayout;
use crate::types::{PriceError, PriceResult};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Substrings served by the bot-mitigation interstitial.
const CHALLENGE_MARKERS: &[&str] = &[
    "_Incapsula_Resource",
    "Incapsula incident ID",
    "Request unsuccessful. Incapsula",
];

/// Statuses worth another attempt.
const RETRY_STATUSES: &[u16] = &[500, 502, 503, 504];

/// Tunables for [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts per request when the server answers 5xx.
    pub max_attempts: u32,
    /// First backoff delay; doubled after every retry.
    pub backoff_base: Duration,
    /// Lower bound of the pause between root page and target page.
    pub navigation_delay_min: Duration,
    /// Upper bound of the pause between root page and target page.
    pub navigation_delay_max: Duration,
    /// Wait before re-requesting after a bot-challenge page.
    pub challenge_cooldown: Duration,
    /// Skip TLS certificate verification. The tariff site has served broken
    /// chains; this is only ever set for that endpoint.
    pub accept_invalid_certs: bool,
    /// Where session cookies persist between runs. `None` keeps them in memory.
    pub cookie_jar_path: Option<PathBuf>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            navigation_delay_min: Duration::from_secs(2),
            navigation_delay_max: Duration::from_secs(4),
            challenge_cooldown: Duration::from_secs(5),
            accept_invalid_certs: true,
            cookie_jar_path: None,
        }
    }
}

/// A fetched page.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// What a response body turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// The tariff table, in the given layout.
    Data(TableLayout),
    /// A bot-challenge interstitial.
    Challenge,
    /// Neither.
    Unrecognized,
}

impl PageKind {
    pub fn classify(body: &str) -> Self {
        if let Some(layout) = TableLayout::detect(body) {
            PageKind::Data(layout)
        } else if CHALLENGE_MARKERS.iter().any(|m| body.contains(m)) {
            PageKind::Challenge
        } else {
            PageKind::Unrecognized
        }
    }
}

/// HTTP client for the tariff page.
pub struct Fetcher {
    client: reqwest::Client,
    jar: Arc<CookieJar>,
    options: FetchOptions,
    span: tracing::Span,
}

impl Fetcher {
    /// Build the client, restoring any saved cookies.
    ///
    /// A missing or unreadable cookie file is logged and ignored.
    pub fn new(options: FetchOptions) -> PriceResult<Self> {
        let span = tracing::info_span!("fetcher", url = tracing::field::Empty);

        let restored = options.cookie_jar_path.as_ref().and_then(|path| {
            if !path.exists() {
                tracing::debug!(parent: &span, "no cookie jar at {}", path.display());
                return None;
            }
            match CookieJar::load(path) {
                Ok(jar) => {
                    tracing::debug!(parent: &span, "restored {} cookie(s) from {}", jar.len(), path.display());
                    Some(jar)
                }
                Err(e) => {
                    tracing::warn!(parent: &span, "ignoring cookie jar {}: {e}", path.display());
                    None
                }
            }
        });
        let jar = Arc::new(restored.unwrap_or_default());

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .default_headers(browser_headers())
            .cookie_provider(Arc::clone(&jar))
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| PriceError::Client(e.to_string()))?;

        Ok(Self {
            client,
            jar,
            options,
            span,
        })
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Span every log line of this fetcher is emitted under.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Fetch the pricing page at `url`.
    ///
    /// Succeeds only when the body carries a known table marker.
    pub async fn fetch(&self, url: &str) -> PriceResult<RawDocument> {
        let target = Url::parse(url).map_err(|e| PriceError::InvalidUrl(format!("{url}: {e}")))?;
        self.span.record("url", target.as_str());
        self.fetch_inner(target).instrument(self.span.clone()).await
    }

    async fn fetch_inner(&self, target: Url) -> PriceResult<RawDocument> {
        let root = root_of(&target);

        match self.get(&root, None).await {
            Ok(doc) => tracing::debug!("root page {} answered {}", root, doc.status),
            Err(e) => tracing::warn!("root page visit failed, continuing: {e}"),
        }
        self.persist_cookies();

        let pause = random_delay(
            self.options.navigation_delay_min,
            self.options.navigation_delay_max,
        );
        tracing::debug!("pausing {} ms before requesting {target}", pause.as_millis());
        tokio::time::sleep(pause).await;

        let doc = self.get(&target, Some(&root)).await?;
        match PageKind::classify(&doc.body) {
            PageKind::Data(layout) => {
                tracing::debug!("received {} bytes, {} layout", doc.body.len(), layout.name());
                self.persist_cookies();
                Ok(doc)
            }
            PageKind::Challenge => {
                tracing::warn!(
                    "bot challenge served ({} bytes), retrying in {} ms",
                    doc.body.len(),
                    self.options.challenge_cooldown.as_millis()
                );
                tokio::time::sleep(self.options.challenge_cooldown).await;

                let retry = self.get(&target, Some(&root)).await?;
                match PageKind::classify(&retry.body) {
                    PageKind::Data(_) => {
                        self.persist_cookies();
                        Ok(retry)
                    }
                    PageKind::Challenge => {
                        tracing::error!("bot challenge not passed ({} bytes)", retry.body.len());
                        Err(PriceError::Challenge {
                            body_len: retry.body.len(),
                        })
                    }
                    PageKind::Unrecognized => {
                        tracing::error!("data marker not found after challenge ({} bytes)", retry.body.len());
                        Err(PriceError::MarkerNotFound {
                            body_len: retry.body.len(),
                        })
                    }
                }
            }
            PageKind::Unrecognized => {
                tracing::error!("data marker not found ({} bytes)", doc.body.len());
                Err(PriceError::MarkerNotFound {
                    body_len: doc.body.len(),
                })
            }
        }
    }

    /// One GET with retry on 5xx. Network errors and other non-2xx statuses
    /// return immediately.
    async fn get(&self, url: &Url, referer: Option<&Url>) -> PriceResult<RawDocument> {
        let mut attempt = 1u32;

        loop {
            let mut request = self.client.get(url.clone());
            if let Some(referer) = referer {
                request = request.header(header::REFERER, referer.as_str());
            }

            let resp = request.send().await?;
            let status = resp.status().as_u16();

            if RETRY_STATUSES.contains(&status) && attempt < self.options.max_attempts {
                let delay = self.options.backoff_base * 2u32.pow(attempt - 1);
                tracing::warn!(
                    "{url} answered {status} (attempt {attempt}/{}), retrying in {} ms",
                    self.options.max_attempts,
                    delay.as_millis()
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            if !resp.status().is_success() {
                return Err(PriceError::Http {
                    status,
                    url: url.to_string(),
                });
            }

            let final_url = resp.url().to_string();
            let body = resp.text().await?;
            return Ok(RawDocument {
                url: url.to_string(),
                final_url,
                status,
                body,
            });
        }
    }

    fn persist_cookies(&self) {
        let Some(path) = &self.options.cookie_jar_path else {
            return;
        };
        if let Err(e) = self.jar.save(path) {
            tracing::warn!("could not save cookie jar to {}: {e}", path.display());
        }
    }
}

/// Header set of a desktop Chrome navigation.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("el-GR,el;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers
}

/// The site root of `url`: scheme, host and port with path `/`.
pub fn root_of(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}

fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}
