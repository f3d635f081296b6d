use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::config;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("session could not be started: {0}")]
    Session(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("no element matched `{0}`")]
    NotFound(String),
    #[error("timed out waiting for `{0}`")]
    Timeout(String),
    #[error("{0} is not supported by this fetcher")]
    Unsupported(&'static str),
}

/// Browser-driven access to a live page. One session per logical search;
/// sessions are never shared across concurrent searches.
///
/// `click` and `fill` resolve a CSS selector, optionally narrowed by a
/// visible-text predicate, so callers can express fallbacks like "any
/// button whose text contains 搜尋" declaratively.
#[async_trait]
pub trait PageFetcher: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    /// Bounded wait for `css` to appear. Err(Timeout) when it never does.
    async fn wait_for(&mut self, css: &str, timeout: Duration) -> Result<(), FetchError>;

    async fn click(&mut self, css: &str, text: Option<&str>) -> Result<(), FetchError>;

    /// Clear the field matched by `css`, then type `value` into it.
    async fn fill(&mut self, css: &str, value: &str) -> Result<(), FetchError>;

    /// Press Enter against the page body.
    async fn press_enter(&mut self) -> Result<(), FetchError>;

    async fn page_html(&mut self) -> Result<String, FetchError>;

    fn current_url(&self) -> String;

    /// Release the underlying session. Idempotent.
    async fn close(&mut self);
}

/// Hands out exclusive page-fetcher sessions, one per search call.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Session: PageFetcher;

    async fn acquire(&self) -> Result<Self::Session, FetchError>;
}

/// Static-HTTP fetcher: fetches pages with reqwest and answers selector
/// queries against the fetched markup. It cannot drive scripts or forms, so
/// interactions report Unsupported and the orchestrator degrades around
/// them. Good enough for pages that render results server-side, and for
/// smoke-testing the pipeline against a live URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    html: String,
    url: String,
}

impl HttpFetcher {
    fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            html: String::new(),
            url: String::new(),
        }
    }

    fn has_selector(&self, css: &str) -> bool {
        let doc = Html::parse_document(&self.html);
        // Selector groups with pseudo-classes the scraper crate rejects are
        // treated as absent rather than fatal.
        css.split(',')
            .filter_map(|s| Selector::parse(s.trim()).ok())
            .any(|sel| doc.select(&sel).next().is_some())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Navigation(e.to_string()))?;
        self.url = response.url().to_string();
        self.html = response
            .text()
            .await
            .map_err(|e| FetchError::Navigation(e.to_string()))?;
        debug!(url = %self.url, bytes = self.html.len(), "fetched page");
        Ok(())
    }

    async fn wait_for(&mut self, css: &str, _timeout: Duration) -> Result<(), FetchError> {
        // Static markup: the element is either already there or never will be.
        if self.has_selector(css) {
            Ok(())
        } else {
            Err(FetchError::Timeout(css.to_string()))
        }
    }

    async fn click(&mut self, _css: &str, _text: Option<&str>) -> Result<(), FetchError> {
        Err(FetchError::Unsupported("click"))
    }

    async fn fill(&mut self, _css: &str, _value: &str) -> Result<(), FetchError> {
        Err(FetchError::Unsupported("fill"))
    }

    async fn press_enter(&mut self) -> Result<(), FetchError> {
        // Nothing to dispatch the key to; a no-op keeps the submit fallback
        // chain moving so the current markup still gets parsed.
        Ok(())
    }

    async fn page_html(&mut self) -> Result<String, FetchError> {
        Ok(self.html.clone())
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    async fn close(&mut self) {
        self.html.clear();
    }
}

/// Builds one HttpFetcher per search with the browser-like headers the site
/// expects.
pub struct HttpSessionProvider;

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    type Session = HttpFetcher;

    async fn acquire(&self) -> Result<HttpFetcher, FetchError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static(config::ACCEPT_LANGUAGE),
        );
        let client = reqwest::Client::builder()
            .user_agent(config::USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| FetchError::Session(e.to_string()))?;
        Ok(HttpFetcher::new(client))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_fetcher_reports_interactions_unsupported() {
        let provider = HttpSessionProvider;
        let mut session = provider.acquire().await.unwrap();
        assert!(matches!(
            session.click("button", None).await,
            Err(FetchError::Unsupported(_))
        ));
        assert!(matches!(
            session.fill("input", "TPE").await,
            Err(FetchError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn wait_for_checks_cached_markup() {
        let provider = HttpSessionProvider;
        let mut session = provider.acquire().await.unwrap();
        session.html = "<div class='flight-card'>IT200</div>".to_string();
        assert!(session
            .wait_for(".flight-card, .flight-result", Duration::from_secs(1))
            .await
            .is_ok());
        assert!(matches!(
            session
                .wait_for(".no-such-thing", Duration::from_secs(1))
                .await,
            Err(FetchError::Timeout(_))
        ));
    }
}
