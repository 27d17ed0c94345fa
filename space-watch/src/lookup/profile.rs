//! Profile page scraping.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use super::SpaceLookup;
use crate::utils::http_client::{self, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT};
use crate::{Error, Result};

/// Path fragment every Space link carries.
const SPACE_PATH_MARKER: &str = "/i/spaces/";

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#)
        .unwrap_or_else(|e| panic!("invalid anchor regex: {e}"))
});

/// Looks for a Space link on `<base>/<username>`.
#[derive(Debug, Clone)]
pub struct ProfileSpaceLookup {
    client: reqwest::Client,
    base_url: String,
}

impl ProfileSpaceLookup {
    /// Create a lookup with the default user agent and request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = http_client::build_profile_client(DEFAULT_USER_AGENT, request_timeout)?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a lookup with a custom HTTP client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn profile_url(&self, username: &str) -> String {
        format!("{}/{}", self.base_url, username)
    }

    /// Fetch the profile and extract a Space link, surfacing transport errors.
    ///
    /// Non-200 responses count as "no Space".
    pub async fn try_active_space(&self, username: &str) -> Result<Option<String>> {
        let url = self.profile_url(username);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::lookup(username, e.to_string()))?;

        if response.status() != StatusCode::OK {
            debug!(user = %username, status = %response.status(), "Profile request not OK");
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::lookup(username, e.to_string()))?;

        Ok(extract_space_url(&body, &self.base_url))
    }
}

#[async_trait]
impl SpaceLookup for ProfileSpaceLookup {
    async fn active_space(&self, username: &str) -> Option<String> {
        match self.try_active_space(username).await {
            Ok(url) => url,
            Err(e) => {
                debug!(user = %username, error = %e, "Space lookup failed; treating as offline");
                None
            }
        }
    }
}

/// Return the first anchor on the page that links to a Space, resolved
/// against `base_url`.
pub fn extract_space_url(html: &str, base_url: &str) -> Option<String> {
    ANCHOR_HREF
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .find(|href| href.contains(SPACE_PATH_MARKER))
        .map(|href| resolve_href(base_url, &href))
}

fn resolve_href(base_url: &str, href: &str) -> String {
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| format!("{}{}", base_url.trim_end_matches('/'), href))
}
