//! Cookie store that remembers one named cookie across a redirect chain.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use url::Url;

/// Name of the session cookie issued by the Dataloop gateway.
pub const SESSION_COOKIE: &str = "JWT-APP";

/// A [`Jar`] that also records the last value seen for one cookie name,
/// regardless of which host in the redirect chain set it.
pub struct CapturingJar {
    name: String,
    inner: Jar,
    captured: Mutex<Option<String>>,
}

impl CapturingJar {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Jar::default(),
            captured: Mutex::new(None),
        }
    }

    /// The most recent value of the watched cookie, if any response set it.
    #[must_use]
    pub fn captured(&self) -> Option<String> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, header: &HeaderValue) {
        let Ok(raw) = header.to_str() else {
            return;
        };
        let Some(update) = cookie_update(raw, &self.name, Utc::now()) else {
            return;
        };
        let mut captured = self.captured.lock().unwrap_or_else(PoisonError::into_inner);
        *captured = match update {
            CookieUpdate::Set(value) => Some(value.to_string()),
            CookieUpdate::Removed => None,
        };
    }
}

impl CookieStore for CapturingJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        for header in &headers {
            self.record(header);
        }
        self.inner.set_cookies(&mut headers.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.inner.cookies(url)
    }
}

impl std::fmt::Debug for CapturingJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturingJar")
            .field("name", &self.name)
            .field("captured", &self.captured().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CookieUpdate<'a> {
    Set(&'a str),
    Removed,
}

/// Interpret a `Set-Cookie` header line for the cookie called `name`.
///
/// An empty value, `Max-Age` of zero or less, or an `Expires` date at or
/// before `now` all remove the cookie.
fn cookie_update<'a>(set_cookie: &'a str, name: &str, now: DateTime<Utc>) -> Option<CookieUpdate<'a>> {
    let mut parts = set_cookie.split(';');
    let (key, value) = parts.next()?.split_once('=')?;
    if key.trim() != name {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let mut max_age = None;
    let mut expires = None;
    for attribute in parts {
        let (attr, attr_value) = attribute.split_once('=').unwrap_or((attribute, ""));
        let attr_value = attr_value.trim();
        if attr.trim().eq_ignore_ascii_case("max-age") {
            max_age = attr_value.parse::<i64>().ok();
        } else if attr.trim().eq_ignore_ascii_case("expires") {
            expires = DateTime::parse_from_rfc2822(attr_value).ok();
        }
    }

    // Max-Age takes precedence over Expires.
    let expired = match (max_age, expires) {
        (Some(seconds), _) => seconds <= 0,
        (None, Some(at)) => at <= now,
        (None, None) => false,
    };

    if value.is_empty() || expired {
        Some(CookieUpdate::Removed)
    } else {
        Some(CookieUpdate::Set(value))
    }
}
