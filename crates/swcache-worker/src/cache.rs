//! Cache entries and request matching.
//!
//! An entry is keyed by its request identity: the URL without fragment, the
//! method, and the request header values named by the stored response's
//! `Vary` header.

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use swcache_net::{NetError, Request, Response};
use thiserror::Error;
use url::Url;

/// Errors raised by cache stores.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Bad response status {status} for {url}")]
    BadResponse { url: String, status: u16 },

    #[error("Network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: NetError,
    },

    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            CacheError::NotFound(_) => "not_found",
            CacheError::Rejected(_) => "rejected",
            CacheError::BadResponse { .. } => "bad_response",
            CacheError::Network { .. } => "network",
            CacheError::Corrupt(_) => "corrupt",
            CacheError::Storage(_) => "storage",
            CacheError::Serialization(_) => "serialization",
            CacheError::Io(_) => "io",
        }
    }
}

/// Normalized URL used as the primary lookup key.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL, fragment stripped.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Request header values selected by the response's `Vary` header.
    pub vary_headers: Vec<(String, Option<String>)>,

    /// Response status.
    pub status: u16,

    /// Final response URL, after redirects.
    pub response_url: String,

    /// Response headers, in received order, values as raw bytes.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Build an entry from a request and the response it produced.
    ///
    /// Rejects what the Cache API refuses to store: non-GET requests,
    /// partial content, and `Vary: *`.
    pub fn from_exchange(request: &Request, response: &Response) -> Result<Self, CacheError> {
        if request.method != Method::GET {
            return Err(CacheError::Rejected(format!(
                "{} {} is not cacheable",
                request.method, request.url
            )));
        }
        if response.status == StatusCode::PARTIAL_CONTENT {
            return Err(CacheError::Rejected(format!(
                "partial response for {}",
                request.url
            )));
        }

        let vary = vary_names(&response.headers);
        if vary.iter().any(|name| name == "*") {
            return Err(CacheError::Rejected(format!(
                "Vary: * response for {}",
                request.url
            )));
        }

        let vary_headers = vary
            .into_iter()
            .map(|name| {
                let value = header_string(&request.headers, &name);
                (name, value)
            })
            .collect();

        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Ok(Self {
            url: cache_key(&request.url),
            method: request.method.to_string(),
            vary_headers,
            status: response.status.as_u16(),
            response_url: response.url.to_string(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        })
    }

    /// Check whether `request` is answered by this entry.
    pub fn matches(&self, request: &Request) -> bool {
        if request.method != Method::GET || self.method != Method::GET.as_str() {
            return false;
        }
        if cache_key(&request.url) != self.url {
            return false;
        }
        self.vary_matches(&request.headers)
    }

    /// Check the `Vary`-selected headers of a request against this entry.
    pub fn vary_matches(&self, headers: &HeaderMap) -> bool {
        vary_satisfied(&self.vary_headers, headers)
    }

    /// Rebuild the stored response.
    pub fn to_response(&self) -> Result<Response, CacheError> {
        let url =
            Url::parse(&self.response_url).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let status =
            StatusCode::from_u16(self.status).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CacheError::Corrupt(e.to_string()))?;
            let value =
                HeaderValue::from_bytes(value).map_err(|e| CacheError::Corrupt(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(Response {
            url,
            status,
            headers,
            body: self.body.clone().into(),
        })
    }
}

/// Whether `headers` carry the stored values of every `Vary`-selected header.
pub(crate) fn vary_satisfied(pairs: &[(String, Option<String>)], headers: &HeaderMap) -> bool {
    pairs
        .iter()
        .all(|(name, stored)| header_string(headers, name) == *stored)
}

/// Header names listed in `Vary`, lowercased.
fn vary_names(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(http::header::VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
