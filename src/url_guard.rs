//! SSRF allowlist for product image URLs supplied by clients.
//!
//! A host is trusted when it equals an allowlist entry or is a subdomain of
//! one, matched on label boundaries.

use reqwest::Url;
use std::fmt;

/// Storefront CDNs and the stock-photo host trusted out of the box.
pub const DEFAULT_TRUSTED_DOMAINS: &[&str] = &[
    "cdn.shopify.com",
    "cdn11.bigcommerce.com",
    "static.wixstatic.com",
    "images.squarespace-cdn.com",
    "images.unsplash.com",
    "plus.unsplash.com",
];

/// Why a URL was refused. Only ever logged, never returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlRejection {
    Malformed(String),
    UnsupportedScheme(String),
    MissingHost,
    UntrustedHost(String),
}

impl fmt::Display for UrlRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlRejection::Malformed(e) => write!(f, "malformed URL: {}", e),
            UrlRejection::UnsupportedScheme(s) => write!(f, "unsupported scheme '{}'", s),
            UrlRejection::MissingHost => f.write_str("URL has no host"),
            UrlRejection::UntrustedHost(h) => write!(f, "host '{}' is not in the allowlist", h),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UrlGuard {
    trusted: Vec<String>,
}

impl Default for UrlGuard {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl UrlGuard {
    /// Defaults plus `extra` entries (already normalized, see
    /// [`crate::config::parse_domain_list`]).
    pub fn new(extra: Vec<String>) -> Self {
        let mut trusted: Vec<String> = DEFAULT_TRUSTED_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .collect();
        for domain in extra {
            if !trusted.contains(&domain) {
                trusted.push(domain);
            }
        }
        Self { trusted }
    }

    pub fn trusted_domains(&self) -> &[String] {
        &self.trusted
    }

    pub fn is_trusted_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        if host.is_empty() {
            return false;
        }
        self.trusted.iter().any(|domain| {
            host == *domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }

    pub fn check(&self, raw: &str) -> Result<Url, UrlRejection> {
        let url = Url::parse(raw.trim()).map_err(|e| UrlRejection::Malformed(e.to_string()))?;
        self.check_url(&url)?;
        Ok(url)
    }

    pub fn check_url(&self, url: &Url) -> Result<(), UrlRejection> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(UrlRejection::UnsupportedScheme(other.to_string())),
        }

        let host = url.host_str().ok_or(UrlRejection::MissingHost)?;
        if self.is_trusted_host(host) {
            Ok(())
        } else {
            Err(UrlRejection::UntrustedHost(host.to_string()))
        }
    }
}
