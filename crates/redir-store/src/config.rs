//! Redirect configuration
//!
//! The slice of extension options the rule store depends on. Field names on
//! the wire match the extension's stored options.

use serde::{Deserialize, Serialize};

use redir_core::url::is_served_by;
use redir_core::LocalEndpoints;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5001";

/// Dynamic rule cap of the declarative engine.
pub const DEFAULT_MAX_DYNAMIC_RULES: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Master switch; when false every installed rule is removed.
    pub active: bool,
    /// Local gateway the redirects point at.
    #[serde(rename = "gwURLString")]
    pub gw_url: String,
    /// RPC API endpoint.
    #[serde(rename = "apiURL")]
    pub api_url: String,
    /// Prefix of the extension's recovery page, allowed as a redirect target
    /// from the gateway itself.
    #[serde(rename = "recoveryPageURL", skip_serializing_if = "Option::is_none")]
    pub recovery_page_url: Option<String>,
    #[serde(rename = "maxDynamicRules")]
    pub max_dynamic_rules: usize,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            active: true,
            gw_url: DEFAULT_GATEWAY_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            recovery_page_url: None,
            max_dynamic_rules: DEFAULT_MAX_DYNAMIC_RULES,
        }
    }
}

impl RedirectConfig {
    pub fn endpoints(&self) -> LocalEndpoints<'_> {
        LocalEndpoints {
            gateway_url: &self.gw_url,
            api_url: &self.api_url,
        }
    }

    pub fn is_recovery_page(&self, url: &str) -> bool {
        self.recovery_page_url
            .as_deref()
            .map_or(false, |prefix| !prefix.is_empty() && url.starts_with(prefix))
    }

    /// Whether `url` is served by the configured gateway, including its
    /// subdomains (`<cid>.ipfs.localhost`).
    pub fn is_gateway_url(&self, url: &str) -> bool {
        is_served_by(url, &self.gw_url)
    }
}
