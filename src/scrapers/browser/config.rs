//! Browser engine configuration types.

use std::env;

use serde::{Deserialize, Serialize};

/// Browser engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false to watch the crawl in a visible window.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// User agent override applied to every page.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            user_agent: None,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

pub fn default_headless() -> bool {
    true
}

impl BrowserEngineConfig {
    /// Apply environment overrides.
    ///
    /// - `BROWSER_URL` - remote DevTools endpoint
    /// - `MEVZUAT_HEADLESS` - `0`/`false` opens a visible window
    /// - `MEVZUAT_PROXY`, then `SOCKS_PROXY` - proxy for browser traffic
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("BROWSER_URL") {
            if !url.is_empty() {
                self.remote_url = Some(url);
            }
        }

        if let Ok(value) = env::var("MEVZUAT_HEADLESS") {
            if value == "0" || value.eq_ignore_ascii_case("false") {
                self.headless = false;
            } else if value == "1" || value.eq_ignore_ascii_case("true") {
                self.headless = true;
            }
        }

        if let Some(proxy) = env::var("MEVZUAT_PROXY")
            .ok()
            .or_else(|| env::var("SOCKS_PROXY").ok())
            .filter(|p| !p.is_empty())
        {
            self.proxy = Some(proxy);
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: BrowserEngineConfig = serde_json::from_str("{}").unwrap();
        assert!(config.headless);
        assert!(config.remote_url.is_none());
        assert!(config.chrome_args.is_empty());
    }
}
