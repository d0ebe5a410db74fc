//! Chromium-backed browsing session over the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{BrowserEngineConfig, BrowsingSession, NextControl, RowRef, SessionError};
use crate::models::{CategoryForm, CrawlRequest};
use crate::scrapers::config::RegistryLayout;

fn cdp_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::Browser(e.to_string())
}

/// Encode a string as a JavaScript literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// A detail tab. Closed explicitly by the session; if dropped on an error
/// path instead, the close is spawned onto the runtime.
pub struct DetailPage {
    page: Option<Page>,
    url: String,
    runtime: tokio::runtime::Handle,
}

impl DetailPage {
    fn new(page: Page, url: &str) -> Self {
        Self {
            page: Some(page),
            url: url.to_string(),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    fn page(&self) -> Result<&Page, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::Browser(format!("detail tab already closed: {}", self.url)))
    }

    async fn close(mut self) -> Result<(), SessionError> {
        if let Some(page) = self.page.take() {
            page.close().await.map_err(cdp_err)?;
            debug!("Closed detail tab for {}", self.url);
        }
        Ok(())
    }
}

impl Drop for DetailPage {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            let url = std::mem::take(&mut self.url);
            self.runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    warn!("Deferred close of detail tab {} failed: {}", url, e);
                }
            });
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    title: String,
    href: Option<String>,
    empty: bool,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    present: bool,
    rows: Vec<RawRow>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    ready: bool,
    html: String,
}

/// Browsing session backed by a launched or remote Chromium.
pub struct ChromeSession {
    browser: Browser,
    listing: Page,
    handler: JoinHandle<()>,
    layout: RegistryLayout,
    user_agent: Option<String>,
    poll_interval: Duration,
    remote: bool,
    closed: bool,
}

impl ChromeSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Launch a browser (or connect to `remote_url`) and open the listing tab.
    pub async fn start(
        config: &BrowserEngineConfig,
        layout: RegistryLayout,
        poll_interval: Duration,
    ) -> Result<Self, SessionError> {
        let remote = config.remote_url.is_some();
        let (browser, handler) = match config.remote_url {
            Some(ref url) => Self::connect_remote(url).await?,
            None => Self::launch(config).await?,
        };

        let handler = spawn_handler(handler);

        let listing = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(cdp_err(e));
            }
        };

        let session = Self {
            browser,
            listing,
            handler,
            layout,
            user_agent: config.user_agent.clone(),
            poll_interval,
            remote,
            closed: false,
        };
        session.apply_user_agent(&session.listing).await?;
        Ok(session)
    }

    /// Find Chrome executable.
    fn find_chrome() -> Result<PathBuf, SessionError> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(SessionError::Launch(
            "Chrome/Chromium not found. Install chromium or set BROWSER_URL to a running instance"
                .to_string(),
        ))
    }

    async fn launch(config: &BrowserEngineConfig) -> Result<(Browser, Handler), SessionError> {
        info!("Launching browser (headless={})", config.headless);

        let chrome_path = Self::find_chrome()?;
        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| SessionError::Launch(format!("invalid browser config: {}", e)))?;

        Browser::launch(browser_config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))
    }

    /// Connect to a remote Chrome instance.
    async fn connect_remote(url: &str) -> Result<(Browser, Handler), SessionError> {
        info!("Connecting to remote browser at {}", url);

        // Resolve the WebSocket URL from the /json/version endpoint
        let mut version_url = Url::parse(url)
            .map_err(|e| SessionError::Launch(format!("invalid remote browser URL {}: {}", url, e)))?;
        let scheme = match version_url.scheme() {
            "ws" => "http",
            "wss" => "https",
            other => other,
        }
        .to_string();
        if version_url.set_scheme(&scheme).is_err() {
            return Err(SessionError::Launch(format!("unsupported remote browser URL {}", url)));
        }
        version_url.set_path("/json/version");

        let resp: serde_json::Value = reqwest::Client::new()
            .get(version_url)
            .send()
            .await
            .map_err(|e| SessionError::Launch(format!("remote browser unreachable: {}", e)))?
            .json()
            .await
            .map_err(|e| SessionError::Launch(format!("bad browser version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SessionError::Launch("No webSocketDebuggerUrl in response".to_string()))?;

        info!("Connecting to WebSocket: {}", ws_url);
        Browser::connect(ws_url)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))
    }

    async fn apply_user_agent(&self, page: &Page) -> Result<(), SessionError> {
        if let Some(ref ua) = self.user_agent {
            page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                .await
                .map_err(cdp_err)?;
        }
        Ok(())
    }

    async fn eval<T: DeserializeOwned>(page: &Page, script: String) -> Result<T, SessionError> {
        page.evaluate(script)
            .await
            .map_err(cdp_err)?
            .into_value()
            .map_err(cdp_err)
    }

    /// Poll until `selector` resolves on the listing tab.
    async fn poll_element(&self, selector: &str) -> Element {
        loop {
            match self.listing.find_element(selector).await {
                Ok(element) => return element,
                Err(e) => {
                    debug!("Waiting for {}: {}", selector, e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn fill_field(&self, selector: &str, value: &str) -> Result<(), SessionError> {
        let element = self
            .listing
            .find_element(selector)
            .await
            .map_err(|_| SessionError::ElementNotFound(selector.to_string()))?;
        Self::eval::<bool>(
            &self.listing,
            format!(
                "(() => {{ const el = document.querySelector({}); if (el) {{ el.value = ''; }} return true; }})()",
                js_str(selector)
            ),
        )
        .await?;
        element.click().await.map_err(cdp_err)?;
        element.type_str(value).await.map_err(cdp_err)?;
        Ok(())
    }
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

#[async_trait::async_trait]
impl BrowsingSession for ChromeSession {
    type Detail = DetailPage;

    async fn submit_search(
        &mut self,
        form: &CategoryForm,
        request: &CrawlRequest,
    ) -> Result<(), SessionError> {
        info!("Opening {}", self.layout.base_url);
        self.listing
            .goto(self.layout.base_url.as_str())
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;

        self.poll_element(&form.link_selector())
            .await
            .click()
            .await
            .map_err(cdp_err)?;
        self.poll_element(&format!("#{}", form.form_id)).await;

        if let Some(term) = request.search_term() {
            self.fill_field(&form.scoped(&self.layout.search_field), term)
                .await?;
        }
        let years = request.years();
        if let Some(start) = years.start {
            self.fill_field(&form.scoped(&self.layout.start_year_field), &start.to_string())
                .await?;
        }
        if let Some(end) = years.end {
            self.fill_field(&form.scoped(&self.layout.end_year_field), &end.to_string())
                .await?;
        }

        let button = form.scoped(&self.layout.search_button);
        self.listing
            .find_element(button.as_str())
            .await
            .map_err(|_| SessionError::ElementNotFound(button.clone()))?
            .click()
            .await
            .map_err(cdp_err)?;
        Ok(())
    }

    async fn wait_until_loaded(&mut self) -> Result<(), SessionError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return !!el && el.style.display === 'none'; }})()",
            js_str(&self.layout.loader)
        );
        loop {
            if Self::eval::<bool>(&self.listing, script.clone()).await? {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn result_rows(&mut self) -> Result<Vec<RowRef>, SessionError> {
        let script = format!(
            r#"(() => {{
                const table = document.querySelector({table});
                if (!table) return {{ present: false, rows: [] }};
                const rows = Array.from(table.querySelectorAll({row})).map(tr => {{
                    const a = tr.querySelector({link});
                    return {{
                        title: ((a || tr).textContent || '').trim(),
                        href: a ? a.getAttribute('href') : null,
                        empty: tr.querySelector({empty}) !== null
                    }};
                }});
                return {{ present: true, rows }};
            }})()"#,
            table = js_str(&self.layout.result_table),
            row = js_str(&self.layout.result_row),
            link = js_str(&self.layout.row_link),
            empty = js_str(&self.layout.empty_row),
        );

        let base = Url::parse(&self.layout.base_url).map_err(|e| {
            SessionError::Navigation(format!("invalid base URL {}: {}", self.layout.base_url, e))
        })?;
        loop {
            let table: RawTable = Self::eval(&self.listing, script.clone()).await?;
            if table.present {
                return Ok(table
                    .rows
                    .into_iter()
                    .skip(1)
                    .filter(|r| !r.empty)
                    .enumerate()
                    .map(|(position, r)| RowRef {
                        position,
                        title: r.title,
                        href: r
                            .href
                            .filter(|h| !h.trim().is_empty())
                            .and_then(|h| base.join(h.trim()).ok())
                            .map(String::from),
                    })
                    .collect());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn next_control(&mut self) -> Result<NextControl, SessionError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return 'absent'; return el.classList.contains({}) ? 'disabled' : 'enabled'; }})()",
            js_str(&self.layout.next_button),
            js_str(&self.layout.disabled_class)
        );
        let state: String = Self::eval(&self.listing, script).await?;
        Ok(match state.as_str() {
            "enabled" => NextControl::Enabled,
            "disabled" => NextControl::Disabled,
            _ => NextControl::Absent,
        })
    }

    async fn click_next(&mut self) -> Result<(), SessionError> {
        self.listing
            .find_element(self.layout.next_button.as_str())
            .await
            .map_err(|_| SessionError::ElementNotFound(self.layout.next_button.clone()))?
            .click()
            .await
            .map_err(cdp_err)?;
        Ok(())
    }

    async fn open_detail(&mut self, url: &str) -> Result<DetailPage, SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Navigation(format!("{}: {}", url, e)))?;
        let detail = DetailPage::new(page, url);
        self.apply_user_agent(detail.page()?).await?;
        Ok(detail)
    }

    async fn load_detail(&mut self, detail: &DetailPage) -> Result<(), SessionError> {
        detail
            .page()?
            .goto(detail.url.as_str())
            .await
            .map_err(|e| SessionError::Navigation(format!("{}: {}", detail.url, e)))?;
        debug!("Loaded detail tab {}", detail.url);
        Ok(())
    }

    async fn frame_html(&mut self, detail: &DetailPage) -> Result<String, SessionError> {
        let page = detail.page()?;
        let script = format!(
            r#"(() => {{
                const frame = document.querySelector({});
                const doc = frame ? frame.contentDocument : null;
                if (!doc || doc.readyState !== 'complete' || !doc.body) return {{ ready: false, html: '' }};
                return {{ ready: true, html: doc.body.outerHTML }};
            }})()"#,
            js_str(&self.layout.detail_frame)
        );
        loop {
            let frame: RawFrame = Self::eval(page, script.clone()).await?;
            if frame.ready {
                return Ok(frame.html);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn close_detail(&mut self, detail: DetailPage) -> Result<(), SessionError> {
        detail.close().await
    }

    async fn focus_listing(&mut self) -> Result<(), SessionError> {
        self.listing.bring_to_front().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = if self.remote {
            // Leave a shared remote browser running; only drop our tab.
            self.listing.clone().close().await.map_err(cdp_err)
        } else {
            let closed = self.browser.close().await.map(|_| ()).map_err(cdp_err);
            if let Err(e) = self.browser.wait().await {
                warn!("Browser process did not exit cleanly: {}", e);
            }
            closed
        };
        self.handler.abort();
        info!("Browser session closed");
        result
    }
}
