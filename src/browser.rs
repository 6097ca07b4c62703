use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use crate::error::CaptureError;

/// Capability needed by the orchestrator: fetch raw screenshot bytes for a
/// URL. Implemented by [`EvasionBrowser`] in production and by fakes in
/// tests, keeping the capture pipeline runnable without a real browser.
pub trait CaptureBackend: Send + Sync {
    fn capture(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, CaptureError>> + Send;
}

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Script evaluated before any page script runs, neutralizing the usual
/// automation-detection probes: the webdriver flag, an empty plugin list, an
/// empty language list, the missing chrome.runtime namespace and the
/// notifications permission query.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {
    get: () => false
});
Object.defineProperty(navigator, 'plugins', {
    get: () => [
        {name: 'Chrome PDF Plugin', description: 'Portable Document Format', filename: 'internal-pdf-viewer'},
        {name: 'Chrome PDF Viewer', description: '', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai'},
        {name: 'Native Client', description: '', filename: 'internal-nacl-plugin'}
    ]
});
Object.defineProperty(navigator, 'languages', {
    get: () => ['en-US', 'en']
});
window.chrome = {
    runtime: {}
};
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications' ?
        Promise.resolve({state: Notification.permission}) :
        originalQuery(parameters)
);
"#;

/// Viewport, timeout and page options for one capture run.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub nav_timeout: Duration,
    pub full_page: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            viewport_width: 1920,
            viewport_height: 1080,
            nav_timeout: Duration::from_secs(30),
            full_page: true,
        }
    }
}

/// One headless Chromium session shared by every capture in a run. Each
/// capture opens a fresh page against the same fingerprint-evasion
/// configuration, so concurrent captures never share mutable state.
pub struct EvasionBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
    opts: BrowserOptions,
}

impl EvasionBrowser {
    /// Launch the headless session. Failure here (no Chromium on the system,
    /// sandbox restrictions) is fatal to the run.
    pub async fn launch(opts: BrowserOptions) -> Result<Self> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .viewport(Viewport {
                width: opts.viewport_width,
                height: opts.viewport_height,
                ..Default::default()
            })
            .build()
            .map_err(|e| anyhow!("invalid browser configuration: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch headless Chromium (is Chrome/Chromium installed?)")?;

        // The CDP event stream must be drained for the lifetime of the session.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            opts,
        })
    }

    /// Tear the session down. Safe to call exactly once at the end of a run.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.ok();
        self.browser.wait().await.ok();
        self.handler_task.abort();
        Ok(())
    }

    async fn prepare_page(&self, page: &Page) -> Result<(), CaptureError> {
        page.execute(EnableParams::default())
            .await
            .map_err(|e| CaptureError::Browser(e.to_string()))?;
        page.execute(SetUserAgentOverrideParams::new(USER_AGENT))
            .await
            .map_err(|e| CaptureError::Browser(e.to_string()))?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(json!({
            "Accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            "Accept-Language": "en-US,en;q=0.5",
            "DNT": "1",
            "Upgrade-Insecure-Requests": "1",
            "Sec-Fetch-Dest": "document",
            "Sec-Fetch-Mode": "navigate",
            "Sec-Fetch-Site": "none",
            "Sec-Fetch-User": "?1",
            "Sec-Ch-Ua": "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
            "Sec-Ch-Ua-Mobile": "?0",
            "Sec-Ch-Ua-Platform": "\"Windows\""
        }))))
        .await
        .map_err(|e| CaptureError::Browser(e.to_string()))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| CaptureError::Browser(e.to_string()))?;
        Ok(())
    }

    async fn capture_on_page(&self, page: &Page, url: &str) -> Result<Vec<u8>, CaptureError> {
        self.prepare_page(page).await?;

        let navigation = async {
            page.goto(url)
                .await
                .map_err(|e| CaptureError::Navigation(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| CaptureError::Navigation(e.to_string()))?;
            Ok::<(), CaptureError>(())
        };
        match time::timeout(self.opts.nav_timeout, navigation).await {
            Ok(res) => res?,
            Err(_) => return Err(CaptureError::Timeout(self.opts.nav_timeout)),
        }

        debug!(url, "navigation complete, taking screenshot");
        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(self.opts.full_page)
                .build(),
        )
        .await
        .map_err(|e| CaptureError::Browser(e.to_string()))
    }
}

impl CaptureBackend for EvasionBrowser {
    /// Open a fresh page, navigate with a bounded wait, screenshot, close the
    /// page. The page is closed on both the success and the failure path so a
    /// slow target cannot leak tabs into later captures.
    async fn capture(&self, url: &str) -> Result<Vec<u8>, CaptureError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CaptureError::Browser(e.to_string()))?;

        let result = self.capture_on_page(&page, url).await;
        if let Err(e) = page.close().await {
            warn!(url, error = %e, "failed to close capture page");
        }
        result
    }
}
