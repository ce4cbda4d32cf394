//! Chrome-backed rendering provider using Chrome DevTools Protocol
//!
//! One browser process is launched per distinct viewport size, on first use,
//! with its window set to exactly that size. Every page is a fresh tab in the
//! matching browser. All DevTools calls are blocking, so they run on tokio's
//! blocking pool.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use parity_core::{BrowserSettings, ParityError, Result, Viewport};
use parity_raster::RasterImage;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::provider::{PageHandle, RenderingProvider};
use crate::screenshot::{capture_tab, ScreenshotOptions};

/// Interval between network-idle polls
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the resource count must stay unchanged to count as idle
const IDLE_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// User agent string
    pub user_agent: Option<String>,
    /// Default timeout for DevTools calls in seconds
    pub timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            timeout_seconds: 30,
        }
    }
}

impl From<&BrowserSettings> for BrowserConfig {
    fn from(settings: &BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            user_agent: settings.user_agent.clone(),
            ..Self::default()
        }
    }
}

impl BrowserConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs().max(1);
        self
    }

    /// Extra command-line flags passed to Chrome
    fn extra_args(&self) -> Vec<String> {
        let mut args = vec![
            "--force-device-scale-factor=1".to_string(),
            "--hide-scrollbars".to_string(),
            "--allow-file-access-from-files".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-extensions".to_string(),
        ];
        if let Some(ref ua) = self.user_agent {
            args.push(format!("--user-agent={}", ua));
        }
        args
    }
}

/// Rendering provider driving headless Chrome
pub struct ChromeProvider {
    config: BrowserConfig,
    browsers: Mutex<HashMap<(u32, u32), Arc<Browser>>>,
}

impl ChromeProvider {
    /// Create a provider; browsers are launched lazily
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browsers: Mutex::new(HashMap::new()),
        }
    }

    async fn browser_for(&self, viewport: &Viewport) -> Result<Arc<Browser>> {
        let size = (viewport.width, viewport.height);
        let mut browsers = self.browsers.lock().await;
        if let Some(browser) = browsers.get(&size) {
            return Ok(Arc::clone(browser));
        }

        info!(
            "Launching browser (headless: {}, size: {}x{})",
            self.config.headless, size.0, size.1
        );

        let config = self.config.clone();
        let browser = tokio::task::spawn_blocking(move || launch(&config, size))
            .await
            .map_err(|e| ParityError::Browser(format!("Browser launch task failed: {}", e)))??;

        let browser = Arc::new(browser);
        browsers.insert(size, Arc::clone(&browser));
        info!("Browser launched successfully");
        Ok(browser)
    }
}

fn launch(config: &BrowserConfig, size: (u32, u32)) -> Result<Browser> {
    let args = config.extra_args();
    let launch_options = LaunchOptions::default_builder()
        .headless(config.headless)
        .window_size(Some(size))
        .idle_browser_timeout(Duration::from_secs(config.timeout_seconds.max(300)))
        .args(args.iter().map(OsStr::new).collect())
        .build()
        .map_err(|e| ParityError::Browser(format!("Failed to launch browser: {}", e)))?;

    Browser::new(launch_options)
        .map_err(|e| ParityError::Browser(format!("Failed to launch browser: {}", e)))
}

#[async_trait]
impl RenderingProvider for ChromeProvider {
    async fn new_page(&self, viewport: &Viewport) -> Result<Box<dyn PageHandle>> {
        let browser = self.browser_for(viewport).await?;
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        let tab = tokio::task::spawn_blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| ParityError::Browser(format!("Failed to create tab: {}", e)))?;
            tab.set_default_timeout(timeout);
            Ok::<_, ParityError>(tab)
        })
        .await
        .map_err(|e| ParityError::Browser(format!("Tab task failed: {}", e)))??;

        debug!("Opened tab at {}", viewport);
        Ok(Box::new(ChromePage {
            tab,
            closed: AtomicBool::new(false),
        }))
    }
}

/// One Chrome tab
struct ChromePage {
    tab: Arc<Tab>,
    closed: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct LoadState {
    ready: String,
    resources: u64,
}

const LOAD_STATE_SCRIPT: &str = r#"JSON.stringify({
    ready: document.readyState,
    resources: performance.getEntriesByType('resource').length,
})"#;

impl ChromePage {
    /// Run a blocking DevTools call against this tab
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| ParityError::Browser(format!("DevTools task failed: {}", e)))?
    }

    async fn load_state(&self) -> Result<LoadState> {
        let raw = self.evaluate(LOAD_STATE_SCRIPT).await?;
        let text = raw
            .as_str()
            .ok_or_else(|| ParityError::Browser("load state returned no value".to_string()))?;
        Ok(serde_json::from_str(text)?)
    }

    async fn current_url(&self) -> String {
        self.blocking(|tab| Ok(tab.get_url()))
            .await
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageHandle for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        let target = url.to_string();

        self.blocking(move |tab| {
            tab.navigate_to(&target).map_err(|e| ParityError::Navigation {
                url: target.clone(),
                reason: e.to_string(),
            })?;
            tab.wait_until_navigated()
                .map_err(|e| ParityError::Navigation {
                    url: target.clone(),
                    reason: e.to_string(),
                })?;
            Ok(())
        })
        .await?;

        debug!("Navigated to {}", url);
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let mut last_count = None;
        let mut quiet_since = Instant::now();

        loop {
            // An evaluation error just means the document is mid-transition
            if let Ok(state) = self.load_state().await {
                if state.ready == "complete" {
                    if last_count == Some(state.resources) {
                        if quiet_since.elapsed() >= IDLE_QUIET_PERIOD {
                            debug!("Network idle after {:?}", started.elapsed());
                            return Ok(());
                        }
                    } else {
                        last_count = Some(state.resources);
                        quiet_since = Instant::now();
                    }
                }
            }

            if started.elapsed() >= timeout {
                return Err(ParityError::LoadTimeout {
                    url: self.current_url().await,
                    timeout,
                });
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let script = script.to_string();
        self.blocking(move |tab| {
            let result = tab
                .evaluate(&script, false)
                .map_err(|e| ParityError::Extraction(format!("Script evaluation failed: {}", e)))?;
            Ok(result.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }

    async fn screenshot(&self, full_page: bool) -> Result<RasterImage> {
        let options = ScreenshotOptions { full_page };
        self.blocking(move |tab| capture_tab(tab, options)).await
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.tab.close(false) {
            warn!("Failed to close tab: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.user_agent.is_none());
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = BrowserSettings {
            headless: false,
            user_agent: Some("ParityBot/1.0".to_string()),
        };
        let config = BrowserConfig::from(&settings).with_timeout(Duration::from_secs(45));

        assert!(!config.headless);
        assert_eq!(config.timeout_seconds, 45);
        assert!(config
            .extra_args()
            .contains(&"--user-agent=ParityBot/1.0".to_string()));
    }

    #[test]
    fn test_sub_second_timeout_rounds_up() {
        let config = BrowserConfig::default().with_timeout(Duration::from_millis(200));
        assert_eq!(config.timeout_seconds, 1);
    }

    #[test]
    fn test_load_state_payload() {
        let state: LoadState =
            serde_json::from_str(r#"{"ready": "complete", "resources": 12}"#).unwrap();
        assert_eq!(state.ready, "complete");
        assert_eq!(state.resources, 12);
    }
}
