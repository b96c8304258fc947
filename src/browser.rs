use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::spawn_blocking;

use crate::config::ScraperConfig;
use crate::{AppError, Result};

// Tabs stay idle between polling cycles.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// One open page, as seen by the scanners.
#[async_trait]
pub trait PageDriver: Send + Sync {
    fn url(&self) -> String;
    async fn reload(&self) -> Result<()>;
    async fn content(&self) -> Result<String>;
    async fn count(&self, selector: &str) -> Result<usize>;
    async fn scroll_by(&self, pixels: i64) -> Result<()>;
    /// Clicks the first "See more" button inside the post. Returns whether one was found.
    async fn expand_post(&self, posinset: &str) -> Result<bool>;
    async fn wait_for_post_images(&self, posinset: &str) -> Result<()>;
    async fn capture_post(&self, posinset: &str) -> Result<Vec<u8>>;
}

/// Source of the currently open pages.
#[async_trait]
pub trait TabSource: Send + Sync {
    type Page: PageDriver + 'static;

    async fn pages(&self) -> Result<Vec<Arc<Self::Page>>>;
}

pub fn post_selector(posinset: &str) -> String {
    format!(r#"div[aria-posinset="{}"]"#, posinset.replace('"', ""))
}

fn browser_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Browser(format!("{}: {}", context, e))
}

pub struct ChromeSession {
    browser: Browser,
    config: ScraperConfig,
}

impl ChromeSession {
    pub fn launch(config: &ScraperConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-backgrounding-occluded-windows"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| browser_error("Failed to create launch options", e))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }
        launch_options.user_data_dir = config.user_data_dir.clone();

        let browser = Browser::new(launch_options).map_err(|e| browser_error("Failed to launch browser", e))?;
        tracing::info!("Launched Chrome (headless: {})", config.headless);

        Ok(Self {
            browser,
            config: config.clone(),
        })
    }

    /// Opens `url` in a new tab.
    pub async fn open(&self, url: &str) -> Result<Arc<ChromePage>> {
        let browser = self.browser.clone();
        let url = url.to_string();
        let user_agent = self.config.user_agent.clone();
        let timeout = Duration::from_secs(self.config.request_timeout);

        let tab = spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser.new_tab().map_err(|e| browser_error("Failed to create tab", e))?;
            tab.set_default_timeout(timeout);
            if let Some(user_agent) = &user_agent {
                tab.set_user_agent(user_agent, None, None)
                    .map_err(|e| browser_error("Failed to set user agent", e))?;
            }
            tab.navigate_to(&url).map_err(|e| browser_error("Navigation failed", e))?;
            tab.wait_until_navigated().map_err(|e| browser_error("Page load failed", e))?;
            Ok(tab)
        })
        .await??;

        Ok(Arc::new(ChromePage { tab }))
    }
}

#[async_trait]
impl TabSource for ChromeSession {
    type Page = ChromePage;

    async fn pages(&self) -> Result<Vec<Arc<ChromePage>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|_| AppError::Browser("tab list lock poisoned".to_string()))?
            .clone();
        Ok(tabs.into_iter().map(|tab| Arc::new(ChromePage { tab })).collect())
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn evaluate(&self, expression: String, await_promise: bool) -> Result<Option<Value>> {
        let tab = Arc::clone(&self.tab);
        let result = spawn_blocking(move || tab.evaluate(&expression, await_promise))
            .await?
            .map_err(|e| browser_error("Script evaluation failed", e))?;
        Ok(result.value)
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    fn url(&self) -> String {
        self.tab.get_url()
    }

    async fn reload(&self) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        spawn_blocking(move || -> Result<()> {
            tab.reload(false, None).map_err(|e| browser_error("Reload failed", e))?;
            tab.wait_until_navigated().map_err(|e| browser_error("Page load failed", e))?;
            Ok(())
        })
        .await?
    }

    async fn content(&self) -> Result<String> {
        let tab = Arc::clone(&self.tab);
        spawn_blocking(move || tab.get_content())
            .await?
            .map_err(|e| browser_error("Failed to get page content", e))
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let expression = format!("document.querySelectorAll({}).length", serde_json::to_string(selector)?);
        let value = self.evaluate(expression, false).await?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    async fn scroll_by(&self, pixels: i64) -> Result<()> {
        self.evaluate(format!("window.scrollBy(0, {})", pixels), false).await?;
        Ok(())
    }

    async fn expand_post(&self, posinset: &str) -> Result<bool> {
        let expression = format!(
            r#"(() => {{
                const post = document.querySelector({});
                if (!post) return false;
                const buttons = post.querySelectorAll('div[role="button"][tabindex="0"]');
                for (const btn of buttons) {{
                    if (btn.textContent && btn.textContent.trim() === 'See more') {{
                        btn.click();
                        return true;
                    }}
                }}
                return false;
            }})()"#,
            serde_json::to_string(&post_selector(posinset))?
        );
        let value = self.evaluate(expression, false).await?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn wait_for_post_images(&self, posinset: &str) -> Result<()> {
        let expression = format!(
            r#"(async () => {{
                const post = document.querySelector({});
                if (!post) return 0;
                const images = Array.from(post.querySelectorAll('img'));
                await Promise.all(images.map((img) => img.complete
                    ? Promise.resolve()
                    : new Promise((resolve) => {{
                        img.addEventListener('load', resolve, {{ once: true }});
                        img.addEventListener('error', resolve, {{ once: true }});
                    }})));
                return images.length;
            }})()"#,
            serde_json::to_string(&post_selector(posinset))?
        );
        self.evaluate(expression, true).await?;
        Ok(())
    }

    async fn capture_post(&self, posinset: &str) -> Result<Vec<u8>> {
        let tab = Arc::clone(&self.tab);
        let selector = post_selector(posinset);
        spawn_blocking(move || -> Result<Vec<u8>> {
            let element = tab
                .find_element(&selector)
                .map_err(|e| browser_error(&format!("Post {} not found", selector), e))?;
            element
                .capture_screenshot(CaptureScreenshotFormatOption::Png)
                .map_err(|e| browser_error("Screenshot capture failed", e))
        })
        .await?
    }
}
