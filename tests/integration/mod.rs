// Shared fakes for the integration tests: an in-memory browser, a recording
// mailer and uploader, and helpers that wire them to a temporary state file.

pub mod api_tests;
pub mod scanner_tests;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use posts_notifier::browser::{PageDriver, TabSource};
use posts_notifier::config::FeedTimingConfig;
use posts_notifier::digest::EmailPayload;
use posts_notifier::plugins::{ImageUploader, Mailer};
use posts_notifier::relay::{Relay, Services};
use posts_notifier::scanner::{FeedTargets, ScanContext};
use posts_notifier::{AppError, Result, StateStore};

pub const MARKETPLACE_URL: &str = "https://www.facebook.com/marketplace/category/free";
pub const FEED_URL: &str = "https://www.facebook.com/?filter=groups&sk=h_chr";
pub const GROUP_A: &str = "https://www.facebook.com/groups/111/";
pub const GROUP_B: &str = "https://www.facebook.com/groups/222/";

/// A page whose content advances one snapshot per scroll.
pub struct FakePage {
    url: String,
    snapshots: Vec<String>,
    position: AtomicUsize,
    fail_scroll: bool,
    reload_delay: Duration,
    pub reloads: AtomicUsize,
    pub captures: Mutex<Vec<String>>,
    pub expanded: Mutex<Vec<String>>,
}

impl FakePage {
    pub fn new(url: &str, snapshots: Vec<String>) -> Arc<Self> {
        Self::build(url, snapshots, false, Duration::ZERO)
    }

    /// Every `scroll_by` fails as a timed-out browser call would.
    pub fn with_failing_scroll(url: &str, snapshots: Vec<String>) -> Arc<Self> {
        Self::build(url, snapshots, true, Duration::ZERO)
    }

    /// `reload` takes `delay` to finish.
    pub fn with_slow_reload(url: &str, snapshots: Vec<String>, delay: Duration) -> Arc<Self> {
        Self::build(url, snapshots, false, delay)
    }

    fn build(url: &str, snapshots: Vec<String>, fail_scroll: bool, reload_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            snapshots,
            position: AtomicUsize::new(0),
            fail_scroll,
            reload_delay,
            reloads: AtomicUsize::new(0),
            captures: Mutex::new(Vec::new()),
            expanded: Mutex::new(Vec::new()),
        })
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    fn current(&self) -> String {
        if self.snapshots.is_empty() {
            return "<html><body></body></html>".to_string();
        }
        let i = self.position.load(Ordering::SeqCst).min(self.snapshots.len() - 1);
        self.snapshots[i].clone()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.reload_delay).await;
        self.position.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.current())
    }

    async fn count(&self, _selector: &str) -> Result<usize> {
        Ok(self.current().matches("aria-posinset=").count())
    }

    async fn scroll_by(&self, _pixels: i64) -> Result<()> {
        if self.fail_scroll {
            return Err(AppError::Browser("scroll timed out".to_string()));
        }
        self.position.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn expand_post(&self, posinset: &str) -> Result<bool> {
        self.expanded.lock().unwrap().push(posinset.to_string());
        Ok(true)
    }

    async fn wait_for_post_images(&self, _posinset: &str) -> Result<()> {
        Ok(())
    }

    async fn capture_post(&self, posinset: &str) -> Result<Vec<u8>> {
        self.captures.lock().unwrap().push(posinset.to_string());
        Ok(format!("png-{}", posinset).into_bytes())
    }
}

pub struct FakeTabs {
    pub pages: Vec<Arc<FakePage>>,
}

#[async_trait]
impl TabSource for FakeTabs {
    type Page = FakePage;

    async fn pages(&self) -> Result<Vec<Arc<FakePage>>> {
        Ok(self.pages.clone())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailPayload>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, payload: &EmailPayload) -> Result<()> {
        self.sent.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(AppError::Email("smtp unavailable".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingUploader {
    pub uploads: Mutex<Vec<Vec<u8>>>,
    pub fail: bool,
}

#[async_trait]
impl ImageUploader for RecordingUploader {
    async fn upload(&self, png: Vec<u8>) -> Result<String> {
        if self.fail {
            return Err(AppError::Upload("bucket unavailable".to_string()));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(png);
        Ok(format!("https://cdn.test/{}.png", uploads.len()))
    }
}

pub fn fast_timing() -> FeedTimingConfig {
    FeedTimingConfig {
        poll_interval_ms: 5,
        wait_timeout_secs: 1,
        settle_delay_ms: 0,
        scroll_iterations: 3,
        scroll_step_px: 2000,
        scroll_delay_ms: 0,
        see_more_delay_ms: 0,
    }
}

pub fn targets() -> FeedTargets {
    FeedTargets::new(&[GROUP_A.to_string(), GROUP_B.to_string()]).unwrap()
}

pub async fn temp_store() -> (TempDir, StateStore) {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(dir.path().join("state.json")).await.unwrap();
    (dir, store)
}

/// Serves relay requests with `services` on a background task.
pub fn spawn_relay(services: Services) -> Relay {
    let (relay, mut rx) = Relay::channel(8);
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let reply = services.dispatch(envelope.message).await;
            let _ = envelope.reply.send(reply);
        }
    });
    relay
}

pub struct Harness {
    pub _dir: TempDir,
    pub store: StateStore,
    pub mailer: Arc<RecordingMailer>,
    pub uploader: Arc<RecordingUploader>,
    pub ctx: ScanContext,
}

pub async fn harness_with(mailer: RecordingMailer, uploader: RecordingUploader, capture_images: bool) -> Harness {
    let (dir, store) = temp_store().await;
    let mailer = Arc::new(mailer);
    let uploader = Arc::new(uploader);
    let relay = spawn_relay(Services {
        mailer: mailer.clone(),
        uploader: Some(uploader.clone()),
    });
    let ctx = ScanContext {
        store: store.clone(),
        relay,
        targets: Arc::new(targets()),
        timing: fast_timing(),
        capture_images,
        marketplace_intro: None,
    };
    Harness {
        _dir: dir,
        store,
        mailer,
        uploader,
        ctx,
    }
}

pub async fn harness() -> Harness {
    harness_with(RecordingMailer::default(), RecordingUploader::default(), true).await
}

pub fn marketplace_html(items: &[(&str, &str)]) -> String {
    let links: String = items
        .iter()
        .map(|(id, title)| {
            format!(
                r#"<a href="/marketplace/item/{id}/?ref=category"><img src="https://cdn.test/{id}.jpg"><span>{title}</span></a>"#
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", links)
}

pub fn feed_post(posinset: u32, group: &str, image: &str) -> String {
    format!(
        r#"<div aria-posinset="{posinset}">
            <div data-ad-rendering-role="profile_name"><a href="{group}?__cft__=x">Group</a></div>
            <div role="button" tabindex="0">See more</div>
            <div style="max-width: 500px"><img referrerpolicy="origin-when-cross-origin" src="https://scontent.test/v/t1/{image}?oh=1"></div>
        </div>"#
    )
}

pub fn feed_html(posts: &[String]) -> String {
    format!("<html><body>{}</body></html>", posts.concat())
}
