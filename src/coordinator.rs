use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::browser::{PageDriver, TabSource};
use crate::config::{FeedTimingConfig, MonitorConfig};
use crate::relay::{Envelope, Relay, Services};
use crate::scanner::{FeedTargets, ScanContext, ScanKind, ScanReport, run_scan};
use crate::store::{Settings, StateStore};
use crate::url_match::UrlPattern;
use crate::Result;

const RELAY_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct MonitoredPage {
    pub kind: ScanKind,
    pub pattern: UrlPattern,
}

/// Decides which open pages get reloaded and which scanner runs on them.
#[derive(Debug, Clone)]
pub struct Monitor {
    host_scope: UrlPattern,
    pages: Vec<MonitoredPage>,
}

impl Monitor {
    pub fn new(host_scope: UrlPattern, pages: Vec<MonitoredPage>) -> Self {
        Self { host_scope, pages }
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let pages = config
            .pages
            .iter()
            .map(|page| {
                Ok(MonitoredPage {
                    kind: page.kind,
                    pattern: UrlPattern::new(page.pattern())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(UrlPattern::new(&config.host_scope)?, pages))
    }

    pub fn kind_for(&self, url: &str) -> Option<ScanKind> {
        if !self.host_scope.matches(url) {
            return None;
        }
        self.pages.iter().find(|p| p.pattern.matches(url)).map(|p| p.kind)
    }
}

/// Scanner settings that do not change while the service runs.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub targets: FeedTargets,
    pub timing: FeedTimingConfig,
    pub capture_images: bool,
    pub marketplace_intro: Option<String>,
    pub resume_on_startup: bool,
}

/// Reloads every monitored page once and scans it.
pub async fn run_cycle<S>(tabs: &S, monitor: &Monitor, ctx: &ScanContext) -> Result<Vec<ScanReport>>
where
    S: TabSource + ?Sized,
{
    tracing::debug!("Alarm triggered. Checking tabs to reload...");
    let pages = tabs.pages().await?;
    let mut reports = Vec::new();

    for page in pages {
        let url = page.url();
        let Some(kind) = monitor.kind_for(&url) else {
            continue;
        };

        tracing::debug!("Reloading {} page {}", kind, url);
        if let Err(e) = page.reload().await {
            tracing::warn!("Failed to reload {}: {}", url, e);
            continue;
        }

        match run_scan(kind, page.as_ref(), ctx).await {
            Ok(report) => {
                tracing::info!(
                    "{} scan of {}: {} new id(s), {} reported",
                    kind,
                    url,
                    report.new_ids,
                    report.reported
                );
                reports.push(report);
            }
            Err(e) => tracing::error!("{} scan of {} failed: {}", kind, url, e),
        }
    }

    Ok(reports)
}

pub struct Coordinator<S: TabSource + 'static> {
    tabs: Arc<S>,
    monitor: Arc<Monitor>,
    services: Services,
    ctx: ScanContext,
    requests: mpsc::Receiver<Envelope>,
    settings: watch::Receiver<Settings>,
    resume_on_startup: bool,
}

impl<S: TabSource + 'static> Coordinator<S> {
    pub fn new(tabs: Arc<S>, monitor: Monitor, store: StateStore, services: Services, options: ScanOptions) -> Self {
        let (relay, requests) = Relay::channel(RELAY_CAPACITY);
        // Subscribed here so changes made before `run` is first polled still re-arm.
        let settings = store.subscribe();
        let ctx = ScanContext {
            store: store.clone(),
            relay,
            targets: Arc::new(options.targets),
            timing: options.timing,
            capture_images: options.capture_images,
            marketplace_intro: options.marketplace_intro,
        };

        Self {
            tabs,
            monitor: Arc::new(monitor),
            services,
            ctx,
            requests,
            settings,
            resume_on_startup: options.resume_on_startup,
        }
    }

    pub fn relay(&self) -> Relay {
        self.ctx.relay.clone()
    }

    /// Context for running scans outside the timer; requests are served once `run` is polled.
    pub fn scan_context(&self) -> ScanContext {
        self.ctx.clone()
    }

    /// Runs until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut settings_rx = self.settings.clone();
        let initial = *settings_rx.borrow();

        let mut timer = if self.resume_on_startup && initial.notifier_enabled {
            Some(arm(&initial))
        } else {
            tracing::debug!("Starting with all alarms cleared");
            None
        };
        let mut cycle: Option<JoinHandle<()>> = None;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                Some(envelope) = self.requests.recv() => {
                    let services = self.services.clone();
                    tokio::spawn(async move {
                        let reply = services.dispatch(envelope.message).await;
                        // The requester may have given up waiting.
                        let _ = envelope.reply.send(reply);
                    });
                }

                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Settings channel closed");
                        break;
                    }
                    let settings = *settings_rx.borrow_and_update();
                    timer = if settings.notifier_enabled {
                        tracing::debug!("notifierEnabled updated, enabling alarm");
                        Some(arm(&settings))
                    } else {
                        tracing::debug!("notifierEnabled updated, clearing alarms");
                        None
                    };
                }

                _ = next_tick(&mut timer) => {
                    if cycle.as_ref().is_some_and(|handle| !handle.is_finished()) {
                        tracing::warn!("Previous scan cycle still running, skipping this tick");
                        metrics::counter!("notifier_skipped_ticks_total").increment(1);
                        continue;
                    }
                    cycle = Some(self.spawn_cycle());
                }
            }
        }

        if let Some(handle) = cycle {
            handle.abort();
        }
        tracing::info!("Coordinator stopped");
        Ok(())
    }

    fn spawn_cycle(&self) -> JoinHandle<()> {
        let tabs = Arc::clone(&self.tabs);
        let monitor = Arc::clone(&self.monitor);
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = run_cycle(tabs.as_ref(), &monitor, &ctx).await {
                tracing::error!("Scan cycle failed: {}", e);
            }
        })
    }
}

fn arm(settings: &Settings) -> Interval {
    let period = Duration::from_secs(settings.reload_interval);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!("Alarm set for every {} seconds.", settings.reload_interval);
    interval
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
