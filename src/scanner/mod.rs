pub mod feed;
pub mod marketplace;

use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::browser::PageDriver;
use crate::config::FeedTimingConfig;
use crate::relay::Relay;
use crate::store::StateStore;
use crate::{AppError, Result};

pub use feed::{FeedScanner, FeedTargets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Marketplace,
    Feed,
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanKind::Marketplace => write!(f, "marketplace"),
            ScanKind::Feed => write!(f, "feed"),
        }
    }
}

/// Everything a scanner needs besides the page itself.
#[derive(Clone)]
pub struct ScanContext {
    pub store: StateStore,
    pub relay: Relay,
    pub targets: Arc<FeedTargets>,
    pub timing: FeedTimingConfig,
    pub capture_images: bool,
    pub marketplace_intro: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub kind: ScanKind,
    /// Identifiers added to the seen-set during this scan.
    pub new_ids: usize,
    /// Entries in the digest; zero when no email was requested.
    pub reported: usize,
    pub email_sent: bool,
}

pub async fn run_scan<P>(kind: ScanKind, page: &P, ctx: &ScanContext) -> Result<ScanReport>
where
    P: PageDriver + ?Sized,
{
    metrics::counter!("notifier_scans_total", "kind" => kind.to_string()).increment(1);
    let report = match kind {
        ScanKind::Marketplace => marketplace::scan(page, ctx).await?,
        ScanKind::Feed => FeedScanner::new(page, ctx).run().await?,
    };
    metrics::counter!("notifier_new_ids_total", "kind" => kind.to_string()).increment(report.new_ids as u64);
    Ok(report)
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| AppError::InvalidSelector {
        selector: css.to_string(),
    })
}
