//! Group-feed scanner.
//!
//! A feed cycle waits for posts to render, then makes several passes over the
//! page with a scroll between them. Each post is identified by the file name of
//! its main image; a post is reported at most once per group per cycle and its
//! image name is remembered so later cycles skip it.

use scraper::{ElementRef, Html};
use std::time::Duration;
use url::Url;

use super::{ScanContext, ScanKind, ScanReport, selector};
use crate::browser::PageDriver;
use crate::digest::{PostResult, feed_digest};
use crate::store::SeenKind;
use crate::url_match::{extract_image_name, resolve};
use crate::{AppError, Result};

pub const POST_SELECTOR: &str = "div[aria-posinset]";
const PROFILE_NAME_SELECTOR: &str = r#"div[data-ad-rendering-role="profile_name"]"#;
const GROUP_LINK_SELECTOR: &str = r#"a[href*="/groups/"]"#;
const POST_IMAGE_SELECTOR: &str = r#"div[style] > img[referrerpolicy="origin-when-cross-origin"]"#;

/// Group URLs whose posts are reported, with the path used to recognise them.
#[derive(Debug, Clone, Default)]
pub struct FeedTargets {
    targets: Vec<(String, String)>,
}

impl FeedTargets {
    pub fn new(urls: &[String]) -> Result<Self> {
        let targets = urls
            .iter()
            .map(|u| {
                let parsed = Url::parse(u).map_err(|e| AppError::Validation(format!("invalid target group {}: {}", u, e)))?;
                Ok((u.clone(), parsed.path().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { targets })
    }

    /// The first target whose path occurs in `group_href`.
    pub fn canonical_for(&self, group_href: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|(_, path)| group_href.contains(path.as_str()))
            .map(|(url, _)| url.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoProfileName,
    NoGroupLink,
    UntargetedGroup,
    NoImage,
    BadImageName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostVerdict {
    Candidate { canonical_url: String, image_name: String },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedPost {
    pub posinset: String,
    pub verdict: PostVerdict,
}

/// Classifies every post container currently in the document.
pub fn inspect_posts(html: &str, page_url: &str, targets: &FeedTargets) -> Result<Vec<InspectedPost>> {
    let base = Url::parse(page_url).map_err(|e| AppError::Browser(format!("invalid page URL {}: {}", page_url, e)))?;
    let post_selector = selector(POST_SELECTOR)?;
    let profile_selector = selector(PROFILE_NAME_SELECTOR)?;
    let group_selector = selector(GROUP_LINK_SELECTOR)?;
    let image_selector = selector(POST_IMAGE_SELECTOR)?;

    let document = Html::parse_document(html);
    let inspected = document
        .select(&post_selector)
        .map(|post| {
            let posinset = post.value().attr("aria-posinset").unwrap_or("?").to_string();
            let verdict = classify(post, &base, targets, &profile_selector, &group_selector, &image_selector);
            InspectedPost { posinset, verdict }
        })
        .collect();
    Ok(inspected)
}

fn classify(
    post: ElementRef<'_>,
    base: &Url,
    targets: &FeedTargets,
    profile_selector: &scraper::Selector,
    group_selector: &scraper::Selector,
    image_selector: &scraper::Selector,
) -> PostVerdict {
    let Some(profile) = post.select(profile_selector).next() else {
        return PostVerdict::Skipped(SkipReason::NoProfileName);
    };

    let group_href = profile
        .select(group_selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .filter(|href| !href.is_empty())
        .and_then(|href| resolve(base, href));
    let Some(group_href) = group_href else {
        return PostVerdict::Skipped(SkipReason::NoGroupLink);
    };

    let Some(canonical_url) = targets.canonical_for(&group_href) else {
        return PostVerdict::Skipped(SkipReason::UntargetedGroup);
    };

    let src = post
        .select(image_selector)
        .next()
        .and_then(|img| img.value().attr("src"))
        .filter(|src| !src.is_empty())
        .and_then(|src| resolve(base, src));
    let Some(src) = src else {
        return PostVerdict::Skipped(SkipReason::NoImage);
    };

    match extract_image_name(&src) {
        Some(image_name) => PostVerdict::Candidate {
            canonical_url: canonical_url.to_string(),
            image_name,
        },
        None => PostVerdict::Skipped(SkipReason::BadImageName),
    }
}

pub struct FeedScanner<'a, P: PageDriver + ?Sized> {
    page: &'a P,
    ctx: &'a ScanContext,
}

impl<'a, P: PageDriver + ?Sized> FeedScanner<'a, P> {
    pub fn new(page: &'a P, ctx: &'a ScanContext) -> Self {
        Self { page, ctx }
    }

    pub async fn run(&self) -> Result<ScanReport> {
        let timing = &self.ctx.timing;
        let mut report = ScanReport {
            kind: ScanKind::Feed,
            new_ids: 0,
            reported: 0,
            email_sent: false,
        };

        tracing::debug!("Waiting for feed posts to load...");
        if !self.wait_for_posts().await? {
            tracing::warn!("No posts appeared on {} within {}s", self.page.url(), timing.wait_timeout_secs);
            return Ok(report);
        }
        tokio::time::sleep(Duration::from_millis(timing.settle_delay_ms)).await;

        let mut results: Vec<PostResult> = Vec::new();
        // Earlier passes have already recorded their ids; what they found is still mailed.
        for pass in 0..timing.scroll_iterations {
            match self.scan_pass(&mut results).await {
                Ok(recorded) => report.new_ids += recorded,
                Err(e) => {
                    tracing::warn!("Feed pass {} on {} failed: {}", pass + 1, self.page.url(), e);
                    break;
                }
            }

            if pass + 1 < timing.scroll_iterations {
                if let Err(e) = self.page.scroll_by(timing.scroll_step_px).await {
                    tracing::warn!("Scrolling {} failed: {}", self.page.url(), e);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(timing.scroll_delay_ms)).await;
            }
        }

        tracing::debug!("Total unique group URLs found: {}", results.len());
        if results.is_empty() {
            tracing::info!("No new posts found on {}", self.page.url());
            return Ok(report);
        }

        report.reported = results.len();
        report.email_sent = match self.ctx.relay.send_email(feed_digest(&results)).await {
            Ok(reply) if reply.success => true,
            Ok(reply) => {
                tracing::warn!("Feed digest not delivered: {}", reply.error.unwrap_or_default());
                false
            }
            Err(e) => {
                tracing::error!("Feed digest could not be relayed: {}", e);
                false
            }
        };
        Ok(report)
    }

    async fn wait_for_posts(&self) -> Result<bool> {
        let poll = Duration::from_millis(self.ctx.timing.poll_interval_ms);
        let limit = Duration::from_secs(self.ctx.timing.wait_timeout_secs);

        let waited = tokio::time::timeout(limit, async {
            loop {
                let found = self.page.count(POST_SELECTOR).await?;
                tracing::debug!("Found {} {} so far", found, POST_SELECTOR);
                if found > 0 {
                    return Ok::<_, AppError>(());
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await;

        match waited {
            Ok(result) => result.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    /// One pass over the rendered posts. Returns how many image names were newly recorded.
    async fn scan_pass(&self, results: &mut Vec<PostResult>) -> Result<usize> {
        let mut seen = self.ctx.store.seen(SeenKind::PostIds).await;
        let html = self.page.content().await?;
        let posts = inspect_posts(&html, &self.page.url(), &self.ctx.targets)?;
        let mut newly_found = Vec::new();

        for post in posts {
            let (canonical_url, image_name) = match post.verdict {
                PostVerdict::Candidate { canonical_url, image_name } => (canonical_url, image_name),
                PostVerdict::Skipped(reason) => {
                    tracing::debug!("Post #{} skipped: {:?}", post.posinset, reason);
                    continue;
                }
            };

            if seen.contains(&image_name) {
                tracing::debug!("Skipping already seen image {}", image_name);
                continue;
            }

            if results.iter().any(|r| r.canonical_url == canonical_url) {
                tracing::debug!("Group {} already in this digest", canonical_url);
            } else {
                let image_url = self.capture_and_upload(&post.posinset).await;
                results.push(PostResult { canonical_url, image_url });
            }

            seen.insert(image_name.clone());
            newly_found.push(image_name);
        }

        if newly_found.is_empty() {
            return Ok(0);
        }
        let recorded = self.ctx.store.record_seen(SeenKind::PostIds, newly_found).await?;
        tracing::debug!("Recorded {} new post id(s)", recorded);
        Ok(recorded)
    }

    /// Screenshot of the post uploaded through the relay; `None` when any step fails.
    async fn capture_and_upload(&self, posinset: &str) -> Option<String> {
        if !self.ctx.capture_images {
            return None;
        }

        match self.page.expand_post(posinset).await {
            Ok(true) => {
                tracing::debug!("Expanded \"See more\" in post #{}", posinset);
                tokio::time::sleep(Duration::from_millis(self.ctx.timing.see_more_delay_ms)).await;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Could not expand post #{}: {}", posinset, e),
        }

        if let Err(e) = self.page.wait_for_post_images(posinset).await {
            tracing::warn!("Images in post #{} did not settle: {}", posinset, e);
        }

        let png = match self.page.capture_post(posinset).await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!("Screenshot of post #{} failed: {}", posinset, e);
                return None;
            }
        };

        match self.ctx.relay.upload_image(&png).await {
            Ok(reply) if reply.success => reply.url,
            Ok(reply) => {
                tracing::warn!("Upload failed for post #{}: {}", posinset, reply.error.unwrap_or_default());
                None
            }
            Err(e) => {
                tracing::warn!("Upload error for post #{}: {}", posinset, e);
                None
            }
        }
    }
}
