use regex::Regex;
use scraper::Html;
use std::collections::HashMap;
use url::Url;

use super::{ScanContext, ScanKind, ScanReport, selector};
use crate::browser::PageDriver;
use crate::digest::{MarketplaceItem, marketplace_digest};
use crate::store::SeenKind;
use crate::url_match::{resolve, strip_url_arguments};
use crate::{AppError, Result};

const ITEM_LINK_SELECTOR: &str = r#"a[href*="/marketplace/item/"]"#;
const ITEM_PATH_PATTERN: &str = r"/marketplace/item/[\w-]+/?";
const NO_TITLE: &str = "(no title)";

/// Item links on a listings page keyed by their cleaned URL, in first-seen order.
pub fn extract_items(html: &str, page_url: &str) -> Result<Vec<MarketplaceItem>> {
    let base = Url::parse(page_url).map_err(|e| AppError::Browser(format!("invalid page URL {}: {}", page_url, e)))?;
    let item_path = Regex::new(ITEM_PATH_PATTERN)?;
    let link_selector = selector(ITEM_LINK_SELECTOR)?;
    let img_selector = selector("img")?;

    let document = Html::parse_document(html);
    let mut items: Vec<MarketplaceItem> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for link in document.select(&link_selector) {
        let Some(href) = link.value().attr("href").and_then(|h| resolve(&base, h)) else {
            continue;
        };
        if !item_path.is_match(&href) {
            continue;
        }

        let url = strip_url_arguments(&href);
        let text = link.text().collect::<String>();
        let title = match text.trim() {
            "" => NO_TITLE.to_string(),
            t => t.to_string(),
        };
        let image = link
            .select(&img_selector)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| resolve(&base, src));

        match positions.get(&url) {
            Some(&i) => {
                items[i].title = title;
                items[i].image = image;
            }
            None => {
                positions.insert(url.clone(), items.len());
                items.push(MarketplaceItem { url, title, image });
            }
        }
    }

    Ok(items)
}

pub async fn scan<P>(page: &P, ctx: &ScanContext) -> Result<ScanReport>
where
    P: PageDriver + ?Sized,
{
    let page_url = page.url();
    let html = page.content().await?;
    let items = extract_items(&html, &page_url)?;

    let seen = ctx.store.seen(SeenKind::Items).await;
    let new_items: Vec<MarketplaceItem> = items.into_iter().filter(|item| !seen.contains(&item.url)).collect();

    if new_items.is_empty() {
        tracing::info!("No new marketplace items on {}", page_url);
        return Ok(ScanReport {
            kind: ScanKind::Marketplace,
            new_ids: 0,
            reported: 0,
            email_sent: false,
        });
    }

    let digest = marketplace_digest(&new_items, ctx.marketplace_intro.as_deref());
    let email_sent = match ctx.relay.send_email(digest).await {
        Ok(reply) if reply.success => true,
        Ok(reply) => {
            tracing::warn!("Marketplace digest not delivered: {}", reply.error.unwrap_or_default());
            false
        }
        Err(e) => {
            tracing::error!("Marketplace digest could not be relayed: {}", e);
            false
        }
    };
    tracing::info!("Requested digest for {} new item(s).", new_items.len());

    // Items are recorded even when delivery failed.
    let reported = new_items.len();
    let new_ids = ctx
        .store
        .record_seen(SeenKind::Items, new_items.into_iter().map(|item| item.url))
        .await?;

    Ok(ScanReport {
        kind: ScanKind::Marketplace,
        new_ids,
        reported,
        email_sent,
    })
}
