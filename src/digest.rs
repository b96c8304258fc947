use serde::{Deserialize, Serialize};

/// One outbound digest: subject plus plain-text and HTML bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub subject: String,
    pub body: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceItem {
    pub url: String,
    pub title: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResult {
    pub canonical_url: String,
    pub image_url: Option<String>,
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn marketplace_digest(items: &[MarketplaceItem], intro: Option<&str>) -> EmailPayload {
    let subject = format!("🛍️ Found {} NEW Facebook Marketplace item(s)", items.len());

    let urls = items.iter().map(|i| i.url.as_str()).collect::<Vec<_>>().join("\n");
    let body = match intro {
        Some(intro) => format!("{}\n\n{}", intro, urls),
        None => urls,
    };

    let mut html = String::new();
    if let Some(intro) = intro {
        html.push_str(&format!("<p>{}</p><br/>", escape_html(intro)));
    }
    let blocks = items
        .iter()
        .map(|item| {
            let title = escape_html(&item.title);
            let url = escape_html(&item.url);
            let image = item
                .image
                .as_deref()
                .map(|src| {
                    format!(
                        r#"<img src="{}" alt="{}" style="max-width: 200px; border:1px solid #ccc; margin-top: 5px;" />"#,
                        escape_html(src),
                        title
                    )
                })
                .unwrap_or_default();
            format!(
                r#"<div style="margin-bottom: 20px;"><strong>{}</strong><br/><a href="{}">{}</a><br/>{}</div>"#,
                title, url, url, image
            )
        })
        .collect::<Vec<_>>();
    html.push_str(&blocks.join("\n"));

    EmailPayload { subject, body, html }
}

pub fn feed_digest(results: &[PostResult]) -> EmailPayload {
    let subject = format!("🔔 New Facebook Posts Found ({})", results.len());

    let lines = results
        .iter()
        .map(|r| match &r.image_url {
            Some(image) => format!("• {}\n  Image: {}", r.canonical_url, image),
            None => format!("• {}", r.canonical_url),
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let body = format!("New Facebook posts were found from the following groups:\n\n{}", lines);

    let items = results
        .iter()
        .map(|r| {
            let url = escape_html(&r.canonical_url);
            let image = r
                .image_url
                .as_deref()
                .map(|src| format!(r#"<br><img src="{}" alt="Image" style="margin-top:5px;" />"#, escape_html(src)))
                .unwrap_or_default();
            format!(r#"<li><a href="{}">{}</a>{}</li>"#, url, url, image)
        })
        .collect::<String>();
    let html = format!(
        "<p><strong>New Facebook posts were found from the following groups:</strong></p>\n<ul>{}</ul>",
        items
    );

    EmailPayload { subject, body, html }
}
