use regex::Regex;
use url::Url;

use crate::Result;

/// A monitored-page pattern.
///
/// Patterns containing `*` are wildcard patterns matched against the whole
/// URL, where `*` stands for any run of characters. Anything else is a plain
/// prefix.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Prefix(String),
    Wildcard(Regex),
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        if !pattern.contains('*') {
            return Ok(UrlPattern::Prefix(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body))?;

        Ok(UrlPattern::Wildcard(regex))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Prefix(prefix) => url.starts_with(prefix.as_str()),
            UrlPattern::Wildcard(regex) => regex.is_match(url),
        }
    }
}

/// Drops the query string and normalises to a single trailing slash.
pub fn strip_url_arguments(url: &str) -> String {
    let clean = url.split('?').next().unwrap_or(url);
    if clean.ends_with('/') {
        clean.to_string()
    } else {
        format!("{}/", clean)
    }
}

/// File name of an image URL, used as the post identifier.
pub fn extract_image_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path().rsplit('/').next()?;
    let name = last.split('?').next().unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Resolves a possibly relative `href`/`src` against the page address.
pub fn resolve(base: &Url, reference: &str) -> Option<String> {
    base.join(reference).ok().map(String::from)
}
