use anyhow::{Context, Result};
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::debug;

/// Placeholder in the configured link pattern that stands for the date token.
pub const TODAY_PLACEHOLDER: &str = "{today}";

/// Substituted for the date token when falling back to "any date".
const DATE_WILDCARD: &str = "[0-9]+";

/// Outcome of the link discovery stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Links matching today's date token were found on the page.
    Today(BTreeSet<String>),
    /// No link for today; the most recent link by string order was selected
    /// from the wildcard match set.
    Latest(String),
    /// Neither today's pattern nor the wildcard pattern matched anything.
    Exhausted,
}

/// Compile a link pattern anchored at the start of the href.
pub fn anchored_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})"))
        .with_context(|| format!("Invalid link pattern: {pattern}"))
}

/// Collect the distinct anchor targets whose href matches the pattern.
pub fn extract_links(html: &str, pattern: &Regex) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").unwrap();

    let mut links = BTreeSet::new();
    for anchor in document.select(&anchor_selector) {
        if let Some(href) = anchor.value().attr("href") {
            if pattern.is_match(href) {
                links.insert(href.to_string());
            }
        }
    }
    links
}

pub fn fetch_html(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to fetch {url}"))?;
    response.text().context("Failed to get response text")
}

/// Fetch the source page once and return the hrefs matching the pattern.
pub fn fetch_matching_links(
    client: &Client,
    web_page: &str,
    pattern: &str,
) -> Result<BTreeSet<String>> {
    let regex = anchored_pattern(pattern)?;
    let html = fetch_html(client, web_page)?;
    Ok(extract_links(&html, &regex))
}

/// Resolve today's trade data links, falling back to the latest available.
pub fn resolve(
    client: &Client,
    web_page: &str,
    pattern_template: &str,
    today: &str,
) -> Result<Resolution> {
    resolve_with(pattern_template, today, |pattern| {
        fetch_matching_links(client, web_page, pattern)
    })
}

/// Resolution algorithm, generic over the query so it can run against a
/// canned page in tests. The query receives the fully instantiated pattern.
pub fn resolve_with<F>(pattern_template: &str, today: &str, mut query: F) -> Result<Resolution>
where
    F: FnMut(&str) -> Result<BTreeSet<String>>,
{
    let today_pattern = pattern_template.replace(TODAY_PLACEHOLDER, today);
    debug!("pattern to get source link: {today_pattern}");
    let links = query(&today_pattern)?;
    if !links.is_empty() {
        return Ok(Resolution::Today(links));
    }

    let wildcard_pattern = pattern_template.replace(TODAY_PLACEHOLDER, DATE_WILDCARD);
    debug!("fallback pattern: {wildcard_pattern}");
    let links = query(&wildcard_pattern)?;
    // String order over the link text; the embedded date makes this an
    // approximation of "most recent".
    match links.into_iter().last() {
        Some(link) => Ok(Resolution::Latest(link)),
        None => Ok(Resolution::Exhausted),
    }
}
