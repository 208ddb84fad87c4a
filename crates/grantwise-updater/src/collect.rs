//! Turning fetched pages, feeds and API payloads into entries.

use crate::entry::UpdaterEntry;
use crate::error::UpdaterError;
use crate::source::DataSource;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

const DEFAULT_LISTING_SELECTOR: &str = ".listing";
const SUMMARY_LIMIT: usize = 500;

fn parse_selector(selector: &str) -> Result<Selector, UpdaterError> {
    Selector::parse(selector).map_err(|e| UpdaterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Text of the first match, with text nodes trimmed and space-joined.
fn select_text(element: ElementRef<'_>, selector: Option<&str>) -> Option<String> {
    let selector = Selector::parse(selector?).ok()?;
    let found = element.select(&selector).next()?;
    let text = found
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn select_href(element: ElementRef<'_>, selector: Option<&str>) -> Option<String> {
    let selector = Selector::parse(selector?).ok()?;
    element
        .select(&selector)
        .next()?
        .value()
        .attr("href")
        .map(str::to_string)
}

/// Extracts one entry per listing element. Listings without a name are
/// skipped.
pub fn parse_listings(html: &str, source: &DataSource) -> Result<Vec<UpdaterEntry>, UpdaterError> {
    let document = Html::parse_document(html);
    let listing = parse_selector(source.selector("listing").unwrap_or(DEFAULT_LISTING_SELECTOR))?;

    let mut entries = Vec::new();
    for element in document.select(&listing) {
        let Some(name) = select_text(element, source.selector("name")) else {
            tracing::debug!(source = %source.name, "skipping listing without a name");
            continue;
        };

        let description = select_text(element, source.selector("description"))
            .unwrap_or_else(|| format!("Opportunity from {}", source.name));
        let mut entry = UpdaterEntry::new(&name, description, &source.name, &source.url);
        entry.location = select_text(element, source.selector("location"));
        entry.deadlines = select_text(element, source.selector("deadline"))
            .into_iter()
            .collect();
        entry.website = select_href(element, source.selector("link"));
        entry.amount = select_text(element, source.selector("amount"));
        if let Some(disciplines) = select_text(element, source.selector("disciplines")) {
            entry.disciplines = disciplines.split(',').map(|d| d.trim().to_string()).collect();
        }
        entries.push(entry.seal());
    }
    Ok(entries)
}

fn child_text<'a, 'input>(node: roxmltree::Node<'a, 'input>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        node.children()
            .find(|c| c.is_element() && c.tag_name().name() == *name)
            .and_then(|c| c.text())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}

fn atom_link<'a, 'input>(node: roxmltree::Node<'a, 'input>) -> Option<&'a str> {
    let link = node
        .children()
        .find(|c| c.is_element() && c.tag_name().name() == "link")?;
    link.attribute("href").or_else(|| link.text().map(str::trim))
}

fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() > SUMMARY_LIMIT {
        let cut: String = summary.chars().take(SUMMARY_LIMIT).collect();
        format!("{}...", cut)
    } else {
        summary.to_string()
    }
}

/// Reads RSS 2.0 `<item>` and Atom `<entry>` elements.
pub fn parse_feed(xml: &str, source: &DataSource) -> Result<Vec<UpdaterEntry>, UpdaterError> {
    let doc = roxmltree::Document::parse(xml)?;
    let entries = doc
        .descendants()
        .filter(|n| n.is_element() && matches!(n.tag_name().name(), "item" | "entry"))
        .filter_map(|item| {
            let title = child_text(item, &["title"])?;
            let summary = child_text(item, &["summary", "description", "content"]).unwrap_or("");
            let mut entry =
                UpdaterEntry::new(title, truncate_summary(summary), &source.name, &source.url);
            entry.website = atom_link(item).map(str::to_string);
            Some(entry.seal())
        })
        .collect();
    Ok(entries)
}

/// Reads `results[]` from a JSON API response. Items without a name are
/// skipped.
pub fn parse_api_results(data: &Value, source: &DataSource) -> Vec<UpdaterEntry> {
    let Some(results) = data.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };
    let text = |item: &Value, key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

    results
        .iter()
        .filter_map(|item| {
            let name = text(item, "name")?;
            let mut entry = UpdaterEntry::new(
                &name,
                text(item, "description").unwrap_or_default(),
                &source.name,
                &source.url,
            );
            entry.kind = text(item, "type").unwrap_or_else(|| "residency".to_string());
            entry.location = text(item, "location");
            entry.website = text(item, "website");
            entry.deadlines = item
                .get("deadlines")
                .and_then(Value::as_array)
                .map(|d| d.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            Some(entry.seal())
        })
        .collect()
}
