use std::collections::HashSet;

use anyhow::{anyhow, Result};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use crate::record::{PatchRecord, RecordFields};
use crate::source::SourceDescriptor;

use super::FormatParser;

const ENTRY_SELECTOR: &str = "article, .advisory, [data-advisory-id]";
const TITLE_SELECTOR: &str = "h1, h2, h3, h4";
const LINK_SELECTOR: &str = "a[href]";
const TIME_SELECTOR: &str = "time";
const PARAGRAPH_SELECTOR: &str = "p";

/// Advisory listings rendered as HTML: one record per advisory entry element.
pub struct HtmlParser;

struct Selectors {
    entry: Selector,
    title: Selector,
    link: Selector,
    time: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            entry: selector(ENTRY_SELECTOR)?,
            title: selector(TITLE_SELECTOR)?,
            link: selector(LINK_SELECTOR)?,
            time: selector(TIME_SELECTOR)?,
            paragraph: selector(PARAGRAPH_SELECTOR)?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e:?}"))
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl FormatParser for HtmlParser {
    #[instrument(skip(self, payload, source), fields(source = %source.url))]
    fn parse(&self, payload: &str, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
        let selectors = Selectors::new()?;
        let document = Html::parse_document(payload);
        let base = Url::parse(&source.url).ok();

        let mut records = Vec::new();
        // Nested matches (an `.advisory` inside an `article`) are the same entry.
        let mut seen = HashSet::new();

        for entry in document.select(&selectors.entry) {
            if entry.ancestors().any(|a| seen.contains(&a.id())) {
                continue;
            }
            seen.insert(entry.id());

            let first = |sel: &Selector| first_owned(entry, sel, &selectors.entry);

            let anchor = first(&selectors.link);
            let title = first(&selectors.title)
                .or(anchor)
                .map(text_of)
                .filter(|t| !t.is_empty());

            let Some(title) = title else {
                debug!("skipping advisory entry without a title");
                continue;
            };

            let link = anchor
                .and_then(|a| a.value().attr("href"))
                .map(|href| resolve_link(base.as_ref(), href));

            let published = first(&selectors.time).map(|t| {
                t.value()
                    .attr("datetime")
                    .map(str::to_string)
                    .unwrap_or_else(|| text_of(t))
            });

            let id = entry
                .value()
                .attr("data-advisory-id")
                .or_else(|| entry.value().attr("id"))
                .map(str::to_string);

            let record = RecordFields {
                id,
                name: Some(title),
                description: first(&selectors.paragraph).map(text_of),
                severity: entry.value().attr("data-severity").map(str::to_string),
                published,
                link,
                ..Default::default()
            }
            .into_record(source);
            records.push(record);
        }

        Ok(records)
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

/// First match of `sel` whose nearest enclosing entry is `entry` itself,
/// falling back to the first match inside a nested entry.
fn first_owned<'a>(
    entry: ElementRef<'a>,
    sel: &Selector,
    entries: &Selector,
) -> Option<ElementRef<'a>> {
    let mut fallback = None;
    for found in entry.select(sel) {
        let owner = found
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| entries.matches(a));
        if owner.is_some_and(|o| o.id() == entry.id()) {
            return Some(found);
        }
        fallback.get_or_insert(found);
    }
    fallback
}

fn resolve_link(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(String::from)
        .unwrap_or_else(|| href.to_string())
}
