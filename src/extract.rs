//! Selector-anchored post content extraction.

use scraper::{Html, Selector};

use crate::traits::ContentExtractor;

/// Extractor anchored on a parent container selector, collecting the text of
/// matching child spans.
///
/// The span match is a class *substring* (`span[class*="…"]`): the platform
/// appends volatile utility classes, so an exact class list would rot within
/// weeks.
pub struct SelectorExtractor {
    parent: Selector,
    spans: Selector,
}

impl SelectorExtractor {
    /// Build an extractor, validating both selectors up front so a typo in
    /// the config fails the run at startup instead of on the first task.
    pub fn new(parent_selector: &str, span_class_fragment: &str) -> anyhow::Result<Self> {
        let parent = Selector::parse(parent_selector)
            .map_err(|e| anyhow::anyhow!("invalid content selector {parent_selector:?}: {e}"))?;
        let span_selector = format!("span[class*=\"{span_class_fragment}\"]");
        let spans = Selector::parse(&span_selector)
            .map_err(|e| anyhow::anyhow!("invalid span selector {span_selector:?}: {e}"))?;
        Ok(Self { parent, spans })
    }
}

impl ContentExtractor for SelectorExtractor {
    fn extract(&self, markup: &str) -> Option<String> {
        let document = Html::parse_document(markup);
        let parent = document.select(&self.parent).next()?;

        let texts: Vec<String> = parent
            .select(&self.spans)
            .map(|span| span.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}
