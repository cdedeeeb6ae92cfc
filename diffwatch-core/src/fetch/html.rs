//! Isolates the `skyscraper` HTML/XPath API surface so the rest of the crate
//! only deals with plain strings.

use skyscraper::html::{self, HtmlDocument};
use skyscraper::xpath::{self, XpathItemTree};

use crate::error::CoreError;

/// Parse an HTML document leniently — real-world pages are rarely
/// well-formed, so parse failures here are rare; they still propagate as a
/// [`CoreError::Extraction`] per spec.md §4.2's failure modes.
pub fn parse(body: &str) -> Result<HtmlDocument, CoreError> {
    html::parse(body).map_err(|e| CoreError::Extraction(format!("html parse error: {e}")))
}

/// Evaluate an XPath 1.0 expression against the parsed document and return
/// the whitespace-compacted text of the first matching node's descendant
/// text, or `""` if nothing matched.
pub fn select_text(document: &HtmlDocument, xpath_expr: &str) -> Result<String, CoreError> {
    let tree = XpathItemTree::from(document);
    let compiled = xpath::parse(xpath_expr)
        .map_err(|e| CoreError::Extraction(format!("xpath compile error: {e}")))?;
    let matches = compiled
        .apply(&tree)
        .map_err(|e| CoreError::Extraction(format!("xpath evaluation error: {e}")))?;

    let Some(first) = matches.into_iter().next() else {
        return Ok(String::new());
    };

    Ok(compact_whitespace(&node_text(&first)))
}

/// `/html/head/title`, same extraction procedure, empty if absent.
pub fn select_title(document: &HtmlDocument) -> Result<String, CoreError> {
    select_text(document, "/html/head/title")
}

/// `content` attribute of `<meta property="og:image">`, falling back to
/// `<meta name="twitter:image">`, else `""`.
pub fn select_image_url(document: &HtmlDocument) -> Result<String, CoreError> {
    let tree = XpathItemTree::from(document);
    for expr in [
        "//meta[@property='og:image']/@content",
        "//meta[@name='twitter:image']/@content",
    ] {
        let compiled = xpath::parse(expr)
            .map_err(|e| CoreError::Extraction(format!("xpath compile error: {e}")))?;
        let matches = compiled
            .apply(&tree)
            .map_err(|e| CoreError::Extraction(format!("xpath evaluation error: {e}")))?;
        if let Some(item) = matches.into_iter().next() {
            let value = item.to_string();
            if !value.is_empty() {
                return Ok(value);
            }
        }
    }
    Ok(String::new())
}

/// Concatenate the text of a matched XPath item (node or attribute) in
/// document order, as skyscraper's `Display` impl already yields the
/// concatenated descendant text for element nodes.
fn node_text(item: &xpath::XpathItem<'_>) -> String {
    item.to_string()
}

/// Replace every run of whitespace (including newlines) with a single space
/// and trim the ends. Idempotent: `compact(compact(x)) == compact(x)`.
fn compact_whitespace(s: &str) -> String {
    let collapsed: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim().to_string()
}
