//! Plain-text extraction from the detail frame's HTML.

use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose text never belongs to the document body.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Extract the visible text of an HTML document or fragment.
///
/// Every text node is whitespace-collapsed and trimmed, empty nodes are
/// dropped, and the rest are joined with a single space. Block boundaries
/// therefore become single spaces.
pub fn normalize_body_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut parts: Vec<String> = Vec::new();
    collect_text(root, &mut parts);
    parts.join(" ")
}

fn collect_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !collapsed.is_empty() {
                    parts.push(collapsed);
                }
            }
            Node::Element(el) => {
                if SKIPPED_ELEMENTS.contains(&el.name()) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, parts);
                }
            }
            _ => {}
        }
    }
}
