use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use sha2::{Digest, Sha256};

static NUMERIC_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d+)$").expect("valid numeric suffix regex"));

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn non_empty(input: String) -> Option<String> {
    let cleaned = clean_text(&input);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|node| non_empty(inner_text(node)))
}

/// Text of every element matching `selector`, skipping matches nested inside another
/// match so that no text node is counted twice.
pub fn region_text(document: &Html, selector: &Selector) -> Option<String> {
    let mut parts = Vec::new();
    for region in document.select(selector) {
        let nested = region
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| selector.matches(&ancestor));
        if nested {
            continue;
        }
        parts.push(region.text().collect::<Vec<_>>().join(" "));
    }
    if parts.is_empty() {
        return None;
    }
    non_empty(parts.join(" "))
}

/// All visible text nodes of the document in order, ignoring script and style bodies.
pub fn text_nodes(document: &Html) -> impl Iterator<Item = &str> {
    document.tree.root().descendants().filter_map(|node| {
        let text = match node.value() {
            Node::Text(text) => text,
            _ => return None,
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        if hidden {
            None
        } else {
            Some(&**text)
        }
    })
}

pub fn page_text(document: &Html) -> String {
    clean_text(&text_nodes(document).collect::<Vec<_>>().join(" "))
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

pub fn numeric_suffix(url: &str) -> Option<&str> {
    NUMERIC_SUFFIX_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn url_digest(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Capitalises the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_alpha = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if previous_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(ch);
            previous_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_handles_mixed_input() {
        assert_eq!(title_case("music & DANCE"), "Music & Dance");
        assert_eq!(title_case("standup comedy"), "Standup Comedy");
    }

    #[test]
    fn numeric_suffix_requires_trailing_digits() {
        assert_eq!(
            numeric_suffix("https://allevents.in/bangalore/jazz-night/800012345"),
            Some("800012345")
        );
        assert_eq!(
            numeric_suffix("https://allevents.in/bangalore/jazz-night"),
            None
        );
        assert_eq!(numeric_suffix("https://allevents.in/bangalore/123/about"), None);
    }

    #[test]
    fn region_text_does_not_repeat_nested_regions() {
        let html = Html::parse_document(
            r#"<div class="description">Outer <div class="description-inner">Inner</div></div>"#,
        );
        let selector = Selector::parse(r#"div[class*="description"]"#).expect("selector");
        assert_eq!(region_text(&html, &selector).as_deref(), Some("Outer Inner"));
    }

    #[test]
    fn page_text_skips_scripts() {
        let html = Html::parse_document(
            r#"<html><head><script>var price = "₹999";</script></head><body><p>Free  Entry</p></body></html>"#,
        );
        assert_eq!(page_text(&html), "Free Entry");
    }

    #[test]
    fn absolute_url_resolves_relative_links() {
        assert_eq!(
            absolute_url(
                "https://allevents.in/bangalore/jazz/123",
                Some("/tickets/123".to_string())
            )
            .as_deref(),
            Some("https://allevents.in/tickets/123")
        );
        assert_eq!(absolute_url("https://allevents.in/", Some("  ".into())), None);
    }
}
