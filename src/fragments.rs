use crate::page::encode_uri_component;
use html5ever::{LocalName, Namespace, QualName};
use kuchiki::NodeRef;
use kuchiki::traits::*;
use thiserror::Error;
use url::Url;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("html manipulation failed: {0}")]
    Html(String),
}

/// Parse an HTML snippet in a `<div>` context and return a detached root
/// node holding the parsed children. Stray close tags cannot escape it.
pub fn parse_fragment(html: &str) -> Result<NodeRef, FragmentError> {
    let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from("div"));
    let document = kuchiki::parse_fragment(context, Vec::new()).one(html);
    let root = document
        .first_child()
        .ok_or_else(|| FragmentError::Html("fragment root missing".to_string()))?;
    root.detach();
    Ok(root)
}

/// Serialize the children of `node`, without the node itself.
pub fn inner_html(node: &NodeRef) -> String {
    node.children().map(|child| child.to_string()).collect()
}

/// Visible text of an HTML snippet; used by plain-text renderers.
pub fn text_of(html: &str) -> String {
    parse_fragment(html)
        .map(|node| node.text_contents())
        .unwrap_or_else(|_| html.to_string())
}

/// Post-process answer HTML: every link opens in a new tab, and links that do
/// not already point at the search engine become a search over their text.
pub fn format_answer_links(html: &str, search_engine: &Url) -> Result<String, FragmentError> {
    let wrapper = parse_fragment(html)?;
    let domain = search_domain(search_engine);
    let links = wrapper
        .select("a")
        .map_err(|_| FragmentError::Html("query selector a failed".to_string()))?;
    for link in links {
        let text = link.as_node().text_contents();
        let mut attrs = link.attributes.borrow_mut();
        attrs.insert("target", "_blank".to_string());
        let href = attrs.get("href").unwrap_or_default().to_string();
        if domain.is_empty() || !href.contains(&domain) {
            attrs.insert("href", search_url(search_engine, &text));
        }
    }
    Ok(inner_html(&wrapper))
}

pub fn search_url(search_engine: &Url, text: &str) -> String {
    let mut url = search_engine.to_string();
    url.push(if search_engine.query().is_some() { '&' } else { '?' });
    url.push_str("q=");
    url.push_str(&encode_uri_component(text));
    url
}

fn search_domain(search_engine: &Url) -> String {
    let host = search_engine.host_str().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google() -> Url {
        Url::parse("https://www.google.com/search").unwrap()
    }

    #[test]
    fn rewrites_foreign_links_into_searches() {
        let html = r#"<p>See <a href="https://en.wikipedia.org/wiki/Paris">Paris, France</a></p>"#;
        let out = format_answer_links(html, &google()).unwrap();
        assert!(out.contains(r#"href="https://www.google.com/search?q=Paris%2C%20France""#));
        assert!(out.contains(r#"target="_blank""#));
        assert!(out.starts_with("<p>"));
    }

    #[test]
    fn keeps_search_engine_links() {
        let html = r#"<a href="https://www.google.com/search?q=rust">rust</a>"#;
        let out = format_answer_links(html, &google()).unwrap();
        assert!(out.contains(r#"href="https://www.google.com/search?q=rust""#));
        assert!(out.contains(r#"target="_blank""#));
    }

    #[test]
    fn links_without_href_become_searches() {
        let out = format_answer_links("<a>docs</a>", &google()).unwrap();
        assert!(out.contains("search?q=docs"));
    }

    #[test]
    fn unbalanced_close_tags_keep_the_tail() {
        let html = "<div>Paris</div></div><p>is the <a href=\"https://x.org\">capital</a></p>";
        let out = format_answer_links(html, &google()).unwrap();
        assert!(out.starts_with("<div>Paris</div>"));
        assert!(out.contains("<p>is the "));
        assert!(out.contains("search?q=capital"));
        assert_eq!(text_of("<b>a</b></div></body></html>b"), "ab");
    }

    #[test]
    fn plain_text_passes_through() {
        let out = format_answer_links("Paris", &google()).unwrap();
        assert_eq!(out, "Paris");
        assert_eq!(text_of("<b>Hi</b> there"), "Hi there");
    }
}
