//! Parsed host page standing in for the browser DOM.
//!
//! The widget components only ever touch the page through element ids listed
//! in [`ids`], so the markup contract stays in one place.

use crate::fragments::{FragmentError, parse_fragment};
use kuchiki::traits::*;
use kuchiki::{ElementData, NodeDataRef, NodeRef};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Element ids shared with the page markup.
pub mod ids {
    pub const CHATBOT_CONTAINER: &str = "chatbot_container";
    pub const CHATBOT_CONTAINER_LOADER: &str = "chatbot_container_loader";
    pub const CHATBOT_INPUT: &str = "chatbot_input";
    pub const CHATBOT_TARGET_LANGUAGE: &str = "chatbot_target_language";
    pub const CHAT_SESSIONS_PC: &str = "chat_sessions_in_pc";
    pub const CHAT_SESSIONS_MOBILE: &str = "chat_sessions_in_mb";
    pub const MINDMAP_CODE: &str = "mindmap-code";
    pub const MERMAID_CONTAINER: &str = "mermaid-container";
}

// Same unreserved set as JavaScript's encodeURIComponent.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static MOBILE_AGENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Mobi|Android|iPhone|iPad|iPod").unwrap());

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

pub fn is_mobile_agent(user_agent: &str) -> bool {
    MOBILE_AGENT.is_match(user_agent)
}

pub struct Page {
    document: NodeRef,
    location: Url,
    user_agent: String,
}

impl Page {
    pub fn parse(html: &str, location: Url) -> Self {
        Self {
            document: kuchiki::parse_html().one(html),
            location,
            user_agent: String::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    /// `host[:port]` of the page, omitting default ports like `location.host`.
    pub fn host(&self) -> String {
        url_host(&self.location)
    }

    pub fn title(&self) -> String {
        self.document
            .select_first("title")
            .map(|t| t.as_node().text_contents().trim().to_string())
            .unwrap_or_default()
    }

    pub fn is_mobile(&self) -> bool {
        is_mobile_agent(&self.user_agent)
    }

    pub fn element(&self, id: &str) -> Option<NodeDataRef<ElementData>> {
        self.document.select_first(&format!("#{id}")).ok()
    }

    /// Current value of a form control: input `value`, textarea text, or the
    /// selected option of a select.
    pub fn value_of(&self, id: &str) -> Option<String> {
        let el = self.element(id)?;
        let value = match &*el.name.local {
            "textarea" => el.as_node().text_contents(),
            "select" => selected_option_value(el.as_node()).unwrap_or_default(),
            _ => el
                .attributes
                .borrow()
                .get("value")
                .unwrap_or_default()
                .to_string(),
        };
        Some(value)
    }

    pub fn set_value(&self, id: &str, value: &str) -> bool {
        let Some(el) = self.element(id) else {
            return false;
        };
        match &*el.name.local {
            "textarea" => {
                let node = el.as_node();
                let existing: Vec<_> = node.children().collect();
                for child in existing {
                    child.detach();
                }
                node.append(NodeRef::new_text(value));
            }
            "select" => {
                if let Ok(options) = el.as_node().select("option") {
                    for option in options {
                        let mut attrs = option.attributes.borrow_mut();
                        let option_value = attrs
                            .get("value")
                            .map(str::to_string)
                            .unwrap_or_else(|| option.as_node().text_contents());
                        if option_value == value {
                            attrs.insert("selected", "selected".to_string());
                        } else {
                            attrs.remove("selected");
                        }
                    }
                }
            }
            _ => {
                el.attributes
                    .borrow_mut()
                    .insert("value", value.to_string());
            }
        }
        true
    }

    pub fn style_of(&self, id: &str, property: &str) -> Option<String> {
        let el = self.element(id)?;
        let style = el.attributes.borrow().get("style")?.to_string();
        parse_style(&style)
            .into_iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value)
    }

    pub fn set_style(&self, id: &str, property: &str, value: &str) -> bool {
        self.update_style(id, property, Some(value))
    }

    pub fn show(&self, id: &str) -> bool {
        self.update_style(id, "display", None)
    }

    pub fn hide(&self, id: &str) -> bool {
        self.update_style(id, "display", Some("none"))
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.style_of(id, "display").as_deref() == Some("none")
    }

    fn update_style(&self, id: &str, property: &str, value: Option<&str>) -> bool {
        let Some(el) = self.element(id) else {
            return false;
        };
        let mut attrs = el.attributes.borrow_mut();
        let mut declarations = parse_style(attrs.get("style").unwrap_or_default());
        declarations.retain(|(name, _)| name != property);
        if let Some(value) = value {
            declarations.push((property.to_string(), value.to_string()));
        }
        if declarations.is_empty() {
            attrs.remove("style");
        } else {
            let style = declarations
                .iter()
                .map(|(name, value)| format!("{name}: {value}"))
                .collect::<Vec<_>>()
                .join("; ");
            attrs.insert("style", style);
        }
        true
    }

    /// Replace the children of `#id` with the given HTML.
    pub fn set_inner_html(&self, id: &str, html: &str) -> Result<bool, FragmentError> {
        let Some(el) = self.element(id) else {
            return Ok(false);
        };
        let wrapper = parse_fragment(html)?;
        replace_children(el.as_node(), &wrapper);
        Ok(true)
    }

    /// Insert `<script async defer src=...>` before the first script of the
    /// page, or at the end of `<head>` when there is none.
    pub fn inject_async_script(&self, src: &str) -> Result<(), FragmentError> {
        let wrapper = parse_fragment("<script async defer></script>")?;
        let script = wrapper
            .select_first("script")
            .map_err(|_| FragmentError::Html("script element missing".to_string()))?;
        script.attributes.borrow_mut().insert("src", src.to_string());
        self.insert_script(script.as_node().clone())
    }

    /// Insert an inline script with the given body before the first script.
    pub fn inject_inline_script(&self, body: &str) -> Result<(), FragmentError> {
        let wrapper = parse_fragment("<script></script>")?;
        let script = wrapper
            .select_first("script")
            .map_err(|_| FragmentError::Html("script element missing".to_string()))?;
        script.as_node().append(NodeRef::new_text(body));
        self.insert_script(script.as_node().clone())
    }

    fn insert_script(&self, node: NodeRef) -> Result<(), FragmentError> {
        if let Ok(first) = self.document.select_first("script") {
            first.as_node().insert_before(node);
            return Ok(());
        }
        let head = self
            .document
            .select_first("head")
            .map_err(|_| FragmentError::Html("page has no head".to_string()))?;
        head.as_node().append(node);
        Ok(())
    }

    pub fn anchors(&self) -> Vec<NodeDataRef<ElementData>> {
        self.document
            .select("a")
            .map(|nodes| nodes.collect())
            .unwrap_or_default()
    }

    /// Id of the chat-session list for the current device class.
    pub fn chat_session_list_id(&self) -> &'static str {
        if self.is_mobile() {
            ids::CHAT_SESSIONS_MOBILE
        } else {
            ids::CHAT_SESSIONS_PC
        }
    }

    /// Mark the session link `#session_id` active inside the session list.
    pub fn set_active_chat_session(&self, session_id: &str) -> bool {
        let Some(list) = self.element(self.chat_session_list_id()) else {
            return false;
        };
        let mut found = false;
        if let Ok(links) = list.as_node().select("a") {
            for link in links {
                let mut attrs = link.attributes.borrow_mut();
                let is_target = attrs.get("id") == Some(session_id);
                let mut classes: Vec<String> = attrs
                    .get("class")
                    .unwrap_or_default()
                    .split_whitespace()
                    .filter(|c| *c != "active")
                    .map(str::to_string)
                    .collect();
                if is_target {
                    classes.push("active".to_string());
                    found = true;
                }
                if classes.is_empty() {
                    attrs.remove("class");
                } else {
                    attrs.insert("class", classes.join(" "));
                }
            }
        }
        found
    }

    pub fn to_html(&self) -> String {
        self.document.to_string()
    }
}

pub fn url_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

pub(crate) fn replace_children(target: &NodeRef, wrapper: &NodeRef) {
    let existing: Vec<_> = target.children().collect();
    for child in existing {
        child.detach();
    }
    let children: Vec<_> = wrapper.children().collect();
    for child in children {
        target.append(child);
    }
}

fn selected_option_value(select: &NodeRef) -> Option<String> {
    let options: Vec<_> = select.select("option").ok()?.collect();
    let chosen = options
        .iter()
        .find(|o| o.attributes.borrow().contains("selected"))
        .or_else(|| options.first())?;
    let attrs = chosen.attributes.borrow();
    Some(
        attrs
            .get("value")
            .map(str::to_string)
            .unwrap_or_else(|| chosen.as_node().text_contents()),
    )
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
