//! CDP observer bootstrap and the named event recorders.

use crate::fragments::FragmentError;
use crate::integration::{
    EventData, InitTrackingHook, Integrations, ObserverProxy, ProfileUpdate, ProxyError,
    TrackingEvent,
};
use crate::page::{Page, encode_uri_component, url_host};
use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

pub const PROXY_SCRIPT_PATH: &str = "/js/leo-observer/leo.proxy.min.js";
pub const VISITOR_SYNC_PARAM: &str = "leosyn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    View,
    Action,
}

/// Fixed catalog of events the observer knows how to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverEvent {
    PageView,
    AcceptTracking,
    Like,
    ContentView,
    Search,
    ItemView,
    ClickDetails,
    PlayVideo,
    SubmitContact,
    FileDownload,
    RegisterAccount,
    UserLogin,
    AskQuestion,
}

impl ObserverEvent {
    pub const ALL: [ObserverEvent; 13] = [
        Self::PageView,
        Self::AcceptTracking,
        Self::Like,
        Self::ContentView,
        Self::Search,
        Self::ItemView,
        Self::ClickDetails,
        Self::PlayVideo,
        Self::SubmitContact,
        Self::FileDownload,
        Self::RegisterAccount,
        Self::UserLogin,
        Self::AskQuestion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PageView => "page-view",
            Self::AcceptTracking => "accept-tracking",
            Self::Like => "like",
            Self::ContentView => "content-view",
            Self::Search => "search",
            Self::ItemView => "item-view",
            Self::ClickDetails => "click-details",
            Self::PlayVideo => "play-video",
            Self::SubmitContact => "submit-contact",
            Self::FileDownload => "file-download",
            Self::RegisterAccount => "register-account",
            Self::UserLogin => "user-login",
            Self::AskQuestion => "ask-question",
        }
    }

    pub fn kind(self) -> EventKind {
        match self {
            Self::PageView | Self::AcceptTracking | Self::ContentView | Self::ItemView => {
                EventKind::View
            }
            _ => EventKind::Action,
        }
    }
}

/// Page title and URL captured when tracking starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Touchpoint {
    pub name: String,
    pub url: String,
}

impl Touchpoint {
    pub fn capture(page: &Page) -> Self {
        Self {
            name: encode_uri_component(&page.title()),
            url: encode_uri_component(page.location().as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub touchpoint: Touchpoint,
    pub proxy_src: String,
}

/// Verify the init hook, tag the touchpoint and inject the proxy script.
///
/// Returns `Ok(None)` when tracking is not ready; nothing is queued or retried.
pub fn bootstrap(
    page: &Page,
    cdn_domain: &str,
    init_hook: Option<&dyn InitTrackingHook>,
) -> Result<Option<BootstrapOutcome>, FragmentError> {
    let ready = init_hook.is_some_and(|hook| hook.load_init_tracking());
    if !ready {
        info!("LEO Observer: loadInitTracking() is not ready");
        return Ok(None);
    }

    let touchpoint = Touchpoint::capture(page);
    let proxy_src = proxy_script_url(page.location(), cdn_domain);
    page.inject_async_script(&proxy_src)?;
    debug!(%proxy_src, touchpoint = %touchpoint.name, "observer proxy script injected");
    Ok(Some(BootstrapOutcome {
        touchpoint,
        proxy_src,
    }))
}

pub fn proxy_script_url(location: &Url, cdn_domain: &str) -> String {
    format!("{}://{}{}", location.scheme(), cdn_domain, PROXY_SCRIPT_PATH)
}

/// Named event recorders delegating to the CDP proxy.
#[derive(Clone)]
pub struct LeoObserver {
    proxy: Arc<dyn ObserverProxy>,
}

impl LeoObserver {
    pub fn new(proxy: Arc<dyn ObserverProxy>) -> Self {
        Self { proxy }
    }

    pub async fn record(&self, event: ObserverEvent, data: Option<EventData>) {
        let event_data = data.unwrap_or_default();
        let tracking = TrackingEvent {
            event_name: event.name().to_string(),
            event_data,
        };
        match event.kind() {
            EventKind::View => self.proxy.record_view_event(tracking).await,
            EventKind::Action => self.proxy.record_action_event(tracking).await,
        }
    }

    pub async fn record_event_page_view(&self, data: Option<EventData>) {
        self.record(ObserverEvent::PageView, data).await
    }

    pub async fn record_event_accept_tracking(&self, data: Option<EventData>) {
        self.record(ObserverEvent::AcceptTracking, data).await
    }

    pub async fn record_event_like(&self, data: Option<EventData>) {
        self.record(ObserverEvent::Like, data).await
    }

    pub async fn record_event_content_view(&self, data: Option<EventData>) {
        self.record(ObserverEvent::ContentView, data).await
    }

    pub async fn record_event_search(&self, data: Option<EventData>) {
        self.record(ObserverEvent::Search, data).await
    }

    pub async fn record_event_item_view(&self, data: Option<EventData>) {
        self.record(ObserverEvent::ItemView, data).await
    }

    pub async fn record_event_click_details(&self, data: Option<EventData>) {
        self.record(ObserverEvent::ClickDetails, data).await
    }

    pub async fn record_event_play_video(&self, data: Option<EventData>) {
        self.record(ObserverEvent::PlayVideo, data).await
    }

    pub async fn record_event_submit_contact(&self, data: Option<EventData>) {
        self.record(ObserverEvent::SubmitContact, data).await
    }

    pub async fn record_event_file_download(&self, data: Option<EventData>) {
        self.record(ObserverEvent::FileDownload, data).await
    }

    pub async fn record_event_register_account(&self, data: Option<EventData>) {
        self.record(ObserverEvent::RegisterAccount, data).await
    }

    pub async fn record_event_user_login(&self, data: Option<EventData>) {
        self.record(ObserverEvent::UserLogin, data).await
    }

    pub async fn record_event_ask_question(&self, data: Option<EventData>) {
        self.record(ObserverEvent::AskQuestion, data).await
    }

    pub async fn update_profile(&self, profile: ProfileUpdate) {
        self.proxy.update_profile_by_session(profile).await
    }

    /// Run once the proxy reports ready: page view, visitor-id sync, link
    /// tagging, then the optional integrations.
    pub async fn on_proxy_ready(
        &self,
        page: &Page,
        integrations: &Integrations,
    ) -> Result<String, ProxyError> {
        self.record_event_page_view(None).await;

        let visitor_id = self.proxy.synch_visitor_id().await?;
        let rewritten = tag_outbound_links(page, &visitor_id);
        info!(%visitor_id, rewritten, "visitor id synchronized");

        if let Some(analytics) = &integrations.analytics {
            analytics.synch_visitor(&visitor_id).await;
        }
        if let Some(chatbot) = &integrations.chatbot {
            chatbot.start_chatbot(&visitor_id);
        }
        Ok(visitor_id)
    }
}

/// Append `leosyn=<visitor_id>` to every anchor that leaves the page host.
/// Returns how many anchors were rewritten.
pub fn tag_outbound_links(page: &Page, visitor_id: &str) -> usize {
    let host = page.host();
    let mut rewritten = 0;
    for anchor in page.anchors() {
        let mut attrs = anchor.attributes.borrow_mut();
        let Some(href) = attrs.get("href").map(str::to_string) else {
            continue;
        };
        let resolved = match page.location().join(&href) {
            Ok(url) => url,
            Err(err) => {
                warn!(%href, ?err, "skipping unparsable anchor href");
                continue;
            }
        };
        let outbound =
            matches!(resolved.scheme(), "http" | "https") && url_host(&resolved) != host;
        if outbound {
            attrs.insert("href", with_visitor_sync(resolved, visitor_id));
            rewritten += 1;
        }
    }
    rewritten
}

fn with_visitor_sync(mut url: Url, visitor_id: &str) -> String {
    let param = format!("{VISITOR_SYNC_PARAM}={}", encode_uri_component(visitor_id));
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{param}"),
        _ => param,
    };
    url.set_query(Some(&query));
    url.to_string()
}

/// Parse `utm_*` campaign parameters out of a query string.
///
/// Returns `None` unless at least one key starts with `utm_`.
pub fn parse_utm(search: &str) -> Option<BTreeMap<String, String>> {
    let search = search.strip_prefix('?').unwrap_or(search);
    let pairs: Vec<(String, String)> = search
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (decode_component(key), decode_component(value)))
        .collect();
    if !pairs.iter().any(|(key, _)| key.starts_with("utm_")) {
        return None;
    }
    Some(pairs.into_iter().collect())
}

fn decode_component(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}
