use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Free-form payload attached to a tracking event.
pub type EventData = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("observer proxy is not ready")]
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub event_name: String,
    pub event_data: EventData,
}

/// Contact details collected by the chatbot onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub login_provider: String,
    pub first_name: String,
    pub email: String,
}

impl ProfileUpdate {
    pub fn from_chatbot(first_name: &str, email: &str) -> Self {
        Self {
            login_provider: "leochatbot".to_string(),
            first_name: first_name.to_string(),
            email: email.to_string(),
        }
    }
}

/// The remote CDP proxy loaded by the observer bootstrap.
#[async_trait]
pub trait ObserverProxy: Send + Sync {
    async fn record_view_event(&self, event: TrackingEvent);
    async fn record_action_event(&self, event: TrackingEvent);
    async fn synch_visitor_id(&self) -> Result<String, ProxyError>;
    async fn update_profile_by_session(&self, profile: ProfileUpdate);
}

/// Proxy that emits every call through tracing and hands out a fixed visitor id.
#[derive(Clone)]
pub struct TracingObserverProxy {
    visitor_id: String,
}

impl TracingObserverProxy {
    pub fn new(visitor_id: impl Into<String>) -> Self {
        Self {
            visitor_id: visitor_id.into(),
        }
    }
}

#[async_trait]
impl ObserverProxy for TracingObserverProxy {
    async fn record_view_event(&self, event: TrackingEvent) {
        let data = Value::Object(event.event_data);
        info!(
            target: "resynap_gui.observer",
            kind = "view",
            event_name = %event.event_name,
            event_data = %data,
            "cdp event"
        );
    }

    async fn record_action_event(&self, event: TrackingEvent) {
        let data = Value::Object(event.event_data);
        info!(
            target: "resynap_gui.observer",
            kind = "action",
            event_name = %event.event_name,
            event_data = %data,
            "cdp event"
        );
    }

    async fn synch_visitor_id(&self) -> Result<String, ProxyError> {
        Ok(self.visitor_id.clone())
    }

    async fn update_profile_by_session(&self, profile: ProfileUpdate) {
        info!(
            target: "resynap_gui.observer",
            login_provider = %profile.login_provider,
            first_name = %profile.first_name,
            "cdp profile update"
        );
    }
}

/// Page-supplied readiness check run before the observer loads anything.
pub trait InitTrackingHook: Send + Sync {
    fn load_init_tracking(&self) -> bool;
}

pub struct StaticInitHook(pub bool);

impl InitTrackingHook for StaticInitHook {
    fn load_init_tracking(&self) -> bool {
        self.0
    }
}

/// Forwards the synchronized visitor id to a web-analytics property.
#[async_trait]
pub trait AnalyticsBridge: Send + Sync {
    async fn synch_visitor(&self, visitor_id: &str);
}

/// Starts the chatbot once a visitor id is known.
pub trait ChatbotStarter: Send + Sync {
    fn start_chatbot(&self, visitor_id: &str);
}

/// Hands visitor ids to whoever owns the chat controller.
pub struct ChannelChatbotStarter {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelChatbotStarter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ChatbotStarter for ChannelChatbotStarter {
    fn start_chatbot(&self, visitor_id: &str) {
        if self.tx.send(visitor_id.to_string()).is_err() {
            debug!(%visitor_id, "chatbot receiver dropped; start ignored");
        }
    }
}

/// Optional collaborators invoked after the visitor id is synchronized.
#[derive(Clone, Default)]
pub struct Integrations {
    pub analytics: Option<Arc<dyn AnalyticsBridge>>,
    pub chatbot: Option<Arc<dyn ChatbotStarter>>,
}

impl Integrations {
    pub fn new(
        analytics: Option<Arc<dyn AnalyticsBridge>>,
        chatbot: Option<Arc<dyn ChatbotStarter>>,
    ) -> Self {
        debug!(
            analytics = analytics.is_some(),
            chatbot = chatbot.is_some(),
            "observer integrations configured"
        );
        Self { analytics, chatbot }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum ProxyCall {
        View(TrackingEvent),
        Action(TrackingEvent),
        Profile(ProfileUpdate),
    }

    /// Proxy that records calls for assertions.
    pub struct RecordingProxy {
        pub visitor_id: Option<String>,
        pub calls: Mutex<Vec<ProxyCall>>,
    }

    impl RecordingProxy {
        pub fn new(visitor_id: Option<&str>) -> Self {
            Self {
                visitor_id: visitor_id.map(str::to_string),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<ProxyCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObserverProxy for RecordingProxy {
        async fn record_view_event(&self, event: TrackingEvent) {
            self.calls.lock().unwrap().push(ProxyCall::View(event));
        }

        async fn record_action_event(&self, event: TrackingEvent) {
            self.calls.lock().unwrap().push(ProxyCall::Action(event));
        }

        async fn synch_visitor_id(&self) -> Result<String, ProxyError> {
            self.visitor_id.clone().ok_or(ProxyError::NotReady)
        }

        async fn update_profile_by_session(&self, profile: ProfileUpdate) {
            self.calls.lock().unwrap().push(ProxyCall::Profile(profile));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_starter_delivers_visitor_id() {
        let (starter, mut rx) = ChannelChatbotStarter::new();
        starter.start_chatbot("vid-1");
        assert_eq!(rx.recv().await.as_deref(), Some("vid-1"));
    }

    #[test]
    fn profile_update_uses_camel_case() {
        let json = serde_json::to_value(ProfileUpdate::from_chatbot("Ann", "ann@example.com"))
            .unwrap();
        assert_eq!(json["loginProvider"], "leochatbot");
        assert_eq!(json["firstName"], "Ann");
    }

    #[tokio::test]
    async fn tracing_proxy_returns_configured_id() {
        let proxy = TracingObserverProxy::new("abc");
        assert_eq!(proxy.synch_visitor_id().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn tracing_proxy_logs_view_and_action_events() {
        let proxy = TracingObserverProxy::new("abc");
        let mut data = EventData::new();
        data.insert("question".into(), Value::String("why?".into()));
        proxy
            .record_view_event(TrackingEvent {
                event_name: "page-view".into(),
                event_data: EventData::new(),
            })
            .await;
        proxy
            .record_action_event(TrackingEvent {
                event_name: "ask-question".into(),
                event_data: data,
            })
            .await;
        proxy
            .update_profile_by_session(ProfileUpdate::from_chatbot("Ann", "ann@example.com"))
            .await;
    }
}
