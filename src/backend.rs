use crate::config::{PayloadStyle, WidgetConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const NOT_FOUND: i64 = 404;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("chat backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat backend returned HTTP {0}")]
    Status(u16),
}

/// Reply shape shared by the visitor-info and ask endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendReply {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    NotFound,
    Failed(i64),
}

impl BackendReply {
    pub fn ok(answer: impl Into<String>) -> Self {
        Self {
            error_code: 0,
            answer: answer.into(),
            name: String::new(),
        }
    }

    pub fn status(&self) -> ReplyStatus {
        match self.error_code {
            0 => ReplyStatus::Ok,
            NOT_FOUND => ReplyStatus::NotFound,
            code => ReplyStatus::Failed(code),
        }
    }
}

/// One question for the ask endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskRequest {
    pub question: String,
    pub visitor_id: String,
    pub persona_name: Option<String>,
    pub answer_in_format: String,
    pub private_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_in_language: Option<String>,
    #[serde(skip)]
    pub context: String,
}

impl AskRequest {
    pub fn payload(&self, style: PayloadStyle) -> Value {
        match style {
            PayloadStyle::Persona => json!(self),
            PayloadStyle::PromptContext => json!({
                "prompt": self.question,
                "question": self.question,
                "visitor_id": self.visitor_id,
                "answer_in_language": self.answer_in_language.clone().unwrap_or_default(),
                "answer_in_format": self.answer_in_format,
                "context": self.context,
            }),
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn get_visitor_info(&self, visitor_id: &str) -> Result<BackendReply, BackendError>;
    async fn ask(&self, request: &AskRequest) -> Result<BackendReply, BackendError>;
}

/// Local-development backend: every visitor resolves, questions are echoed.
#[derive(Clone, Default)]
pub struct StubChatBackend;

#[async_trait]
impl ChatBackend for StubChatBackend {
    async fn get_visitor_info(&self, _visitor_id: &str) -> Result<BackendReply, BackendError> {
        Ok(BackendReply::ok("local_dev"))
    }

    async fn ask(&self, request: &AskRequest) -> Result<BackendReply, BackendError> {
        Ok(BackendReply::ok(request.question.clone()))
    }
}

#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    pub visitor_info_url: Url,
    pub ask_url: Url,
    pub payload_style: PayloadStyle,
}

/// JSON-over-HTTP client for the chatbot service.
#[derive(Clone)]
pub struct HttpChatBackend {
    cfg: HttpBackendConfig,
    client: reqwest::Client,
}

impl HttpChatBackend {
    pub fn new(cfg: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { cfg, client })
    }

    fn visitor_info_url(&self, visitor_id: &str) -> Url {
        let mut url = self.cfg.visitor_info_url.clone();
        let cache_bust = chrono::Utc::now().timestamp_millis().to_string();
        url.query_pairs_mut()
            .append_pair("visitor_id", visitor_id)
            .append_pair("_", &cache_bust);
        url
    }
}

async fn read_reply(resp: reqwest::Response) -> Result<BackendReply, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(BackendError::Status(status.as_u16()));
    }
    Ok(resp.json::<BackendReply>().await?)
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn get_visitor_info(&self, visitor_id: &str) -> Result<BackendReply, BackendError> {
        let url = self.visitor_info_url(visitor_id);
        debug!(%url, "fetching visitor info");
        let resp = self.client.get(url).send().await?;
        read_reply(resp).await
    }

    async fn ask(&self, request: &AskRequest) -> Result<BackendReply, BackendError> {
        let body = request.payload(self.cfg.payload_style);
        let resp = self
            .client
            .post(self.cfg.ask_url.clone())
            .json(&body)
            .send()
            .await?;
        let reply = read_reply(resp).await?;
        debug!(
            url = %self.cfg.ask_url,
            error_code = reply.error_code,
            "ask answered"
        );
        Ok(reply)
    }
}

/// Build the chat backend from config. Dev mode uses the stub.
pub fn backend_from_config(config: &WidgetConfig) -> Arc<dyn ChatBackend> {
    if config.dev_mode {
        info!("CHATBOT_DEV_MODE set; using stub chat backend");
        return Arc::new(StubChatBackend);
    }
    let cfg = HttpBackendConfig {
        visitor_info_url: config.base_url_get_visitor_info.clone(),
        ask_url: config.base_url_api.clone(),
        payload_style: config.payload_style,
    };
    match HttpChatBackend::new(cfg) {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            warn!(?err, "failed to init HTTP chat backend; using stub");
            Arc::new(StubChatBackend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AskRequest {
        AskRequest {
            question: "What is the capital of France?".into(),
            visitor_id: "v1".into(),
            persona_name: Some("coach".into()),
            answer_in_format: "html".into(),
            private_mode: false,
            answer_in_language: None,
            context: "I am a smart chatbot with AI capabilities.".into(),
        }
    }

    fn backend(server: &MockServer, style: PayloadStyle) -> HttpChatBackend {
        let base = Url::parse(&server.uri()).unwrap();
        HttpChatBackend::new(HttpBackendConfig {
            visitor_info_url: base.join("/get-visitor-info").unwrap(),
            ask_url: base.join("/ask").unwrap(),
            payload_style: style,
        })
        .unwrap()
    }

    #[test]
    fn reply_status_from_code() {
        assert_eq!(BackendReply::ok("x").status(), ReplyStatus::Ok);
        let missing = BackendReply {
            error_code: 404,
            ..Default::default()
        };
        assert_eq!(missing.status(), ReplyStatus::NotFound);
        let banned = BackendReply {
            error_code: 666,
            ..Default::default()
        };
        assert_eq!(banned.status(), ReplyStatus::Failed(666));
    }

    #[test]
    fn payload_styles() {
        let persona = request().payload(PayloadStyle::Persona);
        assert_eq!(
            persona,
            json!({
                "question": "What is the capital of France?",
                "visitor_id": "v1",
                "persona_name": "coach",
                "answer_in_format": "html",
                "private_mode": false,
            })
        );
        let mut with_lang = request();
        with_lang.answer_in_language = Some("vi".into());
        let legacy = with_lang.payload(PayloadStyle::PromptContext);
        assert_eq!(legacy["prompt"], legacy["question"]);
        assert_eq!(legacy["answer_in_language"], "vi");
        assert_eq!(legacy["context"], "I am a smart chatbot with AI capabilities.");
        assert!(legacy.get("persona_name").is_none());
    }

    #[tokio::test]
    async fn fetches_visitor_info_with_cache_bust() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get-visitor-info"))
            .and(query_param("visitor_id", "v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error_code": 0, "answer": "Linh"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = backend(&server, PayloadStyle::Persona)
            .get_visitor_info("v1")
            .await
            .unwrap();
        assert_eq!(reply.status(), ReplyStatus::Ok);
        assert_eq!(reply.answer, "Linh");

        let received = server.received_requests().await.unwrap();
        let query = received[0].url.query().unwrap_or_default().to_string();
        assert!(query.contains("_="));
    }

    #[tokio::test]
    async fn posts_question_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .and(body_json(request().payload(PayloadStyle::Persona)))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"error_code": 0, "answer": "Paris", "name": "Linh"}),
            ))
            .mount(&server)
            .await;

        let reply = backend(&server, PayloadStyle::Persona)
            .ask(&request())
            .await
            .unwrap();
        assert_eq!(reply.answer, "Paris");
        assert_eq!(reply.name, "Linh");
    }

    #[tokio::test]
    async fn http_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = backend(&server, PayloadStyle::Persona)
            .ask(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status(502)));
    }

    #[tokio::test]
    async fn stub_backend_resolves_everyone() {
        let stub = StubChatBackend;
        let reply = stub.get_visitor_info("anyone").await.unwrap();
        assert_eq!(reply.answer, "local_dev");
        assert_eq!(stub.ask(&request()).await.unwrap().answer, request().question);
    }
}
