use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_CHATBOT_CONTEXT: &str = "I am a smart chatbot with AI capabilities.";
pub const DEFAULT_SEARCH_ENGINE_URL: &str = "https://www.google.com/search";

/// Runtime configuration for the chatbot widget and its page host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    pub page_template: PathBuf,
    pub chatbot_hostname: String,
    pub chatbot_name: String,
    pub dev_mode: bool,
    pub cdn_domain: Option<String>,
    pub cdp_tracking: bool,
    pub base_url_api: Url,
    pub base_url_get_visitor_info: Url,
    pub persona_name: Option<String>,
    pub answer_in_format: String,
    pub private_mode: bool,
    pub payload_style: PayloadStyle,
    pub chatbot_context: String,
    pub search_engine_url: Url,
    #[serde(default)]
    pub target_languages: Vec<TargetLanguage>,
}

/// Shape of the JSON body posted to the ask endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadStyle {
    /// `{question, visitor_id, persona_name, answer_in_format, private_mode}`
    #[default]
    Persona,
    /// `{prompt, question, visitor_id, answer_in_language, answer_in_format, context}`
    PromptContext,
}

impl PayloadStyle {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "persona" => Some(Self::Persona),
            "prompt-context" | "prompt_context" | "legacy" => Some(Self::PromptContext),
            _ => None,
        }
    }
}

/// One entry of the answer-language selector (BCP-47 code, empty means auto-detect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLanguage {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub selected: bool,
}

impl TargetLanguage {
    fn new(code: &str, label: &str, selected: bool) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
            selected,
        }
    }
}

pub fn default_target_languages() -> Vec<TargetLanguage> {
    vec![
        TargetLanguage::new(
            "",
            "Automatically detect the language according to question",
            true,
        ),
        TargetLanguage::new("en", "Answer the question in English", false),
        TargetLanguage::new("vi", "Trả lời câu hỏi bằng tiếng Việt", false),
        TargetLanguage::new("de", "Beantworten Sie Fragen auf Deutsch", false),
        TargetLanguage::new("fr", "Répondez à la question en français", false),
        TargetLanguage::new("es", "Responde la pregunta en español", false),
        TargetLanguage::new("ja", "質問には日本語で答える", false),
        TargetLanguage::new("zh", "用中文回答问题", false),
        TargetLanguage::new("ko", "질문에 한국어로 답변하기", false),
    ]
}

impl WidgetConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let bind_addr: SocketAddr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("failed to parse BIND_ADDR")?;

        let enable_cors = flag("ENABLE_CORS");
        let page_template = PathBuf::from(
            lookup("PAGE_TEMPLATE")
                .unwrap_or_else(|| "resources/templates/chatbot.html".to_string()),
        );

        let chatbot_hostname =
            lookup("CHATBOT_HOSTNAME").unwrap_or_else(|| "localhost:8080".to_string());
        let chatbot_name = lookup("CHATBOT_NAME").unwrap_or_else(|| "LEO BOT".to_string());
        let dev_mode = flag("CHATBOT_DEV_MODE");
        let cdn_domain = lookup("LEO_OBSERVER_CDN_DOMAIN").filter(|v| !v.trim().is_empty());
        let cdp_tracking = flag("CDP_TRACKING");

        let base_url_api = lookup("BASE_URL_API")
            .unwrap_or_else(|| format!("http://{chatbot_hostname}/ask"));
        let base_url_api =
            Url::parse(&base_url_api).context("failed to parse BASE_URL_API")?;
        let base_url_get_visitor_info = lookup("BASE_URL_GET_VISITOR_INFO")
            .unwrap_or_else(|| format!("http://{chatbot_hostname}/get-visitor-info"));
        let base_url_get_visitor_info = Url::parse(&base_url_get_visitor_info)
            .context("failed to parse BASE_URL_GET_VISITOR_INFO")?;

        let persona_name = lookup("PERSONA_NAME").filter(|v| !v.trim().is_empty());
        let answer_in_format = lookup("ANSWER_IN_FORMAT").unwrap_or_else(|| "html".to_string());
        let private_mode = flag("PRIVATE_MODE");
        let payload_style = match lookup("ASK_PAYLOAD_STYLE") {
            Some(raw) => PayloadStyle::parse(&raw)
                .with_context(|| format!("unknown ASK_PAYLOAD_STYLE {raw:?}"))?,
            None => PayloadStyle::default(),
        };
        let chatbot_context =
            lookup("CHATBOT_CONTEXT").unwrap_or_else(|| DEFAULT_CHATBOT_CONTEXT.to_string());
        let search_engine_url = Url::parse(
            &lookup("SEARCH_ENGINE_URL").unwrap_or_else(|| DEFAULT_SEARCH_ENGINE_URL.to_string()),
        )
        .context("failed to parse SEARCH_ENGINE_URL")?;

        Ok(Self {
            bind_addr,
            enable_cors,
            page_template,
            chatbot_hostname,
            chatbot_name,
            dev_mode,
            cdn_domain,
            cdp_tracking,
            base_url_api,
            base_url_get_visitor_info,
            persona_name,
            answer_in_format,
            private_mode,
            payload_style,
            chatbot_context,
            search_engine_url,
            target_languages: default_target_languages(),
        })
    }

    /// Configuration with every default applied, as used by local development.
    pub fn local() -> anyhow::Result<Self> {
        Self::from_lookup(|_| None)
    }

    /// Whether the observer bootstrap can run at all.
    pub fn tracking_ready(&self) -> bool {
        self.cdp_tracking && self.cdn_domain.is_some()
    }
}
