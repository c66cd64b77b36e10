//! Chat session controller: drives the bot-UI widget through the session
//! state machine and relays questions to the chat backend.

use crate::backend::{AskRequest, BackendError, BackendReply, ChatBackend, ReplyStatus};
use crate::botui::{BotMessage, BotUi, TextAction, UiError};
use crate::config::WidgetConfig;
use crate::fragments::format_answer_links;
use crate::integration::{EventData, ProfileUpdate};
use crate::observer::LeoObserver;
use crate::page::{Page, ids};
use crate::session::{SessionError, SessionEvent, SessionState, VisitorProfile, is_email_valid};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const ASK_CONTEXT: &str = "ask";
pub const WEBSITE_CONTEXT: &str = "leobot_website";
pub const MAX_TRACKED_ANSWER_CHARS: usize = 1000;
const DEFAULT_PROMPT_DELAY: Duration = Duration::from_millis(800);
const ACCOUNT_CREATION_DELAY: Duration = Duration::from_secs(5);

pub type ErrorHook = Arc<dyn Fn(&BackendError) + Send + Sync>;

/// Per-session answer preferences sent with every question.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub tracking: bool,
    pub persona_name: Option<String>,
    pub answer_in_format: String,
    pub answer_in_language: Option<String>,
    pub private_mode: bool,
    pub context: String,
    pub search_engine: Url,
}

impl ChatSettings {
    pub fn from_config(config: &WidgetConfig) -> Self {
        Self {
            tracking: config.tracking_ready(),
            persona_name: config.persona_name.clone(),
            answer_in_format: config.answer_in_format.clone(),
            answer_in_language: None,
            private_mode: config.private_mode,
            context: config.chatbot_context.clone(),
            search_engine: config.search_engine_url.clone(),
        }
    }
}

/// What happened to a submitted question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    /// Too short, `exit`, or the session was not ready; no request was made.
    Skipped,
    Answered(String),
    Onboarded,
    Rejected(String),
    TransportFailed,
}

pub struct ChatController {
    ui: Arc<dyn BotUi>,
    backend: Arc<dyn ChatBackend>,
    observer: Option<LeoObserver>,
    on_error: Option<ErrorHook>,
    settings: ChatSettings,
    profile: VisitorProfile,
    state: SessionState,
}

impl ChatController {
    pub fn new(ui: Arc<dyn BotUi>, backend: Arc<dyn ChatBackend>, settings: ChatSettings) -> Self {
        Self {
            ui,
            backend,
            observer: None,
            on_error: None,
            settings,
            profile: VisitorProfile::default(),
            state: SessionState::default(),
        }
    }

    pub fn with_observer(mut self, observer: LeoObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn profile(&self) -> &VisitorProfile {
        &self.profile
    }

    fn apply(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let next = self.state.next(&event)?;
        debug!(from = %self.state, to = %next, ?event, "chat session transition");
        self.state = next;
        Ok(())
    }

    fn report_transport(&self, err: &BackendError) {
        warn!(?err, "chat backend unreachable");
        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }

    /// Bind the visitor and start the website chat session.
    pub async fn start_chatbot(&mut self, visitor_id: &str) -> Result<(), SessionError> {
        self.profile.bind(visitor_id)?;
        self.load_chat_session(WEBSITE_CONTEXT, visitor_id).await
    }

    /// Resolve the visitor and either greet, onboard, or show the error.
    pub async fn load_chat_session(
        &mut self,
        context: &str,
        visitor_id: &str,
    ) -> Result<(), SessionError> {
        self.profile.bind(visitor_id)?;
        self.apply(SessionEvent::Load)?;
        self.ui.remove_all().await?;
        info!(%context, %visitor_id, "loading chat session");

        let reply = match self.backend.get_visitor_info(visitor_id).await {
            Ok(reply) => reply,
            Err(err) => {
                self.report_transport(&err);
                return self.apply(SessionEvent::TransportFailed);
            }
        };
        debug!(error_code = reply.error_code, "visitor info received");

        match reply.status() {
            ReplyStatus::Ok => {
                self.profile.mark_resolved();
                self.profile.set_display_name(&reply.answer);
                self.apply(SessionEvent::VisitorFound)?;
                let name = self.profile.display_name().to_string();
                self.show_chatbot_ui(&name).await
            }
            ReplyStatus::NotFound => {
                self.profile.mark_resolved();
                self.apply(SessionEvent::VisitorUnknown)?;
                self.ask_for_contact_info().await
            }
            ReplyStatus::Failed(_) => {
                self.apply(SessionEvent::BackendFailed)?;
                self.show_error(&reply.answer).await
            }
        }
    }

    pub async fn show_chatbot_ui(&self, display_name: &str) -> Result<(), SessionError> {
        let msg = format!("Hi {display_name}, you may ask me for anything");
        self.ui.remove_all().await?;
        self.ui
            .add_message(BotMessage::bot_text("chatbot_answer", msg))
            .await?;
        Ok(())
    }

    /// Onboarding: name, then email until it validates, then confirmation.
    /// Expects the state machine to already be in `Onboarding(Name)`.
    async fn ask_for_contact_info(&mut self) -> Result<(), SessionError> {
        let intro = "Hi friend, please enter your name and email to register new user";
        self.ui
            .add_message(BotMessage::bot_html("leobot-question", intro))
            .await?;

        let name = self
            .ui
            .prompt_text(TextAction::new("user-circle-o", "Input your name here"))
            .await?;
        self.apply(SessionEvent::NameSubmitted(name.clone()))?;

        loop {
            let email = self
                .ui
                .prompt_text(TextAction::new("envelope-o", "Input your email here"))
                .await?;
            if is_email_valid(&email) {
                self.register(&name, &email).await?;
                return Ok(());
            }
            self.apply(SessionEvent::EmailRejected)?;
            self.show_error(&format!("{email} is not a valid email"))
                .await?;
        }
    }

    async fn register(&mut self, name: &str, email: &str) -> Result<(), SessionError> {
        info!(%name, "registering chatbot visitor");
        if let (true, Some(observer)) = (self.settings.tracking, &self.observer) {
            observer
                .update_profile(ProfileUpdate::from_chatbot(name, email))
                .await;
        }
        self.apply(SessionEvent::EmailAccepted)?;
        self.profile.set_display_name(name);
        let msg = format!(
            "Hi {name}, system is creating a new account for you. Please wait for 5 seconds..."
        );
        self.show_answer(&msg, Some(ACCOUNT_CREATION_DELAY)).await
    }

    /// Render an answer with its links opening in a new tab as searches.
    pub async fn show_answer(
        &self,
        answer_html: &str,
        delay: Option<Duration>,
    ) -> Result<(), SessionError> {
        let content = match format_answer_links(answer_html, &self.settings.search_engine) {
            Ok(html) => html,
            Err(err) => {
                warn!(?err, "failed to format answer links; showing raw answer");
                answer_html.to_string()
            }
        };
        let mut message = BotMessage::bot_html("chatbot_answer", content);
        if let Some(delay) = delay {
            message = message.with_delay(delay);
        }
        self.ui.add_message(message).await?;
        Ok(())
    }

    pub async fn show_error(&self, error: &str) -> Result<(), SessionError> {
        self.ui
            .add_message(BotMessage::bot_html("leobot-error", error))
            .await?;
        Ok(())
    }

    pub async fn show_chat_message(&self, msg: &str) -> Result<(), SessionError> {
        self.ui
            .add_message(BotMessage::human("chatbot-info", msg))
            .await?;
        Ok(())
    }

    /// Relay a question to the backend and render the outcome.
    pub async fn send_question(
        &mut self,
        context: &str,
        question: &str,
    ) -> Result<AskOutcome, SessionError> {
        if question.chars().count() < 2 || question == "exit" {
            return Ok(AskOutcome::Skipped);
        }
        if !self.state.accepts_questions() {
            warn!(state = %self.state, "question ignored; session not ready");
            return Ok(AskOutcome::Skipped);
        }
        self.apply(SessionEvent::QuestionSubmitted)?;

        let result = match self.relay_question(question).await {
            Ok(result) => result,
            Err(err) => {
                warn!(?err, "chat ui failed while a question was in flight");
                self.apply(SessionEvent::Interrupted)?;
                return Err(err.into());
            }
        };
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.report_transport(&err);
                self.apply(SessionEvent::TransportFailed)?;
                return Ok(AskOutcome::TransportFailed);
            }
        };
        self.handle_answer(context, question, reply).await
    }

    /// Loader, ask, loader removal. The outer result is the UI's.
    async fn relay_question(
        &self,
        question: &str,
    ) -> Result<Result<BackendReply, BackendError>, UiError> {
        let loader = self.ui.add_message(BotMessage::loader()).await?;
        let request = self.ask_request(question);
        let result = self.backend.ask(&request).await;
        self.ui.remove_message(loader).await?;
        Ok(result)
    }

    async fn handle_answer(
        &mut self,
        context: &str,
        question: &str,
        reply: BackendReply,
    ) -> Result<AskOutcome, SessionError> {
        match reply.status() {
            ReplyStatus::Ok => {
                self.profile.set_display_name(&reply.name);
                self.apply(SessionEvent::Answered)?;
                if context == ASK_CONTEXT {
                    self.show_answer(&reply.answer, None).await?;
                }
                self.track_answer(question, &reply.answer).await;
                Ok(AskOutcome::Answered(reply.answer))
            }
            ReplyStatus::NotFound => {
                self.apply(SessionEvent::VisitorUnknown)?;
                self.ask_for_contact_info().await?;
                Ok(AskOutcome::Onboarded)
            }
            ReplyStatus::Failed(code) => {
                debug!(code, "ask rejected by backend");
                self.apply(SessionEvent::BackendFailed)?;
                self.show_error(&reply.answer).await?;
                Ok(AskOutcome::Rejected(reply.answer))
            }
        }
    }

    fn ask_request(&self, question: &str) -> AskRequest {
        AskRequest {
            question: question.to_string(),
            visitor_id: self.profile.visitor_id().to_string(),
            persona_name: self.settings.persona_name.clone(),
            answer_in_format: self.settings.answer_in_format.clone(),
            private_mode: self.settings.private_mode,
            answer_in_language: self.settings.answer_in_language.clone(),
            context: self.settings.context.clone(),
        }
    }

    async fn track_answer(&self, question: &str, answer: &str) {
        let observer = match (&self.observer, self.settings.tracking) {
            (Some(observer), true) => observer,
            _ => {
                debug!("skip ask-question tracking");
                return;
            }
        };
        let answer: String = answer.chars().take(MAX_TRACKED_ANSWER_CHARS).collect();
        let mut data = EventData::new();
        data.insert("question".to_string(), Value::String(question.to_string()));
        data.insert("answer".to_string(), Value::String(answer));
        observer.record_event_ask_question(Some(data)).await;
    }

    /// Trim free text from the input box; anything over one character is
    /// echoed as a human message and sent. Returns whether it was sent.
    /// Input is left untouched while the session is not taking questions.
    pub async fn submit_input(&mut self, raw: &str) -> Result<bool, SessionError> {
        let msg = raw.trim();
        if msg.chars().count() <= 1 {
            return Ok(false);
        }
        if !self.state.accepts_questions() {
            debug!(state = %self.state, "input held; session not ready");
            return Ok(false);
        }
        self.show_chat_message(msg).await?;
        let outcome = self.send_question(ASK_CONTEXT, msg).await?;
        Ok(outcome != AskOutcome::Skipped)
    }

    /// Read `#chatbot_input` (and the answer language) from the page, send it,
    /// and clear the input once it went out.
    pub async fn send_to_chatbot(&mut self, page: &Page) -> Result<bool, SessionError> {
        let raw = page.value_of(ids::CHATBOT_INPUT).unwrap_or_default();
        self.settings.answer_in_language = page
            .value_of(ids::CHATBOT_TARGET_LANGUAGE)
            .filter(|lang| !lang.is_empty());
        let sent = self.submit_input(&raw).await?;
        if sent {
            page.set_value(ids::CHATBOT_INPUT, "");
        }
        Ok(sent)
    }

    /// Prompt inside the widget for a question and send it.
    pub async fn prompt_question(
        &mut self,
        delay: Option<Duration>,
    ) -> Result<AskOutcome, SessionError> {
        let action = TextAction::new("question-circle", "Give me a question")
            .with_delay(delay.unwrap_or(DEFAULT_PROMPT_DELAY));
        let question = self.ui.prompt_text(action).await?;
        self.send_question(ASK_CONTEXT, question.trim()).await
    }

    /// Keep prompting until the user types `exit` or input ends.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        loop {
            if !self.state.accepts_questions() {
                info!(state = %self.state, "chat session not accepting questions; stopping");
                return Ok(());
            }
            let action = TextAction::new("question-circle", "Give me a question")
                .with_delay(DEFAULT_PROMPT_DELAY);
            let question = match self.ui.prompt_text(action).await {
                Ok(q) => q,
                Err(UiError::Closed) => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            let question = question.trim();
            if question == "exit" {
                return Ok(());
            }
            self.send_question(ASK_CONTEXT, question).await?;
        }
    }
}

/// Swap the page from its loading placeholder to the chat widget.
pub fn reveal_chatbot(page: &Page) {
    page.hide(ids::CHATBOT_CONTAINER_LOADER);
    page.show(ids::CHATBOT_CONTAINER);
    page.show(ids::CHATBOT_TARGET_LANGUAGE);
}
