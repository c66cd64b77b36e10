//! Message/action surface of the bot-UI widget.

use crate::fragments::text_of;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum UiError {
    #[error("user input closed")]
    Closed,
    #[error("ui io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Text,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotMessage {
    pub human: bool,
    pub css_class: Option<String>,
    pub content: String,
    pub content_type: ContentType,
    pub loading: bool,
    pub delay: Option<Duration>,
}

impl BotMessage {
    pub fn bot_html(css_class: &str, content: impl Into<String>) -> Self {
        Self {
            human: false,
            css_class: Some(css_class.to_string()),
            content: content.into(),
            content_type: ContentType::Html,
            loading: false,
            delay: None,
        }
    }

    pub fn bot_text(css_class: &str, content: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            ..Self::bot_html(css_class, content)
        }
    }

    pub fn human(css_class: &str, content: impl Into<String>) -> Self {
        Self {
            human: true,
            ..Self::bot_text(css_class, content)
        }
    }

    /// Placeholder shown while a backend call is in flight.
    pub fn loader() -> Self {
        Self {
            human: false,
            css_class: None,
            content: String::new(),
            content_type: ContentType::Text,
            loading: true,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Free-text input prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAction {
    pub icon: String,
    pub css_class: String,
    pub value: String,
    pub placeholder: String,
    pub delay: Duration,
}

impl TextAction {
    pub fn new(icon: &str, placeholder: &str) -> Self {
        Self {
            icon: icon.to_string(),
            css_class: "leobot-question-input".to_string(),
            value: String::new(),
            placeholder: placeholder.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
pub trait BotUi: Send + Sync {
    async fn add_message(&self, message: BotMessage) -> Result<MessageIndex, UiError>;
    async fn remove_message(&self, index: MessageIndex) -> Result<(), UiError>;
    async fn remove_all(&self) -> Result<(), UiError>;
    /// Show the prompt and wait for the user's answer.
    async fn prompt_text(&self, action: TextAction) -> Result<String, UiError>;
}

/// Terminal rendition of the widget: messages go to stdout, prompts read stdin.
pub struct ConsoleBotUi {
    next_index: AtomicUsize,
    input: Mutex<Lines<BufReader<Stdin>>>,
    bot_name: String,
}

impl ConsoleBotUi {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            next_index: AtomicUsize::new(0),
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            bot_name: bot_name.into(),
        }
    }

    async fn write(&self, line: &str) -> Result<(), UiError> {
        let mut out = tokio::io::stdout();
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl BotUi for ConsoleBotUi {
    async fn add_message(&self, message: BotMessage) -> Result<MessageIndex, UiError> {
        if let Some(delay) = message.delay {
            tokio::time::sleep(delay).await;
        }
        let index = MessageIndex(self.next_index.fetch_add(1, Ordering::Relaxed));
        let line = if message.loading {
            "...\n".to_string()
        } else {
            let text = match message.content_type {
                ContentType::Html => text_of(&message.content),
                ContentType::Text => message.content,
            };
            let speaker = if message.human { "you" } else { self.bot_name.as_str() };
            format!("{speaker}> {}\n", text.trim())
        };
        self.write(&line).await?;
        Ok(index)
    }

    async fn remove_message(&self, _index: MessageIndex) -> Result<(), UiError> {
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), UiError> {
        Ok(())
    }

    async fn prompt_text(&self, action: TextAction) -> Result<String, UiError> {
        if !action.delay.is_zero() {
            tokio::time::sleep(action.delay).await;
        }
        self.write(&format!("[{}] ", action.placeholder)).await?;
        let mut input = self.input.lock().await;
        match input.next_line().await? {
            Some(line) => Ok(line),
            None => Err(UiError::Closed),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Widget fake: answers prompts from a script and records what was shown.
    #[derive(Default)]
    pub struct ScriptedBotUi {
        answers: StdMutex<VecDeque<String>>,
        prompts: StdMutex<Vec<TextAction>>,
        messages: StdMutex<Vec<(MessageIndex, BotMessage)>>,
        next_index: AtomicUsize,
    }

    impl ScriptedBotUi {
        pub fn with_answers(answers: &[&str]) -> Self {
            let ui = Self::default();
            ui.answers
                .lock()
                .unwrap()
                .extend(answers.iter().map(|a| a.to_string()));
            ui
        }

        /// Messages still on screen, in insertion order.
        pub fn messages(&self) -> Vec<BotMessage> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .map(|(_, m)| m.clone())
                .collect()
        }

        pub fn contents(&self) -> Vec<String> {
            self.messages().into_iter().map(|m| m.content).collect()
        }

        pub fn placeholders(&self) -> Vec<String> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.placeholder.clone())
                .collect()
        }
    }

    #[async_trait]
    impl BotUi for ScriptedBotUi {
        async fn add_message(&self, message: BotMessage) -> Result<MessageIndex, UiError> {
            let index = MessageIndex(self.next_index.fetch_add(1, Ordering::Relaxed));
            self.messages.lock().unwrap().push((index, message));
            Ok(index)
        }

        async fn remove_message(&self, index: MessageIndex) -> Result<(), UiError> {
            self.messages.lock().unwrap().retain(|(i, _)| *i != index);
            Ok(())
        }

        async fn remove_all(&self) -> Result<(), UiError> {
            self.messages.lock().unwrap().clear();
            Ok(())
        }

        async fn prompt_text(&self, action: TextAction) -> Result<String, UiError> {
            self.prompts.lock().unwrap().push(action);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(UiError::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedBotUi;
    use super::*;

    #[test]
    fn message_builders() {
        let human = BotMessage::human("chatbot-info", "hello");
        assert!(human.human);
        assert_eq!(human.content_type, ContentType::Text);
        let answer = BotMessage::bot_html("chatbot_answer", "<b>hi</b>")
            .with_delay(Duration::from_secs(5));
        assert!(!answer.human);
        assert_eq!(answer.content_type, ContentType::Html);
        assert_eq!(answer.delay, Some(Duration::from_secs(5)));
        assert!(BotMessage::loader().loading);
    }

    #[tokio::test]
    async fn scripted_ui_removes_by_index() {
        let ui = ScriptedBotUi::with_answers(&["x"]);
        let first = ui.add_message(BotMessage::loader()).await.unwrap();
        ui.add_message(BotMessage::bot_text("c", "kept")).await.unwrap();
        ui.remove_message(first).await.unwrap();
        assert_eq!(ui.contents(), vec!["kept".to_string()]);
        assert_eq!(
            ui.prompt_text(TextAction::new("i", "p")).await.unwrap(),
            "x"
        );
        assert!(matches!(
            ui.prompt_text(TextAction::new("i", "p")).await,
            Err(UiError::Closed)
        ));
    }
}
