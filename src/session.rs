use crate::botui::UiError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

pub const DEFAULT_DISPLAY_NAME: &str = "good friend";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .unwrap()
});

pub fn is_email_valid(email: &str) -> bool {
    EMAIL.is_match(email)
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("visitor id already bound to {bound}, refusing {requested}")]
    VisitorChanged { bound: String, requested: String },
    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
    #[error(transparent)]
    Ui(#[from] UiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorProfile {
    visitor_id: String,
    display_name: String,
    resolved: bool,
}

impl Default for VisitorProfile {
    fn default() -> Self {
        Self {
            visitor_id: String::new(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            resolved: false,
        }
    }
}

impl VisitorProfile {
    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Bind the session to `visitor_id`. Once the backend has resolved the
    /// visitor, the id is fixed for the rest of the session.
    pub fn bind(&mut self, visitor_id: &str) -> Result<(), SessionError> {
        if self.resolved && self.visitor_id != visitor_id {
            return Err(SessionError::VisitorChanged {
                bound: self.visitor_id.clone(),
                requested: visitor_id.to_string(),
            });
        }
        self.visitor_id = visitor_id.to_string();
        Ok(())
    }

    pub fn mark_resolved(&mut self) {
        self.resolved = true;
    }

    /// Adopt a name returned by the backend; empty names keep the current one.
    pub fn set_display_name(&mut self, name: &str) {
        if !name.is_empty() {
            self.display_name = name.to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingStep {
    Name,
    Email { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Resolving,
    Greeting,
    Onboarding(OnboardingStep),
    Asking,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Load,
    VisitorFound,
    VisitorUnknown,
    BackendFailed,
    TransportFailed,
    NameSubmitted(String),
    EmailRejected,
    EmailAccepted,
    QuestionSubmitted,
    Answered,
    /// The widget failed while a question was in flight.
    Interrupted,
}

impl SessionState {
    pub fn next(&self, event: &SessionEvent) -> Result<SessionState, SessionError> {
        use OnboardingStep as Step;
        use SessionEvent as E;
        use SessionState as S;

        let next = match (self, event) {
            (S::Uninitialized | S::Greeting | S::Error, E::Load) => S::Resolving,
            (S::Resolving, E::VisitorFound) => S::Greeting,
            (S::Resolving | S::Asking, E::VisitorUnknown) => S::Onboarding(Step::Name),
            (S::Resolving, E::BackendFailed | E::TransportFailed) => S::Error,
            (S::Onboarding(Step::Name), E::NameSubmitted(name)) => {
                S::Onboarding(Step::Email { name: name.clone() })
            }
            (S::Onboarding(Step::Email { name }), E::EmailRejected) => {
                S::Onboarding(Step::Email { name: name.clone() })
            }
            (S::Onboarding(Step::Email { .. }), E::EmailAccepted) => S::Greeting,
            (S::Greeting, E::QuestionSubmitted) => S::Asking,
            (
                S::Asking,
                E::Answered | E::BackendFailed | E::TransportFailed | E::Interrupted,
            ) => S::Greeting,
            _ => {
                return Err(SessionError::InvalidTransition {
                    from: self.to_string(),
                    event: format!("{event:?}"),
                });
            }
        };
        Ok(next)
    }

    pub fn accepts_questions(&self) -> bool {
        matches!(self, SessionState::Greeting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Resolving => write!(f, "resolving"),
            SessionState::Greeting => write!(f, "greeting"),
            SessionState::Onboarding(OnboardingStep::Name) => write!(f, "onboarding(name)"),
            SessionState::Onboarding(OnboardingStep::Email { .. }) => {
                write!(f, "onboarding(email)")
            }
            SessionState::Asking => write!(f, "asking"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_email_valid("a@b.co"));
        assert!(is_email_valid("first.last@mail.example.org"));
        assert!(is_email_valid("\"odd name\"@example.com"));
        assert!(is_email_valid("ops@[10.0.0.1]"));
        assert!(!is_email_valid(""));
        assert!(!is_email_valid("a@b"));
        assert!(!is_email_valid("   "));
        assert!(!is_email_valid("a b@c.com"));
        assert!(!is_email_valid("a@b.c"));
    }

    #[test]
    fn profile_id_is_fixed_after_resolution() {
        let mut profile = VisitorProfile::default();
        assert_eq!(profile.display_name(), DEFAULT_DISPLAY_NAME);
        profile.bind("first").unwrap();
        profile.bind("second").unwrap();
        profile.mark_resolved();
        profile.bind("second").unwrap();
        let err = profile.bind("third").unwrap_err();
        assert!(matches!(err, SessionError::VisitorChanged { .. }));
        assert_eq!(profile.visitor_id(), "second");
    }

    #[test]
    fn empty_backend_name_keeps_display_name() {
        let mut profile = VisitorProfile::default();
        profile.set_display_name("");
        assert_eq!(profile.display_name(), DEFAULT_DISPLAY_NAME);
        profile.set_display_name("Linh");
        assert_eq!(profile.display_name(), "Linh");
    }

    #[test]
    fn greeting_path() {
        let s = SessionState::default().next(&SessionEvent::Load).unwrap();
        assert_eq!(s, SessionState::Resolving);
        let s = s.next(&SessionEvent::VisitorFound).unwrap();
        assert!(s.accepts_questions());
        let s = s.next(&SessionEvent::QuestionSubmitted).unwrap();
        assert_eq!(s, SessionState::Asking);
        assert_eq!(s.next(&SessionEvent::Answered).unwrap(), SessionState::Greeting);
        assert_eq!(s.next(&SessionEvent::Interrupted).unwrap(), SessionState::Greeting);
    }

    #[test]
    fn onboarding_retains_name_on_rejection() {
        let s = SessionState::Resolving
            .next(&SessionEvent::VisitorUnknown)
            .unwrap();
        let s = s.next(&SessionEvent::NameSubmitted("Ann".into())).unwrap();
        let s = s.next(&SessionEvent::EmailRejected).unwrap();
        assert_eq!(
            s,
            SessionState::Onboarding(OnboardingStep::Email { name: "Ann".into() })
        );
        assert_eq!(s.next(&SessionEvent::EmailAccepted).unwrap(), SessionState::Greeting);
    }

    #[test]
    fn backend_errors_while_resolving_end_in_error() {
        let s = SessionState::Resolving
            .next(&SessionEvent::BackendFailed)
            .unwrap();
        assert_eq!(s, SessionState::Error);
        assert_eq!(s.next(&SessionEvent::Load).unwrap(), SessionState::Resolving);
    }

    #[test]
    fn rejects_out_of_order_events() {
        let err = SessionState::Uninitialized
            .next(&SessionEvent::QuestionSubmitted)
            .unwrap_err();
        assert!(err.to_string().contains("uninitialized"));
        assert!(SessionState::Asking
            .next(&SessionEvent::QuestionSubmitted)
            .is_err());
        assert!(SessionState::Onboarding(OnboardingStep::Name)
            .next(&SessionEvent::EmailAccepted)
            .is_err());
    }
}
