use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::UserId;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    QuestionClaimed,
    QuestionAnswered,
    NewMessage,
    ResolveProposed,
    ConversationContinued,
    QuestionAccepted,
    QuestionDisputed,
    ClaimExpired,
    QuestionReopened,
    QuestionAvailable,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::QuestionClaimed => "question_claimed",
            Self::QuestionAnswered => "question_answered",
            Self::NewMessage => "new_message",
            Self::ResolveProposed => "resolve_proposed",
            Self::ConversationContinued => "conversation_continued",
            Self::QuestionAccepted => "question_accepted",
            Self::QuestionDisputed => "question_disputed",
            Self::ClaimExpired => "claim_expired",
            Self::QuestionReopened => "question_reopened",
            Self::QuestionAvailable => "question_available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

/// Fire-and-forget delivery. Failures are logged by callers and never roll
/// back the state transition they rode along with.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}
