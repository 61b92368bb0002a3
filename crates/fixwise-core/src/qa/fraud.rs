//! Abuse heuristics over message and resolution history.
//!
//! Four independent signals: message floods, suspiciously fast resolutions,
//! repeat sanitizer offenders, and asker/expert pairs that quick-resolve
//! again and again (the classic move-it-off-platform pattern). Heuristics
//! are isolated from each other: one failing to read its history logs a
//! warning and the rest still run. Signals land in the activity log for
//! moderation; nothing here blocks the triggering operation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{ActivityEntry, ActivityKind, Question, Severity, UserId};
use super::store::{ActivityLog, ExpertDirectory, QuestionStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudConfig {
    pub rapid_window_minutes: i64,
    /// Message count above which the flood signal is medium.
    pub rapid_medium_threshold: u64,
    /// Message count above which the flood signal is high.
    pub rapid_high_threshold: u64,
    /// Resolutions within this many minutes of claim count as quick.
    pub short_resolution_minutes: i64,
    /// Quick resolutions with at most this many messages are suspicious.
    pub short_message_max: u64,
    pub sanitizer_window_hours: i64,
    pub sanitizer_medium_threshold: u64,
    pub sanitizer_high_threshold: u64,
    pub pair_window_days: i64,
    /// Quick resolutions a pair may accumulate before the high signal.
    pub pair_max: u64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            rapid_window_minutes: 5,
            rapid_medium_threshold: 10,
            rapid_high_threshold: 20,
            short_resolution_minutes: 5,
            short_message_max: 3,
            sanitizer_window_hours: 24,
            sanitizer_medium_threshold: 3,
            sanitizer_high_threshold: 6,
            pair_window_days: 30,
            pair_max: 2,
        }
    }
}

/// One produced signal, also appended to the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    pub kind: ActivityKind,
    pub severity: Severity,
    pub description: String,
}

pub struct FraudDetector {
    config: FraudConfig,
}

impl FraudDetector {
    pub fn new(config: FraudConfig) -> Self {
        Self { config }
    }

    /// Runs the message-triggered heuristics (flood, repeat sanitization).
    pub fn scan_message_event<S>(
        &self,
        store: &S,
        question: &Question,
        sender: &UserId,
        now: DateTime<Utc>,
    ) -> Vec<FraudSignal>
    where
        S: QuestionStore + ActivityLog + ?Sized,
    {
        let mut signals = Vec::new();

        match self.rapid_messages(store, question, now) {
            Ok(Some(signal)) => {
                self.log_signal(store, question, sender, None, &signal, now);
                signals.push(signal);
            }
            Ok(None) => {}
            Err(err) => warn!(question = %question.id.0, error = %err, "rapid-message heuristic failed"),
        }

        match self.repeated_sanitization(store, sender, now) {
            Ok(Some(signal)) => {
                self.log_signal(store, question, sender, None, &signal, now);
                signals.push(signal);
            }
            Ok(None) => {}
            Err(err) => warn!(user = %sender.0, error = %err, "sanitization heuristic failed"),
        }

        signals
    }

    /// Runs the resolution-triggered heuristics (short conversation,
    /// repeated short pair). Call after the terminal transition landed, with
    /// the post-transition row.
    pub fn scan_resolution_event<S>(
        &self,
        store: &S,
        question: &Question,
        now: DateTime<Utc>,
    ) -> Vec<FraudSignal>
    where
        S: QuestionStore + ActivityLog + ExpertDirectory + ?Sized,
    {
        let mut signals = Vec::new();

        let counterparty = question
            .expert
            .as_ref()
            .and_then(|expert| store.expert(expert).ok())
            .map(|profile| profile.owner);

        let quick = match self.short_conversation(store, question) {
            Ok(Some(signal)) => {
                self.log_signal(
                    store,
                    question,
                    &question.asker,
                    counterparty.as_ref(),
                    &signal,
                    now,
                );
                signals.push(signal);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(question = %question.id.0, error = %err, "short-conversation heuristic failed");
                false
            }
        };

        if quick {
            match self.repeated_short_pair(store, question, counterparty.as_ref(), now) {
                Ok(Some(signal)) => {
                    self.log_signal(
                        store,
                        question,
                        &question.asker,
                        counterparty.as_ref(),
                        &signal,
                        now,
                    );
                    signals.push(signal);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(question = %question.id.0, error = %err, "short-pair heuristic failed")
                }
            }
        }

        signals
    }

    fn rapid_messages<S>(
        &self,
        store: &S,
        question: &Question,
        now: DateTime<Utc>,
    ) -> Result<Option<FraudSignal>, StoreError>
    where
        S: QuestionStore + ?Sized,
    {
        let since = now - Duration::minutes(self.config.rapid_window_minutes);
        let count = store
            .messages(&question.id)?
            .iter()
            .filter(|message| message.created_at >= since)
            .count() as u64;
        let severity = if count > self.config.rapid_high_threshold {
            Severity::High
        } else if count > self.config.rapid_medium_threshold {
            Severity::Medium
        } else {
            return Ok(None);
        };
        Ok(Some(FraudSignal {
            kind: ActivityKind::RapidMessages,
            severity,
            description: format!(
                "{count} messages on one question within {} minutes",
                self.config.rapid_window_minutes
            ),
        }))
    }

    fn repeated_sanitization<S>(
        &self,
        store: &S,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<FraudSignal>, StoreError>
    where
        S: ActivityLog + ?Sized,
    {
        let since = now - Duration::hours(self.config.sanitizer_window_hours);
        let count = store.activity_count_since(user, ActivityKind::ContactShareAttempt, since)?;
        let severity = if count > self.config.sanitizer_high_threshold {
            Severity::High
        } else if count > self.config.sanitizer_medium_threshold {
            Severity::Medium
        } else {
            return Ok(None);
        };
        Ok(Some(FraudSignal {
            kind: ActivityKind::RepeatedSanitization,
            severity,
            description: format!(
                "contact filter triggered {count} times within {} hours",
                self.config.sanitizer_window_hours
            ),
        }))
    }

    fn short_conversation<S>(
        &self,
        store: &S,
        question: &Question,
    ) -> Result<Option<FraudSignal>, StoreError>
    where
        S: QuestionStore + ?Sized,
    {
        let (Some(claimed_at), Some(resolved_at)) = (question.claimed_at, question.resolved_at)
        else {
            return Ok(None);
        };
        let elapsed = resolved_at - claimed_at;
        if elapsed > Duration::minutes(self.config.short_resolution_minutes) {
            return Ok(None);
        }
        let message_count = store.messages(&question.id)?.len() as u64;
        if message_count > self.config.short_message_max {
            return Ok(None);
        }
        Ok(Some(FraudSignal {
            kind: ActivityKind::ShortConversation,
            severity: Severity::Medium,
            description: format!(
                "settled {} seconds after claim with {message_count} message(s)",
                elapsed.num_seconds()
            ),
        }))
    }

    fn repeated_short_pair<S>(
        &self,
        store: &S,
        question: &Question,
        counterparty: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Option<FraudSignal>, StoreError>
    where
        S: ActivityLog + ?Sized,
    {
        let Some(counterparty) = counterparty else {
            return Ok(None);
        };
        let since = now - Duration::days(self.config.pair_window_days);
        // The current event's short-conversation entry is already logged, so
        // this count includes it.
        let count = store.pair_count_since(
            ActivityKind::ShortConversation,
            &question.asker,
            counterparty,
            since,
        )?;
        if count <= self.config.pair_max {
            return Ok(None);
        }
        Ok(Some(FraudSignal {
            kind: ActivityKind::RepeatedShortPair,
            severity: Severity::High,
            description: format!(
                "pair quick-resolved {count} questions within {} days",
                self.config.pair_window_days
            ),
        }))
    }

    fn log_signal<S>(
        &self,
        store: &S,
        question: &Question,
        user: &UserId,
        counterparty: Option<&UserId>,
        signal: &FraudSignal,
        now: DateTime<Utc>,
    ) where
        S: ActivityLog + ?Sized,
    {
        let entry = ActivityEntry {
            kind: signal.kind,
            severity: signal.severity,
            user_id: user.clone(),
            question_id: Some(question.id.clone()),
            counterparty: counterparty.cloned(),
            description: signal.description.clone(),
            original_content: None,
            created_at: now,
        };
        if let Err(err) = store.append_activity(&entry) {
            warn!(kind = signal.kind.label(), error = %err, "failed to log fraud signal");
        }
    }
}
