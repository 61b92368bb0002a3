//! Contact-evasion filter for free-text messages.
//!
//! Every message body passes through here before storage. Rules run in a
//! fixed precedence (spelled-out digits, contact phrases, URLs, phone
//! numbers, emails, handles) so that a broader rule consumes text before a
//! narrower one sees it: "call me at 555-123-4567" is swallowed whole by the
//! phrase rule rather than leaving "call me at" behind. Replacement text
//! never matches any rule, which makes the whole pass idempotent.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// `@`-mentions that address the room rather than a person.
const HANDLE_SKIP_LIST: &[&str] = &["here", "all", "everyone", "channel"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizerRuleKind {
    SpelledDigits,
    ContactPhrase,
    Url,
    Phone,
    Email,
    Handle,
}

impl SanitizerRuleKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SpelledDigits => "spelled_digits",
            Self::ContactPhrase => "contact_phrase",
            Self::Url => "url",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Handle => "handle",
        }
    }
}

/// One detection: which rule fired and the exact substring it consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizerFlag {
    pub kind: SanitizerRuleKind,
    pub matched: String,
}

/// Redacted text plus everything that was removed from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedText {
    pub text: String,
    pub flags: Vec<SanitizerFlag>,
}

impl SanitizedText {
    pub fn was_redacted(&self) -> bool {
        !self.flags.is_empty()
    }
}

struct Rule {
    kind: SanitizerRuleKind,
    pattern: Regex,
    placeholder: &'static str,
}

pub struct ContactSanitizer {
    rules: Vec<Rule>,
}

impl ContactSanitizer {
    pub fn new() -> Self {
        let rule = |kind, pattern: &str, placeholder| Rule {
            kind,
            pattern: Regex::new(pattern).expect("hardcoded sanitizer pattern compiles"),
            placeholder,
        };
        Self {
            rules: vec![
                rule(
                    SanitizerRuleKind::SpelledDigits,
                    r"(?i)\b(?:zero|one|two|three|four|five|six|seven|eight|nine|oh)(?:[\s-]+(?:zero|one|two|three|four|five|six|seven|eight|nine|oh)){6,}\b",
                    "[number removed]",
                ),
                rule(
                    SanitizerRuleKind::ContactPhrase,
                    r"(?i)\b(?:call|text|reach|contact|message|ping|email)\s+(?:me|us)\s+(?:at|on|via)\s+(?:\(?\+?\d[\d\s().-]{5,}\d|[A-Za-z0-9_.%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}|@[A-Za-z0-9_.]{2,})",
                    "[contact removed]",
                ),
                rule(
                    SanitizerRuleKind::Url,
                    r"(?i)\b(?:https?://|www\.)[^\s<>]+",
                    "[link removed]",
                ),
                rule(
                    SanitizerRuleKind::Phone,
                    r"(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
                    "[phone removed]",
                ),
                rule(
                    SanitizerRuleKind::Email,
                    r"\b[A-Za-z0-9_.%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                    "[email removed]",
                ),
                rule(
                    SanitizerRuleKind::Handle,
                    r"@([A-Za-z0-9_][A-Za-z0-9_.]{1,30})",
                    "[handle removed]",
                ),
            ],
        }
    }

    /// Redacts contact-evasion content. Total: any input produces a result,
    /// worst case with zero flags. Running it on its own output is a no-op.
    pub fn sanitize(&self, input: &str) -> SanitizedText {
        let mut text = input.to_string();
        let mut flags = Vec::new();
        for rule in &self.rules {
            text = match rule.kind {
                SanitizerRuleKind::Handle => rule
                    .pattern
                    .replace_all(&text, |caps: &Captures<'_>| {
                        let name = caps
                            .get(1)
                            .map(|m| m.as_str().to_ascii_lowercase())
                            .unwrap_or_default();
                        if HANDLE_SKIP_LIST.contains(&name.as_str()) {
                            caps[0].to_string()
                        } else {
                            flags.push(SanitizerFlag {
                                kind: rule.kind,
                                matched: caps[0].to_string(),
                            });
                            rule.placeholder.to_string()
                        }
                    })
                    .into_owned(),
                _ => rule
                    .pattern
                    .replace_all(&text, |caps: &Captures<'_>| {
                        flags.push(SanitizerFlag {
                            kind: rule.kind,
                            matched: caps[0].to_string(),
                        });
                        rule.placeholder.to_string()
                    })
                    .into_owned(),
            };
        }
        SanitizedText { text, flags }
    }
}

impl Default for ContactSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
