use crate::qa::sanitizer::{ContactSanitizer, SanitizerRuleKind};

#[test]
fn clean_text_passes_untouched() {
    let sanitizer = ContactSanitizer::new();
    let result = sanitizer.sanitize("The breaker trips whenever the dryer starts");
    assert_eq!(result.text, "The breaker trips whenever the dryer starts");
    assert!(!result.was_redacted());
}

#[test]
fn phone_numbers_are_redacted() {
    let sanitizer = ContactSanitizer::new();
    let result = sanitizer.sanitize("My number is 555-123-4567 if that helps");
    assert_eq!(result.text, "My number is [phone removed] if that helps");
    assert_eq!(result.flags.len(), 1);
    assert_eq!(result.flags[0].kind, SanitizerRuleKind::Phone);
    assert_eq!(result.flags[0].matched, "555-123-4567");
}

#[test]
fn parenthesized_and_prefixed_phones_are_caught() {
    let sanitizer = ContactSanitizer::new();
    let result = sanitizer.sanitize("Try (555) 123-4567 or +1 555.123.4567");
    assert_eq!(
        result.text,
        "Try [phone removed] or [phone removed]"
    );
    assert_eq!(result.flags.len(), 2);
}

#[test]
fn contact_phrase_is_swallowed_whole() {
    let sanitizer = ContactSanitizer::new();
    let result = sanitizer.sanitize("call me at 555-123-4567");
    assert_eq!(result.text, "[contact removed]");
    assert_eq!(result.flags.len(), 1);
    assert_eq!(result.flags[0].kind, SanitizerRuleKind::ContactPhrase);
}

#[test]
fn contact_phrase_covers_emails_and_handles_too() {
    let sanitizer = ContactSanitizer::new();
    let email = sanitizer.sanitize("Just email me at dave@fixit.example and we can talk");
    assert_eq!(
        email.text,
        "Just [contact removed] and we can talk"
    );
    assert_eq!(email.flags[0].kind, SanitizerRuleKind::ContactPhrase);

    let handle = sanitizer.sanitize("ping me on @fastplumber tomorrow");
    assert_eq!(handle.text, "[contact removed] tomorrow");
    assert_eq!(handle.flags[0].kind, SanitizerRuleKind::ContactPhrase);
}

#[test]
fn emails_are_redacted() {
    let sanitizer = ContactSanitizer::new();
    let result = sanitizer.sanitize("Send pics to bob.smith+diy@example.co.uk first");
    assert_eq!(result.text, "Send pics to [email removed] first");
    assert_eq!(result.flags[0].kind, SanitizerRuleKind::Email);
}

#[test]
fn urls_are_redacted() {
    let sanitizer = ContactSanitizer::new();
    let https = sanitizer.sanitize("I wrote it up at https://myblog.example/fix-guide");
    assert_eq!(https.text, "I wrote it up at [link removed]");
    assert_eq!(https.flags[0].kind, SanitizerRuleKind::Url);

    let www = sanitizer.sanitize("see www.handy.example for details");
    assert_eq!(www.text, "see [link removed] for details");
}

#[test]
fn handles_are_redacted_except_room_mentions() {
    let sanitizer = ContactSanitizer::new();
    let personal = sanitizer.sanitize("find me as @dave_the_plumber");
    assert_eq!(personal.text, "find me as [handle removed]");
    assert_eq!(personal.flags[0].kind, SanitizerRuleKind::Handle);

    let room = sanitizer.sanitize("thanks @everyone for the tips");
    assert_eq!(room.text, "thanks @everyone for the tips");
    assert!(!room.was_redacted());
}

#[test]
fn spelled_out_numbers_are_redacted() {
    let sanitizer = ContactSanitizer::new();
    let result =
        sanitizer.sanitize("its five five five one two three four five six seven ok");
    assert_eq!(result.text, "its [number removed] ok");
    assert_eq!(result.flags[0].kind, SanitizerRuleKind::SpelledDigits);
}

#[test]
fn short_spelled_sequences_are_left_alone() {
    let sanitizer = ContactSanitizer::new();
    let result = sanitizer.sanitize("I need two or three washers and one gasket");
    assert!(!result.was_redacted());
}

#[test]
fn every_detection_is_flagged() {
    let sanitizer = ContactSanitizer::new();
    let result =
        sanitizer.sanitize("I'm at bob@example.com, 555-123-4567, or https://bob.example");
    assert_eq!(result.flags.len(), 3);
    let kinds: Vec<_> = result.flags.iter().map(|flag| flag.kind).collect();
    assert!(kinds.contains(&SanitizerRuleKind::Email));
    assert!(kinds.contains(&SanitizerRuleKind::Phone));
    assert!(kinds.contains(&SanitizerRuleKind::Url));
}

#[test]
fn sanitizing_is_idempotent() {
    let sanitizer = ContactSanitizer::new();
    let first = sanitizer.sanitize("call me at 555-123-4567 or bob@example.com, see www.b.example");
    let second = sanitizer.sanitize(&first.text);
    assert_eq!(second.text, first.text);
    assert!(!second.was_redacted());
}
