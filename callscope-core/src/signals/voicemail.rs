//! Voicemail detection.
//!
//! A call is voicemail-like when the customer never speaks or the text
//! carries voicemail phrasing. The analysis entry point short-circuits on
//! this before any customer-derived metrics or the LLM are touched.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Speaker, TranscriptSegment};

static VOICEMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(voicemail|voice mail|leave (a|your) message|after the (tone|beep)|not available( right now)?|mailbox)\b")
        .unwrap()
});

/// True when every segment is agent speech or voicemail phrasing appears.
pub fn is_voicemail_like(segments: &[TranscriptSegment]) -> bool {
    if segments.is_empty() {
        return false;
    }

    let agent_only = segments.iter().all(|s| s.speaker == Speaker::Agent);
    if agent_only {
        return true;
    }

    segments.iter().any(|s| VOICEMAIL_RE.is_match(&s.text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(speaker: Speaker, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(speaker, text, 0, 1_000)
    }

    #[test]
    fn test_all_agent_is_voicemail() {
        let segments = vec![
            seg(Speaker::Agent, "Hi, this is Dana calling about your plan"),
            seg(Speaker::Agent, "Give us a call back at your convenience"),
        ];
        assert!(is_voicemail_like(&segments));
    }

    #[test]
    fn test_voicemail_keywords() {
        let segments = vec![
            seg(Speaker::Customer, "You have reached John, leave a message after the beep"),
            seg(Speaker::Agent, "Hi John, this is Dana"),
        ];
        assert!(is_voicemail_like(&segments));
    }

    #[test]
    fn test_live_conversation_is_not_voicemail() {
        let segments = vec![
            seg(Speaker::Agent, "Hi, this is Dana"),
            seg(Speaker::Customer, "Hello, who is this?"),
        ];
        assert!(!is_voicemail_like(&segments));
    }

    #[test]
    fn test_empty_is_not_voicemail() {
        assert!(!is_voicemail_like(&[]));
    }
}
