//! Payment detection.
//!
//! Scans customer speech for 13-19 digit card number runs (spaces and
//! dashes between digit groups are tolerated, as transcripts render read-
//! aloud numbers that way) and validates candidates with the Luhn
//! checksum. The first valid run wins.

use crate::types::{Speaker, TranscriptSegment};

/// Result of the payment scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct PaymentSignal {
    pub taken: bool,
    pub last4: Option<String>,
}

/// Luhn checksum validity for a digit string.
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let mut sum = 0u32;
    let mut double = false;
    for b in digits.bytes().rev() {
        let mut d = (b - b'0') as u32;
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
    }
    sum % 10 == 0
}

/// Extract candidate digit runs of plausible card length from text.
///
/// A run is consecutive digits, optionally separated by single spaces or
/// dashes. Runs shorter than 13 or longer than 19 digits are discarded.
fn digit_runs(text: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if (c == ' ' || c == '-')
            && !current.is_empty()
            && chars.peek().map(|n| n.is_ascii_digit()).unwrap_or(false)
        {
            // separator inside a run; skip it
        } else {
            if (13..=19).contains(&current.len()) {
                runs.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if (13..=19).contains(&current.len()) {
        runs.push(current);
    }

    runs
}

/// Detect a card number in customer speech.
pub fn detect_payment(segments: &[TranscriptSegment]) -> PaymentSignal {
    for seg in segments {
        if seg.speaker != Speaker::Customer {
            continue;
        }
        for run in digit_runs(&seg.text) {
            if luhn_valid(&run) {
                let last4 = run[run.len() - 4..].to_string();
                return PaymentSignal {
                    taken: true,
                    last4: Some(last4),
                };
            }
        }
    }

    PaymentSignal::default()
}
