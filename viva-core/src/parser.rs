//! Reply parsing — deterministic heuristics that recover structure from
//! free-form model text.
//!
//! Two independent entry points:
//! - [`parse_feedback`] — structured per-answer scoring (JSON with a
//!   regex-scan fallback), reported as a tagged outcome rather than an
//!   error so callers can run a repair pass.
//! - [`split_reply`] — FEEDBACK/QUESTION free-text split with
//!   completion-signal detection, used during the Q&A loop.
//!
//! Same input text always yields the same structured output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{FeedbackRecord, InterviewSummary};

/// Literal the model is instructed to emit when it judges the interview
/// finished. The orchestrator treats it as a hint, never an authority.
pub const COMPLETION_TOKEN: &str = "INTERVIEW_COMPLETE";

/// Closing phrases that also count as a completion signal.
const CLOSING_PHRASES: &[&str] = &[
    "thank you for your time",
    "this concludes",
    "that concludes",
    "we will be in touch",
    "we'll be in touch",
    "thanks for joining",
];

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z0-9_-]*").expect("fence regex"));

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(correctness|clarity|confidence)["']?\s*[:=]\s*(-?\d+(?:\.\d+)?)"#)
        .expect("score regex")
});

static SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?\n{}]{15,}[.!?]?").expect("sentence regex"));

static QUESTION_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)QUESTION\s*[:\-]").expect("question marker regex"));

static FEEDBACK_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)FEEDBACK\s*[:\-]").expect("feedback marker regex"));

static LEADING_FEEDBACK_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*FEEDBACK\s*[:\-]\s*").expect("feedback label regex"));

/// Outcome of structured-feedback extraction. `NeedsRepair` carries the
/// best-effort record; deciding whether to send a repair prompt is the
/// caller's job.
#[derive(Debug, Clone)]
pub enum FeedbackOutcome {
    Parsed(FeedbackRecord),
    NeedsRepair(FeedbackRecord),
}

impl FeedbackOutcome {
    pub fn record(self) -> FeedbackRecord {
        match self {
            FeedbackOutcome::Parsed(r) | FeedbackOutcome::NeedsRepair(r) => r,
        }
    }

    pub fn needs_repair(&self) -> bool {
        matches!(self, FeedbackOutcome::NeedsRepair(_))
    }
}

/// Result of the FEEDBACK/QUESTION free-text split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplySplit {
    pub feedback: Option<String>,
    pub question: Option<String>,
    /// Detected independently of the split, on the raw text.
    pub completion_signalled: bool,
}

fn strip_fences(raw: &str) -> String {
    FENCE_RE.replace_all(raw, "").replace('`', "")
}

/// True when the text carries the completion token or one of the fixed
/// closing phrases, case-insensitive, anywhere.
pub fn has_completion_signal(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains(&COMPLETION_TOKEN.to_lowercase())
        || CLOSING_PHRASES.iter().any(|p| lowered.contains(p))
}

fn coerce_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract a structured [`FeedbackRecord`] from raw model text.
///
/// Strict path: strip code fences, take the first-`{`-to-last-`}`
/// substring, parse as JSON, coerce score fields. Fallback path: scan for
/// `key: number` patterns and keep the first sentence-like chunk as the
/// comment, reporting `NeedsRepair`.
pub fn parse_feedback(raw: &str) -> FeedbackOutcome {
    let cleaned = strip_fences(raw);

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
                let record = FeedbackRecord {
                    correctness: map.get("correctness").and_then(coerce_score),
                    clarity: map.get("clarity").and_then(coerce_score),
                    confidence: map.get("confidence").and_then(coerce_score),
                    overall_feedback: map
                        .get("overall_feedback")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                    parsing_failed: false,
                };
                return FeedbackOutcome::Parsed(record);
            }
        }
    }

    // Strict parse failed — scavenge scores and a comment from the prose.
    let mut record = FeedbackRecord {
        parsing_failed: true,
        ..Default::default()
    };
    for caps in SCORE_RE.captures_iter(&cleaned) {
        let value: Option<f64> = caps[2].parse().ok();
        let slot = match caps[1].to_lowercase().as_str() {
            "correctness" => &mut record.correctness,
            "clarity" => &mut record.clarity,
            _ => &mut record.confidence,
        };
        if slot.is_none() {
            *slot = value;
        }
    }

    let remaining = SCORE_RE.replace_all(&cleaned, "");
    record.overall_feedback = SENTENCE_RE
        .find(&remaining)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| remaining.trim().to_string());

    FeedbackOutcome::NeedsRepair(record)
}

/// Split a Q&A-loop reply into its feedback and question parts and detect
/// the completion signal.
pub fn split_reply(raw: &str) -> ReplySplit {
    let normalized = raw.replace("\r\n", "\n");
    let normalized = normalized.trim();

    let completion_signalled = has_completion_signal(normalized);

    let (feedback_part, question_part) = match QUESTION_MARKER_RE.find(normalized) {
        Some(marker) => (
            &normalized[..marker.start()],
            Some(&normalized[marker.end()..]),
        ),
        None => (normalized, None),
    };

    let mut feedback = LEADING_FEEDBACK_LABEL_RE
        .replace(feedback_part, "")
        .trim()
        .to_string();

    let question = question_part.map(|q| {
        // A FEEDBACK section after the question is spill-over; keep the
        // question clean but reuse the tail when no feedback preceded it.
        let (body, spill) = match FEEDBACK_MARKER_RE.find(q) {
            Some(m) => (&q[..m.start()], Some(&q[m.end()..])),
            None => (q, None),
        };
        if feedback.is_empty() {
            if let Some(tail) = spill {
                feedback = tail.trim().to_string();
            }
        }
        body.replace(COMPLETION_TOKEN, "").trim().to_string()
    });

    ReplySplit {
        feedback: Some(feedback).filter(|f| !f.is_empty()),
        question: question.filter(|q| !q.is_empty()),
        completion_signalled,
    }
}

/// Parse the end-of-interview holistic summary: strip fences, take the
/// first-`{`-to-last-`}` substring, strict JSON parse. `None` means the
/// caller should fall back to a defaulted summary.
pub fn parse_summary(raw: &str) -> Option<InterviewSummary> {
    let cleaned = strip_fences(raw);
    let (start, end) = (cleaned.find('{')?, cleaned.rfind('}')?);
    if start >= end {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}
