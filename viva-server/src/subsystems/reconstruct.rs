//! History reconstruction — replays the flat turn log into
//! (question, answer, feedback) triples at interview end.
//!
//! The walk is pure and stable: the same history and cache always yield
//! the same triples in the same order.

use viva_core::models::{FeedbackRecord, InterviewTriple, Role, Turn};
use viva_core::parser::has_completion_signal;

/// Interviewer turns at least this long count as questions even without
/// a question mark.
const LONG_QUESTION_CHARS: usize = 80;

fn has_feedback_label(text: &str) -> bool {
    let lowered = text.trim_start().to_lowercase();
    lowered.starts_with("feedback:") || lowered.starts_with("feedback -")
}

/// Classify an interviewer turn: a question has a question mark or is
/// long, and is neither a labeled feedback line nor a closing statement.
fn is_question(text: &str) -> bool {
    if has_completion_signal(text) || has_feedback_label(text) {
        return false;
    }
    text.contains('?') || text.trim().chars().count() > LONG_QUESTION_CHARS
}

struct PendingPair {
    question: String,
    answer: Option<String>,
    /// Index of the candidate turn that supplied the answer.
    answer_idx: usize,
}

/// Rebuild question/answer/feedback triples from the turn log.
///
/// `cached` is the per-answer feedback side-channel written during the
/// Q&A loop; it wins over history-derived feedback and, being bounded,
/// aligns to the most recent answered pairs.
pub fn reconstruct(history: &[Turn], cached: &[FeedbackRecord]) -> Vec<InterviewTriple> {
    let mut pairs: Vec<PendingPair> = Vec::new();
    let mut pending: Option<PendingPair> = None;

    for (idx, turn) in history.iter().enumerate() {
        match turn.role {
            Role::Interviewer => {
                if is_question(&turn.text) {
                    // A new question flushes an answered pending pair;
                    // an unanswered one is dropped.
                    if let Some(pair) = pending.take() {
                        if pair.answer.as_deref().is_some_and(|a| !a.trim().is_empty()) {
                            pairs.push(pair);
                        }
                    }
                    pending = Some(PendingPair {
                        question: turn.text.clone(),
                        answer: None,
                        answer_idx: 0,
                    });
                }
            }
            Role::Candidate => {
                if let Some(pair) = pending.as_mut() {
                    if pair.answer.is_none() {
                        pair.answer = Some(turn.text.clone());
                        pair.answer_idx = idx;
                    }
                }
            }
        }
    }

    if let Some(pair) = pending.take() {
        if pair.answer.as_deref().is_some_and(|a| !a.trim().is_empty()) {
            pairs.push(pair);
        }
    }

    let n = pairs.len();
    pairs
        .into_iter()
        .enumerate()
        .map(|(i, pair)| {
            let feedback = cached_feedback(cached, i, n)
                .or_else(|| scan_feedback(history, pair.answer_idx));
            InterviewTriple {
                question: pair.question,
                answer: pair.answer.unwrap_or_default(),
                feedback,
            }
        })
        .collect()
}

/// Cache entries align to the most recent `cached.len()` answered pairs.
fn cached_feedback(cached: &[FeedbackRecord], index: usize, total: usize) -> Option<String> {
    let entry = if cached.len() >= total {
        cached.get(cached.len() - total + index)
    } else {
        index
            .checked_sub(total - cached.len())
            .and_then(|i| cached.get(i))
    }?;
    Some(entry.overall_feedback.clone()).filter(|f| !f.trim().is_empty())
}

/// Fallback: the interviewer turn right after the answer is feedback,
/// unless it is itself a new question.
fn scan_feedback(history: &[Turn], answer_idx: usize) -> Option<String> {
    history
        .iter()
        .skip(answer_idx + 1)
        .find(|turn| turn.role == Role::Interviewer)
        .filter(|turn| !is_question(&turn.text))
        .map(|turn| turn.text.clone())
}
