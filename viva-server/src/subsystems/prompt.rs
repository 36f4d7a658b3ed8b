//! Prompt assembly for the interview model calls.
//!
//! The wording here is advisory only — completion thresholds and
//! termination decisions are enforced in code, never trusted to the model.

use viva_core::models::{InterviewTriple, Role, Turn};
use viva_core::parser::COMPLETION_TOKEN;

/// Follow-up used when a continuation turn yields no usable question.
pub const GENERIC_FOLLOW_UP: &str =
    "Could you expand on that with a concrete example from your own experience?";

/// Opening prompt: one strong first question grounded in the resume.
pub fn opening(resume: &str) -> String {
    format!(
        "You are a senior technical interviewer conducting a spoken mock interview.\n\
         The candidate's resume follows:\n\n{resume}\n\n\
         Ask one opening interview question tailored to this resume. \
         Respond with the question only — no preamble, no numbering."
    )
}

fn transcript(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::Interviewer => format!("Interviewer: {}", turn.text),
            Role::Candidate => format!("Candidate: {}", turn.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Q&A-loop prompt: short feedback plus the next question, with the
/// completion token as the end-of-interview signal.
pub fn turn(
    resume: &str,
    history: &[Turn],
    question_count: u32,
    min_questions: u32,
    max_questions: u32,
) -> String {
    format!(
        "You are a senior technical interviewer running a mock interview.\n\
         Candidate resume:\n{resume}\n\n\
         Conversation so far ({question_count} questions asked):\n{transcript}\n\n\
         React to the candidate's latest answer and continue the interview. \
         Reply in exactly this format:\n\
         FEEDBACK: <one or two sentences on the latest answer>\n\
         QUESTION: <the next interview question>\n\n\
         A complete interview runs between {min_questions} and {max_questions} questions. \
         If you judge the interview finished, write {COMPLETION_TOKEN} instead of a new question.",
        transcript = transcript(history),
    )
}

/// Per-answer evaluation prompt: strict JSON scoring.
pub fn evaluation(question: &str, answer: &str) -> String {
    format!(
        "Score this interview answer.\n\nQuestion: {question}\nAnswer: {answer}\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"correctness\": <0-10>, \"clarity\": <0-10>, \"confidence\": <0-10>, \
         \"overall_feedback\": \"<one sentence>\"}}"
    )
}

/// Repair prompt: ask the model to reformat its own prior output.
pub fn repair(previous_output: &str) -> String {
    format!(
        "Your previous reply could not be parsed. Reformat it as a single valid JSON \
         object with exactly these keys: correctness, clarity, confidence (numbers 0-10) \
         and overall_feedback (string). Output the JSON object only.\n\n\
         Previous reply:\n{previous_output}"
    )
}

/// Holistic end-of-interview summary prompt.
pub fn summary(resume: &str, triples: &[InterviewTriple]) -> String {
    let exchanges = triples
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let feedback = t.feedback.as_deref().unwrap_or("(none recorded)");
            format!(
                "Q{n}: {q}\nA{n}: {a}\nNoted feedback: {feedback}",
                n = i + 1,
                q = t.question,
                a = t.answer,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "The mock interview below has concluded. Assess the candidate holistically.\n\n\
         Resume:\n{resume}\n\n\
         Exchanges:\n{exchanges}\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"overall_score\": <0-10>, \"strengths\": [..], \"weaknesses\": [..], \
         \"summary\": \"<paragraph>\", \"recommendations\": [..], \
         \"technical_depth\": <0-10>, \"problem_solving\": <0-10>, \
         \"communication\": <0-10>, \"experience_relevance\": <0-10>}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_prompt_carries_transcript_and_token() {
        let history = vec![
            Turn::interviewer("What is a deadlock?"),
            Turn::candidate("Two threads each holding a lock the other needs."),
        ];
        let p = turn("resume text", &history, 1, 12, 25);
        assert!(p.contains("Interviewer: What is a deadlock?"));
        assert!(p.contains("Candidate: Two threads"));
        assert!(p.contains(COMPLETION_TOKEN));
    }

    #[test]
    fn test_summary_prompt_numbers_exchanges() {
        let triples = vec![
            InterviewTriple {
                question: "Q one".into(),
                answer: "A one".into(),
                feedback: Some("solid".into()),
            },
            InterviewTriple {
                question: "Q two".into(),
                answer: "A two".into(),
                feedback: None,
            },
        ];
        let p = summary("resume", &triples);
        assert!(p.contains("Q1: Q one"));
        assert!(p.contains("Q2: Q two"));
        assert!(p.contains("(none recorded)"));
    }
}
