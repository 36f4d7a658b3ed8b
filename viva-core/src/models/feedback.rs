use serde::{Deserialize, Serialize};

/// Per-answer scoring recovered from model output. Lives only in the
/// short-lived feedback cache and inside the final summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub correctness: Option<f64>,
    pub clarity: Option<f64>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub overall_feedback: String,
    #[serde(default)]
    pub parsing_failed: bool,
}

impl FeedbackRecord {
    /// True when at least one of the three score fields was recovered.
    pub fn has_scores(&self) -> bool {
        self.correctness.is_some() || self.clarity.is_some() || self.confidence.is_some()
    }

    /// Placeholder used when both the strict parse and the repair pass
    /// fail. Raw model prose is never stored as feedback.
    pub fn unscored() -> Self {
        Self {
            overall_feedback: "Answer recorded; detailed scoring was unavailable for this turn."
                .to_string(),
            parsing_failed: true,
            ..Default::default()
        }
    }
}

/// Holistic result produced once, at `end`. Ownership passes to the
/// storage collaborator immediately after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterviewSummary {
    #[serde(default)]
    pub overall_score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub technical_depth: f64,
    #[serde(default)]
    pub problem_solving: f64,
    #[serde(default)]
    pub communication: f64,
    #[serde(default)]
    pub experience_relevance: f64,
}

impl InterviewSummary {
    /// Neutral-passing fallback used when the summary call fails or its
    /// output cannot be parsed as JSON.
    pub fn neutral() -> Self {
        Self {
            overall_score: 6.0,
            summary: "The interview completed, but a detailed summary could not be generated."
                .to_string(),
            technical_depth: 6.0,
            problem_solving: 6.0,
            communication: 6.0,
            experience_relevance: 6.0,
            ..Default::default()
        }
    }
}

/// One reconstructed question/answer/feedback exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewTriple {
    pub question: String,
    pub answer: String,
    pub feedback: Option<String>,
}
