use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Started,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Interviewer,
    Candidate,
}

/// One utterance in the conversation, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn interviewer(text: impl Into<String>) -> Self {
        Self {
            role: Role::Interviewer,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn candidate(text: impl Into<String>) -> Self {
        Self {
            role: Role::Candidate,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The live interview session, one per active identity.
///
/// Exists in the store only between `start` and `end`/expiry; absence
/// means the interview has not started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub stage: Stage,
    pub current_question: String,
    pub resume_text: String,
    /// Append-only; order is the conversational order.
    pub history: Vec<Turn>,
    /// Questions asked so far, including the current one. Never decreases.
    pub question_count: u32,
    pub started_at: DateTime<Utc>,
    pub reset_used: bool,
}

impl SessionRecord {
    pub fn new(resume_text: impl Into<String>, opening_question: impl Into<String>) -> Self {
        let question = opening_question.into();
        Self {
            session_id: Uuid::new_v4(),
            stage: Stage::Started,
            current_question: question.clone(),
            resume_text: resume_text.into(),
            history: vec![Turn::interviewer(question)],
            question_count: 1,
            started_at: Utc::now(),
            reset_used: false,
        }
    }
}

/// Partial update for `SessionStore::merge`. `None` fields are left
/// untouched in the stored record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub stage: Option<Stage>,
    pub current_question: Option<String>,
    pub history: Option<Vec<Turn>>,
    pub question_count: Option<u32>,
    pub reset_used: Option<bool>,
}

impl SessionPatch {
    pub fn apply(&self, record: &mut SessionRecord) {
        if let Some(stage) = self.stage {
            record.stage = stage;
        }
        if let Some(ref q) = self.current_question {
            record.current_question = q.clone();
        }
        if let Some(ref h) = self.history {
            record.history = h.clone();
        }
        if let Some(count) = self.question_count {
            record.question_count = count;
        }
        if let Some(used) = self.reset_used {
            record.reset_used = used;
        }
    }
}
