//! Interview orchestration — the session state machine.
//!
//! `NotStarted → Active → Completed`, where Active is the only state with
//! a live session record. Dependencies (store, model client) are injected
//! at construction so flows are testable with doubles.
//!
//! Termination thresholds are enforced here; the model's completion
//! signal is a hint, never an authority.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use viva_core::config::InterviewConfig;
use viva_core::error::VivaError;
use viva_core::model::{GenerateOptions, TextGenerator};
use viva_core::models::{
    FeedbackRecord, InterviewSummary, SessionPatch, SessionRecord, Stage, Turn,
};
use viva_core::parser::{self, FeedbackOutcome};
use viva_core::score;
use viva_core::store::{SessionStore, StoreError};

use crate::subsystems::{prompt, reconstruct};

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub session_id: Uuid,
    pub question: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextOutcome {
    pub feedback: String,
    pub question: String,
    pub is_complete: bool,
    pub question_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndOutcome {
    pub summary: InterviewSummary,
    pub score: f64,
    /// True when the interview ended with no answered questions; the
    /// billing collaborator treats that as a cancellation.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveOutcome {
    pub has_active_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Turn>>,
}

pub struct InterviewOrchestrator {
    store: Arc<dyn SessionStore>,
    model: Arc<dyn TextGenerator>,
    config: InterviewConfig,
    opts: GenerateOptions,
}

impl InterviewOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        model: Arc<dyn TextGenerator>,
        config: InterviewConfig,
        opts: GenerateOptions,
    ) -> Self {
        Self {
            store,
            model,
            config,
            opts,
        }
    }

    fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.session_ttl_minutes * 60)
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.feedback_cache_ttl_minutes * 60)
    }

    /// Staging hook for the external resume collaborator.
    pub async fn stage_resume(&self, identity: &str, resume_text: &str) -> Result<(), VivaError> {
        if resume_text.trim().is_empty() {
            return Err(VivaError::Validation("resume text is empty".to_string()));
        }
        self.store
            .stage_resume(identity, resume_text, self.session_ttl())
            .await?;
        tracing::info!(identity, chars = resume_text.len(), "resume staged");
        Ok(())
    }

    pub async fn start(&self, identity: &str) -> Result<StartOutcome, VivaError> {
        if self.store.get(identity).await?.is_some() {
            return Err(VivaError::Validation(
                "an interview is already in progress for this identity — answer it or reset"
                    .to_string(),
            ));
        }
        self.begin(identity, false).await
    }

    async fn begin(&self, identity: &str, reset_used: bool) -> Result<StartOutcome, VivaError> {
        let resume = self
            .store
            .resume(identity)
            .await?
            .ok_or(VivaError::PrecursorMissing)?;

        let raw = self
            .model
            .generate(&prompt::opening(&resume), &self.opts)
            .await?;
        // An opening reply is usually the bare question; the splitter
        // strips any QUESTION: label the model added anyway.
        let split = parser::split_reply(&raw);
        let question = split
            .question
            .or(split.feedback)
            .unwrap_or_else(|| prompt::GENERIC_FOLLOW_UP.to_string());

        let mut record = SessionRecord::new(resume, question.clone());
        record.reset_used = reset_used;
        self.store
            .create(identity, &record, self.session_ttl())
            .await?;

        tracing::info!(identity, session = %record.session_id, "interview started");
        Ok(StartOutcome {
            session_id: record.session_id,
            question,
        })
    }

    pub async fn next(&self, identity: &str, answer: &str) -> Result<NextOutcome, VivaError> {
        let record = self
            .store
            .get(identity)
            .await?
            .ok_or(VivaError::SessionNotFound)?;
        if record.stage == Stage::Completed {
            return Err(VivaError::Validation(
                "the interview is already complete — request the final summary".to_string(),
            ));
        }

        let answer = answer.trim();
        if answer.chars().count() < self.config.min_answer_chars {
            return Err(VivaError::Validation(format!(
                "answer is too short — please elaborate (at least {} characters)",
                self.config.min_answer_chars
            )));
        }

        let feedback_record = self
            .evaluate_answer(&record.current_question, answer)
            .await;

        let mut history = record.history.clone();
        history.push(Turn::candidate(answer));

        let raw = self
            .model
            .generate(
                &prompt::turn(
                    &record.resume_text,
                    &history,
                    record.question_count,
                    self.config.min_questions,
                    self.config.max_questions,
                ),
                &self.opts,
            )
            .await?;
        let split = parser::split_reply(&raw);

        let question_count = record.question_count;
        let force_complete = question_count >= self.config.max_questions;
        let honor_signal =
            split.completion_signalled && question_count >= self.config.min_questions;

        if split.completion_signalled && !honor_signal && !force_complete {
            tracing::info!(
                identity,
                question_count,
                floor = self.config.min_questions,
                "completion signal below the floor — continuing"
            );
        }

        // All parsing and the termination decision are done; only now
        // touch the store.
        let serialized = serde_json::to_string(&feedback_record).map_err(StoreError::Corrupt)?;
        self.store
            .push_feedback(
                identity,
                &serialized,
                self.config.feedback_cache_len,
                self.cache_ttl(),
            )
            .await?;

        let feedback = split.feedback.unwrap_or_default();

        if force_complete || honor_signal {
            let patch = SessionPatch {
                stage: Some(Stage::Completed),
                history: Some(history),
                ..Default::default()
            };
            self.store
                .merge(identity, &patch, self.session_ttl())
                .await?;
            tracing::info!(identity, question_count, forced = force_complete, "interview complete");
            return Ok(NextOutcome {
                feedback,
                question: String::new(),
                is_complete: true,
                question_count,
            });
        }

        let question = split
            .question
            .unwrap_or_else(|| prompt::GENERIC_FOLLOW_UP.to_string());
        history.push(Turn::interviewer(question.clone()));

        let patch = SessionPatch {
            current_question: Some(question.clone()),
            history: Some(history),
            question_count: Some(question_count + 1),
            ..Default::default()
        };
        self.store
            .merge(identity, &patch, self.session_ttl())
            .await?;

        Ok(NextOutcome {
            feedback,
            question,
            is_complete: false,
            question_count: question_count + 1,
        })
    }

    /// Score one answer. Parse failures go through a single repair pass;
    /// any remaining failure degrades to an unscored placeholder rather
    /// than failing the turn. Raw model prose is never kept as feedback.
    async fn evaluate_answer(&self, question: &str, answer: &str) -> FeedbackRecord {
        let raw = match self
            .model
            .generate(&prompt::evaluation(question, answer), &self.opts)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "answer evaluation failed — recording unscored turn");
                return FeedbackRecord::unscored();
            }
        };

        match parser::parse_feedback(&raw) {
            FeedbackOutcome::Parsed(record) if record.has_scores() => return record,
            _ => {}
        }

        match self
            .model
            .generate(&prompt::repair(&raw), &self.opts)
            .await
        {
            Ok(repaired) => match parser::parse_feedback(&repaired) {
                FeedbackOutcome::Parsed(record) if record.has_scores() => record,
                _ => {
                    tracing::warn!("repair pass yielded no usable scores");
                    FeedbackRecord::unscored()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "repair call failed");
                FeedbackRecord::unscored()
            }
        }
    }

    pub async fn end(&self, identity: &str) -> Result<EndOutcome, VivaError> {
        let record = self
            .store
            .get(identity)
            .await?
            .ok_or(VivaError::SessionNotFound)?;

        let cached: Vec<FeedbackRecord> = self
            .store
            .feedbacks(identity)
            .await?
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect();
        let triples = reconstruct::reconstruct(&record.history, &cached);

        if triples.is_empty() {
            self.store.delete(identity).await?;
            self.store.clear_feedback(identity).await?;
            tracing::info!(identity, "interview ended with no answers — cancelled");
            return Ok(EndOutcome {
                summary: InterviewSummary::default(),
                score: 0.0,
                cancelled: true,
            });
        }

        let summary = match self
            .model
            .generate(&prompt::summary(&record.resume_text, &triples), &self.opts)
            .await
        {
            Ok(raw) => parser::parse_summary(&raw).unwrap_or_else(|| {
                tracing::warn!(identity, "summary output was not valid JSON — using neutral defaults");
                InterviewSummary::neutral()
            }),
            Err(e) => {
                tracing::warn!(identity, error = %e, "summary call failed — using neutral defaults");
                InterviewSummary::neutral()
            }
        };
        let final_score = score::summary_score(&summary);

        self.store.delete(identity).await?;
        self.store.clear_feedback(identity).await?;

        tracing::info!(identity, score = final_score, answered = triples.len(), "interview finalized");
        Ok(EndOutcome {
            summary,
            score: final_score,
            cancelled: false,
        })
    }

    /// Read-only projection for resumption after a client reconnect.
    pub async fn active(&self, identity: &str) -> Result<ActiveOutcome, VivaError> {
        match self.store.get(identity).await? {
            Some(record) => Ok(ActiveOutcome {
                has_active_session: true,
                current_question: Some(record.current_question),
                question_count: Some(record.question_count),
                history: Some(record.history),
            }),
            None => Ok(ActiveOutcome {
                has_active_session: false,
                current_question: None,
                question_count: None,
                history: None,
            }),
        }
    }

    /// One-time restart of the same identity's interview.
    pub async fn reset(&self, identity: &str) -> Result<StartOutcome, VivaError> {
        let record = self
            .store
            .get(identity)
            .await?
            .ok_or(VivaError::SessionNotFound)?;
        if record.reset_used {
            return Err(VivaError::ResetExhausted);
        }

        self.store.delete(identity).await?;
        self.store.clear_feedback(identity).await?;
        tracing::info!(identity, "session reset — prior history discarded");
        self.begin(identity, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use viva_core::model::ModelError;
    use viva_core::store::MemoryStore;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedModel {
        async fn generate(
            &self,
            prompt: &str,
            _opts: &GenerateOptions,
        ) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ModelError::Fatal("script exhausted".to_string())))
        }
    }

    const EVAL_JSON: &str = r#"{"correctness": 8, "clarity": 7, "confidence": 9, "overall_feedback": "Clear and specific."}"#;

    fn harness(
        replies: Vec<Result<String, ModelError>>,
    ) -> (Arc<MemoryStore>, Arc<ScriptedModel>, InterviewOrchestrator) {
        let store = Arc::new(MemoryStore::new());
        let model = ScriptedModel::new(replies);
        let orchestrator = InterviewOrchestrator::new(
            store.clone(),
            model.clone(),
            InterviewConfig::default(),
            GenerateOptions {
                model: "gemini-1.5-pro".to_string(),
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
            },
        );
        (store, model, orchestrator)
    }

    async fn stage(store: &MemoryStore, identity: &str) {
        store
            .stage_resume(identity, "5 years Java backend, JVM tuning, Kafka", Duration::from_secs(60))
            .await
            .unwrap();
    }

    /// Seed an active session at a given question count without driving
    /// the whole loop.
    async fn seed_session(store: &MemoryStore, identity: &str, question_count: u32) {
        let mut record = SessionRecord::new("5 years Java backend", "Current question?");
        record.question_count = question_count;
        store
            .create(identity, &record, Duration::from_secs(60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_creates_session_with_first_question() {
        let (store, _, orchestrator) =
            harness(vec![Ok("Tell me about a challenging bug you fixed.".to_string())]);
        stage(&store, "alice").await;

        let outcome = orchestrator.start("alice").await.unwrap();
        assert_eq!(outcome.question, "Tell me about a challenging bug you fixed.");

        let record = store.get("alice").await.unwrap().unwrap();
        assert_eq!(record.question_count, 1);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.stage, Stage::Started);
    }

    #[tokio::test]
    async fn test_start_without_resume_is_precursor_missing() {
        let (_, _, orchestrator) = harness(vec![Ok("q".to_string())]);
        let err = orchestrator.start("nobody").await.unwrap_err();
        assert!(matches!(err, VivaError::PrecursorMissing));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (store, _, orchestrator) = harness(vec![
            Ok("First question?".to_string()),
            Ok("unused".to_string()),
        ]);
        stage(&store, "alice").await;
        orchestrator.start("alice").await.unwrap();

        let err = orchestrator.start("alice").await.unwrap_err();
        assert!(matches!(err, VivaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_next_returns_feedback_question_and_count() {
        let (store, _, orchestrator) = harness(vec![
            Ok(EVAL_JSON.to_string()),
            Ok("FEEDBACK: Good detail. QUESTION: What would you do differently?".to_string()),
        ]);
        seed_session(&store, "bob", 5).await;

        let outcome = orchestrator
            .next("bob", "I once diagnosed a memory leak in the session cache.")
            .await
            .unwrap();
        assert_eq!(outcome.feedback, "Good detail.");
        assert_eq!(outcome.question, "What would you do differently?");
        assert!(!outcome.is_complete);
        assert_eq!(outcome.question_count, 6);

        let record = store.get("bob").await.unwrap().unwrap();
        assert_eq!(record.question_count, 6);
        // Candidate turn + new interviewer turn were appended.
        assert_eq!(record.history.len(), 3);
        assert_eq!(record.current_question, "What would you do differently?");
    }

    #[tokio::test]
    async fn test_next_rejects_short_answer_without_model_call() {
        let (store, model, orchestrator) = harness(vec![]);
        seed_session(&store, "bob", 2).await;

        let err = orchestrator.next("bob", "idk").await.unwrap_err();
        assert!(matches!(err, VivaError::Validation(_)));
        assert!(model.prompts().is_empty());

        let record = store.get("bob").await.unwrap().unwrap();
        assert_eq!(record.history.len(), 1, "nothing persisted");
    }

    #[tokio::test]
    async fn test_next_unknown_identity_is_not_found() {
        let (_, _, orchestrator) = harness(vec![]);
        let err = orchestrator
            .next("ghost", "a perfectly long answer")
            .await
            .unwrap_err();
        assert!(matches!(err, VivaError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_completion_signal_below_floor_is_overridden() {
        let (store, _, orchestrator) = harness(vec![
            Ok(EVAL_JSON.to_string()),
            Ok("FEEDBACK: Nice wrap-up. INTERVIEW_COMPLETE".to_string()),
        ]);
        seed_session(&store, "carol", 9).await;

        let outcome = orchestrator
            .next("carol", "Here is a long enough answer about my experience.")
            .await
            .unwrap();
        assert!(!outcome.is_complete, "floor of 12 not reached");
        assert_eq!(outcome.question_count, 10);
        // No question was supplied, so a continuation was synthesized.
        assert_eq!(outcome.question, prompt::GENERIC_FOLLOW_UP);
    }

    #[tokio::test]
    async fn test_completion_signal_above_floor_is_honored() {
        let (store, _, orchestrator) = harness(vec![
            Ok(EVAL_JSON.to_string()),
            Ok("FEEDBACK: Strong finish. INTERVIEW_COMPLETE".to_string()),
        ]);
        seed_session(&store, "dave", 14).await;

        let outcome = orchestrator
            .next("dave", "A final answer with plenty of substance.")
            .await
            .unwrap();
        assert!(outcome.is_complete);
        assert_eq!(outcome.question, "");
        assert_eq!(outcome.question_count, 14);

        let record = store.get("dave").await.unwrap().unwrap();
        assert_eq!(record.stage, Stage::Completed);
    }

    #[tokio::test]
    async fn test_ceiling_forces_completion_without_signal() {
        let (store, _, orchestrator) = harness(vec![
            Ok(EVAL_JSON.to_string()),
            Ok("FEEDBACK: Noted. QUESTION: One more thing?".to_string()),
        ]);
        seed_session(&store, "erin", 25).await;

        let outcome = orchestrator
            .next("erin", "An answer that would have continued the loop.")
            .await
            .unwrap();
        assert!(outcome.is_complete, "ceiling of 25 forces completion");
        assert_eq!(outcome.question, "");
    }

    #[tokio::test]
    async fn test_model_failure_in_next_leaves_session_untouched() {
        let (store, _, orchestrator) = harness(vec![
            Ok(EVAL_JSON.to_string()),
            Err(ModelError::RateLimited("quota".to_string())),
        ]);
        seed_session(&store, "frank", 3).await;

        let err = orchestrator
            .next("frank", "An answer that never gets a follow-up.")
            .await
            .unwrap_err();
        assert!(matches!(err, VivaError::RateLimited { .. }));

        let record = store.get("frank").await.unwrap().unwrap();
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.question_count, 3);
        assert!(store.feedbacks("frank").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refusal_prose_triggers_repair_and_never_leaks() {
        let (store, model, orchestrator) = harness(vec![
            // Evaluation returns a refusal instead of JSON.
            Ok("I understand, please provide the question to evaluate.".to_string()),
            // Repair pass returns proper JSON.
            Ok(r#"{"correctness": 6, "clarity": 6, "confidence": 5, "overall_feedback": "Reasonable but vague."}"#.to_string()),
            Ok("FEEDBACK: Thanks. QUESTION: Next one?".to_string()),
        ]);
        seed_session(&store, "grace", 4).await;

        orchestrator
            .next("grace", "A sufficiently long answer about load testing.")
            .await
            .unwrap();

        assert_eq!(model.prompts().len(), 3, "repair prompt was sent");
        assert!(model.prompts()[1].contains("could not be parsed"));

        let cached = store.feedbacks("grace").await.unwrap();
        assert_eq!(cached.len(), 1);
        let record: FeedbackRecord = serde_json::from_str(&cached[0]).unwrap();
        assert_eq!(record.overall_feedback, "Reasonable but vague.");
        assert!(!record.overall_feedback.contains("please provide"));
    }

    #[tokio::test]
    async fn test_failed_repair_degrades_to_unscored_placeholder() {
        let (store, _, orchestrator) = harness(vec![
            Ok("Not JSON at all, just chatter.".to_string()),
            Ok("Still not JSON.".to_string()),
            Ok("FEEDBACK: Fine. QUESTION: Continue?".to_string()),
        ]);
        seed_session(&store, "henry", 4).await;

        orchestrator
            .next("henry", "A long answer about database migrations.")
            .await
            .unwrap();

        let cached = store.feedbacks("henry").await.unwrap();
        let record: FeedbackRecord = serde_json::from_str(&cached[0]).unwrap();
        assert!(record.parsing_failed);
        assert!(!record.has_scores());
        assert!(!record.overall_feedback.contains("chatter"));
    }

    #[tokio::test]
    async fn test_end_with_no_answers_is_cancellation() {
        let (store, model, orchestrator) = harness(vec![]);
        seed_session(&store, "iris", 1).await;

        let outcome = orchestrator.end("iris").await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.score, 0.0);
        assert!(model.prompts().is_empty(), "no summary call for a cancellation");
        assert!(store.get("iris").await.unwrap().is_none(), "record deleted");
    }

    #[tokio::test]
    async fn test_end_produces_summary_and_deletes_session() {
        let summary_json = r#"{"overall_score": 7.5, "strengths": ["debugging"], "weaknesses": ["breadth"], "summary": "Capable backend engineer.", "recommendations": ["study distributed systems"], "technical_depth": 7, "problem_solving": 8, "communication": 7, "experience_relevance": 7}"#;
        let (store, _, orchestrator) = harness(vec![Ok(summary_json.to_string())]);

        let mut record = SessionRecord::new("resume", "Tell me about your toughest bug?");
        record.history.push(Turn::candidate(
            "I chased a race condition in our billing worker.",
        ));
        store
            .create("jack", &record, Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = orchestrator.end("jack").await.unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.score, 7.5);
        assert_eq!(outcome.summary.strengths, vec!["debugging".to_string()]);
        assert!(store.get("jack").await.unwrap().is_none());
        assert!(store.feedbacks("jack").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_with_failing_model_uses_neutral_summary() {
        let (store, _, orchestrator) =
            harness(vec![Err(ModelError::Transient("upstream down".to_string()))]);

        let mut record = SessionRecord::new("resume", "A question?");
        record
            .history
            .push(Turn::candidate("A reasonable answer with detail."));
        store
            .create("kate", &record, Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = orchestrator.end("kate").await.unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.score, 6.0, "neutral passing default");
    }

    #[tokio::test]
    async fn test_end_unknown_identity_is_not_found() {
        let (_, _, orchestrator) = harness(vec![]);
        let err = orchestrator.end("ghost").await.unwrap_err();
        assert!(matches!(err, VivaError::SessionNotFound));
    }

    #[tokio::test]
    async fn test_active_projection_round_trip() {
        let (store, _, orchestrator) = harness(vec![]);
        let projection = orchestrator.active("lena").await.unwrap();
        assert!(!projection.has_active_session);

        seed_session(&store, "lena", 7).await;
        let projection = orchestrator.active("lena").await.unwrap();
        assert!(projection.has_active_session);
        assert_eq!(projection.question_count, Some(7));
        assert_eq!(projection.current_question.as_deref(), Some("Current question?"));
    }

    #[tokio::test]
    async fn test_reset_is_single_use() {
        let (store, _, orchestrator) = harness(vec![
            Ok("Opening question?".to_string()),
            Ok("Fresh opening question?".to_string()),
        ]);
        stage(&store, "mia").await;
        orchestrator.start("mia").await.unwrap();

        let outcome = orchestrator.reset("mia").await.unwrap();
        assert_eq!(outcome.question, "Fresh opening question?");
        let record = store.get("mia").await.unwrap().unwrap();
        assert!(record.reset_used);
        assert_eq!(record.history.len(), 1, "prior history discarded");

        let err = orchestrator.reset("mia").await.unwrap_err();
        assert!(matches!(err, VivaError::ResetExhausted));
    }
}
