pub mod feedback;
pub mod session;

pub use feedback::{FeedbackRecord, InterviewSummary, InterviewTriple};
pub use session::{Role, SessionPatch, SessionRecord, Stage, Turn};
