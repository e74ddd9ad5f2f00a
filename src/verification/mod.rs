//! Join Verification
//!
//! Gates a channel's join requests behind a simple challenge sent to the
//! applicant in a private chat. Pending applicants are kept in memory only.

pub mod challenge;
pub mod engine;
pub mod session;

pub use challenge::{
    AnswerRule, ChallengeConfig, ChallengeError, ChallengeSpec, DEFAULT_RECALL_WORD,
};
pub use engine::{
    AnswerOutcome, JoinOutcome, VerificationEngine, VerificationError, VerificationPolicy,
};
pub use session::{
    DecisionClaim, FailedAttempt, PendingApplicant, VerificationSessionStore,
    DEFAULT_MAX_ATTEMPTS,
};
