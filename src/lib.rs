// Library interface for fibble
// This allows integration tests to access internal modules

use thiserror::Error;

pub mod bench;
pub mod cli;
pub mod feedback;
pub mod llm;
pub mod logging;
pub mod round;
pub mod session;
pub mod solver;
pub mod telemetry;
pub mod wordbank;

// Re-export commonly used items for easier testing
pub use feedback::{Feedback, LiePlan, classify};
pub use llm::{AiOutcome, ChatClient, LlmError, Message, request_guess};
pub use round::{Round, RoundStatus};
pub use session::Session;
pub use solver::{Reason, Solver};
pub use wordbank::Wordbank;

/// Length of every secret and guess in a round.
pub const WORD_LENGTH: usize = 5;

/// Consecutive unparseable model replies tolerated before the AI source
/// is disabled for the rest of the round.
pub const STRIKEOUT_THRESHOLD: usize = 10;

/// Call budget for one AI turn, including reasoning retries.
pub const DEFAULT_MAX_LLM_CALLS: usize = 10;

/// The errors produced by the engine and orchestrator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FibbleError {
    /// Classifier inputs must both be exactly [`WORD_LENGTH`] letters.
    #[error("expected a {expected} letter word, got {got} letters")]
    LengthMismatch { expected: usize, got: usize },

    /// Truthful feedback contradicted the accumulated constraints. This
    /// signals a classifier or store bug and never occurs with feedback
    /// produced by [`classify`].
    #[error("feedback contradicts known constraints for letter '{0}'")]
    InconsistentFeedback(char),

    /// The candidate set is empty and a guess was requested.
    #[error("no candidate words remain")]
    NoCandidates,

    /// A guess was submitted after the round reached Success or Failure.
    #[error("the round is already over")]
    RoundOver,

    /// A guess was submitted while another is awaiting confirmation.
    #[error("a guess is already awaiting confirmation")]
    GuessPending,

    /// A confirmation was requested with no guess staged.
    #[error("no guess is awaiting confirmation")]
    NoPendingGuess,

    /// A second AI request was made while one is in flight.
    #[error("an AI request is already in flight")]
    AiBusy,

    /// An AI guess was requested but no LLM source is configured.
    #[error("no LLM source is configured")]
    AiUnconfigured,

    /// The AI source has struck out for this round.
    #[error("the AI source is disabled for the rest of this round")]
    AiStruckOut,
}
