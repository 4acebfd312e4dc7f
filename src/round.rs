//! A single round of the game and its turn protocol.
//!
//! [`Round`] owns the secret, the lie plan, the locked guess history and
//! the constraint solver. A turn is two steps: [`Round::submit_guess`]
//! stages a word, [`Round::resolve_turn`] classifies it, feeds the
//! truthful feedback to the solver, distorts it through the lie plan and
//! locks the record. The split exists so the orchestrator can put a
//! settle delay between the two without the round knowing about timers.

use crate::feedback::{LiePlan, classify};
use crate::solver::Solver;
use crate::{FibbleError, STRIKEOUT_THRESHOLD, WORD_LENGTH, debug_log};
use serde::{Deserialize, Serialize};

/// Where a round stands. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    InProgress,
    Success,
    Failure,
}

/// Which half of the turn protocol the round is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingGuess,
    PendingConfirmation,
}

/// One locked guess with both views of its feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessRecord {
    pub word: String,
    /// What the arbiter actually computed.
    pub truthful: Vec<crate::Feedback>,
    /// What observers were shown, after the lie plan.
    pub external: Vec<crate::Feedback>,
}

/// Bookkeeping for one committed AI guess, kept for telemetry.
///
/// `accepted` is unknown until a later confirmed guess settles it: the
/// most recent unresolved record matching the locked word is accepted,
/// every other unresolved record is not (the agent's word was discarded
/// or replaced before confirmation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmGuessRecord {
    pub guess: String,
    pub retries: usize,
    pub accepted: Option<bool>,
    pub previous_guesses: Vec<String>,
    pub step: usize,
}

#[derive(Debug, Clone)]
pub struct Round {
    secret: String,
    lie_plan: LiePlan,
    max_guesses: usize,
    solver: Solver,
    records: Vec<GuessRecord>,
    pending: Option<String>,
    status: RoundStatus,
    llm_guesses: Vec<LlmGuessRecord>,
    ai_consecutive_invalid: usize,
    ai_strikeout: bool,
}

impl Round {
    /// Starts a round. The secret must be five ASCII letters and is
    /// uppercased; the lie plan is fixed for the round's lifetime.
    pub fn new(
        secret: &str,
        lie_plan: LiePlan,
        max_guesses: usize,
        dictionary: Vec<String>,
    ) -> Result<Round, FibbleError> {
        let secret = secret.to_uppercase();
        if secret.len() != WORD_LENGTH || !secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FibbleError::LengthMismatch {
                expected: WORD_LENGTH,
                got: secret.chars().count(),
            });
        }
        Ok(Round {
            secret,
            lie_plan,
            max_guesses,
            solver: Solver::new(dictionary),
            records: Vec::new(),
            pending: None,
            status: RoundStatus::InProgress,
            llm_guesses: Vec::new(),
            ai_consecutive_invalid: 0,
            ai_strikeout: false,
        })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn lie_plan(&self) -> &LiePlan {
        &self.lie_plan
    }

    pub fn num_lies(&self) -> usize {
        self.lie_plan.num_lies()
    }

    pub fn max_guesses(&self) -> usize {
        self.max_guesses
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn is_over(&self) -> bool {
        self.status != RoundStatus::InProgress
    }

    pub fn phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::PendingConfirmation
        } else {
            Phase::AwaitingGuess
        }
    }

    /// Locked guesses so far, oldest first.
    pub fn records(&self) -> &[GuessRecord] {
        &self.records
    }

    /// Number of locked guesses.
    pub fn num_of_tries(&self) -> usize {
        self.records.len()
    }

    pub fn tries_left(&self) -> usize {
        self.max_guesses.saturating_sub(self.records.len())
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    /// An independent copy of the solver, for handing to a worker thread.
    pub fn solver_snapshot(&self) -> Solver {
        self.solver.clone()
    }

    /// History as the outside world saw it: locked words with external
    /// feedback only. This is what AI prompts are built from.
    pub fn external_history(&self) -> Vec<(String, Vec<crate::Feedback>)> {
        self.records
            .iter()
            .map(|r| (r.word.clone(), r.external.clone()))
            .collect()
    }

    /// Stages a guess for confirmation.
    ///
    /// The word must be exactly [`WORD_LENGTH`] ASCII letters. Whether it
    /// belongs to the wordbank is the caller's concern; the round itself
    /// accepts any well-formed word so solver and AI sources are never
    /// blocked by list membership.
    pub fn submit_guess(&mut self, word: &str) -> Result<(), FibbleError> {
        if self.is_over() {
            return Err(FibbleError::RoundOver);
        }
        if self.pending.is_some() {
            return Err(FibbleError::GuessPending);
        }
        let word = word.to_uppercase();
        if word.len() != WORD_LENGTH || !word.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FibbleError::LengthMismatch {
                expected: WORD_LENGTH,
                got: word.chars().count(),
            });
        }
        debug_log!("staged guess {word}");
        self.pending = Some(word);
        Ok(())
    }

    /// Discards the staged guess without locking it.
    pub fn retract_guess(&mut self) -> Option<String> {
        self.pending.take()
    }

    pub fn pending_guess(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Confirms the staged guess: classify, update the solver with the
    /// truth, lock the record with the distorted view, settle AI
    /// bookkeeping and evaluate the round status.
    pub fn resolve_turn(&mut self) -> Result<&GuessRecord, FibbleError> {
        let Some(word) = self.pending.take() else {
            return Err(FibbleError::NoPendingGuess);
        };

        let truthful = classify(&self.secret, &word)?;
        self.solver.update(&word, &truthful)?;
        let external = self.lie_plan.apply(&truthful);

        self.reconcile_llm_guesses(&word);

        debug_log!(
            "locked {word}: truthful {:?}, external {:?}",
            truthful,
            external
        );
        self.records.push(GuessRecord {
            word: word.clone(),
            truthful,
            external,
        });

        if word == self.secret {
            self.status = RoundStatus::Success;
        } else if self.records.len() >= self.max_guesses {
            self.status = RoundStatus::Failure;
        }

        Ok(self.records.last().unwrap())
    }

    /// Records a committed AI guess before it is staged. `accepted`
    /// stays unknown until a confirmation settles it.
    pub fn record_llm_guess(&mut self, word: &str, retries: usize) {
        self.llm_guesses.push(LlmGuessRecord {
            guess: word.to_uppercase(),
            retries,
            accepted: None,
            previous_guesses: self.records.iter().map(|r| r.word.clone()).collect(),
            step: self.num_of_tries() + 1,
        });
    }

    pub fn llm_guesses(&self) -> &[LlmGuessRecord] {
        &self.llm_guesses
    }

    // Most recent first: the newest unresolved record matching the word
    // just locked is the accepted one; older unresolved records were
    // superseded without ever being confirmed.
    fn reconcile_llm_guesses(&mut self, locked_word: &str) {
        let mut matched = false;
        for record in self.llm_guesses.iter_mut().rev() {
            if record.accepted.is_some() {
                continue;
            }
            if record.guess == locked_word && !matched {
                record.accepted = Some(true);
                matched = true;
            } else {
                record.accepted = Some(false);
            }
        }
    }

    /// Notes one unparseable AI reply. Returns `true` when the strikeout
    /// threshold is reached, which disables the AI source for the round.
    pub fn note_invalid_ai_reply(&mut self) -> bool {
        self.ai_consecutive_invalid += 1;
        if self.ai_consecutive_invalid >= STRIKEOUT_THRESHOLD {
            self.ai_strikeout = true;
        }
        self.ai_strikeout
    }

    /// A usable AI reply resets the consecutive-invalid counter.
    pub fn note_valid_ai_reply(&mut self) {
        self.ai_consecutive_invalid = 0;
    }

    pub fn set_ai_strikeout(&mut self) {
        self.ai_strikeout = true;
    }

    pub fn ai_struck_out(&self) -> bool {
        self.ai_strikeout
    }
}
