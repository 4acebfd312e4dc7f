//! Feedback classification and misinformation.
//!
//! [`classify`] is the single source of truth for a guess: a pure,
//! duplicate-aware two-pass comparison against the secret. [`LiePlan`]
//! holds the board columns that lie to external observers for the whole
//! round; the internal arbiter only ever sees truthful feedback.

use crate::{FibbleError, WORD_LENGTH};
use rand::Rng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

/// Per-letter feedback, ordered by severity: `Correct > Present > Incorrect`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Incorrect,
    Present,
    Correct,
}

impl Feedback {
    /// Board character, as printed in feedback rows (G=green, Y=yellow, X=gray).
    pub fn as_char(&self) -> char {
        match self {
            Feedback::Correct => 'G',
            Feedback::Present => 'Y',
            Feedback::Incorrect => 'X',
        }
    }

    pub fn from_char(c: char) -> Option<Feedback> {
        match c.to_ascii_uppercase() {
            'G' => Some(Feedback::Correct),
            'Y' => Some(Feedback::Present),
            'X' => Some(Feedback::Incorrect),
            _ => None,
        }
    }

    /// Label used in prompts shown to the model.
    pub fn label(&self) -> &'static str {
        match self {
            Feedback::Correct => "correct",
            Feedback::Present => "present",
            Feedback::Incorrect => "incorrect",
        }
    }

    /// Partial-credit weight for the benchmark completion score.
    pub fn weight(&self) -> f64 {
        match self {
            Feedback::Correct => 1.0,
            Feedback::Present => 0.5,
            Feedback::Incorrect => 0.0,
        }
    }
}

/// Renders a feedback row as a `GYXXG`-style string.
pub fn feedback_row(feedback: &[Feedback]) -> String {
    feedback.iter().map(Feedback::as_char).collect()
}

/// Classifies `guess` against `secret`, duplicate-aware.
///
/// Pass 1 marks exact matches and consumes their letters from the
/// secret's multiset; pass 2 marks remaining letters `Present` only
/// while unconsumed copies exist. A letter appearing `k` times in the
/// secret is therefore marked `Correct`/`Present` at most `k` times,
/// with `Correct` always preferred over `Present`.
pub fn classify(secret: &str, guess: &str) -> Result<Vec<Feedback>, FibbleError> {
    if secret.len() != WORD_LENGTH {
        return Err(FibbleError::LengthMismatch {
            expected: WORD_LENGTH,
            got: secret.len(),
        });
    }
    if guess.len() != WORD_LENGTH {
        return Err(FibbleError::LengthMismatch {
            expected: WORD_LENGTH,
            got: guess.len(),
        });
    }

    let secret_chars: Vec<char> = secret.chars().collect();
    let guess_chars: Vec<char> = guess.chars().collect();
    let mut remaining = [0usize; 26];
    for &c in &secret_chars {
        remaining[letter_index(c)] += 1;
    }

    let mut feedback = vec![Feedback::Incorrect; WORD_LENGTH];
    // Pass 1: exact matches consume their letter first
    for i in 0..WORD_LENGTH {
        if guess_chars[i] == secret_chars[i] {
            feedback[i] = Feedback::Correct;
            remaining[letter_index(guess_chars[i])] -= 1;
        }
    }
    // Pass 2: present-elsewhere, bounded by the unconsumed count
    for i in 0..WORD_LENGTH {
        if feedback[i] == Feedback::Correct {
            continue;
        }
        let idx = letter_index(guess_chars[i]);
        if remaining[idx] > 0 {
            feedback[i] = Feedback::Present;
            remaining[idx] -= 1;
        }
    }

    Ok(feedback)
}

fn letter_index(c: char) -> usize {
    (c.to_ascii_uppercase() as u8 - b'A') as usize
}

/// The board columns that report false feedback for an entire round.
///
/// Positions are drawn without replacement at round start and never
/// change afterwards. An empty plan is the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiePlan {
    indexes: Vec<usize>,
}

impl LiePlan {
    /// No lies: external feedback equals truthful feedback everywhere.
    pub fn none() -> LiePlan {
        LiePlan::default()
    }

    /// Draws `num_lies` distinct positions for the round.
    pub fn sample<R: Rng>(num_lies: usize, rng: &mut R) -> LiePlan {
        let mut indexes = sample(rng, WORD_LENGTH, num_lies.min(WORD_LENGTH)).into_vec();
        indexes.sort_unstable();
        LiePlan { indexes }
    }

    /// A fixed plan, for tests and replays.
    pub fn from_indexes(mut indexes: Vec<usize>) -> LiePlan {
        indexes.sort_unstable();
        indexes.dedup();
        indexes.retain(|&i| i < WORD_LENGTH);
        LiePlan { indexes }
    }

    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }

    pub fn num_lies(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_lie(&self, index: usize) -> bool {
        self.indexes.contains(&index)
    }

    /// Produces the externally observable feedback.
    ///
    /// Outside the lie positions the output equals the input exactly; at
    /// every lie position it is guaranteed to differ. The substitution is
    /// a fixed rotation, so the same truthful kind always lies the same
    /// way: `Correct -> Incorrect`, `Present -> Correct`,
    /// `Incorrect -> Present`.
    pub fn apply(&self, truthful: &[Feedback]) -> Vec<Feedback> {
        truthful
            .iter()
            .enumerate()
            .map(|(i, &f)| if self.is_lie(i) { distort(f) } else { f })
            .collect()
    }
}

fn distort(truth: Feedback) -> Feedback {
    match truth {
        Feedback::Correct => Feedback::Incorrect,
        Feedback::Present => Feedback::Correct,
        Feedback::Incorrect => Feedback::Present,
    }
}
