//! Constraint accumulation and candidate filtering.
//!
//! The [`Solver`] ingests truthful feedback one locked guess at a time,
//! tightens its constraints monotonically, and keeps the live candidate
//! set as a filtered view of the admissible-guess dictionary. It can
//! propose the highest-scoring candidate and explain, as structured
//! [`Reason`]s, why an arbitrary word conflicts with what is known.

use crate::feedback::Feedback;
use crate::{FibbleError, WORD_LENGTH};
use std::collections::{HashMap, HashSet};

/// A structured explanation of why a word conflicts with known
/// constraints. Produced by [`Solver::reason_guess`], never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// The position is pinned to a different letter.
    SingleBadCell {
        index: usize,
        letter: char,
        required: char,
    },
    /// The letter is ruled out at this position.
    NotPossible {
        index: usize,
        letter: char,
        /// Letters still allowed at this position.
        valid: Vec<char>,
    },
    /// A letter known to be in the word is missing from the candidate.
    StillPresentButMissing { letter: char },
}

/// Accumulated truthful constraints plus the candidate set they admit.
///
/// Constraints only ever tighten within a round; [`Solver::reset`] is the
/// only way to relax them. The candidate set starts as the full
/// admissible-guess dictionary (not just the answer list) and never
/// grows between resets.
#[derive(Debug, Clone)]
pub struct Solver {
    dictionary: Vec<String>,
    candidates: Vec<String>,
    required: [Option<char>; WORD_LENGTH],
    excluded: [HashSet<char>; WORD_LENGTH],
    min_count: HashMap<char, usize>,
    fully_excluded: HashSet<char>,
}

impl Solver {
    /// Creates a solver over the given admissible-guess dictionary.
    pub fn new(mut dictionary: Vec<String>) -> Solver {
        dictionary.sort();
        dictionary.dedup();
        let candidates = dictionary.clone();
        Solver {
            dictionary,
            candidates,
            required: [None; WORD_LENGTH],
            excluded: Default::default(),
            min_count: HashMap::new(),
            fully_excluded: HashSet::new(),
        }
    }

    /// Clears all constraints and restores the candidate set to the full
    /// dictionary.
    pub fn reset(&mut self) {
        self.candidates = self.dictionary.clone();
        self.required = [None; WORD_LENGTH];
        self.excluded = Default::default();
        self.min_count.clear();
        self.fully_excluded.clear();
    }

    /// Current candidate-set size. Zero means contradiction or
    /// dictionary exhaustion and callers must stop asking for guesses.
    pub fn num_possible_guesses(&self) -> usize {
        self.candidates.len()
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Folds one guess worth of truthful feedback into the store, then
    /// re-filters the candidate set.
    ///
    /// Returns `InconsistentFeedback` if the update would pin a letter
    /// that is also fully excluded; with classifier-produced feedback
    /// this cannot happen.
    pub fn update(&mut self, guess: &str, truthful: &[Feedback]) -> Result<(), FibbleError> {
        if guess.len() != WORD_LENGTH {
            return Err(FibbleError::LengthMismatch {
                expected: WORD_LENGTH,
                got: guess.len(),
            });
        }
        if truthful.len() != WORD_LENGTH {
            return Err(FibbleError::LengthMismatch {
                expected: WORD_LENGTH,
                got: truthful.len(),
            });
        }
        let letters: Vec<char> = guess.chars().map(|c| c.to_ascii_uppercase()).collect();

        // Confirmed copies of each letter within this guess: the
        // Correct+Present marks bound the letter's multiplicity below.
        let mut confirmed: HashMap<char, usize> = HashMap::new();
        for (i, &letter) in letters.iter().enumerate() {
            if truthful[i] != Feedback::Incorrect {
                *confirmed.entry(letter).or_insert(0) += 1;
            }
        }

        for (i, &letter) in letters.iter().enumerate() {
            match truthful[i] {
                Feedback::Correct => {
                    if self.fully_excluded.contains(&letter) {
                        return Err(FibbleError::InconsistentFeedback(letter));
                    }
                    self.required[i] = Some(letter);
                }
                Feedback::Present => {
                    self.excluded[i].insert(letter);
                }
                Feedback::Incorrect => {
                    if confirmed.contains_key(&letter) {
                        // Duplicate-letter nuance: the letter is in the
                        // word, just not this many times. Cap it by
                        // excluding this cell only; min_count stays put.
                        self.excluded[i].insert(letter);
                    } else {
                        if self.required.iter().any(|r| *r == Some(letter)) {
                            return Err(FibbleError::InconsistentFeedback(letter));
                        }
                        self.fully_excluded.insert(letter);
                    }
                }
            }
        }

        for (letter, count) in confirmed {
            let entry = self.min_count.entry(letter).or_insert(0);
            *entry = (*entry).max(count);
        }

        // Filter the prior candidate set; it never grows
        let mut candidates = std::mem::take(&mut self.candidates);
        candidates.retain(|word| self.satisfies(word));
        self.candidates = candidates;

        Ok(())
    }

    /// Deterministic guess selection: score every candidate by positional
    /// letter frequency over the remaining candidates (each distinct
    /// letter counted once) and return the best, ties broken
    /// lexicographically.
    pub fn get_guess(&self) -> Result<String, FibbleError> {
        let freq = self.build_freq_chart();
        let mut best: Option<(&str, usize)> = None;
        // Candidates are kept sorted, so a strict comparison keeps the
        // lexicographically first word among ties.
        for word in &self.candidates {
            let score = score_word(word, &freq);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((word, score));
            }
        }
        // Owned so callers can feed the word straight back into update
        best.map(|(w, _)| w.to_string())
            .ok_or(FibbleError::NoCandidates)
    }

    /// Explains every constraint `candidate` violates, in position order
    /// followed by global letter order. Empty iff the candidate satisfies
    /// all accumulated constraints, i.e. for dictionary words, iff it is
    /// in the candidate set.
    pub fn reason_guess(&self, candidate: &str) -> Result<Vec<Reason>, FibbleError> {
        if candidate.len() != WORD_LENGTH {
            return Err(FibbleError::LengthMismatch {
                expected: WORD_LENGTH,
                got: candidate.len(),
            });
        }
        let letters: Vec<char> = candidate.chars().map(|c| c.to_ascii_uppercase()).collect();
        let mut reasons = Vec::new();

        for (i, &letter) in letters.iter().enumerate() {
            match self.required[i] {
                Some(required) if required != letter => {
                    reasons.push(Reason::SingleBadCell {
                        index: i,
                        letter,
                        required,
                    });
                }
                Some(_) => {}
                None => {
                    if self.excluded[i].contains(&letter) || self.fully_excluded.contains(&letter)
                    {
                        reasons.push(Reason::NotPossible {
                            index: i,
                            letter,
                            valid: self.valid_letters_for(i),
                        });
                    }
                }
            }
        }

        let mut missing: Vec<char> = self
            .min_count
            .iter()
            .filter(|&(&letter, &count)| letters.iter().filter(|&&c| c == letter).count() < count)
            .map(|(&letter, _)| letter)
            .collect();
        missing.sort_unstable();
        for letter in missing {
            reasons.push(Reason::StillPresentButMissing { letter });
        }

        Ok(reasons)
    }

    /// Letters still allowed at `index`: the alphabet minus this
    /// position's exclusions and the fully excluded set.
    fn valid_letters_for(&self, index: usize) -> Vec<char> {
        ('A'..='Z')
            .filter(|c| !self.excluded[index].contains(c) && !self.fully_excluded.contains(c))
            .collect()
    }

    /// The filter predicate. Mirrors [`Solver::reason_guess`] exactly;
    /// `test_reasons_empty_iff_candidate` pins the equivalence.
    fn satisfies(&self, word: &str) -> bool {
        let letters: Vec<char> = word.chars().collect();
        if letters.len() != WORD_LENGTH {
            return false;
        }
        for (i, &letter) in letters.iter().enumerate() {
            match self.required[i] {
                Some(required) => {
                    if required != letter {
                        return false;
                    }
                }
                None => {
                    if self.excluded[i].contains(&letter) || self.fully_excluded.contains(&letter)
                    {
                        return false;
                    }
                }
            }
        }
        self.min_count
            .iter()
            .all(|(&letter, &count)| letters.iter().filter(|&&c| c == letter).count() >= count)
    }

    fn build_freq_chart(&self) -> [[usize; 26]; WORD_LENGTH] {
        let mut freq = [[0usize; 26]; WORD_LENGTH];
        for word in &self.candidates {
            for (i, c) in word.chars().enumerate() {
                freq[i][(c as u8 - b'A') as usize] += 1;
            }
        }
        freq
    }
}

fn score_word(word: &str, freq: &[[usize; 26]; WORD_LENGTH]) -> usize {
    let mut score = 0;
    for (i, c) in word.chars().enumerate() {
        // Repeated letters score once so duplicates don't inflate a word
        if word[..i].contains(c) {
            continue;
        }
        score += freq[i][(c as u8 - b'A') as usize];
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;

    fn bank(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn update_from_secret(solver: &mut Solver, secret: &str, guess: &str) {
        let truthful = classify(secret, guess).unwrap();
        solver.update(guess, &truthful).unwrap();
    }

    #[test]
    fn test_candidates_start_as_full_dictionary() {
        let solver = Solver::new(bank(&["CRANE", "SLATE", "TRACE"]));
        assert_eq!(solver.num_possible_guesses(), 3);
    }

    #[test]
    fn test_update_narrows_candidates() {
        let mut solver = Solver::new(bank(&["CRANE", "BRAIN", "TRAIN", "GRAIN", "STAIN"]));
        update_from_secret(&mut solver, "BRAIN", "CRANE");
        assert!(!solver.candidates().contains(&"CRANE".to_string()));
        assert!(solver.candidates().contains(&"BRAIN".to_string()));
    }

    #[test]
    fn test_candidate_set_non_increasing() {
        let mut solver = Solver::new(bank(&[
            "CRANE", "BRAIN", "TRAIN", "GRAIN", "STAIN", "SLATE", "TRACE", "PLACE",
        ]));
        let mut last = solver.num_possible_guesses();
        for guess in ["SLATE", "CRANE", "TRAIN"] {
            update_from_secret(&mut solver, "BRAIN", guess);
            let now = solver.num_possible_guesses();
            assert!(now <= last, "candidate set grew after {guess}");
            assert!(solver.candidates().contains(&"BRAIN".to_string()));
            last = now;
        }
    }

    #[test]
    fn test_reset_restores_dictionary() {
        let mut solver = Solver::new(bank(&["CRANE", "SLATE", "TRACE"]));
        update_from_secret(&mut solver, "CRANE", "SLATE");
        assert!(solver.num_possible_guesses() < 3);
        solver.reset();
        assert_eq!(solver.num_possible_guesses(), 3);
        assert!(solver.reason_guess("SLATE").unwrap().is_empty());
    }

    #[test]
    fn test_incorrect_fully_excludes_letter() {
        let mut solver = Solver::new(bank(&["CRANE", "SLATE", "PLUMB"]));
        // Secret PLUMB: every CRANE letter is absent
        update_from_secret(&mut solver, "PLUMB", "CRANE");
        assert_eq!(solver.candidates(), ["PLUMB"]);
    }

    #[test]
    fn test_duplicate_incorrect_is_count_cap_not_exclusion() {
        // Secret PLANE has one L; guess LLAMA reports the second L correct
        // and the first incorrect. The incorrect L must not fully exclude
        // L or the real answer would be filtered out.
        let mut solver = Solver::new(bank(&["PLANE", "LLAMA", "PLUMB", "CLASS"]));
        update_from_secret(&mut solver, "PLANE", "LLAMA");
        assert!(solver.candidates().contains(&"PLANE".to_string()));
        assert!(!solver.candidates().contains(&"LLAMA".to_string()));
    }

    #[test]
    fn test_reasons_empty_iff_candidate() {
        // The core invariant: reason_guess is empty exactly for members
        // of the candidate set, across several store states.
        let words = [
            "CRANE", "BRAIN", "TRAIN", "GRAIN", "STAIN", "SLATE", "TRACE", "PLACE", "PLANE",
            "APPLE", "PAPER", "LEVEL",
        ];
        let mut solver = Solver::new(bank(&words));
        for guess in ["SLATE", "PAPER", "CRANE"] {
            update_from_secret(&mut solver, "BRAIN", guess);
            for word in words {
                let reasons = solver.reason_guess(word).unwrap();
                let in_set = solver.candidates().contains(&word.to_string());
                assert_eq!(
                    reasons.is_empty(),
                    in_set,
                    "word {word}: reasons={reasons:?} in_set={in_set}"
                );
            }
        }
    }

    #[test]
    fn test_reason_single_bad_cell() {
        let mut solver = Solver::new(bank(&["CRANE", "CRATE", "TRACE"]));
        // Secret CRATE vs guess CRANE: C,R,A correct, T present (pos 4 is E correct)
        update_from_secret(&mut solver, "CRATE", "CRANE");
        let reasons = solver.reason_guess("TRACE").unwrap();
        assert!(
            reasons
                .iter()
                .any(|r| matches!(r, Reason::SingleBadCell { index: 0, letter: 'T', required: 'C' })),
            "missing SingleBadCell: {reasons:?}"
        );
    }

    #[test]
    fn test_reason_not_possible_lists_valid_letters() {
        let mut solver = Solver::new(bank(&["STAGE", "ALERT", "ABOUT"]));
        // Secret STAGE vs ALERT: A, E, T present elsewhere; L, R absent
        update_from_secret(&mut solver, "STAGE", "ALERT");
        // A was marked present at index 0, so A at index 0 is NotPossible
        let reasons = solver.reason_guess("ABOUT").unwrap();
        let not_possible = reasons.iter().find_map(|r| match r {
            Reason::NotPossible { index: 0, letter: 'A', valid } => Some(valid),
            _ => None,
        });
        let valid = not_possible.expect("expected NotPossible for A at index 0");
        assert!(!valid.contains(&'A'));
        assert!(!valid.contains(&'L'), "fully excluded letter listed as valid");
        assert!(valid.contains(&'S'));
    }

    #[test]
    fn test_reason_still_present_but_missing() {
        let mut solver = Solver::new(bank(&["CRANE", "SLATE", "STAGE"]));
        update_from_secret(&mut solver, "STAGE", "CRANE");
        // A and E are confirmed in the word; PLUMB has neither
        let reasons = solver.reason_guess("PLUMB").unwrap();
        let missing: Vec<char> = reasons
            .iter()
            .filter_map(|r| match r {
                Reason::StillPresentButMissing { letter } => Some(*letter),
                _ => None,
            })
            .collect();
        assert_eq!(missing, vec!['A', 'E'], "global letter order");
    }

    #[test]
    fn test_min_count_enforces_multiplicity() {
        // Secret LEVEL vs ELLEN confirms two Es and two Ls; BEZEL has
        // both letters but only one L, so it must be filtered and the
        // deficit explained
        let mut solver = Solver::new(bank(&["LEVEL", "BEZEL", "ELLEN"]));
        update_from_secret(&mut solver, "LEVEL", "ELLEN");
        assert!(solver.candidates().contains(&"LEVEL".to_string()));
        assert!(!solver.candidates().contains(&"BEZEL".to_string()));
        let reasons = solver.reason_guess("BEZEL").unwrap();
        assert_eq!(reasons, vec![Reason::StillPresentButMissing { letter: 'L' }]);
    }

    #[test]
    fn test_reasons_ordered_positions_then_letters() {
        let mut solver = Solver::new(bank(&["CRANE", "CRATE", "SLATE"]));
        update_from_secret(&mut solver, "CRATE", "CRANE");
        let reasons = solver.reason_guess("SLUMP").unwrap();
        // All positional reasons must precede the global ones
        let first_global = reasons
            .iter()
            .position(|r| matches!(r, Reason::StillPresentButMissing { .. }));
        if let Some(pos) = first_global {
            assert!(
                reasons[pos..]
                    .iter()
                    .all(|r| matches!(r, Reason::StillPresentButMissing { .. }))
            );
        }
    }

    #[test]
    fn test_get_guess_returns_candidate_and_breaks_ties_lexicographically() {
        // Two words with identical letter profiles at every position
        let solver = Solver::new(bank(&["BOOST", "ROOST"]));
        // freq: position 0 has B=1,R=1; other positions identical, so
        // both words score the same and BOOST wins the tie
        assert_eq!(solver.get_guess().unwrap(), "BOOST");
    }

    #[test]
    fn test_get_guess_prefers_frequent_letters() {
        let solver = Solver::new(bank(&["CRANE", "CRATE", "CRAZE", "BLIMP"]));
        // The CRA_E family shares most positional letters; BLIMP shares none
        let guess = solver.get_guess().unwrap();
        assert_ne!(guess, "BLIMP");
    }

    #[test]
    fn test_get_guess_can_be_played_back_into_update() {
        // The returned word must stay usable while the solver mutates,
        // as the solve command and the benchmark driver both do
        let mut solver = Solver::new(bank(&["CRANE", "SLATE", "TRACE"]));
        let guess = solver.get_guess().unwrap();
        update_from_secret(&mut solver, "SLATE", &guess);
        assert!(solver.num_possible_guesses() < 3);
    }

    #[test]
    fn test_get_guess_empty_is_no_candidates() {
        let mut solver = Solver::new(bank(&["CRANE"]));
        // Secret SLATE vs CRANE eliminates CRANE itself
        update_from_secret(&mut solver, "SLATE", "CRANE");
        assert_eq!(solver.num_possible_guesses(), 0);
        assert_eq!(solver.get_guess(), Err(FibbleError::NoCandidates));
    }

    #[test]
    fn test_inconsistent_feedback_detected() {
        let mut solver = Solver::new(bank(&["CRANE", "SLATE"]));
        // Hand-crafted contradiction: C correct at 0, then C incorrect
        // (and not confirmed elsewhere) in a later guess
        solver
            .update(
                "CRANE",
                &[
                    Feedback::Correct,
                    Feedback::Incorrect,
                    Feedback::Incorrect,
                    Feedback::Incorrect,
                    Feedback::Incorrect,
                ],
            )
            .unwrap();
        let result = solver.update(
            "CLOUD",
            &[
                Feedback::Incorrect,
                Feedback::Incorrect,
                Feedback::Incorrect,
                Feedback::Incorrect,
                Feedback::Incorrect,
            ],
        );
        assert_eq!(result, Err(FibbleError::InconsistentFeedback('C')));
    }

    #[test]
    fn test_update_length_mismatch() {
        let mut solver = Solver::new(bank(&["CRANE"]));
        let result = solver.update("CRANES", &[Feedback::Correct; WORD_LENGTH]);
        assert!(matches!(result, Err(FibbleError::LengthMismatch { .. })));
    }
}
