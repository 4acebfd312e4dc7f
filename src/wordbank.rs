use crate::WORD_LENGTH;
use rand::seq::SliceRandom;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

pub const EMBEDDED_ANSWERS: &str = include_str!("resources/answers.txt");
pub const EMBEDDED_GUESSES: &str = include_str!("resources/guesses.txt");

/// The master dictionary for a process: the admissible-guess list and the
/// (possibly smaller) answer list. Loaded once, consumed read-only.
#[derive(Debug, Clone)]
pub struct Wordbank {
    answers: Vec<String>,
    guesses: Vec<String>,
}

impl Wordbank {
    /// Builds a wordbank from an answer list and additional admissible
    /// guesses. Every answer is always an admissible guess.
    pub fn new(answers: Vec<String>, extra_guesses: Vec<String>) -> Wordbank {
        let mut guesses = answers.clone();
        guesses.extend(extra_guesses);
        guesses.sort();
        guesses.dedup();
        Wordbank { answers, guesses }
    }

    /// The wordbank bundled with the binary.
    pub fn embedded() -> Wordbank {
        Wordbank::new(
            load_words_from_str(EMBEDDED_ANSWERS),
            load_words_from_str(EMBEDDED_GUESSES),
        )
    }

    /// A wordbank where every admissible guess is also a possible answer,
    /// e.g. when the user supplies a single flat list.
    pub fn from_single_list(words: Vec<String>) -> Wordbank {
        Wordbank::new(words, Vec::new())
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    /// All admissible guesses, sorted lexicographically.
    pub fn guesses(&self) -> &[String] {
        &self.guesses
    }

    pub fn is_admissible(&self, word: &str) -> bool {
        self.guesses.binary_search_by(|w| w.as_str().cmp(word)).is_ok()
    }

    /// Picks a secret for a new round.
    pub fn random_answer(&self) -> Option<&str> {
        self.answers
            .choose(&mut rand::thread_rng())
            .map(|w| w.as_str())
    }
}

pub fn load_words_from_str(data: &str) -> Vec<String> {
    data.lines()
        .map(|line| line.trim().to_uppercase())
        .filter(|word| word.len() == WORD_LENGTH && word.chars().all(|c| c.is_ascii_alphabetic()))
        .collect()
}

pub fn load_words_from_file<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut words = Vec::new();
    for line in reader.lines() {
        let word = line?.trim().to_uppercase();
        if word.len() == WORD_LENGTH && word.chars().all(|c| c.is_ascii_alphabetic()) {
            words.push(word);
        }
    }
    Ok(words)
}
