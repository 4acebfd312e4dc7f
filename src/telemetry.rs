//! Per-round telemetry.
//!
//! Finished rounds can be appended to a JSONL file for later analysis.
//! The sink is optional everywhere; a session without one plays
//! identically.

use crate::round::{LlmGuessRecord, Round, RoundStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Everything worth keeping about one finished round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub llm_guesses: Vec<LlmGuessRecord>,
    pub guesses: Vec<String>,
    pub success: bool,
    pub actual_word: String,
    pub num_guesses: usize,
    pub max_guesses: usize,
    pub num_lies: usize,
    pub timestamp: DateTime<Utc>,
}

impl RoundSummary {
    /// Captures a finished round. Call after the status turns terminal;
    /// summarizing an in-progress round records it as a failure so far.
    pub fn capture(round: &Round) -> RoundSummary {
        RoundSummary {
            llm_guesses: round.llm_guesses().to_vec(),
            guesses: round.records().iter().map(|r| r.word.clone()).collect(),
            success: round.status() == RoundStatus::Success,
            actual_word: round.secret().to_string(),
            num_guesses: round.num_of_tries(),
            max_guesses: round.max_guesses(),
            num_lies: round.num_lies(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for finished rounds.
pub trait RoundSink {
    fn record(&mut self, summary: &RoundSummary) -> io::Result<()>;
}

/// Appends one JSON object per round to a file.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<JsonlSink> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonlSink {
            writer: BufWriter::new(file),
        })
    }
}

impl RoundSink for JsonlSink {
    fn record(&mut self, summary: &RoundSummary) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, summary)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
