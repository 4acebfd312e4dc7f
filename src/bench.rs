//! The AI benchmark driver.
//!
//! Plays unattended rounds where every guess comes from the LLM source
//! and aggregates win rate, tries, latency and partial-credit completion
//! into a JSON report per lie count. Unlike the interactive session this
//! driver is synchronous: each network call runs inline, and transport
//! failures abort the benchmark instead of becoming transient messages.

use crate::feedback::{Feedback, LiePlan};
use crate::llm::{AiOutcome, ChatClient, LlmError, request_guess};
use crate::round::{Round, RoundStatus};
use crate::wordbank::Wordbank;
use crate::info_log;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameReport {
    pub run_id: usize,
    /// Mean partial-credit score per locked guess, out of board width.
    /// Scored from the feedback the agent actually saw, lies included.
    pub average_game_completion: f64,
    pub tries: usize,
    pub success: bool,
    /// Wall-clock seconds for the whole round.
    pub latency: f64,
    /// AI turns that produced no usable word.
    pub bad_guesses: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub num_runs: usize,
    pub model: String,
    pub max_llm_calls: usize,
    pub lies: usize,
    pub games: Vec<GameReport>,
    pub total_bad_guesses: usize,
    pub win_rate: f64,
    pub avg_tries: f64,
    pub avg_latency: f64,
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub model: String,
    pub num_runs: usize,
    pub max_guesses: usize,
    pub max_llm_calls: usize,
}

fn completion_score(feedback: &[Feedback]) -> f64 {
    feedback.iter().map(|f| f.weight()).sum()
}

/// Plays one AI-only round to the end. Strikeouts end the round early
/// with however many tries were locked; transport errors propagate.
fn run_game(
    client: &dyn ChatClient,
    wordbank: &Wordbank,
    lies: usize,
    config: &BenchConfig,
    run_id: usize,
) -> Result<GameReport, LlmError> {
    let secret = wordbank
        .random_answer()
        .ok_or_else(|| LlmError::Misconfiguration("empty wordbank".into()))?;
    let mut round = Round::new(
        secret,
        LiePlan::sample(lies, &mut rand::thread_rng()),
        config.max_guesses,
        wordbank.guesses().to_vec(),
    )
    .map_err(|e| LlmError::Misconfiguration(e.to_string()))?;

    let mut bad_guesses = 0usize;
    let mut total_completion = 0.0;
    let start = Instant::now();

    while round.status() == RoundStatus::InProgress && !round.ai_struck_out() {
        let outcome = request_guess(
            client,
            &round.external_history(),
            round.num_lies(),
            round.tries_left(),
            round.solver(),
            config.max_llm_calls,
        )?;

        match outcome {
            AiOutcome::Guess { word, retries } => {
                round.note_valid_ai_reply();
                round.record_llm_guess(&word, retries);
                let external = match round
                    .submit_guess(&word)
                    .and_then(|()| round.resolve_turn())
                {
                    Ok(record) => record.external.clone(),
                    Err(_) => {
                        // malformed despite extraction, counts as a bad turn
                        bad_guesses += 1;
                        round.note_invalid_ai_reply();
                        continue;
                    }
                };
                total_completion += completion_score(&external);
            }
            AiOutcome::Invalid => {
                bad_guesses += 1;
                round.note_invalid_ai_reply();
            }
            AiOutcome::Exhausted => {
                round.set_ai_strikeout();
            }
        }
    }

    let latency = start.elapsed().as_secs_f64();
    let tries = round.num_of_tries();
    let report = GameReport {
        run_id: run_id + 1,
        average_game_completion: if tries > 0 {
            total_completion / tries as f64
        } else {
            0.0
        },
        tries,
        success: round.status() == RoundStatus::Success,
        latency,
        bad_guesses,
    };
    info_log!(
        "run {}: secret {}, tries {}, success {}",
        report.run_id,
        round.secret(),
        report.tries,
        report.success
    );
    Ok(report)
}

/// Runs `num_runs` AI-only rounds at a fixed lie count.
pub fn run_benchmark(
    client: &dyn ChatClient,
    wordbank: &Wordbank,
    lies: usize,
    config: &BenchConfig,
) -> Result<BenchReport, LlmError> {
    let mut games = Vec::with_capacity(config.num_runs);
    for run_id in 0..config.num_runs {
        games.push(run_game(client, wordbank, lies, config, run_id)?);
    }

    let runs = config.num_runs.max(1) as f64;
    let wins = games.iter().filter(|g| g.success).count();
    let total_tries: usize = games.iter().map(|g| g.tries).sum();
    let total_latency: f64 = games.iter().map(|g| g.latency).sum();
    let total_bad_guesses: usize = games.iter().map(|g| g.bad_guesses).sum();

    Ok(BenchReport {
        num_runs: config.num_runs,
        model: config.model.clone(),
        max_llm_calls: config.max_llm_calls,
        lies,
        games,
        total_bad_guesses,
        win_rate: wins as f64 / runs,
        avg_tries: total_tries as f64 / runs,
        avg_latency: total_latency / runs,
    })
}

/// File name for one report, model name made path-safe.
pub fn report_path(out_dir: &Path, model: &str, lies: usize) -> PathBuf {
    out_dir.join(format!(
        "benchmark_llm_{}_fibble{lies}.json",
        model.replace([':', '/'], "_")
    ))
}

pub fn write_report(report: &BenchReport, out_dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = report_path(out_dir, &report.model, report.lies);
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(path)
}

/// Benchmarks every lie count from 0 through `max_lies`, writing one
/// report file per count.
pub fn run_sweep(
    client: &dyn ChatClient,
    wordbank: &Wordbank,
    max_lies: usize,
    config: &BenchConfig,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, LlmError> {
    let mut paths = Vec::new();
    for lies in 0..=max_lies {
        info_log!("benchmarking with {lies} lies");
        let report = run_benchmark(client, wordbank, lies, config)?;
        let path = write_report(&report, out_dir)
            .map_err(|e| LlmError::Misconfiguration(e.to_string()))?;
        paths.push(path);
    }
    Ok(paths)
}

/// Human-readable summary block printed after each lie count.
pub fn format_report(report: &BenchReport) -> String {
    let bar = "=".repeat(50);
    format!(
        "{bar}\nFINAL RESULTS ({} lies)\n{bar}\n\
         Win Rate: {:.2}% ({}/{})\n\
         Average Tries: {:.2}\n\
         Average Latency: {:.2}s\n\
         Total Bad Guesses: {}\n{bar}",
        report.lies,
        report.win_rate * 100.0,
        report.games.iter().filter(|g| g.success).count(),
        report.num_runs,
        report.avg_tries,
        report.avg_latency,
        report.total_bad_guesses,
    )
}
