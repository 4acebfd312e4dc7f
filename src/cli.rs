use crate::bench::{BenchConfig, format_report, run_benchmark, run_sweep, write_report};
use crate::feedback::feedback_row;
use crate::llm::{DEFAULT_BASE_URL, OpenAiClient, TranscriptClient};
use crate::round::RoundStatus;
use crate::session::{Session, SessionConfig};
use crate::telemetry::{JsonlSink, RoundSink, RoundSummary};
use crate::wordbank::{Wordbank, load_words_from_file};
use crate::{DEFAULT_MAX_LLM_CALLS, FibbleError};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fibble CLI options
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a newline-delimited wordbank file
    #[arg(short = 'i', long = "input")]
    pub wordbank_path: Option<String>,

    /// Number of board positions that lie every turn (0-5)
    #[arg(short, long, default_value_t = 0)]
    pub lies: usize,

    /// Guesses allowed per round
    #[arg(short, long, default_value_t = 6)]
    pub guesses: usize,

    /// Fixed secret word instead of a random one
    #[arg(long)]
    pub secret: Option<String>,

    /// Chat model to use for the AI guess source
    #[arg(short, long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Chat-completions base URL (OpenAI-compatible)
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Call budget per AI turn, reasoning retries included
    #[arg(long, default_value_t = DEFAULT_MAX_LLM_CALLS)]
    pub max_calls: usize,

    /// LLM request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Delay in milliseconds between staging and locking a guess
    #[arg(long, default_value_t = 0)]
    pub settle_ms: u64,

    /// Append finished rounds to this JSONL file
    #[arg(long)]
    pub telemetry: Option<PathBuf>,

    /// Append every chat exchange to this transcript file
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Run the AI benchmark instead of an interactive game
    #[arg(long)]
    pub bench: bool,

    /// Rounds per benchmark lie count
    #[arg(long, default_value_t = 10)]
    pub runs: usize,

    /// Benchmark every lie count from 0 through 5
    #[arg(long)]
    pub sweep: bool,

    /// Directory for benchmark report files
    #[arg(long, default_value = "benchmarks")]
    pub out_dir: PathBuf,
}

#[must_use]
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// What the player typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Guess(String),
    Hint,
    Solve,
    Ai,
    Words,
    NewGame,
    Exit,
    Invalid,
}

fn is_valid_word(word: &str) -> bool {
    word.len() == 5 && word.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn parse_command(line: &str) -> Command {
    let input = line.trim().to_uppercase();
    match input.as_str() {
        "EXIT" | "QUIT" => Command::Exit,
        "NEXT" => Command::NewGame,
        "HINT" => Command::Hint,
        "SOLVE" => Command::Solve,
        "AI" | "LLM" => Command::Ai,
        "WORDS" => Command::Words,
        _ if is_valid_word(&input) => Command::Guess(input),
        _ => Command::Invalid,
    }
}

pub fn read_command<R: BufRead>(reader: &mut R) -> Option<Command> {
    let mut input = String::new();
    if reader.read_line(&mut input).ok()? == 0 {
        return None;
    }
    Some(parse_command(&input))
}

// UI Input/Output functions

pub fn display_welcome(lies: usize, guesses: usize) {
    println!("Fibble: Wordle where the board lies.");
    if lies > 0 {
        println!("{lies} of the 5 feedback positions lie every turn.");
    }
    println!(
        "{guesses} guesses. Type a word, or 'hint', 'solve', 'ai', 'words', 'next', 'exit'."
    );
}

pub fn display_board(session: &Session) {
    for record in session.round().records() {
        println!("{}  {}", record.word, feedback_row(&record.external));
    }
}

pub fn display_prompt(session: &Session) {
    println!(
        "\nGuess {}/{}:",
        session.round().num_of_tries() + 1,
        session.round().max_guesses()
    );
}

pub fn display_candidates(candidates: &[String]) {
    println!("Possible candidates ({}):", candidates.len());
    for word in candidates.iter().take(5) {
        println!("{word}");
    }
    if candidates.len() > 5 {
        println!("...and {} more", candidates.len() - 5);
    }
}

pub fn display_round_end(session: &Session) {
    let round = session.round();
    match round.status() {
        RoundStatus::Success => println!(
            "Correct! {} in {} guesses.",
            round.secret(),
            round.num_of_tries()
        ),
        RoundStatus::Failure => println!("Out of guesses. The word was {}.", round.secret()),
        RoundStatus::InProgress => {}
    }
    if round.num_lies() > 0 && round.status() != RoundStatus::InProgress {
        let positions: Vec<String> = round
            .lie_plan()
            .indexes()
            .iter()
            .map(|i| (i + 1).to_string())
            .collect();
        println!("Lying positions were: {}", positions.join(", "));
    }
}

pub fn display_exit_message() {
    println!("Exiting.");
}

fn record_round(session: &Session, sink: &mut Option<JsonlSink>) {
    if let Some(sink) = sink
        && session.round().is_over()
        && let Err(e) = sink.record(&RoundSummary::capture(session.round()))
    {
        eprintln!("Failed to write telemetry: {e}");
    }
}

const AI_WAIT: Duration = Duration::from_secs(120);

/// The interactive loop. Generic over the reader so tests can drive it
/// with a Cursor.
pub fn run_game_loop<R: BufRead>(
    session: &mut Session,
    reader: &mut R,
    mut sink: Option<JsonlSink>,
) {
    let mut round_reported = false;
    loop {
        session.pump();
        if let Some(message) = session.error_message() {
            println!("{message}");
        }
        if session.round().is_over() {
            if !round_reported {
                display_round_end(session);
                record_round(session, &mut sink);
                round_reported = true;
            }
            println!("Type 'next' for a new round or 'exit' to quit.");
        } else {
            display_prompt(session);
        }

        let Some(command) = read_command(reader) else {
            display_exit_message();
            return;
        };

        match command {
            Command::Exit => {
                display_exit_message();
                return;
            }
            Command::NewGame => {
                if let Err(e) = session.new_round() {
                    eprintln!("Could not start a round: {e}");
                    return;
                }
                round_reported = false;
                println!("New round started.");
            }
            Command::Guess(word) => {
                if !session.wordbank().is_admissible(&word) {
                    println!("{word} is not in the word list.");
                    continue;
                }
                match session.submit_guess(&word) {
                    Ok(()) => {
                        wait_for_turn(session);
                        display_board(session);
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Command::Hint => match session.round().solver().get_guess() {
                Ok(hint) => println!("Suggested guess: {hint}"),
                Err(FibbleError::NoCandidates) => {
                    println!("No candidates remain. The lies may have misled the solver.");
                }
                Err(e) => println!("{e}"),
            },
            Command::Solve => match session.round().solver().get_guess() {
                Ok(word) => match session.submit_guess(&word) {
                    Ok(()) => {
                        println!("Solver plays {word}.");
                        wait_for_turn(session);
                        display_board(session);
                    }
                    Err(e) => println!("{e}"),
                },
                Err(FibbleError::NoCandidates) => {
                    println!("No candidates remain. The lies may have misled the solver.");
                }
                Err(e) => println!("{e}"),
            },
            Command::Ai => match session.request_ai() {
                Ok(()) => {
                    println!("Waiting for the model...");
                    if session.wait_for_ai(AI_WAIT) {
                        if let Some(message) = session.error_message() {
                            println!("{message}");
                        }
                        display_board(session);
                    } else {
                        println!("The model did not answer in time.");
                    }
                }
                Err(e) => println!("{e}"),
            },
            Command::Words => display_candidates(session.round().solver().candidates()),
            Command::Invalid => println!("Invalid input. Type a 5 letter word or a command."),
        }
    }
}

// With a settle delay the lock arrives as an event; block until it does.
fn wait_for_turn(session: &mut Session) {
    while session.round().pending_guess().is_some() {
        if !session.process_next(Duration::from_secs(60)) {
            return;
        }
    }
}

/// Builds the wordbank, session and optional LLM client from the parsed
/// arguments, then runs the requested mode.
pub fn run(cli: Cli) -> Result<(), FibbleError> {
    let wordbank = match &cli.wordbank_path {
        Some(path) => match load_words_from_file(path) {
            Ok(words) => Wordbank::from_single_list(words),
            Err(e) => {
                eprintln!("Failed to load word bank from '{path}': {e}");
                return Ok(());
            }
        },
        None => Wordbank::embedded(),
    };

    // A bad LLM setup only disables the AI source; the game still runs
    let api_key = std::env::var("FIBBLE_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();
    let mut client = match OpenAiClient::new(
        &cli.base_url,
        &cli.model,
        api_key,
        Duration::from_secs(cli.timeout),
    ) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn crate::llm::ChatClient>),
        Err(e) => {
            eprintln!("LLM source disabled: {e}");
            None
        }
    };
    if let (Some(inner), Some(path)) = (client.clone(), &cli.transcript) {
        match TranscriptClient::open(inner, path) {
            Ok(wrapped) => client = Some(Arc::new(wrapped)),
            Err(e) => eprintln!("Transcript disabled: {e}"),
        }
    }

    if cli.bench {
        let Some(client) = client else {
            eprintln!("The benchmark needs a working LLM source.");
            return Ok(());
        };
        let config = BenchConfig {
            model: cli.model.clone(),
            num_runs: cli.runs,
            max_guesses: cli.guesses,
            max_llm_calls: cli.max_calls,
        };
        let result = if cli.sweep {
            run_sweep(client.as_ref(), &wordbank, 5, &config, &cli.out_dir).map(|paths| {
                for path in paths {
                    println!("Saved benchmark results to {}", path.display());
                }
            })
        } else {
            run_benchmark(client.as_ref(), &wordbank, cli.lies, &config).and_then(|report| {
                println!("{}", format_report(&report));
                write_report(&report, &cli.out_dir)
                    .map(|path| println!("Saved benchmark results to {}", path.display()))
                    .map_err(|e| crate::llm::LlmError::Misconfiguration(e.to_string()))
            })
        };
        if let Err(e) = result {
            eprintln!("Benchmark aborted: {e}");
        }
        return Ok(());
    }

    let config = SessionConfig {
        num_lies: cli.lies.min(5),
        max_guesses: cli.guesses,
        settle_delay: Duration::from_millis(cli.settle_ms),
        max_llm_calls: cli.max_calls,
        ..SessionConfig::default()
    };
    let mut session = match &cli.secret {
        Some(secret) => Session::with_secret(wordbank, config, client, secret)?,
        None => Session::new(wordbank, config, client)?,
    };

    let sink = match &cli.telemetry {
        Some(path) => match JsonlSink::open(path) {
            Ok(sink) => Some(sink),
            Err(e) => {
                eprintln!("Telemetry disabled: {e}");
                None
            }
        },
        None => None,
    };

    display_welcome(cli.lies.min(5), cli.guesses);
    let stdin = std::io::stdin();
    run_game_loop(&mut session, &mut stdin.lock(), sink);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_command_words() {
        assert_eq!(parse_command("crane\n"), Command::Guess("CRANE".into()));
        assert_eq!(parse_command("  CRANE  "), Command::Guess("CRANE".into()));
        assert_eq!(parse_command("AbCdE"), Command::Guess("ABCDE".into()));
    }

    #[test]
    fn test_parse_command_keywords() {
        assert_eq!(parse_command("exit"), Command::Exit);
        assert_eq!(parse_command("QUIT"), Command::Exit);
        assert_eq!(parse_command("next"), Command::NewGame);
        assert_eq!(parse_command("hint"), Command::Hint);
        assert_eq!(parse_command("solve"), Command::Solve);
        assert_eq!(parse_command("ai"), Command::Ai);
        assert_eq!(parse_command("llm"), Command::Ai);
        assert_eq!(parse_command("words"), Command::Words);
    }

    #[test]
    fn test_parse_command_invalid() {
        assert_eq!(parse_command("CRAN"), Command::Invalid);
        assert_eq!(parse_command("CRANES"), Command::Invalid);
        assert_eq!(parse_command("CRAN3"), Command::Invalid);
        assert_eq!(parse_command(""), Command::Invalid);
    }

    #[test]
    fn test_read_command_eof_is_none() {
        let mut reader = Cursor::new("");
        assert!(read_command(&mut reader).is_none());
    }

    #[test]
    fn test_read_command_reads_one_line() {
        let mut reader = Cursor::new("crane\nexit\n");
        assert_eq!(read_command(&mut reader), Some(Command::Guess("CRANE".into())));
        assert_eq!(read_command(&mut reader), Some(Command::Exit));
    }

    fn scripted_session(secret: &str) -> Session {
        let bank = Wordbank::from_single_list(
            ["APPLE", "CRANE", "SLATE"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
        );
        Session::with_secret(bank, SessionConfig::default(), None, secret).unwrap()
    }

    #[test]
    fn test_game_loop_plays_to_success() {
        let mut session = scripted_session("APPLE");
        let mut input = Cursor::new("CRANE\nAPPLE\nexit\n");
        run_game_loop(&mut session, &mut input, None);
        assert_eq!(session.round().status(), RoundStatus::Success);
        assert_eq!(session.round().num_of_tries(), 2);
    }

    #[test]
    fn test_game_loop_rejects_words_outside_bank() {
        let mut session = scripted_session("APPLE");
        let mut input = Cursor::new("ZZZZZ\nexit\n");
        run_game_loop(&mut session, &mut input, None);
        assert_eq!(session.round().num_of_tries(), 0);
    }

    #[test]
    fn test_game_loop_solve_command_locks_a_guess() {
        let mut session = scripted_session("APPLE");
        let mut input = Cursor::new("solve\nexit\n");
        run_game_loop(&mut session, &mut input, None);
        assert_eq!(session.round().num_of_tries(), 1);
    }

    #[test]
    fn test_game_loop_next_starts_fresh_round() {
        let mut session = scripted_session("APPLE");
        let mut input = Cursor::new("CRANE\nnext\nexit\n");
        run_game_loop(&mut session, &mut input, None);
        assert_eq!(session.round().num_of_tries(), 0);
    }

    #[test]
    fn test_game_loop_exits_on_eof() {
        let mut session = scripted_session("APPLE");
        let mut input = Cursor::new("CRANE\n");
        run_game_loop(&mut session, &mut input, None);
        assert_eq!(session.round().num_of_tries(), 1);
    }
}
