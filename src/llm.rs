//! The chat-completion collaborator and the AI guess sub-protocol.
//!
//! The orchestrator only depends on [`ChatClient`]; any provider that
//! speaks an OpenAI-compatible chat-completions endpoint works through
//! the bundled [`OpenAiClient`] (OpenAI, OpenRouter, DeepSeek, Ollama's
//! compatibility API). [`request_guess`] runs one AI turn: build the
//! prompt from locked history, extract a word from the reply, and coach
//! the model with solver reasoning for up to `max_calls` attempts.

use crate::feedback::Feedback;
use crate::solver::{Reason, Solver};
use crate::{WORD_LENGTH, debug_log};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;

/// Errors from the chat-completion collaborator.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("authentication rejected by provider: {0}")]
    Auth(String),

    #[error("provider rate limit hit")]
    RateLimit,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("LLM source misconfigured: {0}")]
    Misconfiguration(String),
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Message {
        Message {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Message {
        Message::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Message {
        Message::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Message {
        Message::new(Role::Assistant, content)
    }
}

/// The chat-completion collaborator. The orchestrator is agnostic to
/// which concrete provider backs this.
pub trait ChatClient: Send + Sync {
    fn send(&self, messages: &[Message]) -> Result<String, LlmError>;
}

/// Outcome of one AI turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiOutcome {
    /// A word was committed, possibly after reasoning retries.
    Guess { word: String, retries: usize },
    /// The reply contained no usable word; the turn ends without a guess.
    Invalid,
    /// The reasoning retries exhausted the call budget without committing.
    Exhausted,
}

/// Runs the bounded AI retry loop for a single turn.
///
/// `history` is the locked guesses so far paired with their **external**
/// feedback; the model never sees ground truth. The loop makes at most
/// `max_calls - 1` network calls: a reply that parses but conflicts with
/// the constraints is coached with [`Solver::reason_guess`] output and
/// retried, but only while no misinformation is active (the explanations
/// are valid against truthful feedback only). Reaching the budget
/// without committing yields [`AiOutcome::Exhausted`].
pub fn request_guess(
    client: &dyn ChatClient,
    history: &[(String, Vec<Feedback>)],
    num_lies: usize,
    tries_left: usize,
    solver: &Solver,
    max_calls: usize,
) -> Result<AiOutcome, LlmError> {
    let mut messages = build_messages(history, num_lies, tries_left);
    let mut calls = 0usize;

    loop {
        if calls == max_calls.saturating_sub(1) {
            return Ok(AiOutcome::Exhausted);
        }

        let reply = client.send(&messages)?;
        debug_log!("model reply: {reply}");

        let Some(word) = extract_guess(&reply) else {
            return Ok(AiOutcome::Invalid);
        };

        // reason_guess cannot fail here: extract_guess only yields
        // WORD_LENGTH-letter runs
        let reasons = solver
            .reason_guess(&word)
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        messages.push(Message::assistant(reply));

        // An empty candidate set means coaching can never converge, so
        // the word commits uncorrected
        if !reasons.is_empty()
            && num_lies == 0
            && solver.num_possible_guesses() > 0
            && calls < max_calls.saturating_sub(1)
        {
            messages.push(reasoning_message(&reasons));
            calls += 1;
            continue;
        }

        // Commit even if still inconsistent: the agent gets one
        // uncorrected attempt per call budget
        return Ok(AiOutcome::Guess {
            word,
            retries: calls,
        });
    }
}

/// Builds the conversation for one AI turn from external history.
pub fn build_messages(
    history: &[(String, Vec<Feedback>)],
    num_lies: usize,
    tries_left: usize,
) -> Vec<Message> {
    let mut messages = vec![Message::system(format!(
        "This is Wordle. You will guess a {WORD_LENGTH} letter word \
         based off previous guesses and feedback in the form of \
         correct: letter is in the right spot, \
         present: letter is in the word but not in that spot, \
         and incorrect: letter is not present in the word. \
         Assume there are no lies unless otherwise stated. \
         Respond with the {WORD_LENGTH} letter word, nothing else! \
         You should never respond with any additional text, or any \
         symbols that are not an alphabet letter. \
         If no feedback is provided, you must guess the word without \
         feedback (first turn of a new game). \
         You only have a certain amount of tries to get the word."
    ))];

    if num_lies > 0 {
        messages.push(Message::user(format!(
            "{num_lies} of the feedbacks provided to you are lies. \
             Tailor your guesses accordingly."
        )));
    }

    for (guess, feedback) in history {
        let feedback_lines: Vec<String> = guess
            .chars()
            .zip(feedback)
            .map(|(letter, kind)| format!("{letter}: {}", kind.label()))
            .collect();
        messages.push(Message::user(format!(
            "Guess: {guess}\nFeedback:\n{}",
            feedback_lines.join("\n")
        )));
    }

    messages.push(Message::user(format!(
        "You have {tries_left} tries remaining."
    )));

    messages
}

/// Turns reason codes into the corrective system message used to coach
/// a retry.
pub fn reasoning_message(reasons: &[Reason]) -> Message {
    let mut reasoning = String::new();
    for reason in reasons {
        match reason {
            Reason::SingleBadCell {
                letter, required, ..
            } => {
                reasoning.push_str(&format!(
                    "'{letter}' is not a possible letter for this spot, \
                     the valid letter should be: {required}\n"
                ));
            }
            Reason::NotPossible { letter, valid, .. } => {
                let valid: String = valid.iter().collect();
                reasoning.push_str(&format!(
                    "'{letter}' is not a possible letter for this spot, \
                     valid letters are: {valid}\n"
                ));
            }
            Reason::StillPresentButMissing { letter } => {
                reasoning.push_str(&format!("'{letter}' must be in the word\n"));
            }
        }
    }
    Message::system(reasoning)
}

/// Extracts the first alphabetic run of exactly [`WORD_LENGTH`] letters
/// from a free-form reply, uppercased. Known chatter prefixes are
/// stripped first so a wordy reply still yields its guess.
pub fn extract_guess(reply: &str) -> Option<String> {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    let re = WORD_RE.get_or_init(|| {
        Regex::new(&format!(r"\b[A-Za-z]{{{WORD_LENGTH}}}\b")).expect("static regex")
    });

    let cleaned = reply
        .replace("Guess: ", "")
        .replace("My first guess is: ", "")
        .replace("Okay, let's begin!", "");

    re.find(&cleaned).map(|m| m.as_str().to_uppercase())
}

/// Wraps any client and appends every exchange to a transcript file.
/// Off unless the CLI asks for it; logging failures never fail the turn.
pub struct TranscriptClient {
    inner: Arc<dyn ChatClient>,
    file: std::sync::Mutex<std::fs::File>,
}

impl TranscriptClient {
    pub fn open(
        inner: Arc<dyn ChatClient>,
        path: &std::path::Path,
    ) -> Result<TranscriptClient, LlmError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LlmError::Misconfiguration(e.to_string()))?;
        Ok(TranscriptClient {
            inner,
            file: std::sync::Mutex::new(file),
        })
    }

    fn append(&self, messages: &[Message], reply: &Result<String, LlmError>) {
        use std::io::Write;
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        let _ = writeln!(file, "--- request ---");
        for message in messages {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let _ = writeln!(file, "{role}: {}", message.content);
        }
        match reply {
            Ok(content) => {
                let _ = writeln!(file, "--- reply ---\n{content}");
            }
            Err(e) => {
                let _ = writeln!(file, "--- error ---\n{e}");
            }
        }
    }
}

impl ChatClient for TranscriptClient {
    fn send(&self, messages: &[Message]) -> Result<String, LlmError> {
        let reply = self.inner.send(messages);
        self.append(messages, &reply);
        reply
    }
}

/// OpenAI-compatible chat-completions client over blocking HTTP.
///
/// The network call always runs on a worker thread (see
/// [`crate::session`]), so a blocking client keeps the control thread
/// model simple. The client carries a fixed request timeout; when it
/// fires the caller sees [`LlmError::Transport`].
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

/// Default chat-completions endpoint (OpenAI); OpenRouter, DeepSeek and
/// local Ollama expose the same shape under their own base URLs.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<OpenAiClient, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Misconfiguration(e.to_string()))?;
        Ok(OpenAiClient {
            http,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            max_tokens: 50,
            temperature: 0.3,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatClient for OpenAiClient {
    fn send(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            401 | 403 => {
                return Err(LlmError::Auth(format!(
                    "provider returned {}",
                    response.status()
                )));
            }
            429 => return Err(LlmError::RateLimit),
            status if status >= 400 => {
                return Err(LlmError::Transport(format!(
                    "provider returned {}",
                    response.status()
                )));
            }
            _ => {}
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Transport("reply contained no message content".into()))
    }
}
