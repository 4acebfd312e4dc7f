//! The orchestrator: one control thread, workers report back over a channel.
//!
//! All game state lives in [`Session`] and is only touched by the thread
//! that owns it. Settle delays, AI requests and error-message expiry all
//! run as worker threads that send a [`SessionEvent`] when done; the
//! owner drains the channel with [`Session::pump`] (or blocks in
//! [`Session::process_next`]). Every deferred event is tagged with the
//! round generation it was created under, so starting a new round
//! implicitly cancels everything still in flight.

use crate::feedback::LiePlan;
use crate::llm::{AiOutcome, ChatClient, LlmError, request_guess};
use crate::round::Round;
use crate::wordbank::Wordbank;
use crate::{DEFAULT_MAX_LLM_CALLS, FibbleError, debug_log, info_log};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread;
use std::time::Duration;

/// Messages worker threads send back to the owning thread.
#[derive(Debug)]
pub enum SessionEvent {
    /// The settle delay for a staged guess elapsed.
    SettleElapsed { round_gen: u64 },
    /// An AI worker finished one turn.
    AiReply {
        round_gen: u64,
        result: Result<AiOutcome, LlmError>,
    },
    /// A transient error message reached its display time.
    ErrorExpired { seq: u64 },
}

/// Knobs for a session, owned by the CLI layer.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub num_lies: usize,
    pub max_guesses: usize,
    /// Delay between staging a guess and locking it. Zero resolves
    /// synchronously inside [`Session::submit_guess`].
    pub settle_delay: Duration,
    /// How long transient error messages stay visible. Zero disables
    /// auto-expiry.
    pub error_ttl: Duration,
    pub max_llm_calls: usize,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            num_lies: 0,
            max_guesses: 6,
            settle_delay: Duration::ZERO,
            error_ttl: Duration::from_secs(2),
            max_llm_calls: DEFAULT_MAX_LLM_CALLS,
        }
    }
}

pub struct Session {
    wordbank: Wordbank,
    config: SessionConfig,
    round: Round,
    round_gen: u64,
    client: Option<Arc<dyn ChatClient>>,
    ai_loading: bool,
    error_message: Option<String>,
    error_seq: u64,
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
}

impl Session {
    /// Starts a session and its first round with a random secret.
    pub fn new(
        wordbank: Wordbank,
        config: SessionConfig,
        client: Option<Arc<dyn ChatClient>>,
    ) -> Result<Session, FibbleError> {
        let secret = wordbank
            .random_answer()
            .ok_or(FibbleError::NoCandidates)?
            .to_string();
        Session::with_secret(wordbank, config, client, &secret)
    }

    /// Starts a session with a fixed secret, for replays and tests.
    pub fn with_secret(
        wordbank: Wordbank,
        config: SessionConfig,
        client: Option<Arc<dyn ChatClient>>,
        secret: &str,
    ) -> Result<Session, FibbleError> {
        let (tx, rx) = channel();
        let round = Round::new(
            secret,
            LiePlan::sample(config.num_lies, &mut rand::thread_rng()),
            config.max_guesses,
            wordbank.guesses().to_vec(),
        )?;
        info_log!("new session, {} lies", round.num_lies());
        Ok(Session {
            wordbank,
            config,
            round,
            round_gen: 0,
            client,
            ai_loading: false,
            error_message: None,
            error_seq: 0,
            tx,
            rx,
        })
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn wordbank(&self) -> &Wordbank {
        &self.wordbank
    }

    pub fn ai_loading(&self) -> bool {
        self.ai_loading
    }

    pub fn ai_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Starts a fresh round with a new random secret and lie plan.
    /// Anything still in flight for the old round is orphaned: its
    /// events carry a stale generation and are dropped on arrival.
    pub fn new_round(&mut self) -> Result<(), FibbleError> {
        let secret = self
            .wordbank
            .random_answer()
            .ok_or(FibbleError::NoCandidates)?
            .to_string();
        self.round = Round::new(
            &secret,
            LiePlan::sample(self.config.num_lies, &mut rand::thread_rng()),
            self.config.max_guesses,
            self.wordbank.guesses().to_vec(),
        )?;
        self.round_gen += 1;
        self.ai_loading = false;
        self.error_message = None;
        info_log!("round {} started", self.round_gen);
        Ok(())
    }

    /// Stages a guess. With a zero settle delay the turn resolves before
    /// this returns; otherwise a timer thread fires [`SessionEvent::SettleElapsed`].
    pub fn submit_guess(&mut self, word: &str) -> Result<(), FibbleError> {
        self.round.submit_guess(word)?;
        if self.config.settle_delay.is_zero() {
            self.round.resolve_turn()?;
            return Ok(());
        }
        let tx = self.tx.clone();
        let round_gen = self.round_gen;
        let delay = self.config.settle_delay;
        thread::spawn(move || {
            thread::sleep(delay);
            // the receiver is gone when the session dropped; nothing to do
            let _ = tx.send(SessionEvent::SettleElapsed { round_gen });
        });
        Ok(())
    }

    /// Asks the AI source for the next guess. The network call runs on a
    /// worker thread against an immutable snapshot of the round; the
    /// outcome arrives as [`SessionEvent::AiReply`].
    pub fn request_ai(&mut self) -> Result<(), FibbleError> {
        if self.round.is_over() {
            return Err(FibbleError::RoundOver);
        }
        if self.round.pending_guess().is_some() {
            return Err(FibbleError::GuessPending);
        }
        if self.ai_loading {
            return Err(FibbleError::AiBusy);
        }
        if self.round.ai_struck_out() {
            return Err(FibbleError::AiStruckOut);
        }
        let Some(client) = self.client.clone() else {
            return Err(FibbleError::AiUnconfigured);
        };

        let history = self.round.external_history();
        let num_lies = self.round.num_lies();
        let tries_left = self.round.tries_left();
        let solver = self.round.solver_snapshot();
        let max_calls = self.config.max_llm_calls;
        let tx = self.tx.clone();
        let round_gen = self.round_gen;

        self.ai_loading = true;
        thread::spawn(move || {
            let result = request_guess(
                client.as_ref(),
                &history,
                num_lies,
                tries_left,
                &solver,
                max_calls,
            );
            let _ = tx.send(SessionEvent::AiReply { round_gen, result });
        });
        Ok(())
    }

    /// Applies one event to the state. Events from a previous round are
    /// discarded unchanged.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::SettleElapsed { round_gen } => {
                if round_gen != self.round_gen {
                    debug_log!("dropping stale settle timer");
                    return;
                }
                if self.round.pending_guess().is_some()
                    && let Err(e) = self.round.resolve_turn()
                {
                    self.set_error(e.to_string());
                }
            }
            SessionEvent::AiReply { round_gen, result } => {
                if round_gen != self.round_gen {
                    debug_log!("dropping stale AI reply");
                    return;
                }
                self.ai_loading = false;
                self.apply_ai_outcome(result);
            }
            SessionEvent::ErrorExpired { seq } => {
                if seq == self.error_seq {
                    self.error_message = None;
                }
            }
        }
    }

    fn apply_ai_outcome(&mut self, result: Result<AiOutcome, LlmError>) {
        match result {
            Ok(AiOutcome::Guess { word, retries }) => {
                self.round.note_valid_ai_reply();
                self.round.record_llm_guess(&word, retries);
                if let Err(e) = self.submit_guess(&word) {
                    self.set_error(format!("AI guess {word} rejected: {e}"));
                }
            }
            Ok(AiOutcome::Invalid) => {
                if self.round.note_invalid_ai_reply() {
                    self.set_error("AI struck out: too many unusable replies".to_string());
                } else {
                    self.set_error("AI reply contained no usable word".to_string());
                }
            }
            Ok(AiOutcome::Exhausted) => {
                self.round.set_ai_strikeout();
                self.set_error("AI exhausted its call budget for this round".to_string());
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Shows a transient error and arms its expiry timer.
    pub fn set_error(&mut self, message: String) {
        info_log!("session error: {message}");
        self.error_seq += 1;
        self.error_message = Some(message);
        if self.config.error_ttl.is_zero() {
            return;
        }
        let tx = self.tx.clone();
        let seq = self.error_seq;
        let ttl = self.config.error_ttl;
        thread::spawn(move || {
            thread::sleep(ttl);
            let _ = tx.send(SessionEvent::ErrorExpired { seq });
        });
    }

    /// Drains every queued event without blocking. Returns how many were
    /// handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Blocks for the next event, up to `timeout`. Returns `false` on
    /// timeout.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Blocks until the in-flight AI request settles into the round (or
    /// `timeout` passes). Used by the AI-only drivers.
    pub fn wait_for_ai(&mut self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.ai_loading {
            let now = std::time::Instant::now();
            if now >= deadline || !self.process_next(deadline - now) {
                return false;
            }
        }
        // a zero settle delay already resolved; otherwise wait it out
        while self.round.pending_guess().is_some() {
            let now = std::time::Instant::now();
            if now >= deadline || !self.process_next(deadline - now) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use std::sync::Mutex;

    struct ScriptedClient {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: &[&str]) -> Arc<ScriptedClient> {
            Arc::new(ScriptedClient {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    impl ChatClient for ScriptedClient {
        fn send(&self, _messages: &[Message]) -> Result<String, LlmError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::Transport("script exhausted".into()))
        }
    }

    fn bank() -> Wordbank {
        Wordbank::from_single_list(
            ["APPLE", "CRANE", "SLATE", "GRAPE"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
        )
    }

    fn session(client: Option<Arc<dyn ChatClient>>) -> Session {
        Session::with_secret(bank(), SessionConfig::default(), client, "APPLE").unwrap()
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_zero_settle_delay_resolves_synchronously() {
        let mut s = session(None);
        s.submit_guess("CRANE").unwrap();
        assert_eq!(s.round().num_of_tries(), 1);
        assert!(s.round().pending_guess().is_none());
    }

    #[test]
    fn test_settle_timer_resolves_via_event() {
        let mut s = Session::with_secret(
            bank(),
            SessionConfig {
                settle_delay: Duration::from_millis(10),
                ..SessionConfig::default()
            },
            None,
            "APPLE",
        )
        .unwrap();
        s.submit_guess("CRANE").unwrap();
        assert_eq!(s.round().num_of_tries(), 0);
        assert!(s.process_next(WAIT));
        assert_eq!(s.round().num_of_tries(), 1);
    }

    #[test]
    fn test_stale_settle_timer_ignored_after_new_round() {
        let mut s = Session::with_secret(
            bank(),
            SessionConfig {
                settle_delay: Duration::from_millis(10),
                ..SessionConfig::default()
            },
            None,
            "APPLE",
        )
        .unwrap();
        s.submit_guess("CRANE").unwrap();
        s.new_round().unwrap();
        assert!(s.process_next(WAIT));
        assert_eq!(s.round().num_of_tries(), 0);
    }

    #[test]
    fn test_ai_guess_flows_into_round() {
        let mut s = session(Some(ScriptedClient::new(&["CRANE"])));
        s.request_ai().unwrap();
        assert!(s.ai_loading());
        assert!(s.wait_for_ai(WAIT));
        assert_eq!(s.round().num_of_tries(), 1);
        assert_eq!(s.round().records()[0].word, "CRANE");
        assert_eq!(s.round().llm_guesses()[0].accepted, Some(true));
    }

    #[test]
    fn test_concurrent_ai_request_rejected() {
        let mut s = session(Some(ScriptedClient::new(&["CRANE", "SLATE"])));
        s.request_ai().unwrap();
        assert_eq!(s.request_ai(), Err(FibbleError::AiBusy));
        assert!(s.wait_for_ai(WAIT));
    }

    #[test]
    fn test_ai_request_without_client_rejected() {
        let mut s = session(None);
        assert_eq!(s.request_ai(), Err(FibbleError::AiUnconfigured));
    }

    #[test]
    fn test_transport_error_surfaces_as_message() {
        struct FailingClient;
        impl ChatClient for FailingClient {
            fn send(&self, _: &[Message]) -> Result<String, LlmError> {
                Err(LlmError::Transport("connection refused".into()))
            }
        }
        let mut s = session(Some(Arc::new(FailingClient)));
        s.request_ai().unwrap();
        assert!(s.wait_for_ai(WAIT));
        assert!(s.error_message().unwrap().contains("connection refused"));
        assert_eq!(s.round().num_of_tries(), 0);
    }

    #[test]
    fn test_error_message_expires() {
        let mut s = Session::with_secret(
            bank(),
            SessionConfig {
                error_ttl: Duration::from_millis(10),
                ..SessionConfig::default()
            },
            None,
            "APPLE",
        )
        .unwrap();
        s.set_error("transient".to_string());
        assert!(s.error_message().is_some());
        assert!(s.process_next(WAIT));
        assert!(s.error_message().is_none());
    }

    #[test]
    fn test_newer_error_outlives_stale_expiry() {
        let mut s = Session::with_secret(
            bank(),
            SessionConfig {
                error_ttl: Duration::from_millis(10),
                ..SessionConfig::default()
            },
            None,
            "APPLE",
        )
        .unwrap();
        s.set_error("first".to_string());
        s.set_error("second".to_string());
        // first timer's expiry must not clear the second message
        assert!(s.process_next(WAIT));
        assert_eq!(s.error_message(), Some("second"));
    }
}
