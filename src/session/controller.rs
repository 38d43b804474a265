use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::{EndpointPolicy, SessionConfig};
use super::state::{PendingUtterance, SessionNotice, SessionSnapshot, SessionState};
use super::stats::SessionStats;
use crate::capture::{CaptureAdapter, CaptureEvent};
use crate::error::{CaptureError, ExchangeError, SessionError, SynthesisError};
use crate::synthesis::SynthesisAdapter;
use crate::transcript::TranscriptStore;
use crate::tutor::{TutorClient, TutorReply};
use crate::wakelock::WakeLock;

/// External collaborators driven by the controller
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn CaptureAdapter>,
    pub synthesis: Arc<dyn SynthesisAdapter>,
    pub tutor: Arc<dyn TutorClient>,
    pub wake_lock: Arc<dyn WakeLock>,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Start(Reply<Result<(), SessionError>>),
    Stop(Reply<SessionStats>),
    SubmitText(String, Reply<Result<(), SessionError>>),
    Listen(Reply<Result<(), SessionError>>),
    FinishUtterance(Reply<Result<(), SessionError>>),
    Retry(Reply<Result<(), SessionError>>),
    WakeLockRevoked,
    Shutdown(Reply<()>),
}

/// Adapter results, tagged with the generation that issued them
enum Event {
    Capture { generation: u64, event: CaptureEvent },
    CaptureClosed { generation: u64 },
    Exchange { generation: u64, result: Result<TutorReply, ExchangeError> },
    SpeechDone { generation: u64, result: Result<(), SynthesisError> },
    SettleElapsed { generation: u64 },
    SilenceElapsed { generation: u64, mark: u64 },
}

/// Handle on a running session controller
///
/// All state lives in a single driver task; this handle sends it commands
/// and reads the published [`SessionSnapshot`]. Cloning is cheap.
#[derive(Clone)]
pub struct SessionController {
    session_id: Arc<str>,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionController {
    /// Spawn the driver task. Must be called inside a Tokio runtime.
    pub fn spawn(config: SessionConfig, collaborators: Collaborators) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let session_id: Arc<str> = Arc::from(config.session_id.as_str());

        info!("Creating tutoring session controller: {}", session_id);

        let driver = SessionDriver {
            config,
            capture: collaborators.capture,
            synthesis: collaborators.synthesis,
            tutor: collaborators.tutor,
            wake_lock: collaborators.wake_lock,
            events_tx,
            snapshot_tx,
            state: SessionState::Inactive,
            started_at: None,
            transcript: TranscriptStore::new(),
            pending: PendingUtterance::default(),
            notice: None,
            generation: 0,
            silence_mark: 0,
            unlocked: false,
            capture_open: false,
            retry_pending: false,
            forwarder: None,
            task: None,
            silence_timer: None,
        };

        tokio::spawn(driver.run(commands_rx, events_rx));

        Self {
            session_id,
            commands: commands_tx,
            snapshot: snapshot_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start a new session, clearing the previous transcript
    ///
    /// Fails when capture cannot begin. Fatal failures leave the session
    /// `Inactive`; recoverable ones leave it `Idle`.
    pub async fn start_session(&self) -> Result<(), SessionError> {
        self.request(Command::Start).await?
    }

    /// Stop the session and return its final statistics
    pub async fn stop_session(&self) -> Result<SessionStats, SessionError> {
        self.request(Command::Stop).await
    }

    /// Typed alternative to a spoken utterance
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::SubmitText(text, reply)).await?
    }

    /// Begin capture on user request. Interrupted playback gets the settle
    /// delay before capture starts.
    pub async fn listen(&self) -> Result<(), SessionError> {
        self.request(Command::Listen).await?
    }

    /// Stop capture and let the engine finalize what it heard
    pub async fn finish_utterance(&self) -> Result<(), SessionError> {
        self.request(Command::FinishUtterance).await?
    }

    /// Re-send the last user turn after a failed exchange
    pub async fn retry(&self) -> Result<(), SessionError> {
        self.request(Command::Retry).await?
    }

    /// The platform revoked the wake lock (e.g. on a visibility change)
    pub fn wake_lock_revoked(&self) {
        if self.commands.try_send(Command::WakeLockRevoked).is_err() {
            warn!("Dropped wake lock revocation notice");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that sees every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::from_snapshot(&self.session_id, &self.snapshot.borrow())
    }

    /// Stop any session and end the driver task
    pub async fn shutdown(&self) {
        if self.request(Command::Shutdown).await.is_err() {
            debug!("Session controller already shut down");
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Owns every piece of mutable session state
struct SessionDriver {
    config: SessionConfig,
    capture: Arc<dyn CaptureAdapter>,
    synthesis: Arc<dyn SynthesisAdapter>,
    tutor: Arc<dyn TutorClient>,
    wake_lock: Arc<dyn WakeLock>,

    events_tx: mpsc::UnboundedSender<Event>,
    snapshot_tx: watch::Sender<SessionSnapshot>,

    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    transcript: TranscriptStore,
    pending: PendingUtterance,
    notice: Option<SessionNotice>,

    /// Bumped on every hand-off and cancellation; events carrying an older
    /// value come from superseded operations and are dropped
    generation: u64,
    silence_mark: u64,

    unlocked: bool,
    /// A capture instance was started and has not finished
    capture_open: bool,
    /// The last exchange failed and its user turn has no reply
    retry_pending: bool,

    forwarder: Option<JoinHandle<()>>,
    /// Exchange, playback or settle task for the current generation
    task: Option<JoinHandle<()>>,
    silence_timer: Option<JoinHandle<()>>,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        info!("Session controller task started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.teardown().await;
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }

        info!("Session controller task stopped");
    }

    /// Returns false once the controller should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                if self.state.is_active() {
                    info!("Stopping tutoring session: {}", self.config.session_id);
                } else {
                    warn!("Session not active");
                }
                // Stats are taken before teardown resets the start time
                let mut stats = SessionStats::from_snapshot(&self.config.session_id, &self.snapshot());
                self.teardown().await;
                self.publish();
                stats.state = self.state;
                stats.is_active = false;
                let _ = reply.send(stats);
            }
            Command::SubmitText(text, reply) => {
                let result = self.submit_text(&text).await;
                let _ = reply.send(result);
            }
            Command::Listen(reply) => {
                let result = self.listen().await;
                let _ = reply.send(result);
            }
            Command::FinishUtterance(reply) => {
                let result = self.finish_utterance().await;
                let _ = reply.send(result);
            }
            Command::Retry(reply) => {
                let result = self.retry();
                let _ = reply.send(result);
            }
            Command::WakeLockRevoked => {
                if self.state.is_active() {
                    info!("Wake lock revoked while session active, re-acquiring");
                    if let Err(e) = self.wake_lock.reacquire() {
                        warn!("Wake lock unavailable: {:#}", e);
                    }
                }
            }
            Command::Shutdown(reply) => {
                self.teardown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Capture { generation, event } => self.on_capture(generation, event).await,
            Event::CaptureClosed { generation } => {
                if self.is_current(generation, SessionState::Listening) {
                    debug!("Capture stream closed without a terminal event");
                    self.capture_open = false;
                    self.finalize_utterance();
                }
            }
            Event::Exchange { generation, result } => self.on_exchange(generation, result),
            Event::SpeechDone { generation, result } => self.on_speech_done(generation, result),
            Event::SettleElapsed { generation } => {
                if self.is_current(generation, SessionState::Speaking) {
                    self.task = None;
                    // Errors are surfaced in the snapshot by begin_listening
                    let _ = self.begin_listening().await;
                }
            }
            Event::SilenceElapsed { generation, mark } => {
                if self.is_current(generation, SessionState::Listening)
                    && mark == self.silence_mark
                    && self.pending.has_final()
                {
                    info!("Silence after speech, finalizing utterance");
                    self.close_capture().await;
                    self.finalize_utterance();
                }
            }
        }
    }

    fn is_current(&self, generation: u64, expected: SessionState) -> bool {
        if generation == self.generation && self.state == expected {
            return true;
        }
        debug!(
            "Discarding stale event (generation {} vs {}, state {})",
            generation, self.generation, self.state
        );
        false
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn start(&mut self) -> Result<(), SessionError> {
        if self.state.is_active() {
            info!("Restarting active session");
            self.teardown().await;
        }

        info!("Starting tutoring session: {}", self.config.session_id);

        if !self.unlocked {
            self.unlocked = true;
            if let Err(e) = self.synthesis.unlock().await {
                warn!("Failed to unlock {}: {}", self.synthesis.name(), e);
            }
        }

        self.transcript.clear();
        self.notice = None;
        self.started_at = Some(Utc::now());
        self.state = SessionState::Idle;
        self.acquire_wake_lock();

        self.begin_listening().await
    }

    async fn submit_text(&mut self, text: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Inactive => return Err(SessionError::NotActive),
            SessionState::AwaitingReply => return Err(SessionError::Busy(self.state)),
            _ => {}
        }

        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring blank typed utterance");
            return Ok(());
        }

        self.interrupt().await;
        self.transcript.append_user(text);
        self.request_reply();
        Ok(())
    }

    async fn listen(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Inactive => Err(SessionError::NotActive),
            SessionState::AwaitingReply => Err(SessionError::Busy(self.state)),
            SessionState::Listening => Ok(()),
            SessionState::Idle => {
                self.interrupt().await;
                self.begin_listening().await
            }
            SessionState::Speaking => {
                // Capture starts once the cut-off playback has died away
                self.interrupt().await;
                self.schedule_settle();
                Ok(())
            }
        }
    }

    async fn finish_utterance(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Inactive => Err(SessionError::NotActive),
            SessionState::Listening => {
                // The adapter still delivers its single finalization event
                self.capture.stop().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn retry(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Inactive => return Err(SessionError::NotActive),
            SessionState::Idle => {}
            state => return Err(SessionError::Busy(state)),
        }

        let last_is_user = self.transcript.last().is_some_and(|turn| turn.is_user());
        if !self.retry_pending || !last_is_user {
            return Err(SessionError::NothingToRetry);
        }

        info!("Retrying tutor exchange");
        self.request_reply();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Start a fresh capture instance. Never called while playback runs.
    async fn begin_listening(&mut self) -> Result<(), SessionError> {
        self.close_capture().await;
        self.pending.clear();

        let generation = self.next_generation();

        match self.capture.start().await {
            Ok(rx) => {
                debug!("Capture started on {} (generation {})", self.capture.name(), generation);
                self.capture_open = true;
                self.forwarder = Some(tokio::spawn(forward_capture(
                    rx,
                    generation,
                    self.events_tx.clone(),
                )));
                self.set_state(SessionState::Listening);
                Ok(())
            }
            Err(e) => {
                let err = SessionError::from(e);
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn on_capture(&mut self, generation: u64, event: CaptureEvent) {
        if !self.is_current(generation, SessionState::Listening) {
            return;
        }

        match event {
            CaptureEvent::Interim(text) => {
                self.pending.set_interim(&text);
                self.arm_silence_timer();
                self.publish();
            }
            CaptureEvent::Final(text) => {
                self.pending.push_final(&text);
                self.arm_silence_timer();
                self.publish();
            }
            CaptureEvent::EndOfSpeech => {
                self.capture_open = false;
                self.finalize_utterance();
            }
            CaptureEvent::NoSpeech => {
                self.capture_open = false;
                info!("Capture ended without speech");
                self.pending.clear();
                self.notice = Some(SessionNotice::from(&SessionError::Capture(CaptureError::NoSpeech)));
                self.set_state(SessionState::Idle);
            }
            CaptureEvent::Error(e) => {
                self.capture_open = false;
                self.fail(&SessionError::from(e)).await;
            }
        }
    }

    /// Commit the finalized utterance and hand it to the tutor
    fn finalize_utterance(&mut self) {
        self.cancel_silence_timer();
        self.forwarder = None;

        let text = self.pending.take_final();
        if text.is_empty() {
            debug!("Empty utterance, waiting for the user");
            self.set_state(SessionState::Idle);
            return;
        }

        info!("User said: {}", text);
        self.transcript.append_user(text);
        self.request_reply();
    }

    fn arm_silence_timer(&mut self) {
        let EndpointPolicy::SilenceDebounce(quiet) = self.config.endpoint else {
            return;
        };

        self.cancel_silence_timer();
        self.silence_mark += 1;

        let generation = self.generation;
        let mark = self.silence_mark;
        let events = self.events_tx.clone();

        self.silence_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = events.send(Event::SilenceElapsed { generation, mark });
        }));
    }

    fn cancel_silence_timer(&mut self) {
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
    }

    /// Stop the outstanding capture instance, if any
    async fn close_capture(&mut self) {
        self.cancel_silence_timer();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if self.capture_open {
            self.capture_open = false;
            self.capture.stop().await;
        }
    }

    // ------------------------------------------------------------------
    // Exchange and playback
    // ------------------------------------------------------------------

    /// Send the last (user) turn to the tutor
    fn request_reply(&mut self) {
        let index = self.transcript.len().saturating_sub(1);
        let history = self
            .transcript
            .window_before(index, self.config.history_window)
            .to_vec();
        let utterance = match self.transcript.last() {
            Some(turn) => turn.text.clone(),
            None => return,
        };

        let generation = self.next_generation();
        let tutor = Arc::clone(&self.tutor);
        let timeout = self.config.reply_timeout;
        let events = self.events_tx.clone();

        self.retry_pending = false;
        self.notice = None;

        self.task = Some(tokio::spawn(async move {
            let exchange = tutor.exchange(&history, &utterance);
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .unwrap_or(Err(ExchangeError::Timeout(limit))),
                None => exchange.await,
            };
            let _ = events.send(Event::Exchange { generation, result });
        }));

        self.set_state(SessionState::AwaitingReply);
    }

    fn on_exchange(&mut self, generation: u64, result: Result<TutorReply, ExchangeError>) {
        if !self.is_current(generation, SessionState::AwaitingReply) {
            return;
        }
        self.task = None;

        match result {
            Ok(reply) => {
                // Committed before playback so nothing already said is lost
                self.transcript
                    .append_tutor(reply.reply.clone(), reply.correction);
                self.start_speaking(reply.reply);
            }
            Err(e) => {
                warn!("Tutor exchange failed: {}", e);
                self.retry_pending = true;
                self.notice = Some(SessionNotice::from(&SessionError::Exchange(e)));
                self.set_state(SessionState::Idle);
            }
        }
    }

    fn start_speaking(&mut self, text: String) {
        let generation = self.next_generation();
        let synthesis = Arc::clone(&self.synthesis);
        let events = self.events_tx.clone();

        // Publish first: observers see the tutor turn before audio starts
        self.set_state(SessionState::Speaking);

        self.task = Some(tokio::spawn(async move {
            let result = synthesis.speak(&text).await;
            let _ = events.send(Event::SpeechDone { generation, result });
        }));
    }

    fn on_speech_done(&mut self, generation: u64, result: Result<(), SynthesisError>) {
        if !self.is_current(generation, SessionState::Speaking) {
            return;
        }

        if let Err(e) = result {
            warn!("{} failed, continuing as if finished: {}", self.synthesis.name(), e);
        }

        self.schedule_settle();
    }

    /// Re-arm capture after `settle_delay`. The state stays `Speaking` until then.
    fn schedule_settle(&mut self) {
        let generation = self.next_generation();
        let settle = self.config.settle_delay;
        let events = self.events_tx.clone();

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let _ = events.send(Event::SettleElapsed { generation });
        }));
    }

    // ------------------------------------------------------------------
    // Cancellation and errors
    // ------------------------------------------------------------------

    /// Cut off playback or capture so the user can take the turn
    async fn interrupt(&mut self) {
        self.next_generation();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.state == SessionState::Speaking {
            self.synthesis.cancel().await;
        }
        self.close_capture().await;
        self.pending.clear();
    }

    /// Cancel everything and return to `Inactive`
    async fn teardown(&mut self) {
        self.interrupt().await;
        self.started_at = None;
        self.retry_pending = false;
        self.set_state(SessionState::Inactive);
    }

    async fn fail(&mut self, err: &SessionError) {
        self.notice = Some(SessionNotice::from(err));

        if err.is_fatal() {
            error!("Session ended: {}", err);
            // The notice survives teardown so observers can show it
            self.teardown().await;
        } else {
            warn!("Recoverable session error: {}", err);
            self.pending.clear();
            self.set_state(SessionState::Idle);
        }
    }

    // ------------------------------------------------------------------
    // State publication
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("Session {}: {} -> {}", self.config.session_id, self.state, state);
        }
        self.state = state;

        if state.is_active() {
            if !self.wake_lock.is_held() {
                self.acquire_wake_lock();
            }
        } else {
            self.wake_lock.release();
        }

        self.publish();
    }

    fn acquire_wake_lock(&self) {
        if let Err(e) = self.wake_lock.acquire() {
            warn!("Wake lock unavailable: {:#}", e);
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            started_at: self.started_at,
            transcript: self.transcript.turns().to_vec(),
            interim: self.pending.preview(),
            notice: self.notice.clone(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

/// Relay one capture instance's events into the driver inbox
async fn forward_capture(
    mut rx: mpsc::Receiver<CaptureEvent>,
    generation: u64,
    events: mpsc::UnboundedSender<Event>,
) {
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        if events.send(Event::Capture { generation, event }).is_err() || terminal {
            return;
        }
    }

    let _ = events.send(Event::CaptureClosed { generation });
}
