//! Shared test utilities
//!
//! Scripted fakes for every session collaborator plus a harness that wires
//! them into a running controller.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use loqa_tutor::capture::{CaptureAdapter, CaptureEvent};
use loqa_tutor::error::{CaptureError, ExchangeError, SynthesisError};
use loqa_tutor::session::{Collaborators, SessionConfig, SessionController, SessionSnapshot};
use loqa_tutor::synthesis::SynthesisAdapter;
use loqa_tutor::transcript::{Correction, Turn};
use loqa_tutor::tutor::{TutorClient, TutorReply};
use loqa_tutor::wakelock::WakeLock;
use tokio::sync::{mpsc, watch, Notify};

/// What the next `start()` call produces
pub enum CaptureScript {
    /// Start succeeds and these events are queued immediately
    Events(Vec<CaptureEvent>),
    /// Start fails
    Fail(CaptureError),
}

/// Capture adapter driven by scripts and `emit`
pub struct FakeCapture {
    scripts: Mutex<VecDeque<CaptureScript>>,
    current: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
    /// Senders of every started instance, kept only after `retain_instances`
    retained: Mutex<Vec<mpsc::Sender<CaptureEvent>>>,
    retain: AtomicBool,
    speaking: Arc<AtomicBool>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    /// Starts issued while synthesis was still playing
    pub overlaps: AtomicUsize,
}

impl FakeCapture {
    fn new(speaking: Arc<AtomicBool>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            retained: Mutex::new(Vec::new()),
            retain: AtomicBool::new(false),
            speaking,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, script: CaptureScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Say an utterance on the next capture instance
    pub fn script_utterance(&self, text: &str) {
        self.script(CaptureScript::Events(vec![
            CaptureEvent::Interim(text.to_string()),
            CaptureEvent::Final(text.to_string()),
            CaptureEvent::EndOfSpeech,
        ]));
    }

    /// Push an event into the running capture instance
    pub fn emit(&self, event: CaptureEvent) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Keep each instance's sender alive after it is stopped, like an engine
    /// that keeps emitting after being told to stop
    pub fn retain_instances(&self) {
        self.retain.store(true, Ordering::SeqCst);
    }

    /// Push an event into a retained instance, counting from zero
    pub fn emit_to(&self, instance: usize, event: CaptureEvent) -> bool {
        match self.retained.lock().unwrap().get(instance) {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CaptureAdapter for FakeCapture {
    async fn start(&self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.speaking.load(Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let script = self.scripts.lock().unwrap().pop_front();
        let events = match script {
            Some(CaptureScript::Fail(err)) => return Err(err),
            Some(CaptureScript::Events(events)) => events,
            None => Vec::new(),
        };

        let (tx, rx) = mpsc::channel(64);
        for event in events {
            tx.try_send(event).expect("fake capture channel full");
        }
        if self.retain.load(Ordering::SeqCst) {
            self.retained.lock().unwrap().push(tx.clone());
        }
        *self.current.lock().unwrap() = Some(tx);

        Ok(rx)
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender closes the instance's stream
        self.current.lock().unwrap().take();
    }

    fn name(&self) -> &str {
        "fake capture"
    }
}

/// Synthesis adapter that records what it was asked to say
pub struct FakeSynthesis {
    speaking: Arc<AtomicBool>,
    observer: Mutex<Option<watch::Receiver<SessionSnapshot>>>,
    hold: AtomicBool,
    fail: AtomicBool,
    release: Notify,
    pub spoken: Mutex<Vec<String>>,
    /// Last committed turn at the moment `speak` was called
    pub last_turn_at_speak: Mutex<Vec<Option<Turn>>>,
    pub cancels: AtomicUsize,
    pub unlocks: AtomicUsize,
}

struct SpeakingGuard<'a>(&'a AtomicBool);

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FakeSynthesis {
    fn new(speaking: Arc<AtomicBool>) -> Self {
        Self {
            speaking,
            observer: Mutex::new(None),
            hold: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            release: Notify::new(),
            spoken: Mutex::new(Vec::new()),
            last_turn_at_speak: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            unlocks: AtomicUsize::new(0),
        }
    }

    /// Keep playback running until `release` is called
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    pub fn fail_playback(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SynthesisAdapter for FakeSynthesis {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        let last_turn = self
            .observer
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|rx| rx.borrow().transcript.last().cloned());
        self.last_turn_at_speak.lock().unwrap().push(last_turn);
        self.spoken.lock().unwrap().push(text.to_string());

        self.speaking.store(true, Ordering::SeqCst);
        let _guard = SpeakingGuard(&self.speaking);

        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(SynthesisError::Failed("speaker unplugged".to_string()));
        }
        Ok(())
    }

    async fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
    }

    async fn unlock(&self) -> Result<(), SynthesisError> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake synthesis"
    }
}

/// Tutor with scripted replies
pub struct FakeTutor {
    replies: Mutex<VecDeque<Result<TutorReply, ExchangeError>>>,
    hold: AtomicBool,
    release: Notify,
    /// (history length, utterance) per call
    pub calls: Mutex<Vec<(usize, String)>>,
}

impl FakeTutor {
    fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            hold: AtomicBool::new(false),
            release: Notify::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(&self, reply: Result<TutorReply, ExchangeError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Keep the exchange pending until `release` is called
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    pub fn calls(&self) -> Vec<(usize, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TutorClient for FakeTutor {
    async fn exchange(&self, history: &[Turn], utterance: &str) -> Result<TutorReply, ExchangeError> {
        self.calls
            .lock()
            .unwrap()
            .push((history.len(), utterance.to_string()));

        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }

        let scripted = self.replies.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(TutorReply::new("Tell me more.")))
    }
}

/// Wake lock that counts platform requests
///
/// Like the OS-backed lock, `acquire` is a no-op while the lock is held,
/// so a revocation the lock never heard about is only repaired by
/// `reacquire`.
#[derive(Default)]
pub struct FakeWakeLock {
    held: AtomicBool,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
}

impl FakeWakeLock {
    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl WakeLock for FakeWakeLock {
    fn acquire(&self) -> Result<()> {
        if !self.held.swap(true, Ordering::SeqCst) {
            self.acquires.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// Controller wired to fakes
pub struct Harness {
    pub controller: SessionController,
    pub capture: Arc<FakeCapture>,
    pub synthesis: Arc<FakeSynthesis>,
    pub tutor: Arc<FakeTutor>,
    pub wake_lock: Arc<FakeWakeLock>,
    pub snapshots: watch::Receiver<SessionSnapshot>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let speaking = Arc::new(AtomicBool::new(false));
        let capture = Arc::new(FakeCapture::new(Arc::clone(&speaking)));
        let synthesis = Arc::new(FakeSynthesis::new(speaking));
        let tutor = Arc::new(FakeTutor::new());
        let wake_lock = Arc::new(FakeWakeLock::default());

        let controller = SessionController::spawn(
            config,
            Collaborators {
                capture: capture.clone(),
                synthesis: synthesis.clone(),
                tutor: tutor.clone(),
                wake_lock: wake_lock.clone(),
            },
        );

        let snapshots = controller.subscribe();
        *synthesis.observer.lock().unwrap() = Some(controller.subscribe());

        Self {
            controller,
            capture,
            synthesis,
            tutor,
            wake_lock,
            snapshots,
        }
    }

    /// Wait until a published snapshot satisfies `pred`
    pub async fn wait_for(&mut self, pred: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(2), self.snapshots.wait_for(pred))
            .await
            .expect("timed out waiting for session snapshot")
            .expect("session controller dropped")
            .clone()
    }
}

/// Short delays so the loop runs quickly under test
pub fn test_config() -> SessionConfig {
    SessionConfig {
        session_id: "tutor-test".to_string(),
        settle_delay: Duration::from_millis(10),
        reply_timeout: Some(Duration::from_secs(1)),
        ..SessionConfig::default()
    }
}

pub fn agreement_correction() -> Correction {
    Correction {
        original: "I are happy".to_string(),
        corrected: "I am happy".to_string(),
        explanation: "subject-verb agreement".to_string(),
    }
}

/// Let spawned tasks run without waiting on a particular state
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
