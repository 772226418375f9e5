//! Playback control
//!
//! Owns the one "currently speaking" handle. It is either a decoded audio
//! node or the platform speech engine. Every request takes a ticket; a
//! handle is only installed, and only made audible, while its ticket is
//! still the newest one. Checking the ticket, silencing the previous
//! handle and starting the new one happen under a single lock, so two
//! utterances are never audible together and a stop can never be
//! overtaken by audio that was still decoding. Every start is paired with
//! exactly one end notification.

use crate::platform::Capabilities;
use crate::speech::backends::native::NativeSpeech;
use crate::speech::backends::{AudioPayload, Utterance};
use crate::{Result, VoxError};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How often a playing node is checked for completion
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Observer for speech lifecycle events (avatar animation, indicators)
pub trait SpeechListener: Send + Sync {
    fn on_speech_start(&self) {}
    fn on_speech_end(&self) {}
}

/// A decoded piece of audio, created paused
pub trait PlaybackNode: Send {
    /// Make the audio audible
    fn play(&self);

    /// Stop immediately; stopping twice is harmless
    fn stop(&self);

    /// Whether everything has been played
    fn is_finished(&self) -> bool;
}

/// Audio output device
pub trait AudioOutput: Send + Sync {
    /// Decode the payload into a paused node
    fn start(&self, audio: AudioPayload) -> Result<Box<dyn PlaybackNode>>;
}

/// Output through the default sound device via rodio.
///
/// The device is opened on first use and kept for the life of the process.
#[derive(Default)]
pub struct RodioOutput {
    mixer: OnceCell<Mixer>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn mixer(&self) -> Result<&Mixer> {
        self.mixer.get_or_try_init(open_device)
    }
}

/// Open the default output stream on a thread that keeps it alive
fn open_device() -> Result<Mixer> {
    debug!("Opening audio output device");
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("audio-output".to_string())
        .spawn(move || match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => {
                let _ = tx.send(Ok(stream.mixer().clone()));
                // Sound stops when the stream is dropped
                loop {
                    std::thread::park();
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
            }
        })?;

    let mixer = rx
        .recv()
        .map_err(|_| VoxError::Playback("Audio output thread exited".to_string()))?
        .map_err(|e| VoxError::Playback(format!("Failed to open audio output: {}", e)))?;
    info!("Audio output device opened");
    Ok(mixer)
}

struct SinkNode {
    sink: Sink,
}

impl PlaybackNode for SinkNode {
    fn play(&self) {
        self.sink.play();
    }

    fn stop(&self) {
        self.sink.stop();
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}

impl AudioOutput for RodioOutput {
    fn start(&self, audio: AudioPayload) -> Result<Box<dyn PlaybackNode>> {
        let mixer = self.mixer()?;
        let source = Decoder::new(Cursor::new(audio.into_bytes()))
            .map_err(|e| VoxError::Playback(format!("Failed to decode audio: {}", e)))?;

        let sink = Sink::connect_new(mixer);
        sink.pause();
        sink.append(source);
        Ok(Box::new(SinkNode { sink }))
    }
}

enum Active {
    Buffer(Box<dyn PlaybackNode>),
    /// Platform speech; notified when it is cancelled
    Native(Arc<Notify>),
}

struct Current {
    ticket: u64,
    active: Active,
}

#[derive(Default)]
struct Slot {
    /// Newest request ticket
    generation: u64,
    current: Option<Current>,
}

struct Shared {
    output: Arc<dyn AudioOutput>,
    native: Arc<dyn NativeSpeech>,
    capabilities: Capabilities,
    slot: Mutex<Slot>,
    listeners: Mutex<Vec<Arc<dyn SpeechListener>>>,
}

impl Shared {
    fn listeners(&self) -> Vec<Arc<dyn SpeechListener>> {
        self.listeners.lock().clone()
    }

    fn notify_start(&self) {
        for listener in self.listeners() {
            listener.on_speech_start();
        }
    }

    fn notify_end(&self) {
        for listener in self.listeners() {
            listener.on_speech_end();
        }
    }

    /// Silence a handle that has been taken out of the slot
    fn halt(&self, current: &Current) {
        debug!("Stopping playback {}", current.ticket);
        match &current.active {
            Active::Buffer(node) => node.stop(),
            Active::Native(cancelled) => {
                self.native.cancel();
                cancelled.notify_one();
            }
        }
    }

    /// Invalidate every outstanding ticket and silence the current handle
    fn advance(&self) -> u64 {
        let (ticket, previous) = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            let previous = slot.current.take();
            if let Some(previous) = &previous {
                self.halt(previous);
            }
            (slot.generation, previous)
        };
        if previous.is_some() {
            self.notify_end();
        }
        ticket
    }

    /// Install `active` for `ticket` and make it audible with `start`.
    ///
    /// Returns `Ok(false)` without starting anything if the ticket is stale.
    fn install(
        &self,
        ticket: u64,
        active: Active,
        start: impl FnOnce(&Active) -> Result<()>,
    ) -> Result<bool> {
        let mut slot = self.slot.lock();
        if slot.generation != ticket {
            if let Active::Buffer(node) = &active {
                node.stop();
            }
            return Ok(false);
        }

        let previous = slot.current.take();
        if let Some(previous) = &previous {
            self.halt(previous);
        }
        let started = start(&active);
        if started.is_ok() {
            slot.current = Some(Current { ticket, active });
        }
        drop(slot);

        if previous.is_some() {
            self.notify_end();
        }
        started?;
        self.notify_start();
        Ok(true)
    }

    /// Clear the handle if it is still `ticket`'s, announcing the end
    fn finish(&self, ticket: u64) -> bool {
        let finished = {
            let mut slot = self.slot.lock();
            match slot.current.as_ref() {
                Some(c) if c.ticket == ticket => slot.current.take(),
                _ => None,
            }
        };
        if finished.is_some() {
            self.notify_end();
            true
        } else {
            false
        }
    }

    /// `Some(done)` while `ticket` is current, `None` once it was replaced
    fn poll(&self, ticket: u64) -> Option<bool> {
        match self.slot.lock().current.as_ref() {
            Some(Current {
                ticket: current,
                active: Active::Buffer(node),
            }) if *current == ticket => Some(node.is_finished()),
            Some(Current { ticket: current, .. }) if *current == ticket => Some(false),
            _ => None,
        }
    }
}

/// Single owner of whatever is currently audible
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        native: Arc<dyn NativeSpeech>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                output,
                native,
                capabilities,
                slot: Mutex::new(Slot::default()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a lifecycle observer
    pub fn add_listener(&self, listener: Arc<dyn SpeechListener>) {
        self.shared.listeners.lock().push(listener);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.slot.lock().current.is_some()
    }

    /// Silence anything audible and claim a ticket for a new request
    pub fn begin_request(&self) -> u64 {
        self.shared.advance()
    }

    /// Whether no stop or newer request has happened since `ticket` was issued
    pub fn is_current(&self, ticket: u64) -> bool {
        self.shared.slot.lock().generation == ticket
    }

    /// Decode and play an audio payload for `ticket`.
    ///
    /// Dropped silently if the ticket went stale while decoding. Must be
    /// called from within a tokio runtime; completion is watched by a
    /// spawned task.
    pub fn play(&self, ticket: u64, audio: AudioPayload) -> Result<()> {
        debug!("Decoding {} bytes for request {}", audio.len(), ticket);
        let node = self.shared.output.start(audio)?;

        let installed = self.shared.install(ticket, Active::Buffer(node), |active| {
            if let Active::Buffer(node) = active {
                node.play();
            }
            Ok(())
        })?;
        if !installed {
            debug!("Request {} superseded during decode, not playing", ticket);
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                match shared.poll(ticket) {
                    Some(true) => {
                        debug!("Playback {} finished", ticket);
                        shared.finish(ticket);
                        break;
                    }
                    Some(false) => {}
                    None => break,
                }
            }
        });
        Ok(())
    }

    /// Speak through the platform engine for `ticket`, resolving when it is
    /// done or cancelled.
    ///
    /// Resolves immediately if the platform has no speech engine.
    pub async fn speak_native(&self, ticket: u64, utterance: &Utterance) {
        if !self.shared.capabilities.native_speech {
            warn!("Native speech not available, nothing to play");
            return;
        }

        let cancelled = Arc::new(Notify::new());
        let native = Arc::clone(&self.shared.native);
        let installed = self.shared.install(ticket, Active::Native(cancelled.clone()), |_| {
            native.start(utterance.text(), utterance.lang())
        });
        match installed {
            Ok(true) => {}
            Ok(false) => {
                debug!("Request {} superseded, not speaking", ticket);
                return;
            }
            Err(e) => {
                warn!("Native speech failed: {}", e);
                return;
            }
        }

        tokio::select! {
            biased;
            _ = cancelled.notified() => debug!("Native speech {} cancelled", ticket),
            _ = self.shared.native.finished() => {}
        }
        self.shared.finish(ticket);
    }

    /// Silence whatever is playing and invalidate outstanding tickets.
    /// Safe to call when idle.
    pub fn stop(&self) {
        self.shared.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Flags {
        playing: AtomicBool,
        stopped: AtomicBool,
        finished: AtomicBool,
    }

    struct FakeNode(Arc<Flags>);

    impl PlaybackNode for FakeNode {
        fn play(&self) {
            self.0.playing.store(true, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.0.playing.store(false, Ordering::SeqCst);
            self.0.stopped.store(true, Ordering::SeqCst);
        }

        fn is_finished(&self) -> bool {
            self.0.finished.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeOutput {
        decode_time: Duration,
        nodes: Mutex<Vec<Arc<Flags>>>,
    }

    impl AudioOutput for FakeOutput {
        fn start(&self, audio: AudioPayload) -> Result<Box<dyn PlaybackNode>> {
            if audio.is_empty() {
                return Err(VoxError::Playback("empty".to_string()));
            }
            std::thread::sleep(self.decode_time);
            let flags = Arc::new(Flags::default());
            self.nodes.lock().push(flags.clone());
            Ok(Box::new(FakeNode(flags)))
        }
    }

    #[derive(Default)]
    struct FakeNative {
        started: AtomicUsize,
        cancels: AtomicUsize,
    }

    #[async_trait]
    impl NativeSpeech for FakeNative {
        fn is_available(&self) -> bool {
            true
        }

        fn start(&self, _text: &str, _lang: &str) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn finished(&self) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<&'static str>>);

    impl SpeechListener for Events {
        fn on_speech_start(&self) {
            self.0.lock().push("start");
        }

        fn on_speech_end(&self) {
            self.0.lock().push("end");
        }
    }

    fn controller_with(
        output: FakeOutput,
    ) -> (PlaybackController, Arc<FakeOutput>, Arc<FakeNative>, Arc<Events>) {
        let output = Arc::new(output);
        let native = Arc::new(FakeNative::default());
        let events = Arc::new(Events::default());
        let controller = PlaybackController::new(
            output.clone(),
            native.clone(),
            Capabilities { native_speech: true },
        );
        controller.add_listener(events.clone());
        (controller, output, native, events)
    }

    fn controller() -> (PlaybackController, Arc<FakeOutput>, Arc<FakeNative>, Arc<Events>) {
        controller_with(FakeOutput::default())
    }

    fn audio() -> AudioPayload {
        AudioPayload::new(vec![1; 200])
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let (controller, _, native, events) = controller();
        controller.stop();
        controller.stop();
        assert!(!controller.is_playing());
        assert!(events.0.lock().is_empty());
        assert_eq!(native.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_new_request_stops_previous() {
        let (controller, output, _, events) = controller();
        let first = controller.begin_request();
        controller.play(first, audio()).unwrap();
        let second = controller.begin_request();
        controller.play(second, audio()).unwrap();

        let nodes = output.nodes.lock().clone();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].stopped.load(Ordering::SeqCst));
        assert!(nodes[1].playing.load(Ordering::SeqCst));
        assert_eq!(events.0.lock().clone(), vec!["start", "end", "start"]);
        assert!(controller.is_playing());
    }

    #[tokio::test]
    async fn test_stale_ticket_never_plays() {
        let (controller, output, _, events) = controller();
        let first = controller.begin_request();
        let second = controller.begin_request();
        assert!(!controller.is_current(first));
        assert!(controller.is_current(second));

        controller.play(first, audio()).unwrap();

        let nodes = output.nodes.lock().clone();
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].playing.load(Ordering::SeqCst));
        assert!(!controller.is_playing());
        assert!(events.0.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_during_decode_keeps_silence() {
        let (controller, output, _, events) = controller_with(FakeOutput {
            decode_time: Duration::from_millis(300),
            ..FakeOutput::default()
        });

        let ticket = controller.begin_request();
        let decoding = controller.clone();
        let task = tokio::task::spawn_blocking(move || decoding.play(ticket, audio()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.stop();
        task.await.unwrap().unwrap();

        assert!(!controller.is_playing());
        let nodes = output.nodes.lock().clone();
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].playing.load(Ordering::SeqCst));
        assert!(events.0.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_requests_never_overlap_audio() {
        let (controller, output, _, events) = controller_with(FakeOutput {
            decode_time: Duration::from_millis(200),
            ..FakeOutput::default()
        });

        let first = controller.begin_request();
        let slow = controller.clone();
        let task = tokio::task::spawn_blocking(move || slow.play(first, audio()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = controller.begin_request();
        let fast = controller.clone();
        tokio::task::spawn_blocking(move || fast.play(second, audio()))
            .await
            .unwrap()
            .unwrap();
        task.await.unwrap().unwrap();

        let playing = output
            .nodes
            .lock()
            .iter()
            .filter(|n| n.playing.load(Ordering::SeqCst))
            .count();
        assert_eq!(playing, 1);
        assert_eq!(events.0.lock().clone(), vec!["start"]);
    }

    #[tokio::test]
    async fn test_completion_clears_handle() {
        let (controller, output, _, events) = controller();
        let ticket = controller.begin_request();
        controller.play(ticket, audio()).unwrap();
        output.nodes.lock()[0].finished.store(true, Ordering::SeqCst);

        tokio::time::sleep(POLL_INTERVAL * 4).await;
        assert!(!controller.is_playing());
        assert_eq!(events.0.lock().clone(), vec!["start", "end"]);
    }

    #[tokio::test]
    async fn test_decode_failure_leaves_idle() {
        let (controller, _, _, events) = controller();
        let ticket = controller.begin_request();
        assert!(controller.play(ticket, AudioPayload::new(Vec::new())).is_err());
        assert!(!controller.is_playing());
        assert!(events.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_native_speech_pairs_start_and_end() {
        let (controller, _, native, events) = controller();
        let ticket = controller.begin_request();
        controller
            .speak_native(ticket, &Utterance::new("Peace", "en"))
            .await;
        assert!(!controller.is_playing());
        assert_eq!(native.started.load(Ordering::SeqCst), 1);
        assert_eq!(events.0.lock().clone(), vec!["start", "end"]);
    }

    #[tokio::test]
    async fn test_stale_ticket_never_speaks() {
        let (controller, _, native, _) = controller();
        let ticket = controller.begin_request();
        controller.stop();
        controller
            .speak_native(ticket, &Utterance::new("Peace", "en"))
            .await;
        assert_eq!(native.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_cancels_native() {
        let (controller, _, native, events) = controller();
        let ticket = controller.begin_request();
        let speaking = controller.clone();
        let task = tokio::spawn(async move {
            speaking
                .speak_native(ticket, &Utterance::new("Peace", "en"))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.stop();
        task.await.unwrap();

        assert_eq!(native.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(events.0.lock().clone(), vec!["start", "end"]);
    }
}
