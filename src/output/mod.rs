//! Playback of decoded audio through a single shared output.
//!
//! The [`PlaybackEngine`] lazily opens one [`AudioOutput`] on first use and
//! keeps it for the rest of the process. Every started sound is represented
//! by a [`PlaybackHandle`] carrying a single-fire completion token: whichever
//! of natural end or explicit stop disarms the token first decides which path
//! runs, the other is suppressed.

pub mod device;
pub mod wav;

use crate::decoder::AudioAsset;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Callback invoked by an output once a sound has played to its end.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opens the output context on first use.
pub type OutputFactory = Box<dyn Fn() -> Result<Arc<dyn AudioOutput>, PlaybackError> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Audio output is not supported on this host: {0}")]
    Unsupported(String),

    #[error("Audio output failed: {0}")]
    Output(String),

    #[error("Audio cannot be played: {0}")]
    InvalidAsset(String),
}

/// A physical (or simulated) audio sink able to play one asset at a time.
pub trait AudioOutput: Send + Sync {
    /// Start producing sound for `asset` immediately.
    ///
    /// `on_end` must be called once the asset has been played to its end. It
    /// may be called after [`ActiveSound::halt`]; the engine filters that out.
    fn start(
        &self,
        asset: &AudioAsset,
        on_end: CompletionCallback,
    ) -> Result<Box<dyn ActiveSound>, PlaybackError>;
}

/// Sound currently owned by an output.
pub trait ActiveSound: Send + Sync {
    /// Silence the sound and release its resources.
    fn halt(&mut self);
}

pub struct PlaybackEngine {
    factory: OutputFactory,
    output: Mutex<Option<Arc<dyn AudioOutput>>>,
    next_id: AtomicU64,
}

impl PlaybackEngine {
    pub fn new(factory: OutputFactory) -> Self {
        Self {
            factory,
            output: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Engine playing through the default audio device of the host
    pub fn device() -> Self {
        Self::new(Box::new(|| -> Result<Arc<dyn AudioOutput>, PlaybackError> {
            let output = device::DeviceOutput::open()?;
            Ok(Arc::new(output))
        }))
    }

    /// Engine writing every utterance as a WAV file into `dir`
    pub fn wav(dir: PathBuf) -> Self {
        Self::new(Box::new(move || -> Result<Arc<dyn AudioOutput>, PlaybackError> {
            let output = wav::WavOutput::create(dir.clone())?;
            Ok(Arc::new(output))
        }))
    }

    /// Engine around an already opened output
    pub fn with_output(output: Arc<dyn AudioOutput>) -> Self {
        Self::new(Box::new(
            move || -> Result<Arc<dyn AudioOutput>, PlaybackError> { Ok(output.clone()) },
        ))
    }

    fn output(&self) -> Result<Arc<dyn AudioOutput>, PlaybackError> {
        let mut slot = match self.output.lock() {
            Ok(slot) => slot,
            Err(e) => e.into_inner(),
        };

        if let Some(output) = slot.as_ref() {
            return Ok(output.clone());
        }

        // A failed open is not cached, the next utterance tries again
        let output = blocking(&self.factory)?;
        *slot = Some(output.clone());
        Ok(output)
    }

    /// Start playing `asset`. `on_complete` runs at most once, and only if the
    /// asset reaches its natural end before the returned handle is stopped.
    pub fn play<F>(&self, asset: &AudioAsset, on_complete: F) -> Result<PlaybackHandle, PlaybackError>
    where
        F: FnOnce() + Send + 'static,
    {
        if asset.channel_count() == 0 || asset.sample_rate() == 0 {
            return Err(PlaybackError::InvalidAsset(format!(
                "{} channels at {} Hz",
                asset.channel_count(),
                asset.sample_rate()
            )));
        }

        let output = self.output()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let armed = Arc::new(AtomicBool::new(true));

        let on_end: CompletionCallback = {
            let armed = armed.clone();
            Box::new(move || {
                if armed.swap(false, Ordering::SeqCst) {
                    debug!("Playback {id} reached its end");
                    on_complete();
                }
            })
        };

        let sound = output.start(asset, on_end)?;

        debug!(
            "Playback {id} started ({:.2}s at {} Hz)",
            asset.duration().as_secs_f64(),
            asset.sample_rate()
        );

        Ok(PlaybackHandle {
            id,
            armed,
            sound: Some(sound),
        })
    }

    /// Stop a handle. Safe to call on finished or already stopped handles.
    pub fn stop(&self, handle: &mut PlaybackHandle) {
        handle.stop();
    }
}

/// Runs `f`, which may block on the audio device, without starving the
/// other tasks of a multi-threaded runtime.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Live sound started by [`PlaybackEngine::play`].
pub struct PlaybackHandle {
    id: u64,
    armed: Arc<AtomicBool>,
    sound: Option<Box<dyn ActiveSound>>,
}

impl PlaybackHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the completion token has been used up, by natural end or stop
    pub fn is_finished(&self) -> bool {
        !self.armed.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        // Disarm before releasing so a concurrent natural end cannot fire
        let was_armed = self.armed.swap(false, Ordering::SeqCst);

        if let Some(mut sound) = self.sound.take() {
            sound.halt();
            if was_armed {
                debug!("Playback {} stopped", self.id);
            }
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
