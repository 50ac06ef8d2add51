use super::{ActiveSound, AudioOutput, CompletionCallback, PlaybackError};
use crate::{constants::BIT_DEPTH, decoder::AudioAsset};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc::{self, RecvTimeoutError},
};
use std::thread;

/// Output for hosts without a sound card.
///
/// Each asset is written to `<dir>/utterance-<n>.wav` and reported finished
/// once its duration has elapsed in real time, so speaking state behaves as
/// it would with a device.
pub struct WavOutput {
    dir: PathBuf,
    counter: AtomicU64,
}

impl WavOutput {
    pub fn create(dir: PathBuf) -> Result<Self, PlaybackError> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            PlaybackError::Unsupported(format!("cannot create {}: {e}", dir.display()))
        })?;

        info!("Writing speech audio to {}", dir.display());

        Ok(Self {
            dir,
            counter: AtomicU64::new(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

pub fn write_wav(path: &Path, asset: &AudioAsset) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: asset.channel_count(),
        sample_rate: asset.sample_rate(),
        bits_per_sample: BIT_DEPTH,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for sample in asset.interleaved() {
        let sample = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

impl AudioOutput for WavOutput {
    fn start(
        &self,
        asset: &AudioAsset,
        on_end: CompletionCallback,
    ) -> Result<Box<dyn ActiveSound>, PlaybackError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("utterance-{n}.wav"));

        write_wav(&path, asset)
            .map_err(|e| PlaybackError::Output(format!("{}: {e}", path.display())))?;

        debug!("Wrote {}", path.display());

        // Dropping the sender wakes the timer early, which counts as a stop
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let duration = asset.duration();

        thread::Builder::new()
            .name("voicechat-wav-timer".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(duration) {
                    on_end();
                }
            })
            .map_err(|e| PlaybackError::Output(format!("Failed to spawn playback timer: {e}")))?;

        Ok(Box::new(WavSound {
            stop_tx: Some(stop_tx),
        }))
    }
}

struct WavSound {
    stop_tx: Option<mpsc::Sender<()>>,
}

impl ActiveSound for WavSound {
    fn halt(&mut self) {
        self.stop_tx.take();
    }
}
