//! Default audio device output via `rodio`.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so it is opened on a
//! dedicated thread that keeps it alive for the lifetime of the process. Only
//! the `Send + Sync` stream handle leaves that thread.

use super::{ActiveSound, AudioOutput, CompletionCallback, PlaybackError};
use crate::decoder::AudioAsset;
use rodio::{buffer::SamplesBuffer, OutputStream, OutputStreamHandle, Sink, StreamError};
use std::sync::{mpsc, Arc};
use std::thread;

pub struct DeviceOutput {
    handle: OutputStreamHandle,
}

impl DeviceOutput {
    pub fn open() -> Result<Self, PlaybackError> {
        let (init_tx, init_rx) = mpsc::channel::<Result<OutputStreamHandle, PlaybackError>>();

        thread::Builder::new()
            .name("voicechat-audio".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if init_tx.send(Ok(handle)).is_err() {
                        return;
                    }

                    // Output context lives as long as the process
                    let _stream = stream;
                    loop {
                        thread::park();
                    }
                }
                Err(e) => {
                    let _ = init_tx.send(Err(stream_error(e)));
                }
            })
            .map_err(|e| PlaybackError::Output(format!("Failed to spawn audio thread: {e}")))?;

        let handle = init_rx
            .recv()
            .map_err(|_| PlaybackError::Output("Audio thread exited during startup".into()))??;

        info!("Audio output initialized on default output device");

        Ok(Self { handle })
    }
}

fn stream_error(e: StreamError) -> PlaybackError {
    match e {
        StreamError::NoDevice => PlaybackError::Unsupported("no audio output device".into()),
        e => PlaybackError::Output(e.to_string()),
    }
}

impl AudioOutput for DeviceOutput {
    fn start(
        &self,
        asset: &AudioAsset,
        on_end: CompletionCallback,
    ) -> Result<Box<dyn ActiveSound>, PlaybackError> {
        let sink = Sink::try_new(&self.handle).map_err(|e| PlaybackError::Output(e.to_string()))?;

        sink.append(SamplesBuffer::new(
            asset.channel_count(),
            asset.sample_rate(),
            asset.interleaved(),
        ));

        let sink = Arc::new(sink);

        // sleep_until_end also returns once the sink is stopped, the engine
        // drops the callback in that case
        let watched = sink.clone();
        thread::Builder::new()
            .name("voicechat-playback".into())
            .spawn(move || {
                watched.sleep_until_end();
                on_end();
            })
            .map_err(|e| {
                sink.stop();
                PlaybackError::Output(format!("Failed to spawn playback watcher: {e}"))
            })?;

        Ok(Box::new(DeviceSound { sink }))
    }
}

struct DeviceSound {
    sink: Arc<Sink>,
}

impl ActiveSound for DeviceSound {
    fn halt(&mut self) {
        self.sink.stop();
    }
}
