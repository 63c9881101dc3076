//! Play-through engine: default input device to default output device
//! through the timestamped ring buffer.
//!
//! The capture stream is the single producer, the render stream the single
//! consumer. Each keeps its own monotonic frame clock; the render clock is
//! anchored a fixed latency behind the freshest captured frame, which is
//! how the two independently scheduled callbacks stay aligned even as
//! their invocation cadences drift.

use crate::config::StreamDesc;
use crate::error::{PlaythruError, Result};
use crate::events::PlaythruEvent;
use crate::ring_buffer::{
    FetchStatus, RingConsumer, RingProducer, SampleTime, TimedRingBuffer, split,
};
use crate::stats::{DropoutStats, StatsSnapshot};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Capacity of the event channel. Callbacks publish with `try_send`; a
/// slow receiver loses events, never audio.
const EVENT_QUEUE_LEN: usize = 256;

/// Audio engine that wires a capture stream into a render stream.
pub struct PlaythruEngine {
    desc: StreamDesc,
    input_stream: Option<cpal::Stream>,
    output_stream: Option<cpal::Stream>,
    ring: Option<Arc<TimedRingBuffer<f32>>>,
    is_running: Arc<AtomicBool>,
    stats: Arc<DropoutStats>,
    event_tx: Sender<PlaythruEvent>,
    event_rx: Receiver<PlaythruEvent>,
}

impl PlaythruEngine {
    /// Create an engine with the given stream descriptor. No device is
    /// touched until [`start`](Self::start).
    pub fn new(desc: StreamDesc) -> Result<Self> {
        if desc.channels == 0 {
            return Err(PlaythruError::Configuration(
                "stream needs at least one channel".into(),
            ));
        }
        if desc.block_size == 0 {
            return Err(PlaythruError::Configuration(
                "block size must be non-zero".into(),
            ));
        }

        let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_QUEUE_LEN);
        Ok(Self {
            desc,
            input_stream: None,
            output_stream: None,
            ring: None,
            is_running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(DropoutStats::new()),
            event_tx,
            event_rx,
        })
    }

    /// Open the default input and output devices, allocate the ring buffer
    /// between them, and start both streams.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let input_device = host.default_input_device().ok_or_else(|| {
            PlaythruError::AudioDevice("no default input device available".into())
        })?;
        let output_device = host.default_output_device().ok_or_else(|| {
            PlaythruError::AudioDevice("no default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.desc.channels,
            sample_rate: cpal::SampleRate(self.desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.desc.block_size as u32),
        };

        // Ring buffer sized from the stream descriptor, shared between the
        // two callbacks through split producer/consumer handles.
        let capacity = self.desc.ring_capacity(self.desc.block_size);
        let ring = Arc::new(TimedRingBuffer::<f32>::allocate(
            self.desc.channels as usize,
            capacity,
        )?);
        let (producer, consumer) = split(ring.clone());

        let input_format = input_device
            .default_input_config()
            .map_err(|e| {
                PlaythruError::AudioDevice(format!("failed to get input config: {}", e))
            })?
            .sample_format();
        let output_format = output_device
            .default_output_config()
            .map_err(|e| {
                PlaythruError::AudioDevice(format!("failed to get output config: {}", e))
            })?
            .sample_format();

        let input_stream = match input_format {
            cpal::SampleFormat::F32 => {
                self.build_capture_stream::<f32>(&input_device, &config, producer)?
            }
            cpal::SampleFormat::I16 => {
                self.build_capture_stream::<i16>(&input_device, &config, producer)?
            }
            cpal::SampleFormat::U16 => {
                self.build_capture_stream::<u16>(&input_device, &config, producer)?
            }
            other => {
                return Err(PlaythruError::AudioFormat(format!(
                    "unsupported input sample format {:?}",
                    other
                )));
            }
        };

        let output_stream = match output_format {
            cpal::SampleFormat::F32 => {
                self.build_render_stream::<f32>(&output_device, &config, consumer)?
            }
            cpal::SampleFormat::I16 => {
                self.build_render_stream::<i16>(&output_device, &config, consumer)?
            }
            cpal::SampleFormat::U16 => {
                self.build_render_stream::<u16>(&output_device, &config, consumer)?
            }
            other => {
                return Err(PlaythruError::AudioFormat(format!(
                    "unsupported output sample format {:?}",
                    other
                )));
            }
        };

        input_stream.play().map_err(|e| {
            PlaythruError::AudioDevice(format!("failed to start capture stream: {}", e))
        })?;
        output_stream.play().map_err(|e| {
            PlaythruError::AudioDevice(format!("failed to start render stream: {}", e))
        })?;

        self.input_stream = Some(input_stream);
        self.output_stream = Some(output_stream);
        self.ring = Some(ring);
        self.is_running.store(true, Ordering::Relaxed);
        let _ = self.event_tx.try_send(PlaythruEvent::EngineStarted);
        log::debug!(
            "play-through started: {} Hz, {} ch, block {}, ring capacity {}",
            self.desc.sample_rate,
            self.desc.channels,
            self.desc.block_size,
            capacity
        );

        Ok(())
    }

    /// Stop both streams, then reset the ring buffer. The reset is safe
    /// because dropping the streams stops both callbacks first.
    pub fn stop(&mut self) -> Result<()> {
        if self.input_stream.is_none() && self.output_stream.is_none() {
            return Ok(());
        }

        self.is_running.store(false, Ordering::Relaxed);
        drop(self.input_stream.take());
        drop(self.output_stream.take());
        if let Some(ring) = self.ring.take() {
            ring.reset();
        }
        let _ = self.event_tx.try_send(PlaythruEvent::EngineStopped);
        log::debug!("play-through stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn desc(&self) -> &StreamDesc {
        &self.desc
    }

    /// Snapshot of the dropout and throughput counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Receiver for engine and dropout events. May be polled from any
    /// thread; cloning gives additional receivers on the same queue.
    pub fn events(&self) -> Receiver<PlaythruEvent> {
        self.event_rx.clone()
    }

    fn build_capture_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        producer: RingProducer<f32>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = self.desc.channels as usize;
        let is_running = self.is_running.clone();
        let stats = self.stats.clone();
        let event_tx = self.event_tx.clone();

        // Conversion scratch, allocated once. The capture clock is owned
        // by this callback alone; nothing else writes it.
        let mut scratch = vec![0.0f32; self.desc.block_size * channels];
        let mut capture_clock: SampleTime = 0;

        let stream = device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        return;
                    }

                    let frames = data.len() / channels;
                    if scratch.len() < data.len() {
                        // device delivered more than the configured block
                        scratch.resize(data.len(), 0.0);
                    }
                    for (dst, src) in scratch.iter_mut().zip(data.iter()) {
                        *dst = f32::from_sample(*src);
                    }

                    match producer.store_interleaved(&scratch, frames, capture_clock) {
                        Ok(()) => stats.add_captured(frames),
                        Err(err) => {
                            stats.record_rejected_store();
                            let _ = event_tx.try_send(PlaythruEvent::StoreOutOfOrder {
                                time: capture_clock,
                            });
                            log::warn!("capture store rejected: {}", err);
                        }
                    }
                    capture_clock += frames as i64;
                },
                move |err| {
                    log::error!("capture stream error: {}", err);
                },
                None,
            )
            .map_err(|e| {
                PlaythruError::AudioDevice(format!("failed to build capture stream: {}", e))
            })?;

        Ok(stream)
    }

    fn build_render_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        consumer: RingConsumer<f32>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.desc.channels as usize;
        let latency_frames = self.desc.latency_frames() as i64;
        let is_running = self.is_running.clone();
        let stats = self.stats.clone();
        let event_tx = self.event_tx.clone();

        let mut scratch = vec![0.0f32; self.desc.block_size * channels];
        // Anchored on the first callback that finds enough captured audio;
        // this is the capture-to-render sample time offset.
        let mut render_clock: Option<SampleTime> = None;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let silence = T::from_sample(0.0f32);
                    if !is_running.load(Ordering::Relaxed) {
                        data.fill(silence);
                        return;
                    }

                    let frames = data.len() / channels;
                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }

                    let clock = match render_clock {
                        Some(clock) => clock,
                        None => {
                            let (_, end) = consumer.time_bounds();
                            if end < latency_frames {
                                // not enough captured yet; keep silent
                                data.fill(silence);
                                return;
                            }
                            let anchor = end - latency_frames;
                            render_clock = Some(anchor);
                            anchor
                        }
                    };

                    let status =
                        consumer.fetch_interleaved(&mut scratch[..data.len()], frames, clock);
                    match status {
                        FetchStatus::Ok => {}
                        FetchStatus::PartialUnderrun => {
                            stats.record_underrun();
                            let _ =
                                event_tx.try_send(PlaythruEvent::Underrun { frames });
                        }
                        FetchStatus::PartialStale => {
                            stats.record_stale();
                            let _ = event_tx.try_send(PlaythruEvent::Stale { frames });
                        }
                    }

                    for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = T::from_sample(*src);
                    }
                    stats.add_rendered(frames);
                    render_clock = Some(clock + frames as i64);
                },
                move |err| {
                    log::error!("render stream error: {}", err);
                },
                None,
            )
            .map_err(|e| {
                PlaythruError::AudioDevice(format!("failed to build render stream: {}", e))
            })?;

        Ok(stream)
    }
}

impl Drop for PlaythruEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_does_not_touch_devices() {
        let engine = PlaythruEngine::new(StreamDesc::default()).unwrap();
        assert!(!engine.is_running());
        assert_eq!(engine.stats(), StatsSnapshot::default());
        assert_eq!(engine.desc().channels, 2);
    }

    #[test]
    fn rejects_degenerate_descriptors() {
        let no_channels = StreamDesc {
            channels: 0,
            ..Default::default()
        };
        assert!(PlaythruEngine::new(no_channels).is_err());

        let no_block = StreamDesc {
            block_size: 0,
            ..Default::default()
        };
        assert!(PlaythruEngine::new(no_block).is_err());
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        let mut engine = PlaythruEngine::new(StreamDesc::default()).unwrap();
        engine.stop().unwrap();
        assert!(!engine.is_running());
        assert!(engine.events().try_recv().is_err());
    }

    #[test]
    fn latency_covers_at_least_one_block() {
        let desc = StreamDesc {
            sample_rate: 48000,
            block_size: 256,
            latency: Duration::from_millis(20),
            ..Default::default()
        };
        assert!(desc.latency_frames() >= desc.block_size);
    }
}
