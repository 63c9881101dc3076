//! playthru — real-time microphone play-through built around a
//! timestamped lock-free ring buffer.
//!
//! The core is [`TimedRingBuffer`]: a fixed-capacity circular store of
//! audio frames addressed by absolute sample time, bridging a capture
//! callback and a render callback that run on independently scheduled
//! realtime threads. [`PlaythruEngine`] wires the two default cpal
//! devices through it.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ring_buffer;
pub mod stats;

pub use config::StreamDesc;
pub use engine::PlaythruEngine;
pub use error::PlaythruError;
pub use events::PlaythruEvent;
pub use ring_buffer::{
    FetchStatus, RingConsumer, RingProducer, SampleTime, StoreError, TimedRingBuffer, split,
};
pub use stats::{DropoutStats, StatsSnapshot};
