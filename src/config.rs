use std::time::Duration;

/// Descriptor for a play-through stream
#[derive(Debug, Clone)]
pub struct StreamDesc {
    /// Sample rate shared by the capture and render sides
    pub sample_rate: u32,
    /// Number of audio channels (typically 2 for stereo)
    pub channels: u16,
    /// Frames requested per device callback on both the capture and render
    /// streams.
    pub block_size: usize,
    /// Target latency between capture and render. The render clock is
    /// anchored this far behind the freshest captured frame. Should cover
    /// at least one device block.
    pub latency: Duration,
}

impl Default for StreamDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            block_size: 256,
            latency: Duration::from_millis(20),
        }
    }
}

impl StreamDesc {
    /// Number of frames covering `duration` at this stream's sample rate,
    /// rounded up so the sized buffer never comes up short.
    pub fn frames_for(&self, duration: Duration) -> usize {
        let frames = duration.as_secs_f64() * self.sample_rate as f64;
        frames.ceil() as usize
    }

    /// Byte size of one channel's backing region for `frames` frames of
    /// sample type `T`.
    pub fn byte_size<T>(&self, frames: usize) -> usize {
        frames * std::mem::size_of::<T>()
    }

    /// Frames of latency the render clock trails the capture clock by.
    pub fn latency_frames(&self) -> usize {
        self.frames_for(self.latency)
    }

    /// Ring capacity for a device that delivers `device_buffer_frames` per
    /// callback: three device buffers, but never less than the configured
    /// latency plus one device buffer of headroom.
    pub fn ring_capacity(&self, device_buffer_frames: usize) -> usize {
        let three_buffers = device_buffer_frames * 3;
        three_buffers.max(self.latency_frames() + device_buffer_frames)
    }
}
