//! Event types for playthru

use crate::ring_buffer::SampleTime;

/// Events emitted by the engine over a bounded channel.
///
/// Dropout events come from the audio callbacks via `try_send`; if the
/// receiver falls behind, events are dropped while the counters in
/// [`DropoutStats`](crate::stats::DropoutStats) keep advancing.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaythruEvent {
    EngineStarted,
    EngineStopped,
    /// The render side requested frames that have not been captured yet.
    Underrun {
        frames: usize,
    },
    /// The render side requested frames already evicted by newer captures.
    Stale {
        frames: usize,
    },
    /// The capture side tried to re-write already-superseded time.
    StoreOutOfOrder {
        time: SampleTime,
    },
    EngineError {
        error: String,
    },
}

impl PlaythruEvent {
    /// True for events that indicate audible or logic trouble.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Underrun { .. }
                | Self::Stale { .. }
                | Self::StoreOutOfOrder { .. }
                | Self::EngineError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(!PlaythruEvent::EngineStarted.is_error());
        assert!(!PlaythruEvent::EngineStopped.is_error());
        assert!(PlaythruEvent::Underrun { frames: 64 }.is_error());
        assert!(PlaythruEvent::Stale { frames: 64 }.is_error());
        assert!(PlaythruEvent::StoreOutOfOrder { time: 0 }.is_error());
    }
}
