/// Result alias carrying [`ArcError`].
pub type Result<T> = std::result::Result<T, ArcError>;

/// Errors raised by the controller runtime.
///
/// Only [`ArcError::Configuration`] is fatal; it is produced while settings are
/// validated, before any service thread exists. Everything else is contained by
/// the component that produced it and logged.
#[derive(Debug, thiserror::Error)]
pub enum ArcError {
    /// The device went away. The mode state machine moves to `Disconnected`.
    #[error("device disconnected")]
    DeviceDisconnected,

    /// A style strategy produced an unusable result for one ring. The ring keeps
    /// its last good value for the rest of the tick.
    #[error("strategy failed on layer {layer} ring {ring}: {reason}")]
    StrategyComputation {
        layer: usize,
        ring: usize,
        reason: String,
    },

    /// An output sink rejected a write.
    #[error("{sink} sink write failed: {reason}")]
    SinkWrite { sink: &'static str, reason: String },

    /// Invalid settings: unknown style names, count mismatches, out of range
    /// MIDI numbers and so on.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A value write from the writer that does not currently own the ring.
    #[error("layer {layer} ring {ring} is not writable by this writer")]
    ExclusiveWrite { layer: usize, ring: usize },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ArcError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn sink<T: ToString>(sink: &'static str, reason: T) -> Self {
        Self::SinkWrite {
            sink,
            reason: reason.to_string(),
        }
    }
}
