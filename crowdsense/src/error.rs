/// Rejected configuration. Fatal: raised before the first frame is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A duration, distance or rate that must be strictly positive was not.
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("groups.min_people must be at least 1")]
    ZeroMinPeople,

    #[error("{field} must be an hour in 0..=23, got {value}")]
    InvalidHour { field: &'static str, value: u8 },

    #[error("{field} ({fade}) must not be shorter than the continuity window ({continuity})")]
    FadeShorterThanContinuity {
        field: &'static str,
        fade: f64,
        continuity: f64,
    },

    #[error("{field} must hold at least one frame")]
    WindowTooSmall { field: &'static str },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A single malformed detection. The detection is dropped; the frame goes on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("malformed box ({x1}, {y1}, {x2}, {y2})")]
    InvalidBox { x1: i32, y1: i32, x2: i32, y2: i32 },

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f32),
}

/// Errors from the multi-stream hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("invalid stream config: {0}")]
    Config(#[from] ConfigError),

    #[error("stream {0} is already open")]
    DuplicateStream(String),

    #[error("no stream named {0}")]
    UnknownStream(String),

    #[error("stream {0} has stopped")]
    StreamClosed(String),
}
