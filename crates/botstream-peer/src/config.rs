use std::time::Duration;

use botstream_frame::FrameConfig;

/// Default time to wait for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Peer behavior configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Outgoing chunk size and inbound frame limit.
    pub frame: FrameConfig,
    /// How long `send_request` waits for a response. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Unread bytes each incoming stream may buffer. `None` is unbounded.
    pub stream_buffer_limit: Option<usize>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            stream_buffer_limit: None,
        }
    }
}

impl PeerConfig {
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stream_buffer_limit(mut self, limit: Option<usize>) -> Self {
        self.stream_buffer_limit = limit;
        self
    }
}
