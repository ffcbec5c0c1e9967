//! HTTP/2 connection settings sent in the client preface.

/// HTTP/2 SETTINGS and window sizes for the client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http2Settings {
    pub initial_stream_window_size: u32,
    pub initial_connection_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
}

impl Default for Http2Settings {
    fn default() -> Self {
        // Chrome defaults; the connection window matches Chrome's
        // 15663105-byte WINDOW_UPDATE on top of the initial 65535.
        Self {
            initial_stream_window_size: 6291456,
            initial_connection_window_size: 15728640,
            max_frame_size: 16384,
            max_header_list_size: 262144,
        }
    }
}
