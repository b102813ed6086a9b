/// Immediate-mode configuration

/// Default minimum size of a new immediate buffer (4 MiB)
pub const DEFAULT_INTERNAL_BUFFER_SIZE: u64 = 4 * 1024 * 1024;

/// Buffer pool settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmediateConfig {
    /// Minimum size of every newly created buffer
    pub default_buffer_size: u64,
    /// Ceiling for the growth watermark; a single larger request still gets
    /// a buffer of its own size
    pub max_buffer_size: u64,
    /// Number of retired buffers kept before the oldest is freed
    pub max_retired_buffers: usize,
    /// Debug name given to every buffer
    pub debug_name: String,
}

impl Default for ImmediateConfig {
    fn default() -> Self {
        Self {
            default_buffer_size: DEFAULT_INTERNAL_BUFFER_SIZE,
            max_buffer_size: 64 * 1024 * 1024,
            max_retired_buffers: 4,
            debug_name: "Immediate".to_string(),
        }
    }
}
