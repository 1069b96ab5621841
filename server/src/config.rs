use shared::{CANVAS_HEIGHT, CANVAS_WIDTH, DEFAULT_MAX_FRAME_LEN};

/// Largest canvas the server will allocate, in cells
pub const MAX_CANVAS_CELLS: usize = 1 << 20;

/// Startup parameters for [`crate::network::Server`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub width: usize,
    pub height: usize,
    /// Connections beyond this many are sent a closed message and dropped
    pub max_clients: usize,
    /// Largest payload accepted from a client, in bytes
    pub max_frame_len: usize,
    /// Frames that may wait for one client before it is evicted
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            max_clients: 32,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            queue_capacity: 64,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "canvas must be at least 1x1, got {}x{}",
                self.width, self.height
            ));
        }
        match self.width.checked_mul(self.height) {
            Some(cells) if cells <= MAX_CANVAS_CELLS => {}
            _ => {
                return Err(format!(
                    "canvas {}x{} exceeds the limit of {} cells",
                    self.width, self.height, MAX_CANVAS_CELLS
                ))
            }
        }
        if self.max_clients == 0 {
            return Err("max_clients must be at least 1".to_string());
        }
        if self.max_frame_len == 0 {
            return Err("max_frame_len must be at least 1".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}
