use serde::{Deserialize, Serialize};

use crate::models::compression::CompressionState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub compression: CompressionState,
    /// Interactive update rate the reduction factor is tuned for, in
    /// frames per second. Zero disables image reduction.
    pub desired_update_rate: f64,
    /// When set, delivered frames are also dumped as PNG files there.
    pub save_dir: Option<String>,
    /// Run without the windowed viewer.
    pub headless: bool,
}

impl ClientConfig {
    pub fn new(name: String, address: String, port: u16) -> Self {
        Self {
            name,
            address,
            port,
            compression: CompressionState::default(),
            desired_update_rate: 10.0,
            save_dir: None,
            headless: false,
        }
    }
}
