use serde::{Deserialize, Serialize};

use crate::compositing::CompositeStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub width: u32,
    pub height: u32,
    /// Number of render ranks in the sort-last group.
    pub ranks: usize,
    /// Chosen once per session, never switched at runtime.
    pub strategy: CompositeStrategy,
    pub max_reduction_factor: u32,
}

impl ServerConfig {
    pub fn new(
        address: String,
        port: u16,
        width: u32,
        height: u32,
        ranks: usize,
        strategy: CompositeStrategy,
    ) -> Self {
        Self {
            address,
            port,
            width,
            height,
            ranks,
            strategy,
            max_reduction_factor: 16,
        }
    }
}
