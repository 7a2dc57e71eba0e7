use serde::{Deserialize, Serialize};

pub const MAX_SQUIRT_LEVEL: u8 = 5;

/// SQUIRT settings negotiated by the client/server handshake and fixed for
/// the life of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionState {
    pub enabled: bool,
    level: u8,
}

impl CompressionState {
    pub fn new(enabled: bool, level: u8) -> Self {
        Self {
            enabled,
            level: level.min(MAX_SQUIRT_LEVEL),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(MAX_SQUIRT_LEVEL);
    }

    /// Clamps whatever a peer sent into the supported range.
    pub fn clamped(self) -> Self {
        Self::new(self.enabled, self.level)
    }
}

impl Default for CompressionState {
    fn default() -> Self {
        Self {
            enabled: false,
            level: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_clamped_to_supported_range() {
        let state = CompressionState::new(true, 9);
        assert_eq!(state.level(), MAX_SQUIRT_LEVEL);

        let mut state = CompressionState::default();
        state.set_level(3);
        assert_eq!(state.level(), 3);
    }
}
