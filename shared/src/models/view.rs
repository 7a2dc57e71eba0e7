use serde::{Deserialize, Serialize};

/// Camera/view state broadcast in PreRender so every rank renders the same
/// view of its own data partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub camera_position: [f64; 3],
    pub camera_focal_point: [f64; 3],
    pub camera_view_up: [f64; 3],
    pub background: [f64; 3],
    pub desired_update_rate: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            camera_position: [0.0, 0.0, 10.0],
            camera_focal_point: [0.0, 0.0, 0.0],
            camera_view_up: [0.0, 1.0, 0.0],
            background: [0.0, 0.0, 0.0],
            desired_update_rate: 0.0,
        }
    }
}
