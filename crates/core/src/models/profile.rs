//! Device profile - the locally persisted participant identity

use serde::{Deserialize, Serialize};

/// Per-device settings. Never synchronized to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Display name used when joining and incrementing
    pub participant_name: Option<String>,
    /// Vibrate on taps and on completion
    pub haptics_enabled: bool,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            participant_name: None,
            haptics_enabled: true,
        }
    }
}
