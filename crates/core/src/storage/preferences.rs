//! Device profile persistence
//!
//! Stores the local participant name and haptics preference so they
//! survive across sessions and across joining different counters.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::parse::OptionalExt;
use crate::error::Result;
use crate::models::DeviceProfile;

/// Profile store (single row keyed by id = 1)
pub struct ProfileStore<'a> {
    conn: &'a Connection,
}

impl<'a> ProfileStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Save the device profile
    pub fn save(&self, profile: &DeviceProfile) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO device_profile (id, participant_name, haptics_enabled, updated_at)
             VALUES (1, ?1, ?2, ?3)",
            params![
                profile.participant_name,
                profile.haptics_enabled as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load the device profile, falling back to defaults
    pub fn load(&self) -> Result<DeviceProfile> {
        let profile = self
            .conn
            .query_row(
                "SELECT participant_name, haptics_enabled FROM device_profile WHERE id = 1",
                [],
                |row| {
                    Ok(DeviceProfile {
                        participant_name: row.get(0)?,
                        haptics_enabled: row.get::<_, i32>(1)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(profile.unwrap_or_default())
    }

    /// Set the display name, trimmed
    pub fn set_name(&self, name: &str) -> Result<DeviceProfile> {
        let mut profile = self.load()?;
        profile.participant_name = Some(name.trim().to_string());
        self.save(&profile)?;
        Ok(profile)
    }

    /// Toggle haptic feedback
    pub fn set_haptics(&self, enabled: bool) -> Result<DeviceProfile> {
        let mut profile = self.load()?;
        profile.haptics_enabled = enabled;
        self.save(&profile)?;
        Ok(profile)
    }
}
