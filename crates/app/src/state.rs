//! Application state management

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use directories::ProjectDirs;
use tasbih_core::service::normalize_name;
use tasbih_core::{Database, DeviceProfile, Error, Result};

use crate::agent::Identity;

/// Local device state: the profile database and where it lives
pub struct AppState {
    db: Mutex<Database>,
    data_dir: PathBuf,
}

impl AppState {
    pub fn new() -> Result<Self> {
        Self::open_at(Self::data_path()?)
    }

    /// Open (creating if needed) the state database under `data_dir`
    pub fn open_at(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db = Database::open(data_dir.join("tasbih.db"))?;

        Ok(Self {
            db: Mutex::new(db),
            data_dir,
        })
    }

    fn data_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "onyx", "tasbih").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;

        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&db)
    }

    pub fn profile(&self) -> Result<DeviceProfile> {
        self.with_db(|db| db.profile().load())
    }

    /// The identity to hand to a sync agent, if a name has been chosen
    pub fn identity(&self) -> Result<Option<Identity>> {
        let profile = self.profile()?;
        Ok(profile.participant_name.map(|name| Identity {
            name,
            haptics: profile.haptics_enabled,
        }))
    }

    /// Set the display name. Names are validated with the same rules the
    /// service applies.
    pub fn set_name(&self, name: &str) -> Result<DeviceProfile> {
        let name = normalize_name(name)?;
        self.with_db(|db| db.profile().set_name(name))
    }

    pub fn set_haptics(&self, enabled: bool) -> Result<DeviceProfile> {
        self.with_db(|db| db.profile().set_haptics(enabled))
    }
}
