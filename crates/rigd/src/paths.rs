//! Cross-platform application paths

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RigdError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, RigdError> {
        let data_dir = Self::get_data_dir()?;

        // Ensure directory exists
        fs::create_dir_all(&data_dir).map_err(|source| RigdError::DataDir {
            path: data_dir.clone(),
            source,
        })?;

        Ok(Self { data_dir })
    }

    fn get_data_dir() -> Result<PathBuf, RigdError> {
        let base = dirs::data_dir().ok_or(RigdError::NoDataDir)?;
        Ok(base.join("taskrig"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("rig.json")
    }
}
