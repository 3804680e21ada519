use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "whisperlock";
pub const APP_NAME: &str = "vault";

pub fn data_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("vault.db")
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

pub fn retry_registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join("retry-tasks.json")
}

pub fn cache_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("cache")
}
