//! Small JSON state files written atomically (temp file in the same
//! directory, then rename over the target).

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Read a JSON file, or `T::default()` when it does not exist yet.
pub fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> anyhow::Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&data)?)
}

pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&serde_json::to_vec_pretty(value)?)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_and_empty_files_read_as_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let v: Vec<String> = read_or_default(&path).unwrap();
        assert!(v.is_empty());
        std::fs::write(&path, "  ").unwrap();
        let v: Vec<String> = read_or_default(&path).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn write_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        write_atomic(&path, &vec!["a", "b"]).unwrap();
        write_atomic(&path, &vec!["c"]).unwrap();
        let v: Vec<String> = read_or_default(&path).unwrap();
        assert_eq!(v, vec!["c".to_string()]);
    }
}
