use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn read_json_array<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!("file not found: {}", path.display());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read: {}", path.display()));
        }
    };
    serde_json::from_slice(&bytes).with_context(|| format!("parse json array: {}", path.display()))
}

pub fn read_text(path: &Path) -> anyhow::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            anyhow::bail!("file not found: {}", path.display());
        }
        Err(err) => Err(err).with_context(|| format!("read: {}", path.display())),
    }
}

// Temp file plus rename: readers never see a half-written file.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let mut data = serde_json::to_vec_pretty(value).context("serialize json")?;
    data.push(b'\n');

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let mut file = std::fs::File::create(&tmp_path)
        .with_context(|| format!("create tmp: {}", tmp_path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    file.flush()
        .with_context(|| format!("flush tmp: {}", tmp_path.display()))?;
    drop(file);

    if let Err(err) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("rename tmp to final: {}", path.display()));
    }
    Ok(())
}
