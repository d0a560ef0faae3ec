use crate::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

pub fn encode_snapshot<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode_snapshot<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Write a binary snapshot of `value` to `path`, creating parent dirs.
pub fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = encode_snapshot(value)?;
    fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "snapshot saved");
    Ok(())
}

pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let bytes = fs::read(path)?;
    let value = decode_snapshot(&bytes)?;
    info!(path = %path.display(), "snapshot loaded");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Demo {
        year: u32,
        values: Vec<f64>,
        name: String,
    }

    #[test]
    fn file_snapshot() {
        let path = std::env::temp_dir()
            .join(format!("destiny-snap-{}", std::process::id()))
            .join("s.bin");
        let demo = Demo {
            year: 10,
            values: vec![1.5, 2.5],
            name: "艾娃".into(),
        };
        save_snapshot(&path, &demo).unwrap();
        let back: Demo = load_snapshot(&path).unwrap();
        assert_eq!(back, demo);
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn truncated_snapshot_is_an_error() {
        let bytes = encode_snapshot(&Demo {
            year: 1,
            values: vec![1.0; 4],
            name: "x".into(),
        })
        .unwrap();
        let r: Result<Demo, _> = decode_snapshot(&bytes[..bytes.len() / 2]);
        assert!(matches!(r, Err(PersistenceError::Snapshot(_))));
    }
}
