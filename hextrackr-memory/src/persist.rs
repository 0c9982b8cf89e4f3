//! Atomic JSON file persistence
//!
//! Every file the core writes goes through [`write_json_atomic`]: the value is
//! serialized into a sibling temp file, synced, then renamed over the target so
//! readers never observe a partial write.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path(path);
    {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// What a lenient read found on disk
#[derive(Debug, PartialEq)]
pub enum Loaded<T> {
    Missing,
    /// Present but unparseable; already logged
    Malformed,
    Parsed(T),
}

impl<T> Loaded<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Loaded::Parsed(value) => Some(value),
            Loaded::Missing | Loaded::Malformed => None,
        }
    }
}

/// Read a JSON file, reporting whether it was missing, malformed or parsed
///
/// Parse failures are logged at warn. Other IO errors (permissions, etc.)
/// are returned.
pub fn read_json_state<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_reader(std::io::BufReader::new(file)) {
        Ok(value) => Ok(Loaded::Parsed(value)),
        Err(e) => {
            log::warn!(
                "Ignoring malformed state in {}: {}. Starting empty.",
                path.display(),
                e
            );
            Ok(Loaded::Malformed)
        }
    }
}

/// Read a JSON file, degrading to `None` when it is missing or malformed
pub fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    Ok(read_json_state(path)?.into_option())
}
