//! # Dataset and Conflicts Files
//!
//! Pull and push are separable phases: the pulled [`Dataset`](crate::model::Dataset)
//! and the computed [`Conflicts`](crate::conflicts::Conflicts) can be written to
//! disk and loaded again by a later run. The document format is picked from the
//! file extension: `.toml`, `.yaml`/`.yml`, anything else is JSON.
//!
//! Files are created exclusively unless overwriting is forced, so an existing
//! file created between the pre-flight check and the write is still not
//! clobbered.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Document format of a dataset or conflicts file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    /// Pick the format from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => Format::Toml,
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Serialize `data` in the given format.
pub fn to_string<T: Serialize>(data: &T, format: Format) -> Result<String> {
    Ok(match format {
        Format::Json => {
            let mut out = serde_json::to_string_pretty(data)?;
            out.push('\n');
            out
        }
        Format::Yaml => serde_yaml::to_string(data)?,
        Format::Toml => {
            let mut value = serde_json::to_value(data)?;
            drop_nulls(&mut value);
            toml::to_string(&value)?
        }
    })
}

/// Remove null members of every object. TOML has no null, and a missing key
/// reads back as absent.
fn drop_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(drop_nulls),
        _ => {}
    }
}

/// Deserialize `content` in the given format.
pub fn from_str<T: DeserializeOwned>(content: &str, format: Format) -> Result<T> {
    Ok(match format {
        Format::Json => serde_json::from_str(content)?,
        Format::Yaml => serde_yaml::from_str(content)?,
        Format::Toml => toml::from_str(content)?,
    })
}

/// Load a document from `path`.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    from_str(&content, Format::from_path(path))
}

/// Fail early when `path` exists and may not be overwritten.
pub fn ensure_writable(path: &Path, force_overwrite: bool) -> Result<()> {
    if !force_overwrite && path.exists() {
        return Err(Error::FileExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Save `data` to `path`.
///
/// Without `force_overwrite` the file is created exclusively and an existing
/// file yields [`Error::FileExists`].
pub fn save<T: Serialize>(data: &T, path: &Path, force_overwrite: bool) -> Result<()> {
    let content = to_string(data, Format::from_path(path))?;

    let mut options = OpenOptions::new();
    options.write(true);
    if force_overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options.open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            Error::FileExists {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io(e)
        }
    })?;
    file.write_all(content.as_bytes())?;
    log::debug!("Saved {}", path.display());
    Ok(())
}
