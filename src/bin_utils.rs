use crate::codec;
use crate::cost::DatabaseEstimates;
use crate::error::PlanError;
use crate::plan::PlanTree;
use crate::schema::Catalog;
use log::LevelFilter;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ToolError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot tell the document format of {0} from its extension")]
    UnknownFormat(PathBuf),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Logger(#[from] fern::InitError),
}

/// On-disk encoding of a plan document, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    #[strum(serialize = "msgpack", serialize = "mp")]
    MsgPack,
}

impl DocumentFormat {
    pub fn of(path: &Path) -> Result<Self, ToolError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| Self::from_str(&ext.to_lowercase()).ok())
            .ok_or_else(|| ToolError::UnknownFormat(path.to_path_buf()))
    }
}

/// Logs to stderr as `[timestamp LEVEL target] message`. Each `-v` raises the level by one
/// step from `warn`.
pub fn setup_logger(verbosity: u8) -> Result<(), fern::InitError> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()?;
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>, ToolError> {
    fs::read(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_string(path: &Path) -> Result<String, ToolError> {
    fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_document(path: &Path) -> Result<PlanTree, ToolError> {
    let tree = match DocumentFormat::of(path)? {
        DocumentFormat::Json => codec::from_json_str(&read_string(path)?)?,
        DocumentFormat::MsgPack => codec::from_msgpack(&read(path)?)?,
    };
    Ok(tree)
}

pub fn write_document(tree: &PlanTree, path: &Path) -> Result<(), ToolError> {
    let bytes = match DocumentFormat::of(path)? {
        DocumentFormat::Json => serde_json::to_vec_pretty(&codec::to_document(tree)?)?,
        DocumentFormat::MsgPack => codec::to_msgpack(tree)?,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ToolError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON list of table schemas.
pub fn load_catalog(path: &Path) -> Result<Catalog, ToolError> {
    Ok(Catalog::from_json_str(&read_string(path)?)?)
}

/// Reads table statistics from JSON. Missing keys keep their defaults.
pub fn load_stats(path: &Path) -> Result<DatabaseEstimates, ToolError> {
    Ok(serde_json::from_str(&read_string(path)?)?)
}
