//! Failures while reading or writing a body's `config.ron`.

use std::io;
use std::path::{Path, PathBuf};

/// Every variant names the file or directory involved, so a bad override
/// directory shows up in the demo's fallback message.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config directory could not be created.
    #[error("cannot create config directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but is not valid RON for [`crate::Config`].
    #[error("invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("cannot encode config for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: ron::Error,
    },
}

impl ConfigError {
    /// The file or directory the failure relates to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::CreateDir { path, .. }
            | Self::Write { path, .. }
            | Self::Parse { path, .. }
            | Self::Serialize { path, .. } => path,
        }
    }
}
