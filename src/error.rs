//! Error type shared by every stage of the movement-discovery pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the library.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent configuration. Always fatal, raised before any computation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A feature field referenced a reference point other than `e`, `s` or `m`.
    #[error("unknown reference point code {0:?}; expected one of 'e', 's', 'm'")]
    UnknownReferencePoint(char),

    /// A feature preset name could not be parsed.
    #[error("unknown feature preset {0:?}; expected Re, ReVe, ReVeRs or a combination of Re/Ve/Ae/Rs/Rm")]
    UnknownFeaturePreset(String),

    /// A classifier family name is not one of the supported variants.
    #[error("unknown classifier {0:?}; expected one of knn, svm, dt, mlp")]
    UnknownClassifier(String),

    /// Numeric input that an algorithm cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A table the stage depends on has not been produced yet.
    #[error("missing table {}", .0.display())]
    MissingTable(PathBuf),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

pub type Result<T> = std::result::Result<T, Error>;
