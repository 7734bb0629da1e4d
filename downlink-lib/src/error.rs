use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to open input {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No module is registered with the requested id.
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// A declared parameter was given a value of the wrong kind.
    #[error("Invalid value for parameter {key}: {reason}")]
    Parameter { key: String, reason: String },

    /// A unit of instrument data did not have the length its layout requires.
    #[error("Malformed line; expected {expected} bytes, got {actual}")]
    MalformedLine { expected: usize, actual: usize },

    /// A composite referenced a channel the instrument does not have.
    #[error("No such channel: {0}")]
    Channel(usize),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Image shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Image encoding error: {0}")]
    Encoding(#[from] png::EncodingError),
}

pub type Result<T> = std::result::Result<T, Error>;
