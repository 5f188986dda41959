/// Which side caused a failure. The HTTP layer maps this onto a 4xx or 5xx
/// status; the core only classifies, it never speaks HTTP itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Client,
    Server,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not decode the uploaded file as an image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("model '{0}' has not been loaded")]
    ModelNotFound(String),
    #[error("shape mismatch: feature vector has length {actual}, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("failed to load model archive {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    /// A decode failure or an unknown model name is the caller's mistake.
    /// A shape mismatch is not: it means the extractor and the loaded
    /// weights disagree, which is a deployment problem on our side.
    pub fn severity(&self) -> Severity {
        match self {
            Error::Decode(_) | Error::ModelNotFound(_) | Error::InvalidRequest(_) => {
                Severity::Client
            }
            Error::ShapeMismatch { .. } | Error::ModelLoad { .. } | Error::Unexpected(_) => {
                Severity::Server
            }
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
