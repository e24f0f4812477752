use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Decomposition failed: {0}")]
    DecompositionFailure(String),
    #[error("Unsupported channel layout: {0}")]
    UnsupportedChannelLayout(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressionError {
    /// Short name of the failure kind, as reported by the entry point.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::ShapeMismatch(_) => "ShapeMismatch",
            Self::DecompositionFailure(_) => "DecompositionFailure",
            Self::UnsupportedChannelLayout(_) => "UnsupportedChannelLayout",
            Self::Image(_) => "Image",
            Self::Io(_) => "Io",
        }
    }
}
