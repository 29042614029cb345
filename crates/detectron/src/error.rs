use thiserror::Error;

use crate::tensor::DType;

#[derive(Error, Debug)]
pub enum DetectronError {
    #[error("`image` is not in a recognized format: {kind}")]
    UnrecognizedImageFormat { kind: String },

    #[error("Model input has neither `file_name` nor `image`")]
    MissingImageSource,

    #[error("Image mapper failed: {0}")]
    Mapper(#[source] anyhow::Error),

    #[error("Model inference failed: {0}")]
    Model(#[source] anyhow::Error),

    #[error("Model returned {actual} results for {expected} images")]
    ResultCountMismatch { expected: usize, actual: usize },

    #[error("Panoptic segment {field} {value} does not fit in 32 bits")]
    SegmentIdOutOfRange { field: &'static str, value: i64 },

    #[error("Padding error: {message}")]
    Padding { message: String },

    #[error("Dtype mismatch: expected {expected}, got {actual}")]
    DtypeMismatch { expected: DType, actual: DType },

    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = DetectronError::UnrecognizedImageFormat {
            kind: "bytes".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`image` is not in a recognized format: bytes",
            "UnrecognizedImageFormat should name the problem"
        );

        let err = DetectronError::ResultCountMismatch {
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "Model returned 1 results for 2 images");

        let err = DetectronError::DtypeMismatch {
            expected: DType::I32,
            actual: DType::Bool,
        };
        assert_eq!(err.to_string(), "Dtype mismatch: expected int32, got bool");
    }

    #[test]
    fn test_collaborator_errors_keep_their_message() {
        let err = DetectronError::Mapper(anyhow::anyhow!("file not found"));
        assert_eq!(err.to_string(), "Image mapper failed: file not found");

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "file not found");
    }
}
