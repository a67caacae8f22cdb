//! 错误类型

use std::path::PathBuf;

use thiserror::Error;

/// 目标检测库的统一错误
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("model type not set, call one of the set_model_type_as_* methods first")]
    ModelTypeNotSet,

    #[error("model path not set, call set_model_path() before load_model()")]
    ModelPathNotSet,

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("model not loaded, call load_model() before detecting objects")]
    ModelNotLoaded,

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: {0}")]
    UnexpectedOutput(String),

    #[error("invalid input image: {0}")]
    InvalidInput(String),

    #[error("invalid font file: {}", .0.display())]
    InvalidFont(PathBuf),

    #[error("unknown object class: {0}")]
    UnknownClass(String),

    #[error("image error on {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DetectionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;
