//! Image descriptors accepted by the processor and their normalization into
//! model-ready inputs.

use ndarray::{Array, Dimension};
use std::path::{Path, PathBuf};

use crate::error::DetectronError;
use crate::mapper::ImageMapper;
use crate::tensor::Tensor;

/// Dictionary handed to the mapper. Holds a `file_name`, an `image`, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInput {
    pub file_name: Option<String>,
    pub image: Option<Tensor>,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

impl ModelInput {
    pub fn from_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Default::default()
        }
    }

    pub fn from_image(image: Tensor) -> Self {
        Self {
            image: Some(image),
            ..Default::default()
        }
    }
}

/// Model-ready input. Unlike [`ModelInput`] the image is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedInput {
    pub image: Tensor,
    pub file_name: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Payload wrapped by [`ImageWithSize`].
#[derive(Debug, Clone, PartialEq)]
pub enum SizedImage {
    FileName(String),
    Path(PathBuf),
    Tensor(Tensor),
    /// A payload the caller could not express as any of the above. Always
    /// rejected during normalization.
    Unrecognized { kind: String },
}

/// An image together with the output size the model should report
/// predictions at, as `(height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageWithSize {
    pub image: SizedImage,
    pub size: (u32, u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageDescriptor {
    WithSize(ImageWithSize),
    Tensor(Tensor),
    Dict(ModelInput),
    FileName(String),
    Path(PathBuf),
}

impl ImageDescriptor {
    /// First normalization stage: everything becomes a [`ModelInput`].
    pub fn into_model_input(self) -> Result<ModelInput, DetectronError> {
        match self {
            ImageDescriptor::WithSize(ImageWithSize { image, size }) => {
                let (height, width) = size;
                let mut input = ModelInput {
                    height: Some(height),
                    width: Some(width),
                    ..Default::default()
                };
                match image {
                    SizedImage::FileName(name) => input.file_name = Some(name),
                    SizedImage::Path(path) => input.file_name = Some(path_to_string(&path)),
                    SizedImage::Tensor(tensor) => input.image = Some(tensor),
                    SizedImage::Unrecognized { kind } => {
                        return Err(DetectronError::UnrecognizedImageFormat { kind });
                    }
                }
                Ok(input)
            }
            ImageDescriptor::Tensor(tensor) => Ok(ModelInput::from_image(tensor)),
            ImageDescriptor::Dict(input) => Ok(input),
            ImageDescriptor::FileName(name) => Ok(ModelInput::from_file_name(name)),
            ImageDescriptor::Path(path) => Ok(ModelInput::from_file_name(path_to_string(&path))),
        }
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Converts a descriptor into a model-ready input, running the mapper when
/// the image still has to be read and preprocessed.
pub fn to_model_input<M: ImageMapper + ?Sized>(
    descriptor: ImageDescriptor,
    mapper: &M,
) -> Result<MappedInput, DetectronError> {
    let input = descriptor.into_model_input()?;

    match input.image {
        Some(image) => Ok(MappedInput {
            image,
            file_name: input.file_name,
            height: input.height,
            width: input.width,
        }),
        None => mapper.map(input).map_err(DetectronError::Mapper),
    }
}

impl From<ImageWithSize> for ImageDescriptor {
    fn from(value: ImageWithSize) -> Self {
        ImageDescriptor::WithSize(value)
    }
}

impl From<Tensor> for ImageDescriptor {
    fn from(value: Tensor) -> Self {
        ImageDescriptor::Tensor(value)
    }
}

impl<T, D> From<Array<T, D>> for ImageDescriptor
where
    D: Dimension,
    Tensor: From<Array<T, D>>,
{
    fn from(value: Array<T, D>) -> Self {
        ImageDescriptor::Tensor(value.into())
    }
}

impl From<ModelInput> for ImageDescriptor {
    fn from(value: ModelInput) -> Self {
        ImageDescriptor::Dict(value)
    }
}

impl From<String> for ImageDescriptor {
    fn from(value: String) -> Self {
        ImageDescriptor::FileName(value)
    }
}

impl From<&str> for ImageDescriptor {
    fn from(value: &str) -> Self {
        ImageDescriptor::FileName(value.to_string())
    }
}

impl From<PathBuf> for ImageDescriptor {
    fn from(value: PathBuf) -> Self {
        ImageDescriptor::Path(value)
    }
}

impl From<&Path> for ImageDescriptor {
    fn from(value: &Path) -> Self {
        ImageDescriptor::Path(value.to_path_buf())
    }
}
