pub mod backend;
pub mod config;
pub mod error;
pub mod field;
pub mod flatten;
pub mod input;
pub mod mapper;
pub mod output;
pub mod postprocess;
pub mod processor;
pub mod tensor;

// Re-export commonly used types for convenience
pub use backend::DetectionModel;
pub use config::{ExecutionProvider, InputFormat, ProcessorConfig};
pub use error::DetectronError;
pub use field::{FieldRecord, PaddingValue, TensorField, collate};
pub use input::{ImageDescriptor, ImageWithSize, MappedInput, ModelInput, SizedImage};
pub use mapper::{ImageMapper, ResizeShortestEdgeMapper};
pub use output::{Boxes, Instances, PanopticSegmentation, Proposals, RawResult, SegmentInfo};
pub use postprocess::{RescaleParams, rescale_result};
pub use processor::DetectronProcessor;
pub use tensor::{DType, Tensor};
