use common::span;

use crate::backend::DetectionModel;
use crate::error::DetectronError;
use crate::field::FieldRecord;
use crate::flatten::flatten_results;
use crate::input::{ImageDescriptor, MappedInput, to_model_input};
use crate::mapper::ImageMapper;

#[cfg(feature = "ort-backend")]
use crate::{
    backend::ort::OrtDetectionModel, config::ProcessorConfig, mapper::ResizeShortestEdgeMapper,
};

/// Runs images through a detection model and flattens the results into
/// [`FieldRecord`]s.
pub struct DetectronProcessor<M: ImageMapper, D: DetectionModel> {
    mapper: M,
    model: D,
}

#[cfg(feature = "ort-backend")]
impl DetectronProcessor<ResizeShortestEdgeMapper, OrtDetectionModel> {
    /// Builds the stock mapper and loads the ONNX model named by the config.
    pub fn from_config(config: &ProcessorConfig) -> Result<Self, DetectronError> {
        let mapper = ResizeShortestEdgeMapper::from_config(config);
        let model = OrtDetectionModel::from_config(config).map_err(DetectronError::Model)?;
        Ok(Self::new(mapper, model))
    }
}

impl<M: ImageMapper, D: DetectionModel> DetectronProcessor<M, D> {
    pub fn new(mapper: M, model: D) -> Self {
        Self { mapper, model }
    }

    pub fn model(&self) -> &D {
        &self.model
    }

    /// Processes a single image.
    pub fn process(
        &mut self,
        image: impl Into<ImageDescriptor>,
    ) -> Result<FieldRecord, DetectronError> {
        let mut records = self.process_batch(vec![image.into()])?;
        records.pop().ok_or(DetectronError::ResultCountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Processes a batch of images, returning one record per image in input
    /// order. Every image is normalized before the model runs, so a bad
    /// image fails the whole batch without running inference.
    pub fn process_batch(
        &mut self,
        images: Vec<ImageDescriptor>,
    ) -> Result<Vec<FieldRecord>, DetectronError> {
        let _s = span!("process_batch");

        if images.is_empty() {
            return Ok(Vec::new());
        }

        let expected = images.len();
        tracing::debug!(images = expected, "Normalizing model inputs");

        let inputs = images
            .into_iter()
            .map(|image| self.to_model_input(image))
            .collect::<Result<Vec<_>, _>>()?;

        let results = self.model.forward(&inputs).map_err(DetectronError::Model)?;
        if results.len() != expected {
            return Err(DetectronError::ResultCountMismatch {
                expected,
                actual: results.len(),
            });
        }

        flatten_results(results)
    }

    pub fn to_model_input(&self, image: ImageDescriptor) -> Result<MappedInput, DetectronError> {
        to_model_input(image, &self.mapper)
    }
}
