use super::DetectionModel;
use super::outputs::GraphOutputs;
use crate::config::{ExecutionProvider, ProcessorConfig};
use crate::input::MappedInput;
use crate::output::RawResult;
use crate::postprocess::{RescaleParams, rescale_result};
use common::span_debug;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

/// Extracts an optional named output as an owned array of the given type.
macro_rules! extract {
    ($outputs:expr, $name:literal, $elem:ty) => {
        $outputs
            .get($name)
            .map(|value| value.try_extract_array::<$elem>().map(|a| a.into_owned()))
            .transpose()?
    };
}

/// Runs an exported Detectron graph through ONNX Runtime.
///
/// The graph takes a single CHW `image` input and may expose any subset of
/// the outputs `pred_boxes`, `scores`, `pred_classes`, `pred_masks`,
/// `pred_keypoints`, `sem_seg`, `proposal_boxes`, `objectness_logits`,
/// `panoptic_seg` and `segments_info`.
pub struct OrtDetectionModel {
    session: Session,
}

impl OrtDetectionModel {
    /// Load model with specified execution provider
    pub fn load(
        path: &str,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        #[allow(unused_mut)]
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)?
            .with_intra_threads(intra_threads)
            .map_err(ort::Error::<()>::from)?;

        match provider {
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder
                    .with_execution_providers([ort::ep::CUDA::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure()])
                    .map_err(ort::Error::<()>::from)?;
            }
            #[cfg(not(feature = "cuda"))]
            ExecutionProvider::Cuda => {
                anyhow::bail!(
                    "CUDA execution provider requested but the `cuda` feature is disabled"
                );
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path)?;

        tracing::info!("Model loaded from {}", path);
        Ok(Self { session })
    }

    pub fn from_config(config: &ProcessorConfig) -> anyhow::Result<Self> {
        Self::load(
            &config.weights_path,
            config.execution_provider,
            config.intra_threads,
        )
    }

    fn forward_one(&mut self, input: &MappedInput) -> anyhow::Result<RawResult> {
        let _s = span_debug!("forward_one");

        let image = input.image.to_f32();
        let outputs = self.session.run(ort::inputs![
            "image" => TensorRef::from_array_view(image.view())?
        ])?;

        let result = GraphOutputs {
            pred_boxes: extract!(outputs, "pred_boxes", f32),
            scores: extract!(outputs, "scores", f32),
            pred_classes: extract!(outputs, "pred_classes", i64),
            pred_masks: extract!(outputs, "pred_masks", f32),
            pred_keypoints: extract!(outputs, "pred_keypoints", f32),
            sem_seg: extract!(outputs, "sem_seg", f32),
            proposal_boxes: extract!(outputs, "proposal_boxes", f32),
            objectness_logits: extract!(outputs, "objectness_logits", f32),
            panoptic_seg: extract!(outputs, "panoptic_seg", i32),
            segments_info: extract!(outputs, "segments_info", i64),
        }
        .into_result()?;

        // The graph predicts in the mapped image's coordinates
        let params = RescaleParams::for_input(input)?;
        Ok(rescale_result(result, &params))
    }
}

impl DetectionModel for OrtDetectionModel {
    fn forward(&mut self, inputs: &[MappedInput]) -> anyhow::Result<Vec<RawResult>> {
        inputs.iter().map(|input| self.forward_one(input)).collect()
    }
}
