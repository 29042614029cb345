use crate::input::MappedInput;
use crate::output::RawResult;

#[cfg(feature = "ort-backend")]
pub mod ort;
#[cfg(any(feature = "ort-backend", test))]
mod outputs;

/// Detection/segmentation model consumed by the processor.
pub trait DetectionModel {
    /// Runs inference on a batch, returning one result per input in order.
    fn forward(&mut self, inputs: &[MappedInput]) -> anyhow::Result<Vec<RawResult>>;
}
