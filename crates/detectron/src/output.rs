//! Per-image results produced by a [`DetectionModel`](crate::DetectionModel).
//!
//! Every sub-result and every attribute inside one is optional: which ones
//! exist depends on the model architecture (a plain detector has no masks,
//! a semantic segmentation model has no instances, and so on).

use ndarray::{Array1, Array2, Array3};

/// Axis-aligned boxes, one `[x1, y1, x2, y2]` row per detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Boxes {
    pub tensor: Array2<f32>,
}

impl Boxes {
    pub fn new(tensor: Array2<f32>) -> Self {
        Self { tensor }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instances {
    pub pred_boxes: Option<Boxes>,
    pub scores: Option<Array1<f32>>,
    pub pred_classes: Option<Array1<i64>>,
    /// `[N, H, W]` per-instance masks.
    pub pred_masks: Option<Array3<bool>>,
    /// `[N, K, 3]` keypoints as `(x, y, score)`.
    pub pred_keypoints: Option<Array3<f32>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Proposals {
    pub proposal_boxes: Option<Boxes>,
    pub objectness_logits: Option<Array1<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub id: i64,
    pub isthing: bool,
    pub category_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanopticSegmentation {
    /// `[H, W]` map from pixel to segment id; 0 marks unlabeled pixels.
    pub label_map: Array2<i32>,
    pub segments: Vec<SegmentInfo>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub instances: Option<Instances>,
    /// `[C, H, W]` per-class scores.
    pub sem_seg: Option<Array3<f32>>,
    pub proposals: Option<Proposals>,
    pub panoptic_seg: Option<PanopticSegmentation>,
}
