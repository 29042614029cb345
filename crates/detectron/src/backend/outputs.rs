use ndarray::{Array3, ArrayD, Axis, Ix1, Ix2, Ix3};

use crate::output::{Boxes, Instances, PanopticSegmentation, Proposals, RawResult, SegmentInfo};

const MASK_THRESHOLD: f32 = 0.5;

/// Named outputs of one graph run. A field is `None` when the graph does not
/// expose that output.
#[derive(Debug, Default)]
pub(crate) struct GraphOutputs {
    pub pred_boxes: Option<ArrayD<f32>>,
    pub scores: Option<ArrayD<f32>>,
    pub pred_classes: Option<ArrayD<i64>>,
    /// `[N, H, W]` or `[N, 1, H, W]` mask probabilities.
    pub pred_masks: Option<ArrayD<f32>>,
    pub pred_keypoints: Option<ArrayD<f32>>,
    pub sem_seg: Option<ArrayD<f32>>,
    pub proposal_boxes: Option<ArrayD<f32>>,
    pub objectness_logits: Option<ArrayD<f32>>,
    pub panoptic_seg: Option<ArrayD<i32>>,
    /// Rows of `(id, isthing, category_id)`.
    pub segments_info: Option<ArrayD<i64>>,
}

impl GraphOutputs {
    /// Groups the outputs into a [`RawResult`]. A sub-result exists as soon
    /// as one of its outputs does. Outputs of the wrong rank are errors.
    pub fn into_result(self) -> anyhow::Result<RawResult> {
        let has_instances = self.pred_boxes.is_some()
            || self.scores.is_some()
            || self.pred_classes.is_some()
            || self.pred_masks.is_some()
            || self.pred_keypoints.is_some();
        let instances = if has_instances {
            Some(Instances {
                pred_boxes: self.pred_boxes.map(to_boxes).transpose()?,
                scores: self.scores.map(into_ix1).transpose()?,
                pred_classes: self.pred_classes.map(into_ix1).transpose()?,
                pred_masks: self.pred_masks.map(binarize_masks).transpose()?,
                pred_keypoints: self.pred_keypoints.map(into_ix3).transpose()?,
            })
        } else {
            None
        };

        let proposals = if self.proposal_boxes.is_some() || self.objectness_logits.is_some() {
            Some(Proposals {
                proposal_boxes: self.proposal_boxes.map(to_boxes).transpose()?,
                objectness_logits: self.objectness_logits.map(into_ix1).transpose()?,
            })
        } else {
            None
        };

        let panoptic_seg = match self.panoptic_seg {
            Some(label_map) => {
                let segments = self.segments_info.map(parse_segments).transpose()?;
                Some(PanopticSegmentation {
                    label_map: label_map.into_dimensionality::<Ix2>()?,
                    segments: segments.unwrap_or_default(),
                })
            }
            None => None,
        };

        Ok(RawResult {
            instances,
            sem_seg: self.sem_seg.map(into_ix3).transpose()?,
            proposals,
            panoptic_seg,
        })
    }
}

fn into_ix1<T>(array: ArrayD<T>) -> anyhow::Result<ndarray::Array1<T>> {
    Ok(array.into_dimensionality::<Ix1>()?)
}

fn into_ix3<T>(array: ArrayD<T>) -> anyhow::Result<Array3<T>> {
    Ok(array.into_dimensionality::<Ix3>()?)
}

fn to_boxes(array: ArrayD<f32>) -> anyhow::Result<Boxes> {
    Ok(Boxes::new(array.into_dimensionality::<Ix2>()?))
}

/// Accepts `[N, H, W]` or `[N, 1, H, W]` mask probabilities.
fn binarize_masks(array: ArrayD<f32>) -> anyhow::Result<Array3<bool>> {
    let array = if array.ndim() == 4 && array.shape()[1] == 1 {
        array.index_axis_move(Axis(1), 0)
    } else {
        array
    };
    Ok(array
        .into_dimensionality::<Ix3>()?
        .mapv(|p| p > MASK_THRESHOLD))
}

fn parse_segments(array: ArrayD<i64>) -> anyhow::Result<Vec<SegmentInfo>> {
    let rows = array.into_dimensionality::<Ix2>()?;
    if rows.ncols() != 3 {
        anyhow::bail!(
            "segments_info must have 3 columns (id, isthing, category_id), got {}",
            rows.ncols()
        );
    }
    Ok(rows
        .rows()
        .into_iter()
        .map(|row| SegmentInfo {
            id: row[0],
            isthing: row[1] != 0,
            category_id: row[2],
        })
        .collect())
}
