//! Rescaling of model results from the mapped image to the output size
//! requested on the [`MappedInput`].

use ndarray::{Array, Array3, Axis, RemoveAxis};

use crate::input::MappedInput;
use crate::output::{Boxes, Instances, PanopticSegmentation, Proposals, RawResult};

/// Size of the image the model ran on and the size predictions should be
/// reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescaleParams {
    pub input_height: usize,
    pub input_width: usize,
    pub output_height: usize,
    pub output_width: usize,
}

impl RescaleParams {
    /// Reads the CHW image size. A requested dimension that is not set
    /// falls back to the image's own.
    pub fn for_input(input: &MappedInput) -> anyhow::Result<Self> {
        let shape = input.image.shape();
        if shape.len() != 3 || shape[1] == 0 || shape[2] == 0 {
            anyhow::bail!("expected a non-empty CHW image, got shape {:?}", shape);
        }
        let (input_height, input_width) = (shape[1], shape[2]);

        Ok(Self {
            input_height,
            input_width,
            output_height: input.height.map_or(input_height, |h| h as usize),
            output_width: input.width.map_or(input_width, |w| w as usize),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.input_height == self.output_height && self.input_width == self.output_width
    }

    fn scale_x(&self) -> f32 {
        self.output_width as f32 / self.input_width as f32
    }

    fn scale_y(&self) -> f32 {
        self.output_height as f32 / self.input_height as f32
    }
}

/// Moves every prediction into the output size. Boxes and keypoints are
/// scaled, boxes are clipped to the output and instances or proposals whose
/// box collapses are dropped. Masks and panoptic label maps are resized with
/// nearest-neighbour sampling, semantic scores bilinearly.
pub fn rescale_result(result: RawResult, params: &RescaleParams) -> RawResult {
    if params.is_identity() {
        return result;
    }

    tracing::trace!(?params, "Rescaling model result");
    let out = (params.output_height, params.output_width);

    RawResult {
        instances: result.instances.map(|i| rescale_instances(i, params)),
        sem_seg: result.sem_seg.map(|s| resize_bilinear(&s, out)),
        proposals: result.proposals.map(|p| rescale_proposals(p, params)),
        panoptic_seg: result.panoptic_seg.map(|p| PanopticSegmentation {
            label_map: resize_nearest(&p.label_map.insert_axis(Axis(0)), out)
                .index_axis_move(Axis(0), 0),
            segments: p.segments,
        }),
    }
}

fn rescale_instances(instances: Instances, params: &RescaleParams) -> Instances {
    let out = (params.output_height, params.output_width);
    let pred_boxes = instances.pred_boxes.map(|b| scale_boxes(b, params));
    let keep = pred_boxes.as_ref().map(nonempty_rows);
    let keep = keep.as_deref();

    Instances {
        pred_boxes: pred_boxes.map(|b| Boxes::new(keep_rows(b.tensor, keep))),
        scores: instances.scores.map(|s| keep_rows(s, keep)),
        pred_classes: instances.pred_classes.map(|c| keep_rows(c, keep)),
        pred_masks: instances
            .pred_masks
            .map(|m| resize_nearest(&keep_rows(m, keep), out)),
        pred_keypoints: instances
            .pred_keypoints
            .map(|k| scale_keypoints(keep_rows(k, keep), params)),
    }
}

fn rescale_proposals(proposals: Proposals, params: &RescaleParams) -> Proposals {
    let proposal_boxes = proposals.proposal_boxes.map(|b| scale_boxes(b, params));
    let keep = proposal_boxes.as_ref().map(nonempty_rows);
    let keep = keep.as_deref();

    Proposals {
        proposal_boxes: proposal_boxes.map(|b| Boxes::new(keep_rows(b.tensor, keep))),
        objectness_logits: proposals.objectness_logits.map(|l| keep_rows(l, keep)),
    }
}

/// Scales `[x1, y1, x2, y2]` rows and clips them to the output.
fn scale_boxes(mut boxes: Boxes, params: &RescaleParams) -> Boxes {
    let (sx, sy) = (params.scale_x(), params.scale_y());
    let (w, h) = (params.output_width as f32, params.output_height as f32);

    for mut row in boxes.tensor.rows_mut() {
        if row.len() < 4 {
            continue;
        }
        row[0] = (row[0] * sx).clamp(0.0, w);
        row[1] = (row[1] * sy).clamp(0.0, h);
        row[2] = (row[2] * sx).clamp(0.0, w);
        row[3] = (row[3] * sy).clamp(0.0, h);
    }
    boxes
}

/// Indices of boxes with positive width and height.
fn nonempty_rows(boxes: &Boxes) -> Vec<usize> {
    boxes
        .tensor
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| row.len() >= 4 && row[2] > row[0] && row[3] > row[1])
        .map(|(i, _)| i)
        .collect()
}

/// Keeps the listed rows. Arrays whose first axis does not match the boxes
/// they were filtered by are returned as is.
fn keep_rows<A: Clone, D: RemoveAxis>(array: Array<A, D>, keep: Option<&[usize]>) -> Array<A, D> {
    match keep {
        Some(keep) if keep.iter().all(|&i| i < array.len_of(Axis(0))) => {
            if keep.len() == array.len_of(Axis(0)) {
                array
            } else {
                array.select(Axis(0), keep)
            }
        }
        _ => array,
    }
}

/// `[N, K, 3]` keypoints as `(x, y, score)`.
fn scale_keypoints(mut keypoints: Array3<f32>, params: &RescaleParams) -> Array3<f32> {
    if keypoints.len_of(Axis(2)) < 2 {
        return keypoints;
    }
    let (sx, sy) = (params.scale_x(), params.scale_y());
    keypoints.index_axis_mut(Axis(2), 0).mapv_inplace(|x| x * sx);
    keypoints.index_axis_mut(Axis(2), 1).mapv_inplace(|y| y * sy);
    keypoints
}

/// Resizes every `[H, W]` plane of `planes` to `size`.
fn resize_nearest<T: Copy>(planes: &Array3<T>, size: (usize, usize)) -> Array3<T> {
    let (count, in_h, in_w) = planes.dim();
    let (out_h, out_w) = size;
    if (in_h, in_w) == size || in_h == 0 || in_w == 0 {
        return planes.clone();
    }

    let ys: Vec<usize> = (0..out_h).map(|y| nearest_index(y, in_h, out_h)).collect();
    let xs: Vec<usize> = (0..out_w).map(|x| nearest_index(x, in_w, out_w)).collect();
    Array3::from_shape_fn((count, out_h, out_w), |(i, y, x)| {
        planes[[i, ys[y], xs[x]]]
    })
}

fn nearest_index(dst: usize, in_len: usize, out_len: usize) -> usize {
    (dst * in_len / out_len).min(in_len - 1)
}

/// Bilinear resize of every `[H, W]` plane with half-pixel centres.
fn resize_bilinear(planes: &Array3<f32>, size: (usize, usize)) -> Array3<f32> {
    let (count, in_h, in_w) = planes.dim();
    let (out_h, out_w) = size;
    if (in_h, in_w) == size || in_h == 0 || in_w == 0 {
        return planes.clone();
    }

    let ys: Vec<(usize, usize, f32)> = (0..out_h).map(|y| linear_tap(y, in_h, out_h)).collect();
    let xs: Vec<(usize, usize, f32)> = (0..out_w).map(|x| linear_tap(x, in_w, out_w)).collect();

    Array3::from_shape_fn((count, out_h, out_w), |(i, y, x)| {
        let (y0, y1, wy) = ys[y];
        let (x0, x1, wx) = xs[x];
        let top = planes[[i, y0, x0]] * (1.0 - wx) + planes[[i, y0, x1]] * wx;
        let bottom = planes[[i, y1, x0]] * (1.0 - wx) + planes[[i, y1, x1]] * wx;
        top * (1.0 - wy) + bottom * wy
    })
}

/// Source neighbours and weight of the upper one for output index `dst`.
fn linear_tap(dst: usize, in_len: usize, out_len: usize) -> (usize, usize, f32) {
    let scale = in_len as f32 / out_len as f32;
    let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
    let lo = (src as usize).min(in_len - 1);
    let hi = (lo + 1).min(in_len - 1);
    (lo, hi, src - lo as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SegmentInfo;
    use ndarray::{Array2, array};

    fn input(height: usize, width: usize, requested: Option<(u32, u32)>) -> MappedInput {
        MappedInput {
            image: Array3::<u8>::zeros((3, height, width)).into(),
            file_name: None,
            height: requested.map(|(h, _)| h),
            width: requested.map(|(_, w)| w),
        }
    }

    fn halving() -> RescaleParams {
        RescaleParams::for_input(&input(4, 8, Some((2, 4)))).unwrap()
    }

    #[test]
    fn test_params_fall_back_to_image_size() {
        let params = RescaleParams::for_input(&input(800, 1067, None)).unwrap();
        assert!(params.is_identity());

        let mut partial = input(800, 1067, None);
        partial.height = Some(480);
        let params = RescaleParams::for_input(&partial).unwrap();
        assert_eq!((params.output_height, params.output_width), (480, 1067));
    }

    #[test]
    fn test_params_reject_non_chw_image() {
        let mut flat = input(1, 1, None);
        flat.image = Array2::<u8>::zeros((4, 4)).into();
        assert!(RescaleParams::for_input(&flat).is_err());
    }

    #[test]
    fn test_identity_leaves_result_untouched() {
        let result = RawResult {
            sem_seg: Some(Array3::ones((2, 3, 3))),
            ..Default::default()
        };
        let params = RescaleParams::for_input(&input(3, 3, Some((3, 3)))).unwrap();

        assert_eq!(rescale_result(result.clone(), &params), result);
    }

    #[test]
    fn test_boxes_scale_into_requested_size() {
        // 480x640 file resized to 800x1067 by the mapper
        let params = RescaleParams::for_input(&input(800, 1067, Some((480, 640)))).unwrap();
        let result = RawResult {
            instances: Some(Instances {
                pred_boxes: Some(Boxes::new(array![[100.0, 200.0, 1067.0, 800.0]])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let rescaled = rescale_result(result, &params);

        let boxes = rescaled.instances.unwrap().pred_boxes.unwrap().tensor;
        assert!((boxes[[0, 0]] - 100.0 * 640.0 / 1067.0).abs() < 1e-3);
        assert!((boxes[[0, 1]] - 120.0).abs() < 1e-3);
        assert!((boxes[[0, 2]] - 640.0).abs() < 1e-3);
        assert!((boxes[[0, 3]] - 480.0).abs() < 1e-3);
    }

    #[test]
    fn test_boxes_are_clipped_and_collapsed_instances_dropped() {
        let result = RawResult {
            instances: Some(Instances {
                pred_boxes: Some(Boxes::new(array![
                    [2.0, 2.0, 6.0, 4.0],
                    [7.0, 1.0, 7.0, 3.0],
                    [-4.0, 0.0, 16.0, 8.0]
                ])),
                scores: Some(array![0.9, 0.8, 0.7]),
                pred_classes: Some(array![1, 2, 3]),
                pred_masks: Some(Array3::from_elem((3, 4, 8), true)),
                pred_keypoints: Some(Array3::from_elem((3, 1, 3), 4.0)),
            }),
            ..Default::default()
        };

        let instances = rescale_result(result, &halving()).instances.unwrap();

        let boxes = instances.pred_boxes.unwrap().tensor;
        assert_eq!(boxes, array![[1.0f32, 1.0, 3.0, 2.0], [0.0, 0.0, 4.0, 2.0]]);
        assert_eq!(instances.scores.unwrap(), array![0.9f32, 0.7]);
        assert_eq!(instances.pred_classes.unwrap(), array![1i64, 3]);
        assert_eq!(instances.pred_masks.unwrap().shape(), &[2, 2, 4]);

        let keypoints = instances.pred_keypoints.unwrap();
        assert_eq!(keypoints.shape(), &[2, 1, 3]);
        assert_eq!(keypoints[[0, 0, 0]], 2.0, "x scaled");
        assert_eq!(keypoints[[0, 0, 1]], 2.0, "y scaled");
        assert_eq!(keypoints[[0, 0, 2]], 4.0, "score untouched");
    }

    #[test]
    fn test_proposals_follow_their_boxes() {
        let result = RawResult {
            proposals: Some(Proposals {
                proposal_boxes: Some(Boxes::new(array![
                    [0.0, 0.0, 0.0, 0.0],
                    [0.0, 0.0, 8.0, 4.0]
                ])),
                objectness_logits: Some(array![-1.0, 2.0]),
            }),
            ..Default::default()
        };

        let proposals = rescale_result(result, &halving()).proposals.unwrap();

        let boxes = proposals.proposal_boxes.unwrap().tensor;
        assert_eq!(boxes, array![[0.0f32, 0.0, 4.0, 2.0]]);
        assert_eq!(proposals.objectness_logits.unwrap(), array![2.0f32]);
    }

    #[test]
    fn test_sem_seg_is_resized_bilinearly() {
        let params = RescaleParams::for_input(&input(1, 2, Some((1, 4)))).unwrap();
        let result = RawResult {
            sem_seg: Some(array![[[0.0, 1.0]]]),
            ..Default::default()
        };

        let sem_seg = rescale_result(result, &params).sem_seg.unwrap();

        assert_eq!(sem_seg, array![[[0.0f32, 0.25, 0.75, 1.0]]]);
    }

    #[test]
    fn test_panoptic_label_map_is_resized_nearest() {
        let params = RescaleParams::for_input(&input(2, 2, Some((4, 4)))).unwrap();
        let segments = vec![SegmentInfo {
            id: 4,
            isthing: true,
            category_id: 9,
        }];
        let result = RawResult {
            panoptic_seg: Some(PanopticSegmentation {
                label_map: array![[1, 2], [3, 4]],
                segments: segments.clone(),
            }),
            ..Default::default()
        };

        let panoptic = rescale_result(result, &params).panoptic_seg.unwrap();

        assert_eq!(
            panoptic.label_map,
            array![[1i32, 1, 2, 2], [1, 1, 2, 2], [3, 3, 4, 4], [3, 3, 4, 4]]
        );
        assert_eq!(panoptic.segments, segments);
    }
}
