//! Flattening of per-image model results into [`FieldRecord`]s.

use ndarray::Array1;

use crate::error::DetectronError;
use crate::field::{FieldRecord, PaddingValue, TensorField};
use crate::output::{Instances, PanopticSegmentation, Proposals, RawResult};

const INDEX_PADDING: PaddingValue = PaddingValue::Int(-1);
const MASK_PADDING: PaddingValue = PaddingValue::Bool(false);
const SEM_SEG_PADDING: PaddingValue = PaddingValue::Float(0.0);

/// Flattens every result independently, preserving order.
pub fn flatten_results(results: Vec<RawResult>) -> Result<Vec<FieldRecord>, DetectronError> {
    results.into_iter().map(flatten_result).collect()
}

pub fn flatten_result(result: RawResult) -> Result<FieldRecord, DetectronError> {
    let mut fields = FieldRecord::new();

    if let Some(instances) = result.instances {
        flatten_instances(instances, &mut fields);
    }
    if let Some(sem_seg) = result.sem_seg {
        let field = TensorField::with_padding(sem_seg, SEM_SEG_PADDING);
        insert(&mut fields, "sem_seg", field);
    }
    if let Some(proposals) = result.proposals {
        flatten_proposals(proposals, &mut fields);
    }
    if let Some(panoptic) = result.panoptic_seg {
        flatten_panoptic(panoptic, &mut fields)?;
    }

    tracing::trace!(fields = fields.len(), "Flattened model result");
    Ok(fields)
}

fn insert(fields: &mut FieldRecord, key: &str, field: TensorField) {
    fields.insert(key.to_string(), field);
}

fn flatten_instances(instances: Instances, fields: &mut FieldRecord) {
    if let Some(boxes) = instances.pred_boxes {
        let field = TensorField::with_padding(boxes.tensor, INDEX_PADDING);
        insert(fields, "instances/pred_boxes", field);
    }
    // Scores are assumed to line up with the boxes, so they carry no padding value.
    if let Some(scores) = instances.scores {
        insert(fields, "instances/scores", TensorField::new(scores));
    }
    if let Some(classes) = instances.pred_classes {
        let field = TensorField::with_padding(classes, INDEX_PADDING);
        insert(fields, "instances/pred_classes", field);
    }
    if let Some(masks) = instances.pred_masks {
        let field = TensorField::with_padding(masks, MASK_PADDING);
        insert(fields, "instances/pred_masks", field);
    }
    if let Some(keypoints) = instances.pred_keypoints {
        let field = TensorField::with_padding(keypoints, INDEX_PADDING);
        insert(fields, "instances/pred_keypoints", field);
    }
}

fn flatten_proposals(proposals: Proposals, fields: &mut FieldRecord) {
    if let Some(boxes) = proposals.proposal_boxes {
        let field = TensorField::with_padding(boxes.tensor, INDEX_PADDING);
        insert(fields, "proposals/proposal_boxes", field);
    }
    if let Some(logits) = proposals.objectness_logits {
        let field = TensorField::new(logits);
        insert(fields, "proposals/objectness_logits", field);
    }
}

fn flatten_panoptic(
    panoptic: PanopticSegmentation,
    fields: &mut FieldRecord,
) -> Result<(), DetectronError> {
    let PanopticSegmentation { label_map, segments } = panoptic;

    let ids = segments
        .iter()
        .map(|s| to_i32("id", s.id))
        .collect::<Result<Array1<i32>, _>>()?;
    let isthings: Array1<bool> = segments.iter().map(|s| s.isthing).collect();
    let category_ids = segments
        .iter()
        .map(|s| to_i32("category_id", s.category_id))
        .collect::<Result<Array1<i32>, _>>()?;

    let label_map = TensorField::with_padding(label_map, INDEX_PADDING);
    insert(fields, "panoptic_seg", label_map);
    let ids = TensorField::with_padding(ids, INDEX_PADDING);
    insert(fields, "panoptic_seg/ids", ids);
    let isthings = TensorField::with_padding(isthings, MASK_PADDING);
    insert(fields, "panoptic_seg/isthings", isthings);
    let category_ids = TensorField::with_padding(category_ids, INDEX_PADDING);
    insert(fields, "panoptic_seg/category_ids", category_ids);
    Ok(())
}

fn to_i32(field: &'static str, value: i64) -> Result<i32, DetectronError> {
    i32::try_from(value).map_err(|_| DetectronError::SegmentIdOutOfRange { field, value })
}
