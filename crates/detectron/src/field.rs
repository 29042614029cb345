//! Padding-aware tensor containers and the records built from them.

use ndarray::{ArrayD, IxDyn, SliceInfoElem};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::DetectronError;
use crate::tensor::{DType, Tensor, batch_tensors};

/// One image's flattened model output, keyed by names such as
/// `instances/pred_boxes`.
pub type FieldRecord = BTreeMap<String, TensorField>;

/// Per-dimension lengths, keyed `dimension_0`, `dimension_1`, ...
pub type PaddingLengths = BTreeMap<String, usize>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaddingValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl PaddingValue {
    fn as_f32(self) -> f32 {
        match self {
            PaddingValue::Int(v) => v as f32,
            PaddingValue::Float(v) => v as f32,
            PaddingValue::Bool(v) => u8::from(v) as f32,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            PaddingValue::Int(v) => v,
            PaddingValue::Float(v) => v as i64,
            PaddingValue::Bool(v) => i64::from(v),
        }
    }

    fn as_bool(self) -> bool {
        match self {
            PaddingValue::Int(v) => v != 0,
            PaddingValue::Float(v) => v != 0.0,
            PaddingValue::Bool(v) => v,
        }
    }
}

impl From<i64> for PaddingValue {
    fn from(value: i64) -> Self {
        PaddingValue::Int(value)
    }
}

impl From<f64> for PaddingValue {
    fn from(value: f64) -> Self {
        PaddingValue::Float(value)
    }
}

impl From<bool> for PaddingValue {
    fn from(value: bool) -> Self {
        PaddingValue::Bool(value)
    }
}

/// A tensor plus the value used to fill it out when it is batched with
/// larger tensors. A field without a padding value pads with zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorField {
    tensor: Tensor,
    padding_value: Option<PaddingValue>,
}

impl TensorField {
    pub fn new(tensor: impl Into<Tensor>) -> Self {
        Self {
            tensor: tensor.into(),
            padding_value: None,
        }
    }

    pub fn with_padding(tensor: impl Into<Tensor>, padding_value: PaddingValue) -> Self {
        Self {
            tensor: tensor.into(),
            padding_value: Some(padding_value),
        }
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn padding_value(&self) -> Option<PaddingValue> {
        self.padding_value
    }

    pub fn len(&self) -> usize {
        self.tensor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensor.is_empty()
    }

    pub fn padding_lengths(&self) -> PaddingLengths {
        self.tensor
            .shape()
            .iter()
            .enumerate()
            .map(|(i, &n)| (dimension_key(i), n))
            .collect()
    }

    /// Returns the tensor grown to `lengths`, filling new cells with the
    /// padding value.
    pub fn as_padded_tensor(&self, lengths: &PaddingLengths) -> Result<Tensor, DetectronError> {
        let shape = self.tensor.shape();
        let mut target = Vec::with_capacity(shape.len());
        for (i, &current) in shape.iter().enumerate() {
            let key = dimension_key(i);
            let length = *lengths.get(&key).ok_or_else(|| DetectronError::Padding {
                message: format!("missing padding length for {key}"),
            })?;
            if length < current {
                return Err(DetectronError::Padding {
                    message: format!("{key} is {current}, cannot pad down to {length}"),
                });
            }
            target.push(length);
        }

        let padding = self.padding_value;
        let dtype = self.tensor.dtype();
        Ok(match &self.tensor {
            Tensor::F32(a) => {
                let fill = padding.map_or(0.0, PaddingValue::as_f32);
                Tensor::F32(pad_array(a, &target, fill))
            }
            Tensor::I64(a) => {
                let fill = padding.map_or(0, PaddingValue::as_i64);
                Tensor::I64(pad_array(a, &target, fill))
            }
            Tensor::I32(a) => Tensor::I32(pad_array(a, &target, integer_fill(padding, dtype)?)),
            Tensor::U8(a) => Tensor::U8(pad_array(a, &target, integer_fill(padding, dtype)?)),
            Tensor::Bool(a) => {
                let fill = padding.is_some_and(PaddingValue::as_bool);
                Tensor::Bool(pad_array(a, &target, fill))
            }
        })
    }

    /// A field of the same dtype, rank and padding value with no elements.
    pub fn empty_field(&self) -> TensorField {
        TensorField {
            tensor: Tensor::zeros(self.tensor.dtype(), &vec![0; self.tensor.ndim()]),
            padding_value: self.padding_value,
        }
    }
}

impl fmt::Display for TensorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TensorField with shape: {:?} and dtype: {}.",
            self.tensor.shape(),
            self.tensor.dtype()
        )
    }
}

fn dimension_key(i: usize) -> String {
    format!("dimension_{i}")
}

/// Converts the padding value into a narrow integer dtype, rejecting values
/// that would wrap.
fn integer_fill<T: TryFrom<i64> + Default>(
    padding: Option<PaddingValue>,
    dtype: DType,
) -> Result<T, DetectronError> {
    let Some(value) = padding else {
        return Ok(T::default());
    };
    T::try_from(value.as_i64()).map_err(|_| DetectronError::Padding {
        message: format!("padding value {value:?} does not fit in {dtype}"),
    })
}

fn pad_array<T: Clone>(array: &ArrayD<T>, shape: &[usize], fill: T) -> ArrayD<T> {
    let mut padded = ArrayD::from_elem(IxDyn(shape), fill);
    let region: Vec<SliceInfoElem> = array
        .shape()
        .iter()
        .map(|&n| SliceInfoElem::from(0..n))
        .collect();
    padded.slice_mut(region.as_slice()).assign(array);
    padded
}

/// Batches records into one tensor per key, padding every field to the
/// largest length seen for that key. Records missing a key contribute an
/// all-padding entry.
pub fn collate(records: &[FieldRecord]) -> Result<BTreeMap<String, Tensor>, DetectronError> {
    let keys: BTreeSet<&String> = records.iter().flat_map(|r| r.keys()).collect();
    let mut batch = BTreeMap::new();

    for key in keys {
        let present: Vec<&TensorField> = records.iter().filter_map(|r| r.get(key)).collect();
        let Some(template) = present.first() else {
            continue;
        };

        let mut max_lengths = template.padding_lengths();
        for field in &present[1..] {
            if field.tensor.ndim() != template.tensor.ndim() {
                return Err(DetectronError::ShapeMismatch {
                    expected: template.tensor.shape().to_vec(),
                    actual: field.tensor.shape().to_vec(),
                });
            }
            for (dim, length) in field.padding_lengths() {
                let entry = max_lengths.entry(dim).or_insert(0);
                *entry = (*entry).max(length);
            }
        }

        let empty = template.empty_field();
        let padded = records
            .iter()
            .map(|r| r.get(key).unwrap_or(&empty).as_padded_tensor(&max_lengths))
            .collect::<Result<Vec<_>, _>>()?;

        batch.insert(key.clone(), batch_tensors(&padded)?);
    }

    tracing::debug!(records = records.len(), fields = batch.len(), "Collated records");
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, array};

    #[test]
    fn test_padding_lengths_names_every_dimension() {
        let field = TensorField::new(Array2::<f32>::zeros((3, 4)));
        let lengths = field.padding_lengths();

        assert_eq!(lengths.len(), 2);
        assert_eq!(lengths["dimension_0"], 3);
        assert_eq!(lengths["dimension_1"], 4);
    }

    #[test]
    fn test_as_padded_tensor_fills_with_padding_value() {
        let field = TensorField::with_padding(array![1i64, 2], PaddingValue::Int(-1));
        let lengths = PaddingLengths::from([("dimension_0".to_string(), 4)]);

        let padded = field.as_padded_tensor(&lengths).unwrap();

        let values: Vec<i64> = padded.as_i64().unwrap().iter().copied().collect();
        assert_eq!(values, vec![1, 2, -1, -1]);
    }

    #[test]
    fn test_as_padded_tensor_converts_padding_into_dtype() {
        let boxes = TensorField::with_padding(array![[1.0f32, 2.0]], PaddingValue::Int(-1));
        let lengths = PaddingLengths::from([
            ("dimension_0".to_string(), 2),
            ("dimension_1".to_string(), 2),
        ]);

        let padded = boxes.as_padded_tensor(&lengths).unwrap();

        assert_eq!(padded.as_f32().unwrap()[[1, 0]], -1.0);
        assert_eq!(padded.as_f32().unwrap()[[0, 1]], 2.0);
    }

    #[test]
    fn test_as_padded_tensor_without_padding_value_uses_zero() {
        let scores = TensorField::new(array![0.9f32]);
        let lengths = PaddingLengths::from([("dimension_0".to_string(), 3)]);

        let padded = scores.as_padded_tensor(&lengths).unwrap();

        let values: Vec<f32> = padded.as_f32().unwrap().iter().copied().collect();
        assert_eq!(values, vec![0.9, 0.0, 0.0]);
    }

    #[test]
    fn test_as_padded_tensor_rejects_padding_that_wraps() {
        let pixels = TensorField::with_padding(array![1u8], PaddingValue::Int(-1));
        let lengths = PaddingLengths::from([("dimension_0".to_string(), 2)]);

        let err = pixels.as_padded_tensor(&lengths).unwrap_err();
        assert!(matches!(err, DetectronError::Padding { .. }));
        assert!(err.to_string().contains("does not fit in uint8"));

        let ids = TensorField::with_padding(array![1i32], PaddingValue::Int(i64::MAX));
        assert!(ids.as_padded_tensor(&lengths).is_err());
    }

    #[test]
    fn test_as_padded_tensor_narrows_padding_that_fits() {
        let ids = TensorField::with_padding(array![7i32], PaddingValue::Int(-1));
        let lengths = PaddingLengths::from([("dimension_0".to_string(), 3)]);

        let padded = ids.as_padded_tensor(&lengths).unwrap();

        let values: Vec<i32> = padded.as_i32().unwrap().iter().copied().collect();
        assert_eq!(values, vec![7, -1, -1]);
    }

    #[test]
    fn test_as_padded_tensor_rejects_shrinking() {
        let field = TensorField::new(Array1::<i32>::zeros(5));
        let lengths = PaddingLengths::from([("dimension_0".to_string(), 2)]);

        let err = field.as_padded_tensor(&lengths).unwrap_err();
        assert!(err.to_string().contains("cannot pad down"));
    }

    #[test]
    fn test_as_padded_tensor_requires_every_dimension() {
        let field = TensorField::new(Array2::<i32>::zeros((1, 1)));
        let lengths = PaddingLengths::from([("dimension_0".to_string(), 2)]);

        let err = field.as_padded_tensor(&lengths).unwrap_err();
        assert!(err.to_string().contains("dimension_1"));
    }

    #[test]
    fn test_empty_field_keeps_rank_dtype_and_padding() {
        let masks = TensorField::with_padding(
            ndarray::Array3::from_elem((2, 3, 3), true),
            PaddingValue::Bool(false),
        );

        let empty = masks.empty_field();

        assert_eq!(empty.tensor().shape(), &[0, 0, 0]);
        assert_eq!(empty.tensor().dtype(), masks.tensor().dtype());
        assert_eq!(empty.padding_value(), Some(PaddingValue::Bool(false)));
    }

    #[test]
    fn test_display() {
        let field = TensorField::new(Array2::<i32>::zeros((2, 3)));
        assert_eq!(
            field.to_string(),
            "TensorField with shape: [2, 3] and dtype: int32."
        );
    }

    #[test]
    fn test_collate_pads_ragged_fields_and_fills_missing_keys() {
        let mut first = FieldRecord::new();
        first.insert(
            "instances/pred_classes".to_string(),
            TensorField::with_padding(array![3i64, 1, 4], PaddingValue::Int(-1)),
        );
        first.insert(
            "sem_seg".to_string(),
            TensorField::with_padding(Array2::<f32>::ones((2, 2)), PaddingValue::Float(0.0)),
        );

        let mut second = FieldRecord::new();
        second.insert(
            "instances/pred_classes".to_string(),
            TensorField::with_padding(array![5i64], PaddingValue::Int(-1)),
        );

        let batch = collate(&[first, second]).unwrap();

        let classes = &batch["instances/pred_classes"];
        assert_eq!(classes.shape(), &[2, 3]);
        let values: Vec<i64> = classes.as_i64().unwrap().iter().copied().collect();
        assert_eq!(values, vec![3, 1, 4, 5, -1, -1]);

        let sem_seg = &batch["sem_seg"];
        assert_eq!(sem_seg.shape(), &[2, 2, 2]);
        let missing = sem_seg.as_f32().unwrap().index_axis_move(ndarray::Axis(0), 1);
        assert!(missing.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_collate_of_no_records_is_empty() {
        assert!(collate(&[]).unwrap().is_empty());
    }
}
