//! Dtype-tagged tensor shared by model inputs and output fields.

use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn};
use std::fmt;

use crate::error::DetectronError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F32,
    I64,
    I32,
    U8,
    Bool,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "float32",
            DType::I64 => "int64",
            DType::I32 => "int32",
            DType::U8 => "uint8",
            DType::Bool => "bool",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    F32(ArrayD<f32>),
    I64(ArrayD<i64>),
    I32(ArrayD<i32>),
    U8(ArrayD<u8>),
    Bool(ArrayD<bool>),
}

macro_rules! dispatch {
    ($tensor:expr, $arr:ident => $body:expr) => {
        match $tensor {
            Tensor::F32($arr) => $body,
            Tensor::I64($arr) => $body,
            Tensor::I32($arr) => $body,
            Tensor::U8($arr) => $body,
            Tensor::Bool($arr) => $body,
        }
    };
}

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Size of the leading dimension; zero for scalars.
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Tensor::F32(_) => DType::F32,
            Tensor::I64(_) => DType::I64,
            Tensor::I32(_) => DType::I32,
            Tensor::U8(_) => DType::U8,
            Tensor::Bool(_) => DType::Bool,
        }
    }

    /// A tensor of the given dtype with every element zero (or `false`).
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let shape = IxDyn(shape);
        match dtype {
            DType::F32 => Tensor::F32(ArrayD::zeros(shape)),
            DType::I64 => Tensor::I64(ArrayD::zeros(shape)),
            DType::I32 => Tensor::I32(ArrayD::zeros(shape)),
            DType::U8 => Tensor::U8(ArrayD::zeros(shape)),
            DType::Bool => Tensor::Bool(ArrayD::from_elem(shape, false)),
        }
    }

    pub fn as_f32(&self) -> Option<ArrayViewD<'_, f32>> {
        match self {
            Tensor::F32(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<ArrayViewD<'_, i64>> {
        match self {
            Tensor::I64(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<ArrayViewD<'_, i32>> {
        match self {
            Tensor::I32(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<ArrayViewD<'_, u8>> {
        match self {
            Tensor::U8(a) => Some(a.view()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<ArrayViewD<'_, bool>> {
        match self {
            Tensor::Bool(a) => Some(a.view()),
            _ => None,
        }
    }

    /// Pixel values as `f32`, the element type the ONNX graph consumes.
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            Tensor::F32(a) => a.clone(),
            Tensor::I64(a) => a.mapv(|v| v as f32),
            Tensor::I32(a) => a.mapv(|v| v as f32),
            Tensor::U8(a) => a.mapv(f32::from),
            Tensor::Bool(a) => a.mapv(|v| if v { 1.0 } else { 0.0 }),
        }
    }
}

/// Stacks tensors of identical dtype and shape along a new leading axis.
pub fn batch_tensors(tensors: &[Tensor]) -> Result<Tensor, DetectronError> {
    let first = tensors.first().ok_or_else(|| DetectronError::Padding {
        message: "cannot batch an empty list of tensors".to_string(),
    })?;

    for tensor in &tensors[1..] {
        if tensor.dtype() != first.dtype() {
            return Err(DetectronError::DtypeMismatch {
                expected: first.dtype(),
                actual: tensor.dtype(),
            });
        }
        if tensor.shape() != first.shape() {
            return Err(DetectronError::ShapeMismatch {
                expected: first.shape().to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
    }

    macro_rules! stack_as {
        ($variant:ident) => {{
            let views: Vec<_> = tensors
                .iter()
                .filter_map(|t| match t {
                    Tensor::$variant(a) => Some(a.view()),
                    _ => None,
                })
                .collect();
            Tensor::$variant(ndarray::stack(Axis(0), &views)?)
        }};
    }

    Ok(match first {
        Tensor::F32(_) => stack_as!(F32),
        Tensor::I64(_) => stack_as!(I64),
        Tensor::I32(_) => stack_as!(I32),
        Tensor::U8(_) => stack_as!(U8),
        Tensor::Bool(_) => stack_as!(Bool),
    })
}

macro_rules! impl_from_array {
    ($elem:ty, $variant:ident) => {
        impl<D: Dimension> From<ndarray::Array<$elem, D>> for Tensor {
            fn from(array: ndarray::Array<$elem, D>) -> Self {
                Tensor::$variant(array.into_dyn())
            }
        }
    };
}

impl_from_array!(f32, F32);
impl_from_array!(i64, I64);
impl_from_array!(i32, I32);
impl_from_array!(u8, U8);
impl_from_array!(bool, Bool);
