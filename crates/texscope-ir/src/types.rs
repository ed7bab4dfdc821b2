//! Type system for the texscope IR.

use crate::error::IrError;

/// Width of a scalar type in bytes.
pub type Bytes = u8;

/// The kind of a scalar type.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ScalarKind {
    /// Boolean.
    Bool,
    /// Signed integer.
    Sint,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
}

/// A tensor element type: kind + byte width.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub width: Bytes,
}

impl Scalar {
    pub const BOOL: Self = Self {
        kind: ScalarKind::Bool,
        width: 1,
    };
    pub const I32: Self = Self {
        kind: ScalarKind::Sint,
        width: 4,
    };
    pub const I8: Self = Self {
        kind: ScalarKind::Sint,
        width: 1,
    };
    pub const U8: Self = Self {
        kind: ScalarKind::Uint,
        width: 1,
    };
    pub const F16: Self = Self {
        kind: ScalarKind::Float,
        width: 2,
    };
    pub const F32: Self = Self {
        kind: ScalarKind::Float,
        width: 4,
    };
}

/// One axis of a tensor shape.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Dim {
    /// Literal size.
    Fixed(u64),
    /// Size known only by name (not yet resolved).
    Symbolic(String),
}

impl Dim {
    /// Returns the literal size, if any.
    pub fn as_fixed(&self) -> Option<u64> {
        match self {
            Self::Fixed(n) => Some(*n),
            Self::Symbolic(_) => None,
        }
    }
}

/// A tensor type: element scalar plus shape.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TensorType {
    pub shape: Vec<Dim>,
    pub scalar: Scalar,
}

impl TensorType {
    /// Creates a fully static tensor type.
    pub fn new(shape: &[u64], scalar: Scalar) -> Self {
        Self {
            shape: shape.iter().map(|&d| Dim::Fixed(d)).collect(),
            scalar,
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns the innermost dimension, if the tensor has any.
    pub fn innermost(&self) -> Option<&Dim> {
        self.shape.last()
    }

    /// Returns every dimension as a literal size.
    ///
    /// Fails on the first symbolic dimension: by the time placements are
    /// planned all shapes are expected to be resolved.
    pub fn static_dims(&self) -> Result<Vec<u64>, IrError> {
        self.shape
            .iter()
            .enumerate()
            .map(|(axis, d)| match d {
                Dim::Fixed(n) => Ok(*n),
                Dim::Symbolic(name) => Err(IrError::SymbolicDimension {
                    axis,
                    name: name.clone(),
                    shape: crate::display::format_shape(&self.shape),
                }),
            })
            .collect()
    }

    /// Total size in bytes, or `None` if any dimension is symbolic.
    pub fn size_bytes(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(u64::from(self.scalar.width), |acc, d| {
                d.as_fixed().map(|n| acc.saturating_mul(n))
            })
    }
}

/// The checked type of an expression.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Type {
    /// A single tensor.
    Tensor(TensorType),
    /// A tuple of values (a multi-output producer).
    Tuple(Vec<Type>),
    /// Operators, functions and anything else without a storage footprint.
    Opaque,
}

impl Type {
    /// Shorthand for a static tensor type.
    pub fn tensor(shape: &[u64], scalar: Scalar) -> Self {
        Self::Tensor(TensorType::new(shape, scalar))
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_constants() {
        assert_eq!(Scalar::F32.kind, ScalarKind::Float);
        assert_eq!(Scalar::F32.width, 4);
        assert_eq!(Scalar::F16.width, 2);
        assert_eq!(Scalar::BOOL.width, 1);
    }

    #[test]
    fn static_dims_of_fixed_shape() {
        let t = TensorType::new(&[1, 4, 8, 8, 4], Scalar::F32);
        assert_eq!(t.rank(), 5);
        assert_eq!(t.static_dims().unwrap(), vec![1, 4, 8, 8, 4]);
        assert_eq!(t.innermost(), Some(&Dim::Fixed(4)));
    }

    #[test]
    fn static_dims_rejects_symbolic() {
        let t = TensorType {
            shape: vec![Dim::Symbolic("batch".into()), Dim::Fixed(4)],
            scalar: Scalar::F32,
        };
        let err = t.static_dims().unwrap_err();
        match err {
            IrError::SymbolicDimension { axis, name, .. } => {
                assert_eq!(axis, 0);
                assert_eq!(name, "batch");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn size_bytes() {
        let t = TensorType::new(&[2, 3, 4], Scalar::F16);
        assert_eq!(t.size_bytes(), Some(48));
        let dynamic = TensorType {
            shape: vec![Dim::Symbolic("n".into())],
            scalar: Scalar::F32,
        };
        assert_eq!(dynamic.size_bytes(), None);
    }

    #[test]
    fn as_tensor() {
        assert!(Type::tensor(&[4], Scalar::F32).as_tensor().is_some());
        assert!(Type::Tuple(vec![]).as_tensor().is_none());
        assert!(Type::Opaque.as_tensor().is_none());
    }
}
