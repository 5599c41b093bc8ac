//! Shapes and nested output positions.
//!
//! A [`Shape`] is either an array (element type plus dimensions) or a tuple of
//! shapes. Tuples address their parts through a [`ValuePath`], a sequence of
//! element indices from the root of the shape down to a nested position.
//! Liveness and allocation work on array-shaped leaf positions only; a tuple
//! itself has no flat byte size.

use smallvec::SmallVec;
use snafu::ensure;
use veles_dtype::ElementType;

use crate::error::*;

/// Position of a nested output within a (possibly tuple-shaped) value.
///
/// The empty path addresses the value itself. Paths are cheap to clone and
/// usable as map keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValuePath(SmallVec<[usize; 2]>);

impl ValuePath {
    /// The root position.
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Extend this path by one tuple index.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Path obtained by prepending `index`, addressing this position one
    /// tuple level up.
    pub fn nested_under(&self, index: usize) -> Self {
        let mut indices = SmallVec::with_capacity(self.0.len() + 1);
        indices.push(index);
        indices.extend_from_slice(&self.0);
        Self(indices)
    }

    /// Strip a leading `index`, addressing this position one tuple level down.
    /// Returns `None` if the path does not start with `index`.
    pub fn strip_prefix(&self, index: usize) -> Option<Self> {
        match self.0.split_first() {
            Some((&first, rest)) if first == index => Some(Self(SmallVec::from_slice(rest))),
            _ => None,
        }
    }
}

impl From<&[usize]> for ValuePath {
    fn from(indices: &[usize]) -> Self {
        Self(SmallVec::from_slice(indices))
    }
}

impl<const N: usize> From<[usize; N]> for ValuePath {
    fn from(indices: [usize; N]) -> Self {
        Self(SmallVec::from_slice(&indices))
    }
}

impl FromIterator<usize> for ValuePath {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for ValuePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{index}")?;
        }
        write!(f, "}}")
    }
}

/// Shape of an operation result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Dense array with an element type and dimension extents.
    Array { element: ElementType, dims: SmallVec<[usize; 4]> },
    /// Tuple of independently addressable parts.
    Tuple(Vec<Shape>),
}

impl Shape {
    /// Array shape from an element type and dimensions.
    ///
    /// # Errors
    /// Zero-sized dimensions are rejected.
    pub fn array(element: ElementType, dims: impl IntoIterator<Item = usize>) -> Result<Self> {
        let dims: SmallVec<[usize; 4]> = dims.into_iter().collect();
        ensure!(dims.iter().all(|&d| d > 0), ZeroDimensionSnafu { dims: dims.clone() });
        Ok(Self::Array { element, dims })
    }

    /// Rank-0 array.
    pub fn scalar(element: ElementType) -> Self {
        Self::Array { element, dims: SmallVec::new() }
    }

    pub fn tuple(elements: Vec<Shape>) -> Self {
        Self::Tuple(elements)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    /// Number of dimensions of an array shape, `None` for tuples.
    pub fn rank(&self) -> Option<usize> {
        match self {
            Self::Array { dims, .. } => Some(dims.len()),
            Self::Tuple(_) => None,
        }
    }

    /// Element type of an array shape, `None` for tuples.
    pub fn element(&self) -> Option<ElementType> {
        match self {
            Self::Array { element, .. } => Some(*element),
            Self::Tuple(_) => None,
        }
    }

    /// Dimension extents of an array shape, `None` for tuples.
    pub fn dims(&self) -> Option<&[usize]> {
        match self {
            Self::Array { dims, .. } => Some(dims),
            Self::Tuple(_) => None,
        }
    }

    /// Total element count of an array shape, `None` for tuples.
    pub fn element_count(&self) -> Option<usize> {
        match self {
            Self::Array { dims, .. } => Some(dims.iter().product()),
            Self::Tuple(_) => None,
        }
    }

    /// Flat storage size in bytes. Tuples have none.
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            Self::Array { element, dims } => Some(element.byte_size() * dims.iter().product::<usize>()),
            Self::Tuple(_) => None,
        }
    }

    /// Sub-shape at `path`, `None` if the path does not exist.
    pub fn sub_shape(&self, path: &ValuePath) -> Option<&Shape> {
        let mut shape = self;
        for &index in path.as_slice() {
            match shape {
                Self::Tuple(elements) => shape = elements.get(index)?,
                Self::Array { .. } => return None,
            }
        }
        Some(shape)
    }

    /// Paths of all array-shaped leaf positions, in tuple order.
    pub fn leaf_paths(&self) -> Vec<ValuePath> {
        fn walk(shape: &Shape, prefix: &ValuePath, out: &mut Vec<ValuePath>) {
            match shape {
                Shape::Array { .. } => out.push(prefix.clone()),
                Shape::Tuple(elements) => {
                    for (i, element) in elements.iter().enumerate() {
                        walk(element, &prefix.child(i), out);
                    }
                }
            }
        }

        let mut out = Vec::new();
        walk(self, &ValuePath::root(), &mut out);
        out
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Array { element, dims } => {
                write!(f, "{element}[")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{dim}")?;
                }
                write!(f, "]")
            }
            Self::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
        }
    }
}
