//! Element types for the veles compiler.
//!
//! Every array in the dataflow graph is typed by an [`ElementType`]. Buffer
//! sizing works in bytes, so the only property the allocator ever asks for is
//! [`ElementType::byte_size`].


/// Scalar element type of an array value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::AsRefStr, strum::EnumIter, strum::VariantArray)]
pub enum ElementType {
    /// Boolean predicate, stored as one byte.
    Pred,

    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,

    F16,
    BF16,
    F32,
    F64,
}

impl ElementType {
    /// Storage size of one element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Pred | Self::S8 | Self::U8 => 1,
            Self::S16 | Self::U16 | Self::F16 | Self::BF16 => 2,
            Self::S32 | Self::U32 | Self::F32 => 4,
            Self::S64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Whether this is a floating-point type.
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    /// Whether this is a signed or unsigned integer type.
    pub const fn is_integral(self) -> bool {
        !self.is_floating() && !matches!(self, Self::Pred)
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}
