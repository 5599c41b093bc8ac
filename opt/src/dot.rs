//! Dot dimension canonicalization.
//!
//! Backend dispatch pattern-matches only the canonical dimension form — batch
//! lists ascending, then contracting lists ascending — when deciding whether
//! a dot can lower as one fused kernel. A semantically equivalent dot with
//! shuffled lists must not miss that fusion, so this pass reorders the lists
//! and reports, per operand, the transpose-equivalent dimension permutation
//! that keeps the positional pairing between the two sides intact. Everything
//! here is metadata; no data moves, and buffer assignment is untouched.
//!
//! The lhs drives the sort: its reordered lists are ascending by
//! construction, the rhs follows its pairing and receives a dimension
//! renumbering where needed, and the output batch part is permuted alongside
//! the lhs batch list.

use itertools::Itertools;
use smallvec::SmallVec;
use tracing::trace;
use veles_ir::{Computation, DotDims, Op, OpId};

use crate::error::*;

/// Result of canonicalizing one dot: sorted dimension lists plus the
/// compensating permutations. A `None` permutation is the identity — the
/// operand (or output) is untouched.
///
/// Permutations use gather semantics: dimension `j` of the permuted operand
/// is dimension `permutation[j]` of the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDot {
    pub dims: DotDims,
    pub lhs_permutation: Option<Vec<usize>>,
    pub rhs_permutation: Option<Vec<usize>>,
    pub output_permutation: Option<Vec<usize>>,
}

impl CanonicalDot {
    /// Whether canonicalization changed anything.
    pub fn is_noop(&self) -> bool {
        self.lhs_permutation.is_none() && self.rhs_permutation.is_none() && self.output_permutation.is_none()
    }
}

/// Backend dispatch classification of a dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionEligibility {
    /// Canonical dimension order: a fused single-kernel lowering is legal.
    Fused,
    /// Falls back to the generic multi-step lowering.
    Generic,
}

impl FusionEligibility {
    pub fn is_fused(self) -> bool {
        matches!(self, Self::Fused)
    }
}

/// Whether all four dimension lists already read in ascending order.
pub fn is_canonical(dims: &DotDims) -> bool {
    [&dims.lhs_batch, &dims.lhs_contracting, &dims.rhs_batch, &dims.rhs_contracting]
        .iter()
        .all(|list| list.windows(2).all(|pair| pair[0] < pair[1]))
}

/// The ascending form of each dimension list, ignoring pairing. This is the
/// order backend dispatch matches against; [`canonicalize`] additionally
/// works out how to reach it without changing semantics.
pub fn canonical_order(dims: &DotDims) -> DotDims {
    let sorted = |list: &SmallVec<[usize; 2]>| -> SmallVec<[usize; 2]> {
        let mut list = list.clone();
        list.sort_unstable();
        list
    };
    DotDims {
        lhs_batch: sorted(&dims.lhs_batch),
        lhs_contracting: sorted(&dims.lhs_contracting),
        rhs_batch: sorted(&dims.rhs_batch),
        rhs_contracting: sorted(&dims.rhs_contracting),
    }
}

/// Classification consumed by backend dispatch: only the canonical form is
/// eligible for the fused single-kernel lowering.
pub fn fusion_eligibility(dims: &DotDims) -> FusionEligibility {
    if is_canonical(dims) {
        FusionEligibility::Fused
    } else {
        FusionEligibility::Generic
    }
}

/// Canonicalize the dimension lists of a dot with the given operand ranks.
///
/// The sort is driven by the lhs lists; the rhs lists are reordered along
/// the same pairing and, where the paired order disagrees with ascending
/// physical order, the rhs receives a compensating dimension permutation.
/// Reordering the batch list also reorders the output's batch dimensions,
/// reported as `output_permutation`. Applying the pass twice yields the same
/// lists as applying it once, and each list keeps its members — only the
/// relative order changes.
pub fn canonicalize(dims: &DotDims, lhs_rank: usize, rhs_rank: usize) -> CanonicalDot {
    let batch_order = sort_order(&dims.lhs_batch);
    let contracting_order = sort_order(&dims.lhs_contracting);

    // Lhs lists become ascending by construction; the lhs itself never needs
    // a transpose.
    let lhs_batch = apply_order(&dims.lhs_batch, &batch_order);
    let lhs_contracting = apply_order(&dims.lhs_contracting, &contracting_order);

    // Rhs lists follow the pairing, then get renumbered to ascending physical
    // dims through a transpose of the rhs.
    let rhs_batch_paired = apply_order(&dims.rhs_batch, &batch_order);
    let rhs_contracting_paired = apply_order(&dims.rhs_contracting, &contracting_order);

    let mut rhs_batch = rhs_batch_paired.clone();
    rhs_batch.sort_unstable();
    let mut rhs_contracting = rhs_contracting_paired.clone();
    rhs_contracting.sort_unstable();

    let mut rhs_permutation: Vec<usize> = (0..rhs_rank).collect();
    for (&target, &source) in rhs_batch.iter().zip(&rhs_batch_paired) {
        rhs_permutation[target] = source;
    }
    for (&target, &source) in rhs_contracting.iter().zip(&rhs_contracting_paired) {
        rhs_permutation[target] = source;
    }

    // The output's leading dimensions track the lhs batch list order.
    let batch = lhs_batch.len();
    let lhs_free = lhs_rank - batch - lhs_contracting.len();
    let rhs_free = rhs_rank - batch - rhs_contracting.len();
    let output_rank = batch + lhs_free + rhs_free;
    let mut output_permutation: Vec<usize> = (0..output_rank).collect();
    output_permutation[..batch].copy_from_slice(&batch_order);

    let canonical = CanonicalDot {
        dims: DotDims { lhs_batch, lhs_contracting, rhs_batch, rhs_contracting },
        lhs_permutation: None,
        rhs_permutation: non_identity(rhs_permutation),
        output_permutation: non_identity(output_permutation),
    };

    if !canonical.is_noop() {
        trace!(before = ?dims, after = ?canonical.dims, "canonicalized dot dimensions");
    }
    canonical
}

/// Canonicalization metadata for a dot operation of `comp`.
///
/// # Errors
/// `id` must refer to a dot.
pub fn canonical_dims_for(comp: &Computation, id: OpId) -> Result<CanonicalDot> {
    let Op::Dot { lhs, rhs, dims } = comp.operation(id).op() else {
        return NotADotSnafu { op: id }.fail();
    };
    let lhs_rank = comp.operation(*lhs).shape().rank().unwrap_or(0);
    let rhs_rank = comp.operation(*rhs).shape().rank().unwrap_or(0);
    Ok(canonicalize(dims, lhs_rank, rhs_rank))
}

/// Backend classification of a dot operation of `comp`.
///
/// # Errors
/// `id` must refer to a dot.
pub fn classify_dot(comp: &Computation, id: OpId) -> Result<FusionEligibility> {
    match comp.operation(id).op() {
        Op::Dot { dims, .. } => Ok(fusion_eligibility(dims)),
        _ => NotADotSnafu { op: id }.fail(),
    }
}

/// Stable permutation that sorts `list` ascending.
fn sort_order(list: &[usize]) -> Vec<usize> {
    (0..list.len()).sorted_by_key(|&i| list[i]).collect()
}

fn apply_order(list: &SmallVec<[usize; 2]>, order: &[usize]) -> SmallVec<[usize; 2]> {
    order.iter().map(|&i| list[i]).collect()
}

fn non_identity(permutation: Vec<usize>) -> Option<Vec<usize>> {
    permutation.iter().enumerate().any(|(i, &p)| i != p).then_some(permutation)
}
