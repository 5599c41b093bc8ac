//! Liveness analysis over a fixed execution order.
//!
//! The order is a read-only input: a total order over the computation's
//! operations, consistent with operand dependencies. The analysis never
//! reorders; it only interprets. A value is defined at its producer's
//! position and dies at its latest reading position, except that values of
//! the designated root stay live past the end of the order so the terminal
//! output's storage outlives nominal execution.

use snafu::ensure;
use tracing::debug;
use veles_ir::{Computation, Op, OpId};

use crate::error::*;
use crate::value::{ValueId, ValueTable};

/// Inclusive `[def, last_use]` interval in execution-order positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub def: usize,
    pub last_use: usize,
}

impl LiveRange {
    /// Whether two ranges are both live at some position, treating the
    /// `def == last_use` boundary as non-overlapping. The boundary case is
    /// exactly the in-place handoff: the defining operation's write may
    /// supersede the dying operand's final read.
    pub fn overlaps(&self, other: &LiveRange) -> bool {
        self.def < other.last_use && other.def < self.last_use
    }

    /// Whether two ranges share any live position, boundary included. Used
    /// for region disjointness, where a same-position read/write pair of
    /// unrelated values must still not share storage.
    pub fn touches(&self, other: &LiveRange) -> bool {
        self.def <= other.last_use && other.def <= self.last_use
    }
}

/// Live ranges for every logical value of one computation.
#[derive(Debug)]
pub struct Liveness {
    ranges: Vec<LiveRange>,
    /// One past the final position; root values live until here.
    horizon: usize,
}

impl Liveness {
    pub fn range(&self, value: ValueId) -> LiveRange {
        self.ranges[value.index()]
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }
}

/// Compute live ranges for every value in `table`.
///
/// # Errors
/// The order must cover every operation exactly once and respect operand
/// dependencies; violations are the caller's precondition failures and are
/// never tolerated silently.
pub fn compute(comp: &Computation, order: &[OpId], table: &ValueTable) -> Result<Liveness> {
    let positions = validate_order(comp, order)?;

    let mut ranges: Vec<LiveRange> = table
        .values()
        .map(|(_, value)| {
            let def = positions[value.op.index()];
            LiveRange { def, last_use: def }
        })
        .collect();

    let mut extend = |value: ValueId, position: usize| {
        let range = &mut ranges[value.index()];
        range.last_use = range.last_use.max(position);
    };

    for (position, &id) in order.iter().enumerate() {
        match comp.operation(id).op() {
            // A tuple-element extraction reads only the selected subtree.
            Op::GetTupleElement { input, index } => {
                for value in table.values_of(*input) {
                    if table.value(value).path.strip_prefix(*index).is_some() {
                        extend(value, position);
                    }
                }
            }
            op => {
                for operand in op.operands() {
                    for value in table.values_of(operand) {
                        extend(value, position);
                    }
                }
            }
        }
    }

    let horizon = order.len();
    if let Some(root) = comp.root() {
        for value in table.values_of(root) {
            ranges[value.index()].last_use = horizon;
        }
    }

    debug!(values = ranges.len(), horizon, "liveness analysis complete");

    Ok(Liveness { ranges, horizon })
}

/// Check the order is a permutation of the computation's operations with
/// every operand defined before use, and return the position map.
fn validate_order(comp: &Computation, order: &[OpId]) -> Result<Vec<usize>> {
    const UNSEEN: usize = usize::MAX;

    let mut positions = vec![UNSEEN; comp.len()];
    for (position, &id) in order.iter().enumerate() {
        ensure!(positions[id.index()] == UNSEEN, DuplicateInOrderSnafu { op: id });
        positions[id.index()] = position;
    }

    for (id, _) in comp.ops() {
        ensure!(positions[id.index()] != UNSEEN, MissingFromOrderSnafu { op: id });
    }

    for (position, &id) in order.iter().enumerate() {
        for operand in comp.operation(id).op().operands() {
            ensure!(
                positions[operand.index()] < position,
                UseBeforeDefinitionSnafu { user: id, operand, position }
            );
        }
    }

    Ok(positions)
}
