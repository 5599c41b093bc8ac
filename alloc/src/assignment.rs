//! Buffer assignment: the core allocator.
//!
//! Consumes the value model, liveness, and the forced unions seeded from
//! declared aliases, then coalesces in-place-eligible results into their
//! dying operands and lays every equivalence class out in a concrete storage
//! region. Regions retired by dead classes are reused for later classes of
//! compatible size.
//!
//! # Phases
//!
//! 1. **Values**: enumerate logical values, seed view/tuple forwards
//! 2. **Liveness**: live range per value over the given order
//! 3. **Declared aliases**: forced unions, validated for interference
//! 4. **In-place coalescing**: best-effort unions for overwrite-safe kinds
//! 5. **Region assignment**: event sweep with a free pool keyed by size

use std::collections::HashMap;

use itertools::Itertools;
use snafu::ensure;
use tracing::{debug, trace};
use veles_ir::{AliasKind, Computation, Op, OpId, OpKind, ValuePath};

use crate::collective::{self, class_members};
use crate::error::*;
use crate::liveness::{self, LiveRange, Liveness};
use crate::union::UnionFind;
use crate::value::{ValueId, ValueTable};

/// Identifier of a concrete storage region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(u32);

impl AllocationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "allocation {}", self.0)
    }
}

/// A concrete storage region holding one or more equivalence classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    bytes: usize,
    is_parameter: bool,
    is_output: bool,
}

impl Allocation {
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Backed by an entry parameter; never handed to unrelated values.
    pub fn is_parameter(&self) -> bool {
        self.is_parameter
    }

    /// Holds the terminal output; stays valid past the end of execution.
    pub fn is_output(&self) -> bool {
        self.is_output
    }
}

/// Storage assigned to one logical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferSlice {
    pub allocation: AllocationId,
    pub offset: usize,
    pub bytes: usize,
}

impl BufferSlice {
    /// Whether two slices name the same storage.
    pub fn same_storage(&self, other: &BufferSlice) -> bool {
        self.allocation == other.allocation && self.offset == other.offset
    }
}

/// Aggregate allocator statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentStats {
    pub allocations: usize,
    pub allocation_bytes: usize,
    /// Classes placed into a retired region instead of fresh storage.
    pub regions_reused: usize,
    pub bytes_reused: usize,
}

/// One equivalence class: values sharing a single storage region.
#[derive(Debug, Clone)]
struct ClassInfo {
    members: Vec<ValueId>,
    bytes: usize,
    range: LiveRange,
    is_parameter: bool,
    is_output: bool,
}

/// Total mapping from logical values to storage slices.
///
/// Produced by [`BufferAssignment::run`]; queries mirror what code generation
/// needs: the slice of a position, and whether two positions share storage.
#[derive(Debug)]
pub struct BufferAssignment {
    table: ValueTable,
    /// Class index per value.
    class_of: Vec<u32>,
    classes: Vec<ClassInfo>,
    /// Slice per class.
    slices: Vec<BufferSlice>,
    allocations: Vec<Allocation>,
    stats: AssignmentStats,
}

impl BufferAssignment {
    /// Assign buffers using the computation's own (insertion) order.
    pub fn run(comp: &Computation) -> Result<Self> {
        Self::run_with_order(comp, &comp.execution_order())
    }

    /// Assign buffers over an explicit execution order.
    ///
    /// # Errors
    /// Fatal conditions — malformed or unsatisfiable alias declarations, an
    /// order violating operand dependencies — abort the whole assignment; no
    /// partial result is ever returned.
    pub fn run_with_order(comp: &Computation, order: &[OpId]) -> Result<Self> {
        let Some(root) = comp.root() else {
            return EmptyComputationSnafu { name: comp.name().to_string() }.fail();
        };

        let table = ValueTable::build(comp);
        let mut unions = UnionFind::new(table.len());
        for &(view, source) in table.forwards() {
            unions.union(view, source);
        }

        let liveness = liveness::compute(comp, order, &table)?;
        collective::seed_declared_aliases(comp, &table, &liveness, &mut unions)?;

        let coalesced = coalesce_in_place(comp, order, &table, &liveness, &mut unions);

        let (classes, class_of) = build_classes(comp, root, &table, &liveness, &mut unions);
        let (slices, allocations, stats) = assign_regions(&classes);

        debug!(
            values = table.len(),
            classes = classes.len(),
            coalesced,
            allocations = stats.allocations,
            allocation_bytes = stats.allocation_bytes,
            regions_reused = stats.regions_reused,
            "buffer assignment complete"
        );

        Ok(Self { table, class_of, classes, slices, allocations, stats })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Storage slice of the value at `(op, path)`.
    ///
    /// # Errors
    /// The position must name an array-shaped output of `op`.
    pub fn slice_for(&self, op: OpId, path: &ValuePath) -> Result<BufferSlice> {
        self.class_index(op, path)
            .map(|class| self.slices[class])
            .ok_or_else(|| UnknownPositionSnafu { op, path: path.clone() }.build())
    }

    /// Storage slice of `op`'s top-level value.
    pub fn slice_for_root(&self, op: OpId) -> Result<BufferSlice> {
        self.slice_for(op, &ValuePath::root())
    }

    /// Whether the two positions resolve to the same storage.
    pub fn shares_slice(&self, a: OpId, a_path: &ValuePath, b: OpId, b_path: &ValuePath) -> bool {
        match (self.class_index(a, a_path), self.class_index(b, b_path)) {
            (Some(ca), Some(cb)) => self.slices[ca].same_storage(&self.slices[cb]),
            _ => false,
        }
    }

    /// [`Self::shares_slice`] at both operations' top-level positions.
    pub fn shares_top_level_slice(&self, a: OpId, b: OpId) -> bool {
        self.shares_slice(a, &ValuePath::root(), b, &ValuePath::root())
    }

    pub fn allocation(&self, id: AllocationId) -> &Allocation {
        &self.allocations[id.index()]
    }

    pub fn allocations(&self) -> impl Iterator<Item = (AllocationId, &Allocation)> {
        self.allocations.iter().enumerate().map(|(i, a)| (AllocationId(i as u32), a))
    }

    pub fn stats(&self) -> AssignmentStats {
        self.stats
    }

    /// Re-check the result invariants: totality and size agreement of the
    /// slice map, disjoint storage for time-overlapping unrelated classes,
    /// and satisfaction of every must-alias contract.
    pub fn validate(&self, comp: &Computation) -> Result<()> {
        for (value, logical) in self.table.values() {
            let slice = self.slices[self.class_of[value.index()] as usize];
            ensure!(
                slice.bytes == logical.bytes,
                ValidationFailedSnafu {
                    reason: format!("{logical} has {} bytes but its slice has {}", logical.bytes, slice.bytes),
                }
            );
            let allocation = self.allocations[slice.allocation.index()];
            ensure!(
                slice.offset + slice.bytes <= allocation.bytes,
                ValidationFailedSnafu { reason: format!("slice of {logical} exceeds its allocation") }
            );
        }

        for (i, j) in (0..self.classes.len()).tuple_combinations() {
            if self.classes[i].range.touches(&self.classes[j].range) {
                ensure!(
                    !self.slices[i].same_storage(&self.slices[j]),
                    ValidationFailedSnafu {
                        reason: format!("unrelated classes live at the same time share {}", self.slices[i].allocation),
                    }
                );
            }
        }

        if let Some(root) = comp.root() {
            for declaration in comp.alias_config().iter().filter(|d| d.kind == AliasKind::Must) {
                let holds = comp.parameter_id(declaration.parameter).is_some_and(|parameter| {
                    self.shares_slice(root, &declaration.output_path, parameter, &declaration.parameter_path)
                });
                ensure!(
                    holds,
                    ValidationFailedSnafu { reason: format!("must-alias {declaration} is not satisfied") }
                );
            }
        }

        Ok(())
    }

    fn class_index(&self, op: OpId, path: &ValuePath) -> Option<usize> {
        self.table.lookup(op, path).map(|value| self.class_of[value.index()] as usize)
    }
}

impl std::fmt::Display for BufferAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "buffer assignment: {} allocations, {} bytes, {} regions reused",
            self.stats.allocations, self.stats.allocation_bytes, self.stats.regions_reused
        )?;
        for (id, allocation) in self.allocations() {
            let mut tags = String::new();
            if allocation.is_parameter() {
                tags.push_str(" parameter");
            }
            if allocation.is_output() {
                tags.push_str(" output");
            }
            writeln!(f, "  {id}: {} bytes{tags}", allocation.bytes())?;
            for (class, slice) in self.slices.iter().enumerate() {
                if slice.allocation == id {
                    for &member in &self.classes[class].members {
                        let end = slice.offset + slice.bytes;
                        writeln!(f, "    [{}..{end}) {}", slice.offset, self.table.value(member))?;
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// In-place coalescing
// =============================================================================

/// Best-effort unions of results with operands that die at the defining
/// position. Only operation kinds with overwrite semantics participate;
/// everything that fails a guard simply stays in its own class — a missed
/// optimization, never an error.
fn coalesce_in_place(
    comp: &Computation,
    order: &[OpId],
    table: &ValueTable,
    liveness: &Liveness,
    unions: &mut UnionFind,
) -> usize {
    let mut coalesced = 0;

    for (position, &id) in order.iter().enumerate() {
        let operation = comp.operation(id);
        if !operation.kind().overwrites_operand() {
            continue;
        }

        match operation.op() {
            // A multi-operand collective's result positions line up with its
            // operands one to one; each pair is attempted independently.
            Op::AllReduce { inputs, .. } if inputs.len() > 1 => {
                for (i, &input) in inputs.iter().enumerate() {
                    let result = table.lookup(id, &ValuePath::from([i]));
                    let operand = table.lookup(input, &ValuePath::root());
                    if let (Some(result), Some(operand)) = (result, operand)
                        && !unions.same(result, operand)
                        && try_in_place(comp, table, liveness, unions, result, operand, position)
                    {
                        coalesced += 1;
                    }
                }
            }
            op => {
                let Some(result) = table.lookup(id, &ValuePath::root()) else { continue };
                for operand_id in op.operands() {
                    let Some(operand) = table.lookup(operand_id, &ValuePath::root()) else { continue };
                    if unions.same(result, operand) {
                        break;
                    }
                    if try_in_place(comp, table, liveness, unions, result, operand, position) {
                        coalesced += 1;
                        break;
                    }
                }
            }
        }
    }

    if coalesced > 0 {
        debug!(coalesced, "in-place coalescing complete");
    }
    coalesced
}

/// Union `result` into `operand`'s storage if the overwrite is provably safe.
fn try_in_place(
    comp: &Computation,
    table: &ValueTable,
    liveness: &Liveness,
    unions: &mut UnionFind,
    result: ValueId,
    operand: ValueId,
    position: usize,
) -> bool {
    if table.value(result).bytes != table.value(operand).bytes {
        return false;
    }

    let result_root = unions.find(result);
    let operand_root = unions.find(operand);
    let operand_class = class_members(unions, table, operand_root);

    // The operand's storage must die exactly here, and must not be pinned by
    // an entry parameter: only explicit aliasing may overwrite a parameter.
    for &member in &operand_class {
        if liveness.range(member).last_use > position {
            return false;
        }
        if comp.operation(table.value(member).op).kind() == OpKind::Parameter {
            return false;
        }
    }

    // Re-validate interference across the prospective union.
    let result_class = class_members(unions, table, result_root);
    for &a in &result_class {
        for &b in &operand_class {
            if liveness.range(a).overlaps(&liveness.range(b)) {
                return false;
            }
        }
    }

    unions.union(result, operand);
    trace!(
        result = %table.value(result),
        operand = %table.value(operand),
        kind = %comp.operation(table.value(result).op).kind(),
        position,
        "reusing operand storage in place"
    );
    true
}

// =============================================================================
// Class construction and region assignment
// =============================================================================

fn build_classes(
    comp: &Computation,
    root: OpId,
    table: &ValueTable,
    liveness: &Liveness,
    unions: &mut UnionFind,
) -> (Vec<ClassInfo>, Vec<u32>) {
    let mut index_of_representative: HashMap<ValueId, usize> = HashMap::new();
    let mut classes: Vec<ClassInfo> = Vec::new();
    let mut class_of = vec![0u32; table.len()];

    for (value, logical) in table.values() {
        let representative = unions.find(value);
        let index = *index_of_representative.entry(representative).or_insert_with(|| {
            classes.push(ClassInfo {
                members: Vec::new(),
                bytes: 0,
                range: LiveRange { def: usize::MAX, last_use: 0 },
                is_parameter: false,
                is_output: false,
            });
            classes.len() - 1
        });
        class_of[value.index()] = index as u32;

        let range = liveness.range(value);
        let class = &mut classes[index];
        class.members.push(value);
        class.bytes = class.bytes.max(logical.bytes);
        class.range.def = class.range.def.min(range.def);
        class.range.last_use = class.range.last_use.max(range.last_use);
        class.is_parameter |= comp.operation(logical.op).kind() == OpKind::Parameter;
        class.is_output |= logical.op == root;
    }

    (classes, class_of)
}

/// Event in the region sweep; frees sort before allocations at one timestep
/// so a region retired at `t` is available to a class defined at `t`.
#[derive(Debug, Clone, Copy)]
struct RegionEvent {
    timestep: usize,
    is_alloc: bool,
    class: usize,
}

fn assign_regions(classes: &[ClassInfo]) -> (Vec<BufferSlice>, Vec<Allocation>, AssignmentStats) {
    let mut events = Vec::with_capacity(classes.len() * 2);
    for (index, class) in classes.iter().enumerate() {
        events.push(RegionEvent { timestep: class.range.def, is_alloc: true, class: index });
        // Parameter and output regions are never retired into the free pool.
        if !class.is_parameter && !class.is_output {
            events.push(RegionEvent { timestep: class.range.last_use + 1, is_alloc: false, class: index });
        }
    }
    events.sort_by_key(|e| (e.timestep, e.is_alloc, e.class));

    let mut allocations: Vec<Allocation> = Vec::new();
    let mut slices: Vec<Option<BufferSlice>> = vec![None; classes.len()];
    let mut free_regions: Vec<(AllocationId, usize)> = Vec::new();
    let mut stats = AssignmentStats::default();

    for event in events {
        let class = &classes[event.class];

        if !event.is_alloc {
            if let Some(slice) = slices[event.class] {
                let capacity = allocations[slice.allocation.index()].bytes;
                free_regions.push((slice.allocation, capacity));
            }
            continue;
        }

        let need = class.bytes;
        // Parameters always get dedicated storage; an output class may take
        // over a retired region since that region never retires again.
        let reusable = (!class.is_parameter).then(|| pick_free_region(&free_regions, need)).flatten();

        let allocation = match reusable {
            Some(index) => {
                let (id, capacity) = free_regions.remove(index);
                allocations[id.index()].is_output |= class.is_output;
                stats.regions_reused += 1;
                stats.bytes_reused += need;
                trace!(class = event.class, bytes = need, capacity, %id, "reusing retired region");
                id
            }
            None => {
                let id = AllocationId(allocations.len() as u32);
                allocations.push(Allocation {
                    bytes: need,
                    is_parameter: class.is_parameter,
                    is_output: class.is_output,
                });
                id
            }
        };

        slices[event.class] = Some(BufferSlice { allocation, offset: 0, bytes: need });
    }

    let slices: Vec<BufferSlice> =
        slices.into_iter().map(|slice| slice.expect("every class receives one allocation event")).collect();

    stats.allocations = allocations.len();
    stats.allocation_bytes = allocations.iter().map(|a| a.bytes).sum();

    (slices, allocations, stats)
}

/// Free-pool policy: exact byte-size match first, else the smallest
/// sufficient region; ties go to the earliest-created allocation. The policy
/// is deterministic but an optimization detail, not a correctness contract.
fn pick_free_region(free_regions: &[(AllocationId, usize)], need: usize) -> Option<usize> {
    let exact = free_regions
        .iter()
        .enumerate()
        .filter(|(_, (_, capacity))| *capacity == need)
        .min_by_key(|(_, (id, _))| *id)
        .map(|(index, _)| index);

    exact.or_else(|| {
        free_regions
            .iter()
            .enumerate()
            .filter(|(_, (_, capacity))| *capacity >= need)
            .min_by_key(|(_, (id, capacity))| (*capacity, *id))
            .map(|(index, _)| index)
    })
}
