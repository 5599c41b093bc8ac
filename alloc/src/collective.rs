//! Resolution of declared input/output aliases.
//!
//! Declarations are applied before general coalescing runs, seeding forced
//! unions the allocator must honor. For a collective whose result is a tuple,
//! result position `{i}` lines up with operand `i` in declaration order, so a
//! multi-operand all-reduce with one declaration per operand ends up with one
//! independent class per pair and no cross-aliasing. Offsets are not computed
//! here.

use snafu::ensure;
use tracing::{debug, trace};
use veles_ir::{AliasDeclaration, Computation};

use crate::error::*;
use crate::liveness::Liveness;
use crate::union::UnionFind;
use crate::value::{ValueId, ValueTable};

/// Apply every declaration of `comp`'s alias config, in declaration order.
///
/// Both `may` and `must` declarations force a union; a size mismatch means
/// the declaration itself is malformed and is fatal for either kind. After
/// each union the merged class is re-checked for interference: a declaration
/// that forces two values live at the same time into one region is
/// unsatisfiable and aborts the assignment.
pub fn seed_declared_aliases(
    comp: &Computation,
    table: &ValueTable,
    liveness: &Liveness,
    unions: &mut UnionFind,
) -> Result<()> {
    let Some(root) = comp.root() else {
        return EmptyComputationSnafu { name: comp.name().to_string() }.fail();
    };

    for declaration in comp.alias_config().iter() {
        let parameter_op = comp.parameter_id(declaration.parameter).ok_or_else(|| {
            MalformedDeclarationSnafu { declaration: declaration.clone(), reason: "no such entry parameter" }.build()
        })?;

        let parameter_value = table.lookup(parameter_op, &declaration.parameter_path).ok_or_else(|| {
            MalformedDeclarationSnafu {
                declaration: declaration.clone(),
                reason: "parameter position does not exist",
            }
            .build()
        })?;

        let output_value = table.lookup(root, &declaration.output_path).ok_or_else(|| {
            MalformedDeclarationSnafu { declaration: declaration.clone(), reason: "output position does not exist" }
                .build()
        })?;

        let parameter_bytes = table.value(parameter_value).bytes;
        let output_bytes = table.value(output_value).bytes;
        ensure!(
            parameter_bytes == output_bytes,
            AliasSizeMismatchSnafu { declaration: declaration.clone(), parameter_bytes, output_bytes }
        );

        force_union(declaration, parameter_value, output_value, table, liveness, unions)?;

        trace!(
            declaration = %declaration,
            parameter = %table.value(parameter_value),
            output = %table.value(output_value),
            "seeded declared alias"
        );
    }

    if !comp.alias_config().is_empty() {
        debug!(declarations = comp.alias_config().len(), "alias resolution complete");
    }

    Ok(())
}

/// Union the two classes, re-validating interference across the merge.
fn force_union(
    declaration: &AliasDeclaration,
    a: ValueId,
    b: ValueId,
    table: &ValueTable,
    liveness: &Liveness,
    unions: &mut UnionFind,
) -> Result<()> {
    let ra = unions.find(a);
    let rb = unions.find(b);
    if ra == rb {
        return Ok(());
    }

    let members_a = class_members(unions, table, ra);
    let members_b = class_members(unions, table, rb);

    for &ma in &members_a {
        for &mb in &members_b {
            let range_a = liveness.range(ma);
            let range_b = liveness.range(mb);
            if range_a.overlaps(&range_b) {
                // Fatal for may-alias too: honoring the contract would
                // clobber a live value.
                return UnsatisfiableAliasSnafu {
                    declaration: declaration.clone(),
                    a: table.value(ma).to_string(),
                    b: table.value(mb).to_string(),
                }
                .fail();
            }
        }
    }

    unions.union(a, b);
    Ok(())
}

/// All values currently in the class of `representative`.
pub(crate) fn class_members(unions: &mut UnionFind, table: &ValueTable, representative: ValueId) -> Vec<ValueId> {
    (0..table.len())
        .map(ValueId::from_index)
        .filter(|&v| unions.find(v) == representative)
        .collect()
}
