//! Logical value enumeration.
//!
//! A logical value is one array-shaped output position of one operation,
//! identified by `(OpId, ValuePath)`. Tuple-shaped positions are containers,
//! not values; only their array leaves carry storage. The table also records
//! which values are pass-through forwards of another value (views and tuple
//! plumbing) so the allocator can seed its equivalence classes, but it makes
//! no allocation decisions itself.

use std::collections::HashMap;

use veles_ir::{Computation, Op, OpId, ValuePath};

/// Index of a logical value within a [`ValueTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

/// One addressable output position of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalValue {
    pub op: OpId,
    pub path: ValuePath,
    /// Flat storage size of the position in bytes.
    pub bytes: usize,
}

impl std::fmt::Display for LogicalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.op, self.path)
    }
}

/// Every logical value of a computation, in operation order.
#[derive(Debug)]
pub struct ValueTable {
    values: Vec<LogicalValue>,
    by_position: HashMap<(OpId, ValuePath), ValueId>,
    /// Per-operation contiguous spans into `values`, indexed by `OpId`.
    spans: Vec<(u32, u32)>,
    /// Pass-through pairs `(forwarding value, source value)`.
    forwards: Vec<(ValueId, ValueId)>,
}

impl ValueTable {
    /// Enumerate the logical values of `comp`, including all nested tuple
    /// positions.
    pub fn build(comp: &Computation) -> Self {
        let mut values = Vec::new();
        let mut by_position = HashMap::new();
        let mut spans = Vec::with_capacity(comp.len());

        for (id, operation) in comp.ops() {
            let start = values.len() as u32;
            for path in operation.shape().leaf_paths() {
                let bytes = operation.shape().sub_shape(&path).and_then(|s| s.byte_size()).unwrap_or(0);
                let value_id = ValueId(values.len() as u32);
                by_position.insert((id, path.clone()), value_id);
                values.push(LogicalValue { op: id, path, bytes });
            }
            spans.push((start, values.len() as u32));
        }

        let mut table = Self { values, by_position, spans, forwards: Vec::new() };
        table.forwards = table.collect_forwards(comp);
        table
    }

    /// Pass-through pairs: a view's value forwards its input's value at the
    /// matching position, a tuple's nested positions forward the element
    /// values, and a tuple-element extraction forwards the selected subtree.
    fn collect_forwards(&self, comp: &Computation) -> Vec<(ValueId, ValueId)> {
        let mut forwards = Vec::new();

        for (id, operation) in comp.ops() {
            match operation.op() {
                Op::Bitcast { input } | Op::Reshape { input } => {
                    if let (Some(view), Some(source)) =
                        (self.lookup(id, &ValuePath::root()), self.lookup(*input, &ValuePath::root()))
                    {
                        forwards.push((view, source));
                    }
                }
                Op::GetTupleElement { input, index } => {
                    for view in self.values_of(id) {
                        let source_path = self.value(view).path.nested_under(*index);
                        if let Some(source) = self.lookup(*input, &source_path) {
                            forwards.push((view, source));
                        }
                    }
                }
                Op::Tuple { elements } => {
                    for (i, &element) in elements.iter().enumerate() {
                        for source in self.values_of(element) {
                            let view_path = self.value(source).path.nested_under(i);
                            if let Some(view) = self.lookup(id, &view_path) {
                                forwards.push((view, source));
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        forwards
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, id: ValueId) -> &LogicalValue {
        &self.values[id.index()]
    }

    pub fn values(&self) -> impl Iterator<Item = (ValueId, &LogicalValue)> {
        self.values.iter().enumerate().map(|(i, v)| (ValueId(i as u32), v))
    }

    /// Value at an exact `(operation, position)` pair.
    pub fn lookup(&self, op: OpId, path: &ValuePath) -> Option<ValueId> {
        self.by_position.get(&(op, path.clone())).copied()
    }

    /// All values produced by one operation.
    pub fn values_of(&self, op: OpId) -> impl Iterator<Item = ValueId> + '_ {
        let (start, end) = self.spans.get(op.index()).copied().unwrap_or((0, 0));
        (start..end).map(ValueId)
    }

    pub fn forwards(&self) -> &[(ValueId, ValueId)] {
        &self.forwards
    }
}
