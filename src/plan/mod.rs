use crate::cost::{CostEstimate, CostInputs, DatabaseEstimates, ScalarValueHint};
use crate::error::{PlanError, Result};
use crate::expr::{ColumnRef, Expr};
use crate::schema::{NodeSchema, SchemaLookup};
use crate::value::ValueType;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use traversal::DftPre;

mod aggregate;
mod join;
mod order;
mod projection;
mod scan;
mod tree;

pub use aggregate::{AggregateColumn, AggregateFunc, HashAggregateNode};
pub use join::{JoinType, NestLoopNode};
pub use order::{LimitNode, LimitValue, OrderByNode, SortDirection, SortKey};
pub use projection::{ProjectedColumn, ProjectionNode};
pub use scan::{
    MaterializedScanNode, SeqScanNode, MATERIALIZED_COLUMN_NAME, MATERIALIZED_TABLE_NAME,
};
pub use tree::PlanTree;

pub type NodeId = u32;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
pub enum PlanNodeType {
    #[strum(serialize = "SEQSCAN")]
    SeqScan,
    #[strum(serialize = "MATERIALIZEDSCAN")]
    MaterializedScan,
    #[strum(serialize = "NESTLOOP")]
    NestLoop,
    #[strum(serialize = "HASHAGGREGATE")]
    HashAggregate,
    #[strum(serialize = "ORDERBY")]
    OrderBy,
    #[strum(serialize = "LIMIT")]
    Limit,
    #[strum(serialize = "PROJECTION")]
    Projection,
}

/// Number of children a variant takes. Binary nodes order their children as (outer, inner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Leaf,
    Unary,
    Binary,
}

/// The contract every physical operator implements. A variant holds only its own payload; the
/// shared state (children, estimates, output schema) lives in `PlanNode`.
pub trait NodeVariant:
    Clone + Serialize + DeserializeOwned + Into<PlanNodeKind> + VariantPayload
{
    const NODE_TYPE: PlanNodeType;
    const ARITY: Arity;
    /// Whether replaying the operator over identical input always yields the same order.
    const ORDER_DETERMINISTIC: bool;
    /// Payload keys that must be present in a serialized node.
    const REQUIRED_FIELDS: &'static [&'static str];
    const OPTIONAL_FIELDS: &'static [&'static str] = &[];

    /// Structural invariants of the payload, checked on construction and on load.
    fn validate(&self) -> Result<()>;

    fn estimate(&self, inputs: &CostInputs<'_>) -> CostEstimate;

    /// Binds the payload's column references against the children's output schemas (in child
    /// order) and returns this node's output schema.
    fn resolve(
        &mut self,
        node: &str,
        inputs: &[&NodeSchema],
        lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema>;

    fn clear_resolution(&mut self);

    /// Every expression embedded in the payload.
    fn expressions(&self) -> Vec<&Expr>;

    fn explain(&self) -> String;
}

/// Typed access to one variant's payload inside a `PlanNodeKind`.
pub trait VariantPayload: Sized {
    fn payload_mut(kind: &mut PlanNodeKind) -> Option<&mut Self>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanNodeKind {
    SeqScan(SeqScanNode),
    MaterializedScan(MaterializedScanNode),
    NestLoop(NestLoopNode),
    HashAggregate(HashAggregateNode),
    OrderBy(OrderByNode),
    Limit(LimitNode),
    Projection(ProjectionNode),
}

macro_rules! dispatch {
    ($kind:expr, $variant:ident => $body:expr) => {
        match $kind {
            $crate::plan::PlanNodeKind::SeqScan($variant) => $body,
            $crate::plan::PlanNodeKind::MaterializedScan($variant) => $body,
            $crate::plan::PlanNodeKind::NestLoop($variant) => $body,
            $crate::plan::PlanNodeKind::HashAggregate($variant) => $body,
            $crate::plan::PlanNodeKind::OrderBy($variant) => $body,
            $crate::plan::PlanNodeKind::Limit($variant) => $body,
            $crate::plan::PlanNodeKind::Projection($variant) => $body,
        }
    };
}

pub(crate) use dispatch;

macro_rules! impl_from_variant {
    ($($case:ident($node:ty)),* $(,)?) => {
        $(
            impl From<$node> for PlanNodeKind {
                fn from(node: $node) -> Self {
                    Self::$case(node)
                }
            }

            impl VariantPayload for $node {
                fn payload_mut(kind: &mut PlanNodeKind) -> Option<&mut Self> {
                    match kind {
                        PlanNodeKind::$case(node) => Some(node),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_variant!(
    SeqScan(SeqScanNode),
    MaterializedScan(MaterializedScanNode),
    NestLoop(NestLoopNode),
    HashAggregate(HashAggregateNode),
    OrderBy(OrderByNode),
    Limit(LimitNode),
    Projection(ProjectionNode),
);

/// One physical operator and the subtree it exclusively owns.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    id: Option<NodeId>,
    kind: PlanNodeKind,
    children: Vec<PlanNode>,
    estimates: Option<CostEstimate>,
    output_schema: Option<NodeSchema>,
}

fn node_type_of<V: NodeVariant>(_: &V) -> PlanNodeType {
    V::NODE_TYPE
}

fn arity_of<V: NodeVariant>(_: &V) -> Arity {
    V::ARITY
}

fn order_deterministic_of<V: NodeVariant>(_: &V) -> bool {
    V::ORDER_DETERMINISTIC
}

impl Arity {
    pub fn count(&self) -> usize {
        match self {
            Self::Leaf => 0,
            Self::Unary => 1,
            Self::Binary => 2,
        }
    }
}

impl PlanNodeKind {
    pub fn node_type(&self) -> PlanNodeType {
        dispatch!(self, node => node_type_of(node))
    }

    pub fn arity(&self) -> Arity {
        dispatch!(self, node => arity_of(node))
    }

    pub fn is_order_deterministic(&self) -> bool {
        dispatch!(self, node => order_deterministic_of(node))
    }

    pub fn validate(&self) -> Result<()> {
        dispatch!(self, node => node.validate())
    }

    pub fn explain(&self) -> String {
        dispatch!(self, node => node.explain())
    }

    fn estimate(&self, inputs: &CostInputs<'_>) -> CostEstimate {
        dispatch!(self, node => node.estimate(inputs))
    }

    fn resolve(
        &mut self,
        label: &str,
        inputs: &[&NodeSchema],
        lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema> {
        dispatch!(self, node => node.resolve(label, inputs, lookup))
    }

    fn clear_resolution(&mut self) {
        dispatch!(self, node => node.clear_resolution())
    }

    pub fn expressions(&self) -> Vec<&Expr> {
        dispatch!(self, node => node.expressions())
    }

    /// Whether every column reference in the payload is bound.
    pub fn is_bound(&self) -> bool {
        self.expressions().iter().all(|expr| expr.is_resolved())
    }

    pub fn has_bindings(&self) -> bool {
        self.expressions().iter().any(|expr| expr.has_bindings())
    }
}

impl PlanNode {
    pub fn new(kind: impl Into<PlanNodeKind>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            children: vec![],
            estimates: None,
            output_schema: None,
        }
    }

    /// Reassembles a node read back from a document. The payload has already been validated.
    pub(crate) fn from_parts(
        id: Option<NodeId>,
        kind: PlanNodeKind,
        children: Vec<PlanNode>,
        estimates: Option<CostEstimate>,
        output_schema: Option<NodeSchema>,
    ) -> Result<Self> {
        let node = Self {
            id,
            kind,
            children,
            estimates,
            output_schema,
        };
        node.check_arity()?;
        let consistent = match node.output_schema {
            Some(_) => node.kind.is_bound(),
            None => !node.kind.has_bindings(),
        };
        if !consistent {
            return Err(PlanError::MalformedDocument(format!(
                "{}: column bindings disagree with the presence of an output schema",
                node.label()
            )));
        }
        Ok(node)
    }

    pub fn with_child(mut self, child: PlanNode) -> Result<Self> {
        self.add_child(child)?;
        Ok(self)
    }

    /// Appends a child. Fails if the variant already has all the children it accepts.
    pub fn add_child(&mut self, child: PlanNode) -> Result<()> {
        let arity = self.arity();
        if self.children.len() >= arity.count() {
            return Err(PlanError::ChildCount {
                node: self.label(),
                expected: arity,
                found: self.children.len() + 1,
            });
        }
        self.children.push(child);
        self.invalidate();
        Ok(())
    }

    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn node_type(&self) -> PlanNodeType {
        self.kind.node_type()
    }

    pub fn arity(&self) -> Arity {
        self.kind.arity()
    }

    pub fn kind(&self) -> &PlanNodeKind {
        &self.kind
    }

    /// Edits the payload of a node of variant `V`. The edit is applied to a copy and only
    /// committed if the copy still validates; the node type never changes. Any estimate or
    /// binding this node held is dropped.
    pub fn modify<V, F>(&mut self, f: F) -> Result<()>
    where
        V: NodeVariant,
        F: FnOnce(&mut V) -> Result<()>,
    {
        let label = self.label();
        let payload = V::payload_mut(&mut self.kind).ok_or_else(|| PlanError::NodeTypeMismatch {
            node: label,
            expected: V::NODE_TYPE,
        })?;
        let mut updated = payload.clone();
        f(&mut updated)?;
        updated.validate()?;
        *payload = updated;
        self.invalidate();
        Ok(())
    }

    pub fn children(&self) -> &[PlanNode] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&PlanNode> {
        self.children.get(index)
    }

    pub fn estimates(&self) -> Option<CostEstimate> {
        self.estimates
    }

    pub fn estimated_processed_tuple_count(&self) -> Option<u64> {
        self.estimates.map(|est| est.processed)
    }

    pub fn estimated_output_tuple_count(&self) -> Option<u64> {
        self.estimates.map(|est| est.output)
    }

    pub fn output_schema(&self) -> Option<&NodeSchema> {
        self.output_schema.as_ref()
    }

    pub fn is_estimated(&self) -> bool {
        self.estimates.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.output_schema.is_some() && self.kind.is_bound()
    }

    pub fn is_order_deterministic(&self) -> bool {
        self.kind.is_order_deterministic()
    }

    /// Short name used in errors and logs, e.g. `NESTLOOP[2]`.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{}[{}]", self.node_type(), id),
            None => self.node_type().to_string(),
        }
    }

    /// Iterates over this node and its descendants in pre-order.
    pub fn iter_tree<'a>(&'a self) -> impl Iterator<Item = &'a Self> {
        DftPre::new(self, |node: &'a Self| node.children.iter()).map(|(_, node)| node)
    }

    /// Estimates this node from its children's estimates, which must already be present.
    pub fn compute_cost_estimates(
        &mut self,
        stats: &DatabaseEstimates,
        hints: &[ScalarValueHint],
    ) -> Result<CostEstimate> {
        let children = self
            .children
            .iter()
            .enumerate()
            .map(|(child_index, child)| {
                child.estimates.ok_or_else(|| PlanError::ChildNotEstimated {
                    node: self.label(),
                    child_index,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let inputs = CostInputs {
            child_output: children.first().map(|est| est.output).unwrap_or(0),
            children: &children,
            stats,
            hints,
        };
        let estimate = self.kind.estimate(&inputs);
        debug!("estimated {}: {}", self.label(), estimate);
        self.estimates = Some(estimate);
        Ok(estimate)
    }

    pub(crate) fn compute_estimates_recursively(
        &mut self,
        stats: &DatabaseEstimates,
        hints: &[ScalarValueHint],
    ) -> Result<()> {
        for child in self.children.iter_mut() {
            child.compute_estimates_recursively(stats, hints)?;
        }
        self.compute_cost_estimates(stats, hints)?;
        Ok(())
    }

    /// Binds this node's column references against its children's output schemas, which must
    /// already be resolved, and records the node's own output schema.
    pub fn resolve_column_indexes(&mut self, lookup: &dyn SchemaLookup) -> Result<()> {
        self.check_arity()?;
        let label = self.label();
        let inputs = self
            .children
            .iter()
            .enumerate()
            .map(|(child_index, child)| {
                child
                    .output_schema
                    .as_ref()
                    .ok_or_else(|| PlanError::ChildNotResolved {
                        node: label.clone(),
                        child_index,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let schema = match self.kind.resolve(&label, &inputs, lookup) {
            Ok(schema) => schema,
            Err(err) => {
                // Drop whatever was bound before the failure.
                self.kind.clear_resolution();
                self.output_schema = None;
                return Err(err);
            }
        };
        debug!("resolved {}: {}", label, schema);
        self.output_schema = Some(schema);
        Ok(())
    }

    pub(crate) fn resolve_recursively(&mut self, lookup: &dyn SchemaLookup) -> Result<()> {
        for child in self.children.iter_mut() {
            child.resolve_recursively(lookup)?;
        }
        self.resolve_column_indexes(lookup)
    }

    /// Human-readable description of the subtree, one line per node, children indented by two
    /// spaces under their parent.
    pub fn explain_text(&self, indent: &str) -> String {
        let mut out = format!("{}{}", indent, self.kind.explain());
        if let Some(estimates) = &self.estimates {
            out.push_str(&format!(" ({})", estimates));
        }
        out.push('\n');
        let child_indent = format!("{}  ", indent);
        for child in &self.children {
            out.push_str(&child.explain_text(&child_indent));
        }
        out
    }

    pub(crate) fn check_arity(&self) -> Result<()> {
        let arity = self.arity();
        if self.children.len() != arity.count() {
            return Err(PlanError::ChildCount {
                node: self.label(),
                expected: arity,
                found: self.children.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn assign_ids(&mut self, next_id: &mut NodeId) {
        self.id = Some(*next_id);
        *next_id += 1;
        for child in self.children.iter_mut() {
            child.assign_ids(next_id);
        }
    }

    /// Forgets every estimate and binding in the subtree.
    pub(crate) fn clear_passes(&mut self) {
        self.invalidate();
        for child in self.children.iter_mut() {
            child.clear_passes();
        }
    }

    /// Mutable access to the children, for rewrites. This node's estimate and binding are
    /// dropped; arity is checked again by `PlanTree::freeze_shape` and column resolution.
    pub fn children_mut(&mut self) -> &mut Vec<PlanNode> {
        self.invalidate();
        &mut self.children
    }

    fn invalidate(&mut self) {
        self.estimates = None;
        self.output_schema = None;
        self.kind.clear_resolution();
    }
}

/// Checks an expression embedded in a node of type `node_type`.
pub(crate) fn check_expr(node_type: PlanNodeType, expr: &Expr) -> Result<()> {
    expr.validate()
        .map_err(|reason| PlanError::InvalidExpression { node_type, reason })
}

/// Like `check_expr`, but also rejects multi-valued expressions.
pub(crate) fn check_scalar(node_type: PlanNodeType, expr: &Expr) -> Result<()> {
    check_expr(node_type, expr)?;
    if expr.is_multi_valued() {
        return Err(PlanError::InvalidExpression {
            node_type,
            reason: format!("expected a single value, got {}", expr),
        });
    }
    Ok(())
}

pub(crate) fn check_predicate(node_type: PlanNodeType, expr: &Expr) -> Result<()> {
    check_scalar(node_type, expr)?;
    if expr.value_type() != ValueType::Boolean {
        return Err(PlanError::InvalidExpression {
            node_type,
            reason: format!("predicate is not boolean: {}", expr),
        });
    }
    Ok(())
}

/// Binds each column reference to the first input schema containing it. The tuple index of
/// the binding is the position of that schema in `inputs`.
pub(crate) fn bind_columns(expr: &mut Expr, node: &str, inputs: &[&NodeSchema]) -> Result<()> {
    expr.resolve_columns(&mut |col: &mut ColumnRef| {
        let found = inputs.iter().enumerate().find_map(|(tuple_idx, schema)| {
            schema
                .index_of(&col.table_alias, &col.column_name)
                .map(|column_idx| (tuple_idx, column_idx))
        });
        match found {
            Some((tuple_idx, column_idx)) => {
                col.bind(tuple_idx, column_idx);
                Ok(())
            }
            None => Err(PlanError::ColumnNotFound {
                node: node.to_string(),
                column: col.to_string(),
            }),
        }
    })
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count())
    }
}

impl From<&PlanNode> for termtree::Tree<String> {
    fn from(node: &PlanNode) -> Self {
        let label = match &node.estimates {
            Some(estimates) => format!("{} ({})", node.kind.explain(), estimates),
            None => node.kind.explain(),
        };
        Self::new(label).with_leaves(node.children.iter())
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", termtree::Tree::<String>::from(self))
    }
}
