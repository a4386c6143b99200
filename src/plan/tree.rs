use super::{NodeId, PlanNode, PlanNodeType};
use crate::cost::{DatabaseEstimates, ScalarValueHint};
use crate::error::{PlanError, Result};
use crate::schema::SchemaLookup;
use log::info;
use std::fmt;

/// A rooted plan. Owns every node and tracks where the tree is in its lifecycle:
/// built, estimated, shape frozen, resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTree {
    root: PlanNode,
    shape_final: bool,
}

impl PlanTree {
    /// Takes ownership of `root` and numbers its nodes in pre-order starting at 1.
    pub fn new(mut root: PlanNode) -> Self {
        Self::number(&mut root);
        Self {
            root,
            shape_final: false,
        }
    }

    pub(crate) fn from_parts(root: PlanNode, shape_final: bool) -> Self {
        Self { root, shape_final }
    }

    fn number(root: &mut PlanNode) {
        let mut next_id: NodeId = 1;
        root.assign_ids(&mut next_id);
    }

    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    pub fn into_root(self) -> PlanNode {
        self.root
    }

    /// Hands out the root for restructuring. Whatever `f` does, every estimate and binding
    /// is discarded afterwards, the shape is unfrozen and ids are reassigned.
    pub fn rewrite<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut PlanNode) -> Result<()>,
    {
        let result = f(&mut self.root);
        self.root.clear_passes();
        self.shape_final = false;
        Self::number(&mut self.root);
        result
    }

    /// Checks that every node has exactly the children its variant takes, then forbids
    /// further restructuring until the next `rewrite`.
    pub fn freeze_shape(&mut self) -> Result<()> {
        for node in self.root.iter_tree() {
            node.check_arity()?;
        }
        self.shape_final = true;
        Ok(())
    }

    pub fn compute_cost_estimates(
        &mut self,
        stats: &DatabaseEstimates,
        hints: &[ScalarValueHint],
    ) -> Result<()> {
        self.root.compute_estimates_recursively(stats, hints)?;
        info!(
            "estimated {} nodes, root output {}",
            self.node_count(),
            self.root.estimated_output_tuple_count().unwrap_or(0)
        );
        Ok(())
    }

    pub fn resolve_column_indexes(&mut self, lookup: &dyn SchemaLookup) -> Result<()> {
        if !self.shape_final {
            return Err(PlanError::ShapeNotFinal);
        }
        self.root.resolve_recursively(lookup)?;
        info!("resolved {} nodes", self.node_count());
        Ok(())
    }

    pub fn is_shape_final(&self) -> bool {
        self.shape_final
    }

    pub fn is_estimated(&self) -> bool {
        self.iter().all(PlanNode::is_estimated)
    }

    pub fn is_resolved(&self) -> bool {
        self.iter().all(PlanNode::is_resolved)
    }

    /// Ready to hand to the executor.
    pub fn is_final(&self) -> bool {
        self.shape_final && self.is_estimated() && self.is_resolved()
    }

    pub fn is_order_deterministic(&self) -> bool {
        self.iter().all(PlanNode::is_order_deterministic)
    }

    pub fn nondeterministic_nodes(&self) -> Vec<&PlanNode> {
        self.iter()
            .filter(|node| !node.is_order_deterministic())
            .collect()
    }

    pub fn find_nodes_of_type(&self, node_type: PlanNodeType) -> Vec<&PlanNode> {
        self.iter()
            .filter(|node| node.node_type() == node_type)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanNode> {
        self.root.iter_tree()
    }

    pub fn explain(&self) -> String {
        self.root.explain_text("")
    }
}

impl fmt::Display for PlanTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}
