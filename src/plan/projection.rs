use super::{bind_columns, check_scalar, Arity, NodeVariant, PlanNodeType};
use crate::cost::{CostEstimate, CostInputs};
use crate::error::{PlanError, Result};
use crate::expr::Expr;
use crate::schema::{NodeSchema, SchemaColumn, SchemaLookup, TEMP_TABLE_NAME};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProjectedColumn {
    expr: Expr,
    alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProjectionNode {
    columns: Vec<ProjectedColumn>,
}

impl ProjectedColumn {
    pub fn new(expr: Expr, alias: &str) -> Self {
        Self {
            expr,
            alias: alias.to_string(),
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl ProjectionNode {
    pub fn new(columns: Vec<ProjectedColumn>) -> Result<Self> {
        let node = Self { columns };
        node.validate()?;
        Ok(node)
    }

    pub fn columns(&self) -> &[ProjectedColumn] {
        &self.columns
    }
}

impl NodeVariant for ProjectionNode {
    const NODE_TYPE: PlanNodeType = PlanNodeType::Projection;
    const ARITY: Arity = Arity::Unary;
    const ORDER_DETERMINISTIC: bool = true;
    const REQUIRED_FIELDS: &'static [&'static str] = &["COLUMNS"];

    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(PlanError::InvalidPayload {
                node_type: Self::NODE_TYPE,
                reason: "no output columns".to_string(),
            });
        }
        if let Some(column) = self.columns.iter().find(|column| column.alias.is_empty()) {
            return Err(PlanError::InvalidPayload {
                node_type: Self::NODE_TYPE,
                reason: format!("column {} has no alias", column.expr),
            });
        }
        if let Some(alias) = self
            .columns
            .iter()
            .map(|column| &column.alias)
            .duplicates()
            .next()
        {
            return Err(PlanError::InvalidPayload {
                node_type: Self::NODE_TYPE,
                reason: format!("duplicate alias {}", alias),
            });
        }
        self.columns
            .iter()
            .try_for_each(|column| check_scalar(Self::NODE_TYPE, &column.expr))
    }

    fn estimate(&self, inputs: &CostInputs<'_>) -> CostEstimate {
        CostEstimate::new(inputs.child_output, inputs.child_output)
    }

    fn resolve(
        &mut self,
        node: &str,
        inputs: &[&NodeSchema],
        _lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema> {
        for column in self.columns.iter_mut() {
            bind_columns(&mut column.expr, node, inputs)?;
        }
        Ok(NodeSchema::new(
            self.columns
                .iter()
                .map(|column| {
                    SchemaColumn::new(TEMP_TABLE_NAME, &column.alias, column.expr.value_type())
                })
                .collect(),
        ))
    }

    fn clear_resolution(&mut self) {
        for column in self.columns.iter_mut() {
            column.expr.clear_resolution();
        }
    }

    fn expressions(&self) -> Vec<&Expr> {
        self.columns.iter().map(|column| &column.expr).collect()
    }

    fn explain(&self) -> String {
        format!("PROJECTION ({})", self.columns.iter().join(", "))
    }
}

impl fmt::Display for ProjectedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS {}", self.expr, self.alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanNode;
    use crate::test_utils;
    use crate::value::ValueType;

    #[test]
    fn rejects_bad_columns() {
        assert!(ProjectionNode::new(vec![]).is_err());
        assert!(ProjectionNode::new(vec![ProjectedColumn::new(
            Expr::column("o", "id", ValueType::BigInt),
            ""
        )])
        .is_err());
        assert!(ProjectionNode::new(vec![
            ProjectedColumn::new(Expr::column("o", "id", ValueType::BigInt), "x"),
            ProjectedColumn::new(Expr::column("o", "total", ValueType::Float), "x"),
        ])
        .is_err());
    }

    #[test]
    fn resolves_against_child() {
        let catalog = test_utils::sample_catalog();
        let mut node = PlanNode::new(
            ProjectionNode::new(vec![
                ProjectedColumn::new(Expr::column("o", "total", ValueType::Float), "amount"),
                ProjectedColumn::new(Expr::column("o", "id", ValueType::BigInt), "order_id"),
            ])
            .unwrap(),
        )
        .with_child(test_utils::seq_scan("orders", "o"))
        .unwrap();
        node.children_mut()[0]
            .resolve_column_indexes(&catalog)
            .unwrap();
        node.resolve_column_indexes(&catalog).unwrap();

        assert_eq!(
            node.output_schema().unwrap().to_string(),
            "(temp_table.amount, temp_table.order_id)"
        );
        assert_eq!(
            node.kind().explain(),
            "PROJECTION (o.total AS amount, o.id AS order_id)"
        );
    }
}
