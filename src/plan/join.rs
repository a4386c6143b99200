use super::{bind_columns, check_predicate, Arity, NodeVariant, PlanNodeType};
use crate::cost::{self, CostEstimate, CostInputs};
use crate::error::Result;
use crate::expr::Expr;
use crate::schema::{NodeSchema, SchemaLookup};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinType {
    Inner,
    Left,
}

/// Nested-loop join. Child 0 is the outer input and child 1 the inner input, which is
/// re-scanned for every outer tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NestLoopNode {
    join_type: JoinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_predicate: Option<Expr>,
}

impl NestLoopNode {
    pub fn new(join_type: JoinType) -> Self {
        Self {
            join_type,
            join_predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Result<Self> {
        check_predicate(Self::NODE_TYPE, &predicate)?;
        self.join_predicate = Some(predicate);
        Ok(self)
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn join_predicate(&self) -> Option<&Expr> {
        self.join_predicate.as_ref()
    }
}

impl NodeVariant for NestLoopNode {
    const NODE_TYPE: PlanNodeType = PlanNodeType::NestLoop;
    const ARITY: Arity = Arity::Binary;
    const ORDER_DETERMINISTIC: bool = true;
    const REQUIRED_FIELDS: &'static [&'static str] = &["JOIN_TYPE"];
    const OPTIONAL_FIELDS: &'static [&'static str] = &["JOIN_PREDICATE"];

    fn validate(&self) -> Result<()> {
        match &self.join_predicate {
            Some(predicate) => check_predicate(Self::NODE_TYPE, predicate),
            None => Ok(()),
        }
    }

    fn estimate(&self, inputs: &CostInputs<'_>) -> CostEstimate {
        let outer = inputs.child_output;
        let inner = inputs.children.get(1).map(|est| est.output).unwrap_or(0);
        let processed = outer.saturating_mul(inner);
        let output = match self.join_predicate {
            Some(_) => cost::apply_selectivity(processed, inputs.stats.join_selectivity()),
            None => processed,
        };
        let output = match self.join_type {
            JoinType::Inner => output,
            JoinType::Left => output.max(outer),
        };
        CostEstimate::new(processed, output)
    }

    fn resolve(
        &mut self,
        node: &str,
        inputs: &[&NodeSchema],
        _lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema> {
        if let Some(predicate) = &mut self.join_predicate {
            bind_columns(predicate, node, inputs)?;
        }
        Ok(inputs[0].join(inputs[1]))
    }

    fn clear_resolution(&mut self) {
        if let Some(predicate) = &mut self.join_predicate {
            predicate.clear_resolution();
        }
    }

    fn expressions(&self) -> Vec<&Expr> {
        self.join_predicate.iter().collect()
    }

    fn explain(&self) -> String {
        match &self.join_predicate {
            Some(predicate) => format!("NESTLOOP {} JOIN on {}", self.join_type, predicate),
            None => format!("NESTLOOP {} JOIN", self.join_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::DatabaseEstimates;
    use crate::error::PlanError;
    use crate::plan::{PlanNode, PlanNodeKind, MATERIALIZED_COLUMN_NAME, MATERIALIZED_TABLE_NAME};
    use crate::test_utils;
    use crate::value::ValueType;

    fn inputs<'a>(children: &'a [CostEstimate], stats: &'a DatabaseEstimates) -> CostInputs<'a> {
        CostInputs {
            child_output: children[0].output,
            children,
            stats,
            hints: &[],
        }
    }

    #[test]
    fn estimate_multiplies_inputs() {
        let stats = DatabaseEstimates::default();
        let children = [CostEstimate::new(100, 100), CostEstimate::new(1, 1)];
        let cross = NestLoopNode::new(JoinType::Inner);
        assert_eq!(
            cross.estimate(&inputs(&children, &stats)),
            CostEstimate::new(100, 100)
        );

        let children = [CostEstimate::new(100, 100), CostEstimate::new(5, 5)];
        let joined = test_utils::in_list_join_payload();
        assert_eq!(
            joined.estimate(&inputs(&children, &stats)),
            CostEstimate::new(500, 50)
        );
    }

    #[test]
    fn left_join_keeps_outer_rows() {
        let stats = DatabaseEstimates::default();
        let children = [CostEstimate::new(40, 40), CostEstimate::new(1, 1)];
        let join = NestLoopNode::new(JoinType::Left)
            .with_predicate(test_utils::in_list_join_predicate())
            .unwrap();
        assert_eq!(
            join.estimate(&inputs(&children, &stats)),
            CostEstimate::new(40, 40)
        );
    }

    #[test]
    fn resolve_binds_outer_then_inner() {
        let catalog = test_utils::sample_catalog();
        let mut join = test_utils::join_over_in_list(&[1, 2, 3]);
        for child in join.children_mut() {
            child.resolve_column_indexes(&catalog).unwrap();
        }
        join.resolve_column_indexes(&catalog).unwrap();

        let PlanNodeKind::NestLoop(nest_loop) = join.kind() else {
            panic!("not a nest loop");
        };
        let bindings = nest_loop
            .join_predicate()
            .unwrap()
            .column_refs()
            .map(|col| (col.tuple_idx.unwrap(), col.column_idx.unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(bindings, vec![(0, 0), (1, 0)]);

        let schema = join.output_schema().unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(
            schema.index_of(MATERIALIZED_TABLE_NAME, MATERIALIZED_COLUMN_NAME),
            Some(3)
        );
    }

    #[test]
    fn resolve_reports_missing_column() {
        let catalog = test_utils::sample_catalog();
        let mut join = PlanNode::new(
            NestLoopNode::new(JoinType::Inner)
                .with_predicate(Expr::equals(
                    Expr::column("c", "id", ValueType::BigInt),
                    Expr::column("o", "customer_id", ValueType::BigInt),
                ))
                .unwrap(),
        )
        .with_child(test_utils::seq_scan("customers", "c"))
        .and_then(|join| join.with_child(test_utils::in_list_scan(&[1])))
        .unwrap();
        for child in join.children_mut() {
            child.resolve_column_indexes(&catalog).unwrap();
        }
        assert!(matches!(
            join.resolve_column_indexes(&catalog).unwrap_err(),
            PlanError::ColumnNotFound { column, .. } if column == "o.customer_id"
        ));
    }

    #[test]
    fn explain_mentions_predicate() {
        assert_eq!(
            test_utils::in_list_join_payload().explain(),
            "NESTLOOP INNER JOIN on c.id = materialized_temp_table.list_element"
        );
    }
}
