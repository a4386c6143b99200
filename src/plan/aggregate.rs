use super::{bind_columns, check_scalar, Arity, NodeVariant, PlanNodeType};
use crate::cost::{self, CostEstimate, CostInputs};
use crate::error::{PlanError, Result};
use crate::expr::Expr;
use crate::schema::{NodeSchema, SchemaColumn, SchemaLookup, TEMP_TABLE_NAME};
use crate::value::ValueType;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunc {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AggregateColumn {
    func: AggregateFunc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<Expr>,
    #[serde(default)]
    distinct: bool,
    output_name: String,
}

/// Hash aggregation. Output columns are the group-by keys followed by the aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HashAggregateNode {
    #[serde(default)]
    group_by: Vec<Expr>,
    aggregates: Vec<AggregateColumn>,
}

impl AggregateFunc {
    fn output_type(&self, input_type: Option<ValueType>) -> ValueType {
        match (self, input_type) {
            (Self::CountStar | Self::Count, _) => ValueType::BigInt,
            (Self::Avg, _) => ValueType::Float,
            (Self::Sum, Some(input_type)) if input_type.is_integral() => ValueType::BigInt,
            (Self::Sum, _) => ValueType::Float,
            (Self::Min | Self::Max, Some(input_type)) => input_type,
            (Self::Min | Self::Max, None) => ValueType::Null,
        }
    }
}

impl AggregateColumn {
    pub fn new(func: AggregateFunc, input: Option<Expr>, output_name: &str) -> Self {
        Self {
            func,
            input,
            distinct: false,
            output_name: output_name.to_string(),
        }
    }

    pub fn count_star(output_name: &str) -> Self {
        Self::new(AggregateFunc::CountStar, None, output_name)
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn func(&self) -> AggregateFunc {
        self.func
    }

    pub fn input(&self) -> Option<&Expr> {
        self.input.as_ref()
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn output_type(&self) -> ValueType {
        self.func
            .output_type(self.input.as_ref().map(|input| input.value_type()))
    }

    fn validate(&self, node_type: PlanNodeType) -> Result<()> {
        let invalid = |reason: String| PlanError::InvalidPayload { node_type, reason };
        if self.output_name.is_empty() {
            return Err(invalid(format!("{} has no output name", self.func)));
        }
        match (&self.input, self.func) {
            (Some(_), AggregateFunc::CountStar) => {
                Err(invalid(format!("{} takes no input", self.func)))
            }
            (None, AggregateFunc::CountStar) => Ok(()),
            (None, func) => Err(invalid(format!("{} requires an input", func))),
            (Some(input), func) => {
                check_scalar(node_type, input)?;
                if matches!(func, AggregateFunc::Sum | AggregateFunc::Avg)
                    && !input.value_type().is_numeric()
                {
                    return Err(invalid(format!("{} over non-numeric {}", func, input)));
                }
                Ok(())
            }
        }
    }
}

impl HashAggregateNode {
    pub fn new(group_by: Vec<Expr>, aggregates: Vec<AggregateColumn>) -> Result<Self> {
        let node = Self {
            group_by,
            aggregates,
        };
        node.validate()?;
        Ok(node)
    }

    pub fn group_by(&self) -> &[Expr] {
        &self.group_by
    }

    pub fn aggregates(&self) -> &[AggregateColumn] {
        &self.aggregates
    }

    fn group_by_column(index: usize, expr: &Expr) -> SchemaColumn {
        match expr {
            // Plain column keys keep their name so upper nodes can keep referring to them.
            Expr::Column(col) => SchemaColumn::new(&col.table_alias, &col.column_name, col.value_type),
            _ => SchemaColumn::new(TEMP_TABLE_NAME, &format!("group_{}", index), expr.value_type()),
        }
    }
}

impl NodeVariant for HashAggregateNode {
    const NODE_TYPE: PlanNodeType = PlanNodeType::HashAggregate;
    const ARITY: Arity = Arity::Unary;
    // Groups come out in hash-table order.
    const ORDER_DETERMINISTIC: bool = false;
    const REQUIRED_FIELDS: &'static [&'static str] = &["AGGREGATES"];
    const OPTIONAL_FIELDS: &'static [&'static str] = &["GROUP_BY"];

    fn validate(&self) -> Result<()> {
        if self.group_by.is_empty() && self.aggregates.is_empty() {
            return Err(PlanError::InvalidPayload {
                node_type: Self::NODE_TYPE,
                reason: "no group-by keys and no aggregates".to_string(),
            });
        }
        for expr in &self.group_by {
            check_scalar(Self::NODE_TYPE, expr)?;
        }
        for aggregate in &self.aggregates {
            aggregate.validate(Self::NODE_TYPE)?;
        }
        Ok(())
    }

    fn estimate(&self, inputs: &CostInputs<'_>) -> CostEstimate {
        let processed = inputs.child_output;
        let output = if self.group_by.is_empty() {
            1
        } else if processed == 0 {
            0
        } else {
            cost::apply_selectivity(processed, inputs.stats.group_reduction_factor()).max(1)
        };
        CostEstimate::new(processed, output)
    }

    fn resolve(
        &mut self,
        node: &str,
        inputs: &[&NodeSchema],
        _lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema> {
        for expr in self.group_by.iter_mut() {
            bind_columns(expr, node, inputs)?;
        }
        for input in self
            .aggregates
            .iter_mut()
            .filter_map(|aggregate| aggregate.input.as_mut())
        {
            bind_columns(input, node, inputs)?;
        }

        let columns = self
            .group_by
            .iter()
            .enumerate()
            .map(|(index, expr)| Self::group_by_column(index, expr))
            .chain(self.aggregates.iter().map(|aggregate| {
                SchemaColumn::new(
                    TEMP_TABLE_NAME,
                    &aggregate.output_name,
                    aggregate.output_type(),
                )
            }))
            .collect();
        Ok(NodeSchema::new(columns))
    }

    fn clear_resolution(&mut self) {
        for expr in self.group_by.iter_mut() {
            expr.clear_resolution();
        }
        for input in self
            .aggregates
            .iter_mut()
            .filter_map(|aggregate| aggregate.input.as_mut())
        {
            input.clear_resolution();
        }
    }

    fn expressions(&self) -> Vec<&Expr> {
        self.group_by
            .iter()
            .chain(
                self.aggregates
                    .iter()
                    .filter_map(|aggregate| aggregate.input.as_ref()),
            )
            .collect()
    }

    fn explain(&self) -> String {
        let mut out = format!("HASH AGGREGATE {}", self.aggregates.iter().join(", "));
        if !self.group_by.is_empty() {
            out.push_str(&format!(" GROUP BY {}", self.group_by.iter().join(", ")));
        }
        out
    }
}

impl fmt::Display for AggregateColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        match &self.input {
            Some(input) => write!(
                f,
                "{}({}{}) AS {}",
                self.func, distinct, input, self.output_name
            ),
            None => write!(f, "{}(*) AS {}", self.func, self.output_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::DatabaseEstimates;
    use crate::plan::PlanNode;
    use crate::test_utils;

    fn unary_inputs(child_output: u64, stats: &DatabaseEstimates) -> CostInputs<'_> {
        CostInputs {
            child_output,
            children: &[],
            stats,
            hints: &[],
        }
    }

    fn total() -> Expr {
        Expr::column("o", "total", ValueType::Float)
    }

    #[test]
    fn rejects_malformed_aggregates() {
        assert!(HashAggregateNode::new(vec![], vec![]).is_err());
        assert!(HashAggregateNode::new(
            vec![],
            vec![AggregateColumn::new(AggregateFunc::Sum, None, "s")]
        )
        .is_err());
        assert!(HashAggregateNode::new(
            vec![],
            vec![AggregateColumn::new(
                AggregateFunc::CountStar,
                Some(total()),
                "n"
            )]
        )
        .is_err());
        assert!(HashAggregateNode::new(
            vec![],
            vec![AggregateColumn::new(
                AggregateFunc::Avg,
                Some(Expr::column("c", "name", ValueType::Varchar)),
                "a"
            )]
        )
        .is_err());
        assert!(HashAggregateNode::new(
            vec![test_utils::bigint_list(&[1])],
            vec![AggregateColumn::count_star("n")]
        )
        .is_err());
    }

    #[test]
    fn estimates() {
        let stats = DatabaseEstimates::default();
        let global =
            HashAggregateNode::new(vec![], vec![AggregateColumn::count_star("n")]).unwrap();
        assert_eq!(
            global.estimate(&unary_inputs(300, &stats)),
            CostEstimate::new(300, 1)
        );

        let grouped = HashAggregateNode::new(
            vec![Expr::column("o", "customer_id", ValueType::BigInt)],
            vec![AggregateColumn::new(AggregateFunc::Sum, Some(total()), "s")],
        )
        .unwrap();
        assert_eq!(
            grouped.estimate(&unary_inputs(300, &stats)),
            CostEstimate::new(300, 150)
        );
        assert_eq!(
            grouped.estimate(&unary_inputs(0, &stats)),
            CostEstimate::new(0, 0)
        );
        assert!(!PlanNode::new(grouped).is_order_deterministic());
    }

    #[test]
    fn output_schema() {
        let catalog = test_utils::sample_catalog();
        let mut node = PlanNode::new(
            HashAggregateNode::new(
                vec![Expr::column("o", "customer_id", ValueType::BigInt)],
                vec![
                    AggregateColumn::new(AggregateFunc::Sum, Some(total()), "total"),
                    AggregateColumn::new(
                        AggregateFunc::Count,
                        Some(Expr::column("o", "id", ValueType::BigInt)),
                        "orders",
                    )
                    .distinct(),
                ],
            )
            .unwrap(),
        )
        .with_child(test_utils::seq_scan("orders", "o"))
        .unwrap();
        node.children_mut()[0]
            .resolve_column_indexes(&catalog)
            .unwrap();
        node.resolve_column_indexes(&catalog).unwrap();

        let schema = node.output_schema().unwrap();
        assert_eq!(
            schema.to_string(),
            "(o.customer_id, temp_table.total, temp_table.orders)"
        );
        assert_eq!(schema.columns()[1].value_type, ValueType::Float);
        assert_eq!(schema.columns()[2].value_type, ValueType::BigInt);
        assert_eq!(
            node.kind().explain(),
            "HASH AGGREGATE SUM(o.total) AS total, COUNT(DISTINCT o.id) AS orders GROUP BY o.customer_id"
        );
    }
}
