/// Fixtures shared by the unit tests: a small customers/orders catalog, matching table
/// statistics and a few ready-made plans. Builders panic on invalid input, since they are meant
/// to be used only during testing.
use crate::cost::DatabaseEstimates;
use crate::expr::{ComparisonOp, Expr};
use crate::plan::{
    AggregateColumn, AggregateFunc, HashAggregateNode, JoinType, LimitNode, LimitValue,
    MaterializedScanNode, NestLoopNode, OrderByNode, PlanNode, ProjectedColumn, ProjectionNode,
    SeqScanNode, SortDirection, SortKey, MATERIALIZED_COLUMN_NAME, MATERIALIZED_TABLE_NAME,
};
use crate::schema::{Catalog, ColumnDef, TableSchema, TEMP_TABLE_NAME};
use crate::value::{Value, ValueType};

fn table(name: &str, columns: &[(&str, ValueType)]) -> TableSchema {
    TableSchema {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(name, value_type)| ColumnDef {
                name: name.to_string(),
                value_type: *value_type,
            })
            .collect(),
    }
}

pub fn sample_catalog() -> Catalog {
    Catalog::new([
        table(
            "customers",
            &[
                ("id", ValueType::BigInt),
                ("name", ValueType::Varchar),
                ("region", ValueType::Varchar),
            ],
        ),
        table(
            "orders",
            &[
                ("id", ValueType::BigInt),
                ("customer_id", ValueType::BigInt),
                ("total", ValueType::Float),
            ],
        ),
    ])
}

pub fn sample_stats() -> DatabaseEstimates {
    DatabaseEstimates::default()
        .with_table("customers", 1000)
        .with_table("orders", 5000)
}

/// `VECTOR` of BIGINT constants, the shape an IN-list takes after planning.
pub fn bigint_list(values: &[i64]) -> Expr {
    Expr::vector(
        ValueType::BigInt,
        values
            .iter()
            .map(|value| Expr::constant(Value::BigInt(*value)))
            .collect(),
    )
}

pub fn in_list_scan(values: &[i64]) -> PlanNode {
    PlanNode::new(MaterializedScanNode::new(bigint_list(values)).unwrap())
}

pub fn seq_scan(table_name: &str, alias: &str) -> PlanNode {
    PlanNode::new(SeqScanNode::new(table_name).with_alias(alias))
}

/// `c.id = materialized_temp_table.list_element`
pub fn in_list_join_predicate() -> Expr {
    Expr::equals(
        Expr::column("c", "id", ValueType::BigInt),
        Expr::column(
            MATERIALIZED_TABLE_NAME,
            MATERIALIZED_COLUMN_NAME,
            ValueType::BigInt,
        ),
    )
}

pub fn in_list_join_payload() -> NestLoopNode {
    NestLoopNode::new(JoinType::Inner)
        .with_predicate(in_list_join_predicate())
        .unwrap()
}

/// `customers c` joined with the IN-list `values`, the list being the inner input.
pub fn join_over_in_list(values: &[i64]) -> PlanNode {
    PlanNode::new(in_list_join_payload())
        .with_child(seq_scan("customers", "c"))
        .and_then(|join| join.with_child(in_list_scan(values)))
        .unwrap()
}

/// A plan using every node type:
///
/// ```text
/// SELECT c.region AS region, SUM(o.total) AS total_sales
/// FROM customers c JOIN orders o ON c.id = o.customer_id
/// WHERE c.id IN (1, 2, 3) AND o.total > 10.0
/// GROUP BY c.region ORDER BY total_sales DESC LIMIT 10
/// ```
pub fn full_tree() -> PlanNode {
    let orders = PlanNode::new(
        SeqScanNode::new("orders")
            .with_alias("o")
            .with_predicate(Expr::comparison(
                ComparisonOp::GreaterThan,
                Expr::column("o", "total", ValueType::Float),
                Expr::constant(Value::Float(10.0)),
            ))
            .unwrap(),
    );
    let join = PlanNode::new(
        NestLoopNode::new(JoinType::Inner)
            .with_predicate(Expr::equals(
                Expr::column("c", "id", ValueType::BigInt),
                Expr::column("o", "customer_id", ValueType::BigInt),
            ))
            .unwrap(),
    )
    .with_child(join_over_in_list(&[1, 2, 3]))
    .and_then(|join| join.with_child(orders))
    .unwrap();
    let aggregate = PlanNode::new(
        HashAggregateNode::new(
            vec![Expr::column("c", "region", ValueType::Varchar)],
            vec![AggregateColumn::new(
                AggregateFunc::Sum,
                Some(Expr::column("o", "total", ValueType::Float)),
                "total",
            )],
        )
        .unwrap(),
    )
    .with_child(join)
    .unwrap();
    let projection = PlanNode::new(
        ProjectionNode::new(vec![
            ProjectedColumn::new(Expr::column("c", "region", ValueType::Varchar), "region"),
            ProjectedColumn::new(
                Expr::column(TEMP_TABLE_NAME, "total", ValueType::Float),
                "total_sales",
            ),
        ])
        .unwrap(),
    )
    .with_child(aggregate)
    .unwrap();
    let order_by = PlanNode::new(
        OrderByNode::new(vec![SortKey::new(
            Expr::column(TEMP_TABLE_NAME, "total_sales", ValueType::Float),
            SortDirection::Desc,
        )])
        .unwrap(),
    )
    .with_child(projection)
    .unwrap();
    PlanNode::new(LimitNode::new(LimitValue::Constant(10)))
        .with_child(order_by)
        .unwrap()
}
