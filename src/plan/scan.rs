use super::{bind_columns, check_expr, check_predicate, Arity, NodeVariant, PlanNodeType};
use crate::cost::{self, CostEstimate, CostInputs};
use crate::error::{PlanError, Result};
use crate::expr::Expr;
use crate::schema::{NodeSchema, SchemaColumn, SchemaLookup};
use serde::{Deserialize, Serialize};

/// Name under which a materialized IN-list exposes its single column.
pub static MATERIALIZED_TABLE_NAME: &str = "materialized_temp_table";
pub static MATERIALIZED_COLUMN_NAME: &str = "list_element";

/// Full scan of a catalog table, optionally filtered by a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SeqScanNode {
    table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    table_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    predicate: Option<Expr>,
}

/// Presents the list of an `x IN (v1, v2, ...)` predicate as a one-column relation, so that it
/// can drive an index-accelerated nested-loop join instead of one comparison per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MaterializedScanNode {
    table_data: Expr,
}

impl SeqScanNode {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            table_alias: None,
            predicate: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.table_alias = Some(alias.to_string());
        self
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Result<Self> {
        check_predicate(Self::NODE_TYPE, &predicate)?;
        self.predicate = Some(predicate);
        Ok(self)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The alias columns of this scan are referenced by; the table name if none was given.
    pub fn alias(&self) -> &str {
        self.table_alias.as_deref().unwrap_or(&self.table_name)
    }

    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }
}

impl NodeVariant for SeqScanNode {
    const NODE_TYPE: PlanNodeType = PlanNodeType::SeqScan;
    const ARITY: Arity = Arity::Leaf;
    // Storage iteration order is not stable across replicas.
    const ORDER_DETERMINISTIC: bool = false;
    const REQUIRED_FIELDS: &'static [&'static str] = &["TABLE_NAME"];
    const OPTIONAL_FIELDS: &'static [&'static str] = &["TABLE_ALIAS", "PREDICATE"];

    fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(PlanError::InvalidPayload {
                node_type: Self::NODE_TYPE,
                reason: "empty table name".to_string(),
            });
        }
        match &self.predicate {
            Some(predicate) => check_predicate(Self::NODE_TYPE, predicate),
            None => Ok(()),
        }
    }

    fn estimate(&self, inputs: &CostInputs<'_>) -> CostEstimate {
        let processed = inputs.stats.table_tuple_count(&self.table_name);
        let output = if self.predicate.is_some() {
            cost::apply_selectivity(processed, inputs.stats.predicate_selectivity())
        } else {
            processed
        };
        CostEstimate::new(processed, output)
    }

    fn resolve(
        &mut self,
        node: &str,
        _inputs: &[&NodeSchema],
        lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema> {
        let table = lookup
            .table_schema(&self.table_name)
            .ok_or_else(|| PlanError::UnknownTable {
                node: node.to_string(),
                table: self.table_name.clone(),
            })?;
        let schema = table.scan_schema(self.alias());
        if let Some(predicate) = &mut self.predicate {
            bind_columns(predicate, node, &[&schema])?;
        }
        Ok(schema)
    }

    fn clear_resolution(&mut self) {
        if let Some(predicate) = &mut self.predicate {
            predicate.clear_resolution();
        }
    }

    fn expressions(&self) -> Vec<&Expr> {
        self.predicate.iter().collect()
    }

    fn explain(&self) -> String {
        let mut out = format!("SEQUENTIAL SCAN of \"{}\"", self.table_name);
        if let Some(alias) = &self.table_alias {
            out.push_str(&format!(" ({})", alias));
        }
        if let Some(predicate) = &self.predicate {
            out.push_str(&format!(" filter by {}", predicate));
        }
        out
    }
}

impl MaterializedScanNode {
    pub fn new(table_data: Expr) -> Result<Self> {
        Self::check_table_data(&table_data)?;
        Ok(Self { table_data })
    }

    pub fn set_table_data(&mut self, table_data: Expr) -> Result<()> {
        Self::check_table_data(&table_data)?;
        self.table_data = table_data;
        Ok(())
    }

    pub fn table_data(&self) -> &Expr {
        &self.table_data
    }

    /// Number of list elements.
    pub fn len(&self) -> usize {
        match &self.table_data {
            Expr::Vector { values, .. } => values.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_table_data(table_data: &Expr) -> Result<()> {
        if !table_data.is_multi_valued() {
            return Err(PlanError::NotMultiValued {
                node_type: Self::NODE_TYPE,
                found: table_data.to_string(),
            });
        }
        check_expr(Self::NODE_TYPE, table_data)
    }
}

impl NodeVariant for MaterializedScanNode {
    const NODE_TYPE: PlanNodeType = PlanNodeType::MaterializedScan;
    const ARITY: Arity = Arity::Leaf;
    // A literal list always iterates in the same order.
    const ORDER_DETERMINISTIC: bool = true;
    const REQUIRED_FIELDS: &'static [&'static str] = &["TABLE_DATA"];

    fn validate(&self) -> Result<()> {
        Self::check_table_data(&self.table_data)
    }

    fn estimate(&self, _inputs: &CostInputs<'_>) -> CostEstimate {
        // Constant regardless of the list length. The nested-loop join consuming this scan
        // accounts for the real cost of the IN-list.
        CostEstimate::new(1, 1)
    }

    fn resolve(
        &mut self,
        _node: &str,
        _inputs: &[&NodeSchema],
        _lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema> {
        Ok(NodeSchema::new(vec![SchemaColumn::new(
            MATERIALIZED_TABLE_NAME,
            MATERIALIZED_COLUMN_NAME,
            self.table_data.value_type(),
        )]))
    }

    fn clear_resolution(&mut self) {}

    fn expressions(&self) -> Vec<&Expr> {
        vec![&self.table_data]
    }

    fn explain(&self) -> String {
        format!(
            "MATERIALIZED SCAN of IN-LIST constants ({} values)",
            self.len()
        )
    }
}
