use super::{bind_columns, check_scalar, Arity, NodeVariant, PlanNodeType};
use crate::cost::{CostEstimate, CostInputs};
use crate::error::{PlanError, Result};
use crate::expr::Expr;
use crate::schema::{NodeSchema, SchemaLookup};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SortKey {
    expr: Expr,
    direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OrderByNode {
    sort_keys: Vec<SortKey>,
}

/// Row count of a LIMIT, either literal or bound to a statement parameter at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitValue {
    Constant(u64),
    Parameter(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LimitNode {
    limit: LimitValue,
    #[serde(default)]
    offset: u64,
}

impl SortKey {
    pub fn new(expr: Expr, direction: SortDirection) -> Self {
        Self { expr, direction }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

impl OrderByNode {
    pub fn new(sort_keys: Vec<SortKey>) -> Result<Self> {
        let node = Self { sort_keys };
        node.validate()?;
        Ok(node)
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }
}

impl NodeVariant for OrderByNode {
    const NODE_TYPE: PlanNodeType = PlanNodeType::OrderBy;
    const ARITY: Arity = Arity::Unary;
    const ORDER_DETERMINISTIC: bool = true;
    const REQUIRED_FIELDS: &'static [&'static str] = &["SORT_KEYS"];

    fn validate(&self) -> Result<()> {
        if self.sort_keys.is_empty() {
            return Err(PlanError::InvalidPayload {
                node_type: Self::NODE_TYPE,
                reason: "no sort keys".to_string(),
            });
        }
        self.sort_keys
            .iter()
            .try_for_each(|key| check_scalar(Self::NODE_TYPE, &key.expr))
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
        for key in self.sort_keys.iter_mut() {
            bind_columns(&mut key.expr, node, inputs)?;
        }
        Ok(inputs[0].clone())
    }

    fn clear_resolution(&mut self) {
        for key in self.sort_keys.iter_mut() {
            key.expr.clear_resolution();
        }
    }

    fn expressions(&self) -> Vec<&Expr> {
        self.sort_keys.iter().map(|key| &key.expr).collect()
    }

    fn explain(&self) -> String {
        format!("ORDER BY {}", self.sort_keys.iter().join(", "))
    }
}

impl LimitNode {
    pub fn new(limit: LimitValue) -> Self {
        Self { limit, offset: 0 }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(&self) -> LimitValue {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The limit if known at planning time, from the literal or from a parameter hint.
    fn known_limit(&self, inputs: &CostInputs<'_>) -> Option<u64> {
        match self.limit {
            LimitValue::Constant(limit) => Some(limit),
            LimitValue::Parameter(index) => inputs
                .hint(index)
                .and_then(|value| value.as_i64())
                .map(|limit| limit.max(0) as u64),
        }
    }
}

impl NodeVariant for LimitNode {
    const NODE_TYPE: PlanNodeType = PlanNodeType::Limit;
    const ARITY: Arity = Arity::Unary;
    const ORDER_DETERMINISTIC: bool = true;
    const REQUIRED_FIELDS: &'static [&'static str] = &["LIMIT"];
    const OPTIONAL_FIELDS: &'static [&'static str] = &["OFFSET"];

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn estimate(&self, inputs: &CostInputs<'_>) -> CostEstimate {
        let child = inputs.child_output;
        match self.known_limit(inputs) {
            Some(limit) => CostEstimate::new(
                child.min(limit.saturating_add(self.offset)),
                child.saturating_sub(self.offset).min(limit),
            ),
            None => CostEstimate::new(child, child),
        }
    }

    fn resolve(
        &mut self,
        _node: &str,
        inputs: &[&NodeSchema],
        _lookup: &dyn SchemaLookup,
    ) -> Result<NodeSchema> {
        Ok(inputs[0].clone())
    }

    fn clear_resolution(&mut self) {}

    fn expressions(&self) -> Vec<&Expr> {
        vec![]
    }

    fn explain(&self) -> String {
        let mut out = format!("LIMIT {}", self.limit);
        if self.offset > 0 {
            out.push_str(&format!(" OFFSET {}", self.offset));
        }
        out
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, self.direction)
    }
}

impl fmt::Display for LimitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(limit) => write!(f, "{}", limit),
            Self::Parameter(index) => write!(f, "?{}", index),
        }
    }
}
