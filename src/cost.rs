use crate::value::Value;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TupleCount = u64;

pub mod cost_factors {
    pub static PREDICATE_SELECTIVITY: f64 = 0.1;
    pub static JOIN_SELECTIVITY: f64 = 0.1;
    pub static GROUP_REDUCTION_FACTOR: f64 = 0.5;
    pub static DEFAULT_TABLE_TUPLE_COUNT: u64 = 1000;
}

/// Tuple counts attached to a plan node by the cost-estimation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    pub processed: TupleCount,
    pub output: TupleCount,
}

/// Table cardinalities and the factors the estimator applies on top of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseEstimates {
    table_tuple_counts: FxHashMap<String, TupleCount>,
    default_table_tuple_count: TupleCount,
    predicate_selectivity: f64,
    join_selectivity: f64,
    group_reduction_factor: f64,
}

/// Planner hint about a statement parameter, indexed by parameter position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarValueHint {
    pub expected: Option<Value>,
}

/// Everything a variant may look at when estimating itself.
pub struct CostInputs<'a> {
    /// Output estimate of the first child, 0 for leaves.
    pub child_output: TupleCount,
    pub children: &'a [CostEstimate],
    pub stats: &'a DatabaseEstimates,
    pub hints: &'a [ScalarValueHint],
}

impl CostEstimate {
    pub fn new(processed: TupleCount, output: TupleCount) -> Self {
        Self { processed, output }
    }
}

impl DatabaseEstimates {
    pub fn with_table(mut self, table_name: &str, tuple_count: TupleCount) -> Self {
        self.table_tuple_counts
            .insert(table_name.to_string(), tuple_count);
        self
    }

    pub fn table_tuple_count(&self, table_name: &str) -> TupleCount {
        self.table_tuple_counts
            .get(table_name)
            .copied()
            .unwrap_or(self.default_table_tuple_count)
    }

    pub fn predicate_selectivity(&self) -> f64 {
        self.predicate_selectivity
    }

    pub fn join_selectivity(&self) -> f64 {
        self.join_selectivity
    }

    pub fn group_reduction_factor(&self) -> f64 {
        self.group_reduction_factor
    }
}

impl Default for DatabaseEstimates {
    fn default() -> Self {
        Self {
            table_tuple_counts: FxHashMap::default(),
            default_table_tuple_count: cost_factors::DEFAULT_TABLE_TUPLE_COUNT,
            predicate_selectivity: cost_factors::PREDICATE_SELECTIVITY,
            join_selectivity: cost_factors::JOIN_SELECTIVITY,
            group_reduction_factor: cost_factors::GROUP_REDUCTION_FACTOR,
        }
    }
}

impl ScalarValueHint {
    pub fn expecting(value: Value) -> Self {
        Self {
            expected: Some(value),
        }
    }
}

impl<'a> CostInputs<'a> {
    pub fn hint(&self, param_index: usize) -> Option<&Value> {
        self.hints
            .get(param_index)
            .and_then(|hint| hint.expected.as_ref())
    }
}

/// Scales a tuple count, rounding up so that a non-empty input never estimates to nothing.
pub fn apply_selectivity(count: TupleCount, selectivity: f64) -> TupleCount {
    (count as f64 * selectivity).ceil() as TupleCount
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processed={}, output={}", self.processed, self.output)
    }
}
