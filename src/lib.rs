pub mod bin_utils;
pub mod codec;
pub mod cost;
mod error;
pub mod expr;
pub mod plan;
pub mod schema;
pub mod test_utils;
mod value;

pub use codec::{from_document, from_json_str, from_msgpack, to_document, to_json_string, to_msgpack};
pub use cost::{CostEstimate, DatabaseEstimates, ScalarValueHint};
pub use error::{PlanError, Result};
pub use expr::Expr;
pub use plan::{PlanNode, PlanNodeKind, PlanNodeType, PlanTree};
pub use schema::{Catalog, NodeSchema, SchemaLookup};
pub use value::{Value, ValueType};
