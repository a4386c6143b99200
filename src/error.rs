use crate::plan::{Arity, PlanNodeType};
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, PlanError>;

/// Errors raised while building, estimating, resolving or (de)serializing a plan tree.
/// Nodes are named as `TYPE[id]`.
#[derive(Debug, ThisError)]
pub enum PlanError {
    // Structural invariants
    #[error("{node_type} requires a multi-valued expression, got: {found}")]
    NotMultiValued {
        node_type: PlanNodeType,
        found: String,
    },

    #[error("{node} has {found} children, expected {expected}")]
    ChildCount {
        node: String,
        expected: Arity,
        found: usize,
    },

    #[error("invalid expression in {node_type}: {reason}")]
    InvalidExpression {
        node_type: PlanNodeType,
        reason: String,
    },

    #[error("invalid {node_type} payload: {reason}")]
    InvalidPayload {
        node_type: PlanNodeType,
        reason: String,
    },

    #[error("{node} is not a {expected} node")]
    NodeTypeMismatch {
        node: String,
        expected: PlanNodeType,
    },

    // Ordering violations
    #[error("{node}: child {child_index} has not been cost-estimated")]
    ChildNotEstimated { node: String, child_index: usize },

    #[error("{node}: child {child_index} has not been resolved")]
    ChildNotResolved { node: String, child_index: usize },

    #[error("column resolution requires a final tree shape")]
    ShapeNotFinal,

    #[error("plan tree is not final: {0}")]
    NotFinal(&'static str),

    // Codec
    #[error("node object has no PLAN_NODE_TYPE discriminator")]
    MissingDiscriminator,

    #[error("unknown plan node type '{0}'")]
    UnknownNodeType(String),

    #[error("{node_type} is missing required field {field}")]
    MissingField {
        node_type: String,
        field: &'static str,
    },

    #[error("malformed field {field} in {node_type}: {source}")]
    MalformedField {
        node_type: String,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed plan document: {0}")]
    MalformedDocument(String),

    #[error("unsupported plan document version {0}")]
    UnsupportedVersion(u64),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    // Schema resolution
    #[error("{node}: unknown table '{table}'")]
    UnknownTable { node: String, table: String },

    #[error("{node}: column {column} not found in input schema")]
    ColumnNotFound { node: String, column: String },
}
