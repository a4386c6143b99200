//! Plan documents: the serialized form a plan tree takes on its way from the planner to the
//! execution engine.
//!
//! A document is `{FORMAT_VERSION, FINALIZED, ROOT}` where every node is an object carrying
//! its discriminator (`PLAN_NODE_TYPE`), its nested `CHILDREN`, the results of the two passes
//! when present and the variant payload under `FIELDS`. The same document is carried either as
//! JSON text or as MessagePack bytes.

use crate::cost::CostEstimate;
use crate::error::{PlanError, Result};
use crate::plan::{
    dispatch, HashAggregateNode, LimitNode, MaterializedScanNode, NestLoopNode, NodeId,
    NodeVariant, OrderByNode, PlanNode, PlanNodeKind, PlanTree, ProjectionNode, SeqScanNode,
};
use crate::schema::NodeSchema;
use log::{debug, warn};
use phf::phf_map;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::str::FromStr;

pub static FORMAT_VERSION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::IntoStaticStr, strum_macros::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
enum DocumentMember {
    FormatVersion,
    Finalized,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::IntoStaticStr, strum_macros::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
enum NodeMember {
    Id,
    PlanNodeType,
    Children,
    EstimatedProcessedTupleCount,
    EstimatedOutputTupleCount,
    OutputSchema,
    Explain,
    Fields,
}

/// Builds a variant payload out of the `FIELDS` object of a node.
type NodeLoader = fn(&Value) -> Result<PlanNodeKind>;

static NODE_LOADERS: phf::Map<&'static str, NodeLoader> = phf_map! {
    "SEQSCAN" => load_variant::<SeqScanNode>,
    "MATERIALIZEDSCAN" => load_variant::<MaterializedScanNode>,
    "NESTLOOP" => load_variant::<NestLoopNode>,
    "HASHAGGREGATE" => load_variant::<HashAggregateNode>,
    "ORDERBY" => load_variant::<OrderByNode>,
    "LIMIT" => load_variant::<LimitNode>,
    "PROJECTION" => load_variant::<ProjectionNode>,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Write each node's explain line under `EXPLAIN`. Readers ignore it.
    pub include_explain: bool,
}

fn name<M: Into<&'static str>>(member: M) -> &'static str {
    member.into()
}

fn key<M: Into<&'static str>>(member: M) -> String {
    name(member).to_string()
}

pub fn to_document(tree: &PlanTree) -> Result<Value> {
    to_document_with(tree, EncodeOptions::default())
}

pub fn to_document_with(tree: &PlanTree, options: EncodeOptions) -> Result<Value> {
    let mut document = Map::new();
    document.insert(key(DocumentMember::FormatVersion), json!(FORMAT_VERSION));
    document.insert(key(DocumentMember::Finalized), json!(tree.is_final()));
    document.insert(key(DocumentMember::Root), node_to_value(tree.root(), options)?);
    Ok(Value::Object(document))
}

/// Like `to_document`, but only for trees the executor can run as is.
pub fn to_final_document(tree: &PlanTree) -> Result<Value> {
    if !tree.is_estimated() {
        return Err(PlanError::NotFinal("cost estimates are missing"));
    }
    if !tree.is_shape_final() {
        return Err(PlanError::NotFinal("shape is not frozen"));
    }
    if !tree.is_resolved() {
        return Err(PlanError::NotFinal("column indexes are not resolved"));
    }
    to_document(tree)
}

fn node_to_value(node: &PlanNode, options: EncodeOptions) -> Result<Value> {
    let mut object = Map::new();
    if let Some(id) = node.id() {
        object.insert(key(NodeMember::Id), json!(id));
    }
    object.insert(key(NodeMember::PlanNodeType), json!(node.node_type().to_string()));
    let children = node
        .children()
        .iter()
        .map(|child| node_to_value(child, options))
        .collect::<Result<Vec<_>>>()?;
    object.insert(key(NodeMember::Children), Value::Array(children));
    if let Some(estimates) = node.estimates() {
        object.insert(
            key(NodeMember::EstimatedProcessedTupleCount),
            json!(estimates.processed),
        );
        object.insert(
            key(NodeMember::EstimatedOutputTupleCount),
            json!(estimates.output),
        );
    }
    if let Some(schema) = node.output_schema() {
        object.insert(key(NodeMember::OutputSchema), serde_json::to_value(schema)?);
    }
    if options.include_explain {
        object.insert(key(NodeMember::Explain), json!(node.kind().explain()));
    }
    let fields = dispatch!(node.kind(), payload => serde_json::to_value(payload))?;
    object.insert(key(NodeMember::Fields), fields);
    Ok(Value::Object(object))
}

pub fn from_document(document: &Value) -> Result<PlanTree> {
    let object = document
        .as_object()
        .ok_or_else(|| PlanError::MalformedDocument("document is not an object".to_string()))?;
    for unknown in object
        .keys()
        .filter(|member| DocumentMember::from_str(member).is_err())
    {
        warn!("ignoring unknown document member {}", unknown);
    }

    let version = object
        .get(name(DocumentMember::FormatVersion))
        .ok_or_else(|| PlanError::MalformedDocument("missing FORMAT_VERSION".to_string()))?
        .as_u64()
        .ok_or_else(|| {
            PlanError::MalformedDocument("FORMAT_VERSION is not an unsigned integer".to_string())
        })?;
    if version != FORMAT_VERSION {
        return Err(PlanError::UnsupportedVersion(version));
    }

    let finalized = match object.get(name(DocumentMember::Finalized)) {
        Some(value) => value.as_bool().ok_or_else(|| {
            PlanError::MalformedDocument("FINALIZED is not a boolean".to_string())
        })?,
        None => false,
    };
    let root = object
        .get(name(DocumentMember::Root))
        .ok_or_else(|| PlanError::MalformedDocument("missing ROOT".to_string()))?;
    let root = node_from_value(root, finalized)?;
    Ok(PlanTree::from_parts(root, finalized))
}

/// Reads an optional base member of a node.
fn member<T: DeserializeOwned>(
    object: &Map<String, Value>,
    node_type: &str,
    member: NodeMember,
) -> Result<Option<T>> {
    let field: &'static str = member.into();
    object
        .get(field)
        .map(|value| {
            T::deserialize(value).map_err(|source| PlanError::MalformedField {
                node_type: node_type.to_string(),
                field,
                source,
            })
        })
        .transpose()
}

fn node_from_value(value: &Value, finalized: bool) -> Result<PlanNode> {
    let object = value
        .as_object()
        .ok_or_else(|| PlanError::MalformedDocument(format!("node is not an object: {}", value)))?;
    let node_type = match object.get(name(NodeMember::PlanNodeType)) {
        Some(Value::String(node_type)) => node_type.as_str(),
        Some(other) => {
            return Err(PlanError::MalformedDocument(format!(
                "PLAN_NODE_TYPE is not a string: {}",
                other
            )))
        }
        None => return Err(PlanError::MissingDiscriminator),
    };
    let loader = NODE_LOADERS
        .get(node_type)
        .ok_or_else(|| PlanError::UnknownNodeType(node_type.to_string()))?;
    for unknown in object
        .keys()
        .filter(|member| NodeMember::from_str(member).is_err())
    {
        warn!("ignoring unknown member {} of {} node", unknown, node_type);
    }

    let fields = object
        .get(name(NodeMember::Fields))
        .ok_or_else(|| PlanError::MissingField {
            node_type: node_type.to_string(),
            field: NodeMember::Fields.into(),
        })?;
    let kind = loader(fields)?;

    let children = match object.get(name(NodeMember::Children)) {
        Some(Value::Array(children)) => children
            .iter()
            .map(|child| node_from_value(child, finalized))
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(PlanError::MalformedDocument(format!(
                "CHILDREN of {} is not an array: {}",
                node_type, other
            )))
        }
        None => {
            return Err(PlanError::MissingField {
                node_type: node_type.to_string(),
                field: NodeMember::Children.into(),
            })
        }
    };

    let id = member::<NodeId>(object, node_type, NodeMember::Id)?;
    let processed = member::<u64>(object, node_type, NodeMember::EstimatedProcessedTupleCount)?;
    let output = member::<u64>(object, node_type, NodeMember::EstimatedOutputTupleCount)?;
    let estimates = match (processed, output) {
        (Some(processed), Some(output)) => Some(CostEstimate::new(processed, output)),
        (None, None) => None,
        _ => {
            return Err(PlanError::MalformedDocument(format!(
                "{} carries only one of the two tuple count estimates",
                node_type
            )))
        }
    };
    let output_schema = member::<NodeSchema>(object, node_type, NodeMember::OutputSchema)?;
    if finalized && (estimates.is_none() || output_schema.is_none()) {
        return Err(PlanError::MalformedDocument(format!(
            "finalized document has an unestimated or unresolved {} node",
            node_type
        )));
    }

    let node = PlanNode::from_parts(id, kind, children, estimates, output_schema)?;
    debug!("loaded {}", node.label());
    Ok(node)
}

fn load_variant<V: NodeVariant>(fields: &Value) -> Result<PlanNodeKind> {
    let node_type = V::NODE_TYPE.to_string();
    let object = fields.as_object().ok_or_else(|| {
        PlanError::MalformedDocument(format!("FIELDS of {} is not an object", node_type))
    })?;
    if let Some(field) = V::REQUIRED_FIELDS
        .iter()
        .copied()
        .find(|field| object.get(*field).map_or(true, Value::is_null))
    {
        return Err(PlanError::MissingField { node_type, field });
    }
    let is_known = |field: &str| {
        V::REQUIRED_FIELDS
            .iter()
            .chain(V::OPTIONAL_FIELDS)
            .any(|known| *known == field)
    };
    for field in object.keys().filter(|field| !is_known(field.as_str())) {
        warn!("ignoring unknown field {} of {} node", field, node_type);
    }

    let payload = V::deserialize(fields).map_err(|source| PlanError::MalformedField {
        node_type,
        field: NodeMember::Fields.into(),
        source,
    })?;
    payload.validate()?;
    Ok(payload.into())
}

pub fn to_json_string(tree: &PlanTree) -> Result<String> {
    Ok(serde_json::to_string(&to_document(tree)?)?)
}

pub fn from_json_str(text: &str) -> Result<PlanTree> {
    from_document(&serde_json::from_str::<Value>(text)?)
}

pub fn to_msgpack(tree: &PlanTree) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(&to_document(tree)?)?)
}

pub fn from_msgpack(bytes: &[u8]) -> Result<PlanTree> {
    from_document(&rmp_serde::from_slice::<Value>(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::DatabaseEstimates;
    use crate::plan::{PlanNodeType, MATERIALIZED_COLUMN_NAME, MATERIALIZED_TABLE_NAME};
    use crate::test_utils;
    use pretty_assertions::assert_eq;

    fn finalized(root: PlanNode) -> PlanTree {
        let mut tree = PlanTree::new(root);
        tree.compute_cost_estimates(&test_utils::sample_stats(), &[])
            .unwrap();
        tree.freeze_shape().unwrap();
        tree.resolve_column_indexes(&test_utils::sample_catalog())
            .unwrap();
        tree
    }

    fn in_list_document(table_data: Value) -> Value {
        json!({
            "FORMAT_VERSION": 1,
            "ROOT": {
                "PLAN_NODE_TYPE": "MATERIALIZEDSCAN",
                "CHILDREN": [],
                "FIELDS": {"TABLE_DATA": table_data},
            },
        })
    }

    #[test]
    fn unprocessed_tree_round_trip() {
        let tree = PlanTree::new(test_utils::full_tree());
        let document = to_document(&tree).unwrap();
        assert_eq!(document["FINALIZED"], json!(false));
        let loaded = from_document(&document).unwrap();
        assert_eq!(loaded, tree);
        assert!(!loaded.is_estimated());
        assert!(!loaded.is_resolved());
    }

    #[test]
    fn final_tree_round_trip() {
        let tree = finalized(test_utils::full_tree());
        let document = to_final_document(&tree).unwrap();
        assert_eq!(document["FINALIZED"], json!(true));
        let loaded = from_document(&document).unwrap();
        assert_eq!(loaded, tree);
        assert!(loaded.is_final());
    }

    #[test]
    fn estimated_only_round_trip() {
        let mut tree = PlanTree::new(test_utils::full_tree());
        tree.compute_cost_estimates(&test_utils::sample_stats(), &[])
            .unwrap();
        let loaded = from_json_str(&to_json_string(&tree).unwrap()).unwrap();
        assert_eq!(loaded, tree);
        assert!(loaded.is_estimated());
        assert!(!loaded.is_resolved());
    }

    #[test]
    fn msgpack_round_trip() {
        let tree = finalized(test_utils::full_tree());
        let loaded = from_msgpack(&to_msgpack(&tree).unwrap()).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn in_list_join_survives_transport() {
        let mut tree = PlanTree::new(test_utils::join_over_in_list(&[1, 2, 3]));
        tree.compute_cost_estimates(&DatabaseEstimates::default(), &[])
            .unwrap();
        assert_eq!(
            tree.root().child(1).unwrap().estimates(),
            Some(CostEstimate::new(1, 1))
        );

        let loaded = from_json_str(&to_json_string(&tree).unwrap()).unwrap();
        let tags = |tree: &PlanTree| tree.iter().map(PlanNode::node_type).collect::<Vec<_>>();
        assert_eq!(tags(&loaded), tags(&tree));
        assert_eq!(
            tags(&loaded),
            vec![
                PlanNodeType::NestLoop,
                PlanNodeType::SeqScan,
                PlanNodeType::MaterializedScan,
            ]
        );
        let PlanNodeKind::MaterializedScan(scan) = loaded.root().child(1).unwrap().kind() else {
            panic!("inner child is not a materialized scan");
        };
        assert_eq!(scan.table_data(), &test_utils::bigint_list(&[1, 2, 3]));
        assert!(loaded
            .explain()
            .contains("MATERIALIZED SCAN of IN-LIST constants"));
    }

    #[test]
    fn materialized_scan_node_shape() {
        let tree = finalized(test_utils::in_list_scan(&[5]));
        let document = to_document(&tree).unwrap();
        assert_eq!(
            document["ROOT"],
            json!({
                "ID": 1,
                "PLAN_NODE_TYPE": "MATERIALIZEDSCAN",
                "CHILDREN": [],
                "ESTIMATED_PROCESSED_TUPLE_COUNT": 1,
                "ESTIMATED_OUTPUT_TUPLE_COUNT": 1,
                "OUTPUT_SCHEMA": [{
                    "TABLE_ALIAS": MATERIALIZED_TABLE_NAME,
                    "COLUMN_NAME": MATERIALIZED_COLUMN_NAME,
                    "VALUE_TYPE": "BIG_INT",
                }],
                "FIELDS": {
                    "TABLE_DATA": {
                        "TYPE": "VECTOR",
                        "VALUE_TYPE": "BIG_INT",
                        "VALUES": [
                            {"TYPE": "CONSTANT", "VALUE": {"TYPE": "BIG_INT", "VALUE": 5}},
                        ],
                    },
                },
            })
        );
    }

    #[test]
    fn explain_is_written_on_request_and_ignored_on_read() {
        let tree = PlanTree::new(test_utils::in_list_scan(&[1, 2]));
        let document = to_document_with(
            &tree,
            EncodeOptions {
                include_explain: true,
            },
        )
        .unwrap();
        assert_eq!(
            document["ROOT"]["EXPLAIN"],
            json!("MATERIALIZED SCAN of IN-LIST constants (2 values)")
        );
        assert_eq!(from_document(&document).unwrap(), tree);
        assert!(to_document(&tree).unwrap()["ROOT"].get("EXPLAIN").is_none());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut document = in_list_document(serde_json::to_value(test_utils::bigint_list(&[1])).unwrap());
        document["PLANNER"] = json!("cascades");
        document["ROOT"]["HINTS"] = json!([]);
        document["ROOT"]["FIELDS"]["SORTED"] = json!(true);
        let tree = from_document(&document).unwrap();
        assert_eq!(tree.root().node_type(), PlanNodeType::MaterializedScan);
    }

    #[test]
    fn unknown_discriminator() {
        let document = json!({
            "FORMAT_VERSION": 1,
            "ROOT": {"PLAN_NODE_TYPE": "INDEXSCAN", "CHILDREN": [], "FIELDS": {}},
        });
        match from_document(&document).unwrap_err() {
            PlanError::UnknownNodeType(node_type) => assert_eq!(node_type, "INDEXSCAN"),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn missing_discriminator() {
        let document = json!({
            "FORMAT_VERSION": 1,
            "ROOT": {"CHILDREN": [], "FIELDS": {}},
        });
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MissingDiscriminator
        ));
    }

    #[test]
    fn missing_required_field() {
        let mut document = in_list_document(json!(null));
        document["ROOT"]["FIELDS"] = json!({});
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MissingField {
                field: "TABLE_DATA",
                ..
            }
        ));
    }

    #[test]
    fn null_required_field_is_missing() {
        let document = in_list_document(json!(null));
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MissingField {
                field: "TABLE_DATA",
                ..
            }
        ));
    }

    #[test]
    fn final_document_without_bindings_is_rejected() {
        let tree = finalized(test_utils::join_over_in_list(&[1, 2]));
        let mut document = to_final_document(&tree).unwrap();
        let predicate = &mut document["ROOT"]["FIELDS"]["JOIN_PREDICATE"];
        for side in ["LEFT", "RIGHT"] {
            if let Some(column) = predicate[side].as_object_mut() {
                column.remove("TUPLE_IDX");
                column.remove("COLUMN_IDX");
            }
        }
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MalformedDocument(_)
        ));

        document["FINALIZED"] = json!(false);
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MalformedDocument(_)
        ));
    }

    #[test]
    fn bindings_without_schema_are_rejected() {
        let tree = finalized(test_utils::join_over_in_list(&[1, 2]));
        let mut document = to_document(&tree).unwrap();
        document["FINALIZED"] = json!(false);
        if let Some(root) = document["ROOT"].as_object_mut() {
            root.remove("OUTPUT_SCHEMA");
        }
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MalformedDocument(_)
        ));
    }

    #[test]
    fn malformed_field() {
        let document = in_list_document(json!("1, 2, 3"));
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MalformedField { .. }
        ));
    }

    #[test]
    fn scalar_table_data_is_rejected() {
        let document = in_list_document(json!({
            "TYPE": "CONSTANT",
            "VALUE": {"TYPE": "BIG_INT", "VALUE": 1},
        }));
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::NotMultiValued {
                node_type: PlanNodeType::MaterializedScan,
                ..
            }
        ));
    }

    #[test]
    fn leaf_with_children_is_rejected() {
        let list = serde_json::to_value(test_utils::bigint_list(&[1])).unwrap();
        let mut document = in_list_document(list.clone());
        document["ROOT"]["CHILDREN"] = json!([in_list_document(list)["ROOT"]]);
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::ChildCount { found: 1, .. }
        ));
    }

    #[test]
    fn unsupported_version() {
        let mut document = to_document(&PlanTree::new(test_utils::in_list_scan(&[1]))).unwrap();
        document["FORMAT_VERSION"] = json!(2);
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::UnsupportedVersion(2)
        ));
    }

    #[test]
    fn half_estimate_is_rejected() {
        let mut tree = PlanTree::new(test_utils::in_list_scan(&[1]));
        tree.compute_cost_estimates(&DatabaseEstimates::default(), &[])
            .unwrap();
        let mut document = to_document(&tree).unwrap();
        if let Some(root) = document["ROOT"].as_object_mut() {
            root.remove("ESTIMATED_OUTPUT_TUPLE_COUNT");
        }
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MalformedDocument(_)
        ));
    }

    #[test]
    fn finalized_claim_is_checked() {
        let mut document = to_document(&PlanTree::new(test_utils::in_list_scan(&[1]))).unwrap();
        document["FINALIZED"] = json!(true);
        assert!(matches!(
            from_document(&document).unwrap_err(),
            PlanError::MalformedDocument(_)
        ));
    }

    #[test]
    fn final_document_requires_final_tree() {
        let mut tree = PlanTree::new(test_utils::join_over_in_list(&[1]));
        assert!(matches!(
            to_final_document(&tree).unwrap_err(),
            PlanError::NotFinal(_)
        ));
        tree.compute_cost_estimates(&test_utils::sample_stats(), &[])
            .unwrap();
        assert!(matches!(
            to_final_document(&tree).unwrap_err(),
            PlanError::NotFinal("shape is not frozen")
        ));
    }
}
