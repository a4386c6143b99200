use crate::value::ValueType;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Table alias given to columns produced by operators rather than read from a table.
pub static TEMP_TABLE_NAME: &str = "temp_table";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchemaColumn {
    pub table_alias: String,
    pub column_name: String,
    pub value_type: ValueType,
}

/// Output tuple layout of a plan node. Offsets into the tuple are positions in this list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSchema(Vec<SchemaColumn>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ColumnDef {
    pub name: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

/// Catalog capability used by column resolution. Implementations are consulted only for the
/// duration of one resolution pass.
pub trait SchemaLookup {
    fn table_schema(&self, table_name: &str) -> Option<&TableSchema>;
}

/// An in-memory set of table schemas, loadable from a JSON list of tables.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: FxHashMap<String, TableSchema>,
}

impl SchemaColumn {
    pub fn new(table_alias: &str, column_name: &str, value_type: ValueType) -> Self {
        Self {
            table_alias: table_alias.to_string(),
            column_name: column_name.to_string(),
            value_type,
        }
    }
}

impl NodeSchema {
    pub fn new(columns: Vec<SchemaColumn>) -> Self {
        Self(columns)
    }

    pub fn columns(&self) -> &[SchemaColumn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn index_of(&self, table_alias: &str, column_name: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|col| col.table_alias == table_alias && col.column_name == column_name)
    }

    /// Concatenation used for join outputs: `self` columns followed by `other` columns.
    pub fn join(&self, other: &NodeSchema) -> NodeSchema {
        Self(self.0.iter().chain(other.0.iter()).cloned().collect())
    }
}

impl TableSchema {
    /// The table's columns as they appear when scanned under `alias`.
    pub fn scan_schema(&self, alias: &str) -> NodeSchema {
        NodeSchema(
            self.columns
                .iter()
                .map(|col| SchemaColumn::new(alias, &col.name, col.value_type))
                .collect(),
        )
    }
}

impl Catalog {
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.name.clone(), table))
                .collect(),
        }
    }

    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        let tables: Vec<TableSchema> = serde_json::from_str(s)?;
        Ok(Self::new(tables))
    }
}

impl SchemaLookup for Catalog {
    fn table_schema(&self, table_name: &str) -> Option<&TableSchema> {
        self.tables.get(table_name)
    }
}

impl fmt::Display for SchemaColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_alias, self.column_name)
    }
}

impl fmt::Display for NodeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(", "))
    }
}
