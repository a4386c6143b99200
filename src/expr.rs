use crate::error::Result;
use crate::value::{Value, ValueType};
use auto_enums::auto_enum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use traversal::DftPre;

// Plan nodes only carry expressions around: they check their shape, bind their column
// references and serialize them. Evaluation belongs to the execution engine.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "TYPE",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "SCREAMING_SNAKE_CASE"
)]
pub enum Expr {
    Constant {
        value: Value,
    },
    Parameter {
        index: usize,
        value_type: ValueType,
    },
    Column(ColumnRef),
    Comparison {
        op: ComparisonOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conjunction {
        op: ConjunctionOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// A multi-valued expression, e.g. the list of an IN-list predicate.
    Vector {
        value_type: ValueType,
        values: Vec<Expr>,
    },
    InList {
        left: Box<Expr>,
        list: Box<Expr>,
    },
}

/// A symbolic reference to a column. `tuple_idx` selects the input tuple (0 for the first or
/// outer input, 1 for the inner input of a join) and `column_idx` the offset inside it; both
/// are unset until column resolution binds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ColumnRef {
    pub table_alias: String,
    pub column_name: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple_idx: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_idx: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConjunctionOp {
    And,
    Or,
}

impl Expr {
    pub fn constant(value: Value) -> Self {
        Self::Constant { value }
    }

    pub fn parameter(index: usize, value_type: ValueType) -> Self {
        Self::Parameter { index, value_type }
    }

    pub fn column(table_alias: &str, column_name: &str, value_type: ValueType) -> Self {
        Self::Column(ColumnRef::new(table_alias, column_name, value_type))
    }

    pub fn comparison(op: ComparisonOp, left: Expr, right: Expr) -> Self {
        Self::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Self::comparison(ComparisonOp::Equal, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::Conjunction {
            op: ConjunctionOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn vector(value_type: ValueType, values: Vec<Expr>) -> Self {
        Self::Vector { value_type, values }
    }

    pub fn in_list(left: Expr, list: Expr) -> Self {
        Self::InList {
            left: Box::new(left),
            list: Box::new(list),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Constant { value } => value.value_type(),
            Self::Parameter { value_type, .. } | Self::Vector { value_type, .. } => *value_type,
            Self::Column(col) => col.value_type,
            Self::Comparison { .. } | Self::Conjunction { .. } | Self::InList { .. } => {
                ValueType::Boolean
            }
        }
    }

    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Self::Vector { .. })
    }

    /// Type-checks the expression tree. The error is a human-readable reason which callers
    /// attach to the plan node holding the expression.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            // JSON has no spelling for these, so they could not be read back.
            Self::Constant {
                value: Value::Float(val),
            } if !val.is_finite() => Err(format!("non-finite float constant {}", val)),
            Self::Constant { .. } | Self::Parameter { .. } | Self::Column(_) => Ok(()),
            Self::Comparison { left, right, .. } => {
                left.validate()?;
                right.validate()?;
                if left.is_multi_valued() || right.is_multi_valued() {
                    return Err(format!("comparison with a multi-valued operand: {}", self));
                }
                let (left_type, right_type) = (left.value_type(), right.value_type());
                if !left_type.accepts(right_type) && !right_type.accepts(left_type) {
                    return Err(format!(
                        "cannot compare {} with {} in {}",
                        left_type, right_type, self
                    ));
                }
                Ok(())
            }
            Self::Conjunction { left, right, .. } => {
                left.validate()?;
                right.validate()?;
                match [left, right]
                    .into_iter()
                    .find(|side| side.value_type() != ValueType::Boolean)
                {
                    Some(side) => Err(format!("conjunction operand is not boolean: {}", side)),
                    None => Ok(()),
                }
            }
            Self::Vector { value_type, values } => {
                for value in values {
                    if !matches!(value, Self::Constant { .. } | Self::Parameter { .. }) {
                        return Err(format!("vector element is not a constant: {}", value));
                    }
                    value.validate()?;
                    if !value_type.accepts(value.value_type()) {
                        return Err(format!(
                            "vector of {} holds a {} element",
                            value_type,
                            value.value_type()
                        ));
                    }
                }
                Ok(())
            }
            Self::InList { left, list } => {
                left.validate()?;
                list.validate()?;
                if left.is_multi_valued() {
                    return Err(format!("IN-list operand is multi-valued: {}", left));
                }
                if !list.is_multi_valued() {
                    return Err(format!("IN-list right side is not a list: {}", list));
                }
                let (left_type, list_type) = (left.value_type(), list.value_type());
                if !list_type.accepts(left_type) && !left_type.accepts(list_type) {
                    return Err(format!("cannot test {} against a {} list", left_type, list_type));
                }
                Ok(())
            }
        }
    }

    /// Iterates over the children of an expression.
    #[auto_enum(Iterator)]
    fn iter_children<'a>(&'a self) -> impl Iterator<Item = &'a Self> {
        match self {
            Self::Constant { .. } | Self::Parameter { .. } | Self::Column(_) => std::iter::empty(),
            Self::Comparison { left, right, .. }
            | Self::Conjunction { left, right, .. }
            | Self::InList {
                left, list: right, ..
            } => vec![left.as_ref(), right.as_ref()].into_iter(),
            Self::Vector { values, .. } => values.iter(),
        }
    }

    /// Iterates over the expression tree in dft order.
    pub fn iter_tree<'a>(&'a self) -> impl Iterator<Item = &'a Self> {
        DftPre::new(self, |expr| expr.iter_children()).map(|(_, expr)| expr)
    }

    /// Iterates over all column references in this expression.
    pub fn column_refs<'a>(&'a self) -> impl Iterator<Item = &'a ColumnRef> {
        self.iter_tree().filter_map(|expr| match expr {
            Self::Column(col) => Some(col),
            _ => None,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.column_refs().all(|col| col.is_resolved())
    }

    /// Whether any column reference carries a binding, even a partial one.
    pub fn has_bindings(&self) -> bool {
        self.column_refs()
            .any(|col| col.tuple_idx.is_some() || col.column_idx.is_some())
    }

    /// Visits every column reference mutably, stopping at the first error.
    pub fn resolve_columns<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut ColumnRef) -> Result<()>,
    {
        match self {
            Self::Constant { .. } | Self::Parameter { .. } => Ok(()),
            Self::Column(col) => f(col),
            Self::Comparison { left, right, .. }
            | Self::Conjunction { left, right, .. }
            | Self::InList { left, list: right } => {
                left.resolve_columns(f)?;
                right.resolve_columns(f)
            }
            Self::Vector { values, .. } => values
                .iter_mut()
                .try_for_each(|value| value.resolve_columns(f)),
        }
    }

    /// Drops every binding made by column resolution.
    pub fn clear_resolution(&mut self) {
        let _ = self.resolve_columns(&mut |col: &mut ColumnRef| {
            col.tuple_idx = None;
            col.column_idx = None;
            Ok(())
        });
    }
}

impl ColumnRef {
    pub fn new(table_alias: &str, column_name: &str, value_type: ValueType) -> Self {
        Self {
            table_alias: table_alias.to_string(),
            column_name: column_name.to_string(),
            value_type,
            tuple_idx: None,
            column_idx: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tuple_idx.is_some() && self.column_idx.is_some()
    }

    pub fn bind(&mut self, tuple_idx: usize, column_idx: usize) {
        self.tuple_idx = Some(tuple_idx);
        self.column_idx = Some(column_idx);
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { value } => write!(f, "{}", value),
            Self::Parameter { index, .. } => write!(f, "?{}", index),
            Self::Column(col) => write!(f, "{}", col),
            Self::Comparison { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Self::Conjunction { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Self::Vector { values, .. } => write!(f, "[{}]", values.iter().join(", ")),
            Self::InList { left, list } => write!(f, "{} IN {}", left, list),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_alias, self.column_name)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for ConjunctionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use pretty_assertions::assert_eq;

    #[test]
    fn multi_valued() {
        assert!(test_utils::bigint_list(&[1, 2, 3]).is_multi_valued());
        assert!(!Expr::constant(Value::BigInt(1)).is_multi_valued());
        assert!(!Expr::column("t", "c", ValueType::BigInt).is_multi_valued());
    }

    #[test]
    fn validate_vector_elements() {
        assert!(test_utils::bigint_list(&[1, 2]).validate().is_ok());
        let mixed = Expr::vector(
            ValueType::BigInt,
            vec![
                Expr::constant(Value::BigInt(1)),
                Expr::parameter(0, ValueType::Integer),
                Expr::constant(Value::Null),
            ],
        );
        assert!(mixed.validate().is_ok());

        let wrong_type = Expr::vector(
            ValueType::BigInt,
            vec![Expr::constant(Value::Varchar("a".to_string()))],
        );
        assert!(wrong_type.validate().is_err());

        let not_constant = Expr::vector(
            ValueType::BigInt,
            vec![Expr::column("t", "c", ValueType::BigInt)],
        );
        assert!(not_constant.validate().is_err());
    }

    #[test]
    fn validate_in_list() {
        let col = Expr::column("t", "c", ValueType::BigInt);
        assert!(Expr::in_list(col.clone(), test_utils::bigint_list(&[1]))
            .validate()
            .is_ok());
        assert!(Expr::in_list(col.clone(), Expr::constant(Value::BigInt(1)))
            .validate()
            .is_err());
        assert!(Expr::and(col, Expr::constant(Value::Boolean(true)))
            .validate()
            .is_err());
    }

    #[test]
    fn rejects_non_finite_floats() {
        let total = Expr::column("o", "total", ValueType::Float);
        for val in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let cmp = Expr::comparison(
                ComparisonOp::GreaterThan,
                total.clone(),
                Expr::constant(Value::Float(val)),
            );
            assert!(cmp.validate().is_err());
            let list = Expr::vector(ValueType::Float, vec![Expr::constant(Value::Float(val))]);
            assert!(list.validate().is_err());
        }
        assert!(Expr::constant(Value::Float(2.5)).validate().is_ok());
    }

    #[test]
    fn resolve_and_clear() {
        let mut expr = Expr::and(
            Expr::equals(
                Expr::column("a", "x", ValueType::BigInt),
                Expr::constant(Value::BigInt(1)),
            ),
            Expr::equals(
                Expr::column("b", "y", ValueType::BigInt),
                Expr::column("a", "z", ValueType::BigInt),
            ),
        );
        assert_eq!(
            expr.column_refs().map(|col| col.to_string()).collect::<Vec<_>>(),
            vec!["a.x", "b.y", "a.z"]
        );
        assert!(!expr.is_resolved());

        let mut next = 0;
        expr.resolve_columns(&mut |col: &mut ColumnRef| {
            col.bind(0, next);
            next += 1;
            Ok(())
        })
        .unwrap();
        assert!(expr.is_resolved());
        assert_eq!(
            expr.column_refs()
                .map(|col| col.column_idx.unwrap())
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        assert!(expr.has_bindings());
        expr.clear_resolution();
        assert!(expr.column_refs().all(|col| !col.is_resolved()));
        assert!(!expr.has_bindings());
    }

    #[test]
    fn document_shape() {
        let mut col = ColumnRef::new("t", "c", ValueType::Integer);
        assert_eq!(
            serde_json::to_value(Expr::Column(col.clone())).unwrap(),
            serde_json::json!({
                "TYPE": "COLUMN",
                "TABLE_ALIAS": "t",
                "COLUMN_NAME": "c",
                "VALUE_TYPE": "INTEGER",
            })
        );
        col.bind(1, 4);
        let doc = serde_json::to_value(Expr::Column(col.clone())).unwrap();
        assert_eq!(doc["TUPLE_IDX"], serde_json::json!(1));
        assert_eq!(
            serde_json::from_value::<Expr>(doc).unwrap(),
            Expr::Column(col)
        );

        let list = test_utils::bigint_list(&[3, 1]);
        assert_eq!(list.to_string(), "[3, 1]");
        let doc = serde_json::to_value(&list).unwrap();
        assert_eq!(doc["TYPE"], serde_json::json!("VECTOR"));
        assert_eq!(doc["VALUES"][1]["VALUE"]["VALUE"], serde_json::json!(1));
    }
}
