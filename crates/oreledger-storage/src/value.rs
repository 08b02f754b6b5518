//! Driver-neutral statement parameters and result rows
//!
//! Statement parameters and result rows are expressed once, as [`SqlValue`]
//! and [`SqlRow`], and converted to and from each driver at the edge.

use std::error::Error;

use bytes::BytesMut;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use tokio_postgres::types::{IsNull, ToSql as PgToSql, Type, to_sql_checked};

/// A single statement parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            SqlValue::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            SqlValue::Real(value) => ToSqlOutput::Owned(Value::Real(*value)),
            SqlValue::Bool(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(value) => SqlValue::Integer(value),
            ValueRef::Real(value) => SqlValue::Real(value),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

// PostgreSQL types parameters strictly, so integers are narrowed to the
// width of the target column here.
impl PgToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Text(text) => text.as_str().to_sql(ty, out),
            SqlValue::Integer(value) => {
                if *ty == Type::INT2 {
                    i16::try_from(*value)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*value)?.to_sql(ty, out)
                } else if *ty == Type::BOOL {
                    (*value != 0).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*value as f64).to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            SqlValue::Real(value) => value.to_sql(ty, out),
            SqlValue::Bool(value) => value.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <&str as PgToSql>::accepts(ty)
            || [Type::BOOL, Type::INT2, Type::INT4, Type::INT8, Type::FLOAT8].contains(ty)
    }

    to_sql_checked!();
}

/// One result row, addressed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
            .and_then(|index| self.values.get(index))
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            SqlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            SqlValue::Integer(value) => Some(*value),
            SqlValue::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    /// SQLite stores booleans as integers; any non-zero value is true.
    pub fn boolean(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            SqlValue::Bool(value) => Some(*value),
            SqlValue::Integer(value) => Some(*value != 0),
            _ => None,
        }
    }
}

pub(crate) fn row_from_postgres(row: &tokio_postgres::Row) -> Result<SqlRow, tokio_postgres::Error> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(index)?.map(SqlValue::Bool)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(index)?
                .map(|v| SqlValue::Integer(i64::from(v)))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(index)?
                .map(|v| SqlValue::Integer(i64::from(v)))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(index)?.map(SqlValue::Integer)
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(index)?.map(SqlValue::Real)
        } else {
            row.try_get::<_, Option<String>>(index)?.map(SqlValue::Text)
        };
        columns.push(column.name().to_string());
        values.push(value.unwrap_or(SqlValue::Null));
    }

    Ok(SqlRow::new(columns, values))
}
