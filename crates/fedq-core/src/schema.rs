//! Runtime datatypes and the output schema of tuple sources.
//!
//! `DataType` is the closed set of runtime types a value can carry. Metadata
//! datatype records (`varchar`, `decimal`, ...) map onto these by name.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Char,
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    BigInteger,
    Float,
    Double,
    BigDecimal,
    Date,
    Time,
    Timestamp,
    Object,
    Blob,
    Clob,
    Xml,
    Varbinary,
    /// Type of the untyped null literal.
    Null,
}

impl DataType {
    /// Canonical runtime type name.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Char => "char",
            DataType::Boolean => "boolean",
            DataType::Byte => "byte",
            DataType::Short => "short",
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::BigInteger => "biginteger",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::BigDecimal => "bigdecimal",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Timestamp => "timestamp",
            DataType::Object => "object",
            DataType::Blob => "blob",
            DataType::Clob => "clob",
            DataType::Xml => "xml",
            DataType::Varbinary => "varbinary",
            DataType::Null => "null",
        }
    }

    /// Look up a runtime type by name or by one of its SQL aliases.
    pub fn from_name(name: &str) -> Option<DataType> {
        let lower = name.to_ascii_lowercase();
        let dt = match lower.as_str() {
            "string" | "varchar" => DataType::String,
            "char" => DataType::Char,
            "boolean" => DataType::Boolean,
            "byte" | "tinyint" => DataType::Byte,
            "short" | "smallint" => DataType::Short,
            "integer" | "int" => DataType::Integer,
            "long" | "bigint" => DataType::Long,
            "biginteger" => DataType::BigInteger,
            "float" | "real" => DataType::Float,
            "double" => DataType::Double,
            "bigdecimal" | "decimal" | "numeric" => DataType::BigDecimal,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "timestamp" => DataType::Timestamp,
            "object" => DataType::Object,
            "blob" => DataType::Blob,
            "clob" => DataType::Clob,
            "xml" => DataType::Xml,
            "varbinary" => DataType::Varbinary,
            _ => return None,
        };
        Some(dt)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Byte
                | DataType::Short
                | DataType::Integer
                | DataType::Long
                | DataType::BigInteger
                | DataType::Float
                | DataType::Double
                | DataType::BigDecimal
        )
    }

    /// Rough per-value footprint, used for buffer accounting and estimates.
    pub fn estimated_size(&self) -> usize {
        match self {
            DataType::Boolean | DataType::Byte | DataType::Null => 1,
            DataType::Short => 2,
            DataType::Char => 4,
            DataType::Integer | DataType::Float => 4,
            DataType::Long | DataType::Double | DataType::Date | DataType::Time => 8,
            DataType::Timestamp | DataType::BigInteger | DataType::BigDecimal => 16,
            DataType::String | DataType::Object => 32,
            DataType::Blob | DataType::Clob | DataType::Xml | DataType::Varbinary => 64,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    /// Case-insensitive position lookup; names in the engine are case-insensitive.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Estimated bytes per row.
    pub fn estimated_row_size(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.data_type.estimated_size())
            .sum::<usize>()
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_map_to_runtime_types() {
        assert_eq!(DataType::from_name("VARCHAR"), Some(DataType::String));
        assert_eq!(DataType::from_name("decimal"), Some(DataType::BigDecimal));
        assert_eq!(DataType::from_name("int"), Some(DataType::Integer));
        assert_eq!(DataType::from_name("nosuchtype"), None);
    }

    #[test]
    fn index_of_ignores_case() {
        let schema = Schema::new(vec![
            Field::new("E1", DataType::Integer, true),
            Field::new("e2", DataType::String, true),
        ]);
        assert_eq!(schema.index_of("e1"), Some(0));
        assert_eq!(schema.index_of("E2"), Some(1));
        assert_eq!(schema.index_of("e3"), None);
    }
}
