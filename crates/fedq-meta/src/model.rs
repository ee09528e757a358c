//! Metadata records: schemas, tables, columns, keys, procedures, functions.
//!
//! Records are plain owned data. Cross references (foreign keys to their
//! referenced key, materialized views to their table) are kept by name and
//! resolved copies, never by pointer, so a store can be cloned and merged
//! freely.

use std::collections::{BTreeMap, HashMap};

use fedq_core::schema::DataType;
use serde::{Deserialize, Serialize};

/// Extension properties, kept sorted for stable rendering.
pub type Properties = BTreeMap<String, String>;

/// Insertion-ordered map with case-insensitive keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameMap<T> {
    entries: Vec<(String, T)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl<T> Default for NameMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> NameMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// Insert a new entry; a case-insensitive duplicate hands the value back.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Result<(), T> {
        let name = name.into();
        let key = Self::key(&name);
        if self.lookup(&key).is_some() {
            return Err(value);
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((name, value));
        Ok(())
    }

    fn lookup(&self, key: &str) -> Option<usize> {
        if self.index.len() == self.entries.len() {
            return self.index.get(key).copied();
        }
        // index is skipped by serde; fall back to a scan after deserialization
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(key))
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.lookup(&Self::key(name)).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        let i = self.lookup(&Self::key(name))?;
        Some(&mut self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.entries.into_iter().map(|(_, v)| v)
    }
}

/// A named type record as referenced by DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datatype {
    pub name: String,
    pub runtime_type: DataType,
}

impl Datatype {
    pub fn new(name: impl Into<String>, runtime_type: DataType) -> Self {
        Self {
            name: name.into(),
            runtime_type,
        }
    }

    /// Runtime type names plus the `varchar` and `decimal` aliases.
    pub fn builtins() -> Vec<Datatype> {
        use DataType::*;
        let mut out: Vec<Datatype> = [
            String, Char, Boolean, Byte, Short, Integer, Long, BigInteger, Float, Double,
            BigDecimal, Date, Time, Timestamp, Object, Blob, Clob, Xml, Varbinary,
        ]
        .into_iter()
        .map(|dt| Datatype::new(dt.name(), dt))
        .collect();
        out.push(Datatype::new("varchar", String));
        out.push(Datatype::new("decimal", BigDecimal));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NullType {
    #[default]
    Nullable,
    NoNulls,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub uuid: String,
    pub name_in_source: Option<String>,
    pub datatype: Datatype,
    pub native_type: Option<String>,
    pub null_type: NullType,
    pub length: u32,
    pub precision: u32,
    pub scale: u32,
    pub default_value: Option<String>,
    pub auto_increment: bool,
    pub selectable: bool,
    pub updatable: bool,
    /// 1-based position within the owning table or result set.
    pub position: usize,
    pub annotation: Option<String>,
    pub properties: Properties,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: Datatype, uuid: String) -> Self {
        Self {
            name: name.into(),
            uuid,
            name_in_source: None,
            datatype,
            native_type: None,
            null_type: NullType::Nullable,
            length: 0,
            precision: 0,
            scale: 0,
            default_value: None,
            auto_increment: false,
            selectable: true,
            updatable: true,
            position: 0,
            annotation: None,
            properties: Properties::new(),
        }
    }

    pub fn runtime_type(&self) -> DataType {
        self.datatype.runtime_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Primary,
    Unique,
    Index,
    AccessPattern,
    Foreign,
}

impl KeyType {
    pub fn label(&self) -> &'static str {
        match self {
            KeyType::Primary => "primary key",
            KeyType::Unique => "unique key",
            KeyType::Index => "index",
            KeyType::AccessPattern => "access pattern",
            KeyType::Foreign => "foreign key",
        }
    }
}

/// An ordered sub-sequence of a table's columns, stored as indexes into
/// `Table::columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub name: String,
    pub uuid: String,
    pub key_type: KeyType,
    pub columns: Vec<usize>,
}

/// Copy of the key a foreign key was bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedKey {
    pub schema: String,
    pub table: String,
    pub key_type: KeyType,
    pub key_name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub key: KeyRecord,
    /// Referenced table as written, simple or schema qualified.
    pub reference_table_name: String,
    pub reference_columns: Option<Vec<String>>,
    pub resolved: Option<ReferencedKey>,
}

impl ForeignKey {
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Physical,
    View,
}

/// Schema-qualified reference to another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub uuid: String,
    pub name_in_source: Option<String>,
    pub kind: TableKind,
    pub columns: Vec<Column>,
    pub primary_key: Option<KeyRecord>,
    pub unique_keys: Vec<KeyRecord>,
    pub indexes: Vec<KeyRecord>,
    pub access_patterns: Vec<KeyRecord>,
    pub foreign_keys: Vec<ForeignKey>,
    /// -1 when unknown.
    pub cardinality: i64,
    pub supports_update: bool,
    pub annotation: Option<String>,
    pub select_transformation: Option<String>,
    pub insert_plan: Option<String>,
    pub update_plan: Option<String>,
    pub delete_plan: Option<String>,
    pub materialized: bool,
    pub materialized_table_name: Option<String>,
    pub materialized_table: Option<TableRef>,
    pub properties: Properties,
}

impl Table {
    pub fn new(name: impl Into<String>, kind: TableKind, uuid: String) -> Self {
        Self {
            name: name.into(),
            uuid,
            name_in_source: None,
            kind,
            columns: Vec::new(),
            primary_key: None,
            unique_keys: Vec::new(),
            indexes: Vec::new(),
            access_patterns: Vec::new(),
            foreign_keys: Vec::new(),
            cardinality: -1,
            supports_update: false,
            annotation: None,
            select_transformation: None,
            insert_plan: None,
            update_plan: None,
            delete_plan: None,
            materialized: false,
            materialized_table_name: None,
            materialized_table: None,
            properties: Properties::new(),
        }
    }

    pub fn is_physical(&self) -> bool {
        self.kind == TableKind::Physical
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == TableKind::View
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Append a column, assigning its 1-based position.
    pub fn add_column(&mut self, mut column: Column) {
        column.position = self.columns.len() + 1;
        self.columns.push(column);
    }

    pub fn key_column_names(&self, key: &KeyRecord) -> Vec<String> {
        key.columns
            .iter()
            .filter_map(|&i| self.columns.get(i).map(|c| c.name.clone()))
            .collect()
    }

    /// Primary key first, then unique keys in declaration order.
    pub fn candidate_keys(&self) -> impl Iterator<Item = &KeyRecord> {
        self.primary_key.iter().chain(self.unique_keys.iter())
    }

    pub fn cardinality_hint(&self) -> Option<u64> {
        u64::try_from(self.cardinality).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    In,
    Out,
    InOut,
    ReturnValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureParameter {
    pub name: String,
    pub uuid: String,
    pub param_type: ParameterType,
    pub datatype: Datatype,
    pub length: u32,
    pub precision: u32,
    pub scale: u32,
    pub position: usize,
    pub vararg: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    pub uuid: String,
    pub name_in_source: Option<String>,
    pub parameters: Vec<ProcedureParameter>,
    pub result_set: Option<Vec<Column>>,
    pub is_virtual: bool,
    pub query_plan: Option<String>,
    pub update_count: i32,
    pub annotation: Option<String>,
    pub properties: Properties,
}

impl Procedure {
    pub fn new(name: impl Into<String>, uuid: String) -> Self {
        Self {
            name: name.into(),
            uuid,
            name_in_source: None,
            parameters: Vec::new(),
            result_set: None,
            is_virtual: false,
            query_plan: None,
            update_count: 1,
            annotation: None,
            properties: Properties::new(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ProcedureParameter> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushDown {
    MustPushdown,
    CanPushdown,
    CannotPushdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Determinism {
    Deterministic,
    UserDeterministic,
    SessionDeterministic,
    Nondeterministic,
}

impl Determinism {
    pub fn parse(text: &str) -> Option<Determinism> {
        match text.to_ascii_uppercase().as_str() {
            "DETERMINISTIC" => Some(Determinism::Deterministic),
            "USER_DETERMINISTIC" => Some(Determinism::UserDeterministic),
            "SESSION_DETERMINISTIC" => Some(Determinism::SessionDeterministic),
            "NONDETERMINISTIC" => Some(Determinism::Nondeterministic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParameter {
    pub name: String,
    pub datatype: String,
    pub vararg: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMethod {
    pub name: String,
    pub uuid: String,
    pub name_in_source: Option<String>,
    pub inputs: Vec<FunctionParameter>,
    pub output: FunctionParameter,
    pub pushdown: PushDown,
    pub determinism: Determinism,
    pub category: Option<String>,
    pub null_on_null: bool,
    pub invocation_class: Option<String>,
    pub invocation_method: Option<String>,
    pub annotation: Option<String>,
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub physical: bool,
    pub tables: NameMap<Table>,
    pub procedures: NameMap<Procedure>,
    pub functions: NameMap<FunctionMethod>,
    pub annotation: Option<String>,
    pub properties: Properties,
}

impl Schema {
    pub fn new(name: impl Into<String>, physical: bool) -> Self {
        Self {
            name: name.into(),
            physical,
            ..Default::default()
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionMethod> {
        self.functions.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.procedures.is_empty() && self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_map_is_case_insensitive_and_ordered() {
        let mut m = NameMap::new();
        m.insert("G2", 2).unwrap();
        m.insert("g1", 1).unwrap();
        assert_eq!(m.insert("g2", 3), Err(3));
        assert_eq!(m.get("G1"), Some(&1));
        let names: Vec<&str> = m.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["G2", "g1"]);
    }

    #[test]
    fn name_map_lookup_survives_serde() {
        let mut m = NameMap::new();
        m.insert("Alpha", 1u32).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back: NameMap<u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("ALPHA"), Some(&1));
    }

    #[test]
    fn builtins_include_aliases() {
        let all = Datatype::builtins();
        let varchar = all.iter().find(|d| d.name == "varchar").unwrap();
        assert_eq!(varchar.runtime_type, DataType::String);
        assert!(all.iter().any(|d| d.name == "decimal"));
    }

    #[test]
    fn columns_get_positions() {
        let mut t = Table::new("g1", TableKind::Physical, "u".into());
        t.add_column(Column::new("e1", Datatype::new("integer", DataType::Integer), "c1".into()));
        t.add_column(Column::new("e2", Datatype::new("string", DataType::String), "c2".into()));
        assert_eq!(t.column("E2").unwrap().position, 2);
        assert_eq!(t.cardinality_hint(), None);
    }
}
