//! The top-level metadata aggregate for one VDB version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MetaError, Result};
use crate::model::{Datatype, NameMap, Procedure, Schema, Table};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataStore {
    schemas: NameMap<Schema>,
    datatypes: NameMap<Datatype>,
    /// prefix (lower case) -> uri
    namespaces: BTreeMap<String, String>,
}

impl Default for MetadataStore {
    fn default() -> Self {
        let mut datatypes = NameMap::new();
        for dt in Datatype::builtins() {
            let _ = datatypes.insert(dt.name.clone(), dt);
        }
        Self {
            schemas: NameMap::new(),
            datatypes,
            namespaces: BTreeMap::new(),
        }
    }
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema. A case-insensitive duplicate leaves the store unchanged.
    pub fn add_schema(&mut self, schema: Schema) -> Result<()> {
        let name = schema.name.clone();
        self.schemas
            .insert(name.clone(), schema)
            .map_err(|_| MetaError::DuplicateRecord {
                kind: "schema",
                name,
            })
    }

    pub fn add_datatype(&mut self, datatype: Datatype) {
        let _ = self.datatypes.insert(datatype.name.clone(), datatype);
    }

    pub fn add_namespace(&mut self, prefix: &str, uri: impl Into<String>) {
        self.namespaces
            .insert(prefix.to_ascii_lowercase(), uri.into());
    }

    /// Union another store into this one. Schema duplicates are errors and
    /// abort before anything is moved.
    pub fn merge(&mut self, other: MetadataStore) -> Result<()> {
        for (name, _) in other.schemas.iter() {
            if self.schemas.contains(name) {
                return Err(MetaError::DuplicateRecord {
                    kind: "schema",
                    name: name.to_string(),
                });
            }
        }
        let MetadataStore {
            schemas,
            datatypes,
            namespaces,
        } = other;
        for schema in schemas.into_values() {
            self.add_schema(schema)?;
        }
        for dt in datatypes.into_values() {
            self.add_datatype(dt);
        }
        self.namespaces.extend(namespaces);
        Ok(())
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn schema_mut(&mut self, name: &str) -> Option<&mut Schema> {
        self.schemas.get_mut(name)
    }

    /// Schemas in insertion order.
    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    pub fn schemas_mut(&mut self) -> impl Iterator<Item = &mut Schema> {
        self.schemas.values_mut()
    }

    pub fn datatype(&self, name: &str) -> Option<&Datatype> {
        self.datatypes.get(name)
    }

    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }

    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .get(&prefix.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Find a table by `schema.table` or by a simple name unique across
    /// schemas. Returns the owning schema name with the table.
    pub fn find_table(&self, name: &str) -> Result<(&str, &Table)> {
        find_in(self, name, "table", |s, n| s.table(n))
    }

    pub fn find_procedure(&self, name: &str) -> Result<(&str, &Procedure)> {
        find_in(self, name, "procedure", |s, n| s.procedure(n))
    }
}

fn find_in<'a, T>(
    store: &'a MetadataStore,
    name: &str,
    kind: &str,
    get: impl Fn(&'a Schema, &str) -> Option<&'a T>,
) -> Result<(&'a str, &'a T)> {
    if let Some((schema_name, simple)) = name.split_once('.') {
        if let Some(schema) = store.schema(schema_name) {
            if let Some(found) = get(schema, simple) {
                return Ok((schema.name.as_str(), found));
            }
        }
    }
    let mut hits = store
        .schemas()
        .filter_map(|s| get(s, name).map(|t| (s.name.as_str(), t)));
    match (hits.next(), hits.next()) {
        (Some(hit), None) => Ok(hit),
        (Some(_), Some(_)) => Err(MetaError::resolve(format!(
            "{} '{}' is ambiguous across schemas",
            kind, name
        ))),
        (None, _) => Err(MetaError::NotFound(name.to_string())),
    }
}
