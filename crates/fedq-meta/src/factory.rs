//! Builds one schema's records, then commits them into a `MetadataStore`.

use std::collections::BTreeMap;

use fedq_core::id::generate_record_uuid;
use tracing::debug;

use crate::error::{MetaError, Result};
use crate::model::{
    Column, Datatype, ForeignKey, FunctionMethod, KeyRecord, KeyType, NameMap, Procedure,
    ReferencedKey, Schema, Table, TableKind,
};
use crate::store::MetadataStore;

pub struct MetadataFactory {
    vdb_name: String,
    vdb_version: u32,
    schema: Schema,
    datatypes: NameMap<Datatype>,
    namespaces: BTreeMap<String, String>,
}

impl MetadataFactory {
    pub fn new(
        vdb_name: impl Into<String>,
        vdb_version: u32,
        model_name: impl Into<String>,
        physical: bool,
    ) -> Self {
        let mut datatypes = NameMap::new();
        for dt in Datatype::builtins() {
            let _ = datatypes.insert(dt.name.clone(), dt);
        }
        Self {
            vdb_name: vdb_name.into(),
            vdb_version,
            schema: Schema::new(model_name, physical),
            datatypes,
            namespaces: BTreeMap::new(),
        }
    }

    pub fn vdb_name(&self) -> &str {
        &self.vdb_name
    }

    pub fn vdb_version(&self) -> u32 {
        self.vdb_version
    }

    pub fn model_name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn tables(&self) -> &NameMap<Table> {
        &self.schema.tables
    }

    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }

    pub fn datatype(&self, name: &str) -> Result<Datatype> {
        self.datatypes
            .get(name)
            .cloned()
            .ok_or_else(|| MetaError::UnknownDatatype(name.to_string()))
    }

    pub fn new_table(&self, name: impl Into<String>, kind: TableKind) -> Table {
        Table::new(name, kind, generate_record_uuid())
    }

    pub fn new_column(&self, name: impl Into<String>, type_name: &str) -> Result<Column> {
        Ok(Column::new(
            name,
            self.datatype(type_name)?,
            generate_record_uuid(),
        ))
    }

    pub fn new_procedure(&self, name: impl Into<String>) -> Procedure {
        Procedure::new(name, generate_record_uuid())
    }

    pub fn add_table(&mut self, table: Table) -> Result<()> {
        let name = table.name.clone();
        self.schema
            .tables
            .insert(name.clone(), table)
            .map_err(|_| MetaError::DuplicateRecord { kind: "table", name: name.clone() })?;
        debug!(schema = %self.schema.name, table = %name, "table added");
        Ok(())
    }

    pub fn add_procedure(&mut self, procedure: Procedure) -> Result<()> {
        let name = procedure.name.clone();
        self.schema
            .procedures
            .insert(name.clone(), procedure)
            .map_err(|_| MetaError::DuplicateRecord {
                kind: "procedure",
                name: name.clone(),
            })?;
        debug!(schema = %self.schema.name, procedure = %name, "procedure added");
        Ok(())
    }

    pub fn add_function(&mut self, function: FunctionMethod) -> Result<()> {
        let name = function.name.clone();
        self.schema
            .functions
            .insert(name.clone(), function)
            .map_err(|_| MetaError::DuplicateRecord {
                kind: "function",
                name: name.clone(),
            })?;
        debug!(schema = %self.schema.name, function = %name, "function added");
        Ok(())
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.schema
            .tables
            .get_mut(name)
            .ok_or_else(|| MetaError::NotFound(name.to_string()))
    }

    pub fn add_namespace(&mut self, prefix: &str, uri: impl Into<String>) {
        self.namespaces
            .insert(prefix.to_ascii_lowercase(), uri.into());
    }

    /// Commit this factory's schema and namespaces. Foreign keys that refer
    /// to tables of the same schema are resolved first; the rest stay pending.
    pub fn merge_into(mut self, store: &mut MetadataStore) -> Result<()> {
        resolve_local_foreign_keys(&mut self.schema);
        let MetadataFactory {
            schema, namespaces, ..
        } = self;
        debug!(
            schema = %schema.name,
            tables = schema.tables.len(),
            procedures = schema.procedures.len(),
            "merging schema"
        );
        store.add_schema(schema)?;
        for (prefix, uri) in namespaces {
            store.add_namespace(&prefix, uri);
        }
        Ok(())
    }

    pub fn as_metadata_store(self) -> Result<MetadataStore> {
        let mut store = MetadataStore::new();
        self.merge_into(&mut store)?;
        Ok(store)
    }
}

/// Build a key over the named columns of `table`.
pub fn key_record(
    table: &Table,
    key_type: KeyType,
    name: Option<String>,
    columns: &[String],
) -> Result<KeyRecord> {
    let mut indexes = Vec::with_capacity(columns.len());
    for col in columns {
        let idx = table
            .column_index(col)
            .ok_or_else(|| MetaError::UnknownColumn {
                table: table.name.clone(),
                column: col.clone(),
            })?;
        indexes.push(idx);
    }
    let ordinal = match key_type {
        KeyType::Primary => 0,
        KeyType::Unique => table.unique_keys.len(),
        KeyType::Index => table.indexes.len(),
        KeyType::AccessPattern => table.access_patterns.len(),
        KeyType::Foreign => table.foreign_keys.len(),
    };
    let name = name.unwrap_or_else(|| match key_type {
        KeyType::Primary => format!("PK_{}", table.name),
        KeyType::Unique => format!("UK{}_{}", ordinal, table.name),
        KeyType::Index => format!("IDX{}_{}", ordinal, table.name),
        KeyType::AccessPattern => format!("AP{}_{}", ordinal, table.name),
        KeyType::Foreign => format!("FK{}_{}", ordinal, table.name),
    });
    Ok(KeyRecord {
        name,
        uuid: generate_record_uuid(),
        key_type,
        columns: indexes,
    })
}

/// Install a primary, unique, index or access-pattern key on `table`.
pub fn add_key(
    table: &mut Table,
    key_type: KeyType,
    name: Option<String>,
    columns: &[String],
) -> Result<()> {
    if key_type == KeyType::Primary && table.primary_key.is_some() {
        return Err(MetaError::DuplicatePrimaryKey {
            table: table.name.clone(),
        });
    }
    let key = key_record(table, key_type, name, columns)?;
    match key_type {
        KeyType::Primary => table.primary_key = Some(key),
        KeyType::Unique => table.unique_keys.push(key),
        KeyType::Index => table.indexes.push(key),
        KeyType::AccessPattern => table.access_patterns.push(key),
        KeyType::Foreign => {
            return Err(MetaError::resolve("foreign keys are added with add_foreign_key"))
        }
    }
    Ok(())
}

pub fn add_foreign_key(
    table: &mut Table,
    name: Option<String>,
    columns: &[String],
    reference_table_name: impl Into<String>,
    reference_columns: Option<Vec<String>>,
) -> Result<()> {
    let key = key_record(table, KeyType::Foreign, name, columns)?;
    table.foreign_keys.push(ForeignKey {
        key,
        reference_table_name: reference_table_name.into(),
        reference_columns,
        resolved: None,
    });
    Ok(())
}

/// Pick the key of `target` that `fk` refers to: with explicit reference
/// columns the primary or a unique key with exactly those columns, otherwise
/// the primary key. The bound key must have the foreign key's arity.
pub fn bind_foreign_key(fk: &ForeignKey, schema: &str, target: &Table) -> Option<ReferencedKey> {
    let key = match &fk.reference_columns {
        Some(wanted) => target.candidate_keys().find(|k| {
            let names = target.key_column_names(k);
            names.len() == wanted.len()
                && names
                    .iter()
                    .zip(wanted)
                    .all(|(a, b)| a.eq_ignore_ascii_case(b))
        })?,
        None => target.primary_key.as_ref()?,
    };
    if key.columns.len() != fk.key.columns.len() {
        return None;
    }
    Some(ReferencedKey {
        schema: schema.to_string(),
        table: target.name.clone(),
        key_type: key.key_type,
        key_name: key.name.clone(),
        columns: target.key_column_names(key),
    })
}

fn resolve_local_foreign_keys(schema: &mut Schema) {
    let mut bindings = Vec::new();
    for (table_name, table) in schema.tables.iter() {
        for (i, fk) in table.foreign_keys.iter().enumerate() {
            if fk.is_resolved() {
                continue;
            }
            let local = match fk.reference_table_name.split_once('.') {
                Some((s, t)) if s.eq_ignore_ascii_case(&schema.name) => t,
                Some(_) => continue,
                None => fk.reference_table_name.as_str(),
            };
            if let Some(target) = schema.tables.get(local) {
                if let Some(bound) = bind_foreign_key(fk, &schema.name, target) {
                    bindings.push((table_name.to_string(), i, bound));
                }
            }
        }
    }
    for (table_name, i, bound) in bindings {
        if let Some(fk) = schema
            .tables
            .get_mut(&table_name)
            .and_then(|t| t.foreign_keys.get_mut(i))
        {
            fk.resolved = Some(bound);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn table(f: &MetadataFactory, name: &str, columns: &[&str]) -> Table {
        let mut t = f.new_table(name, TableKind::Physical);
        for c in columns {
            t.add_column(f.new_column(*c, "integer").unwrap());
        }
        t
    }

    #[test]
    fn second_primary_key_fails() {
        let f = MetadataFactory::new("vdb", 1, "pm1", true);
        let mut t = table(&f, "g1", &["e1", "e2"]);
        add_key(&mut t, KeyType::Primary, None, &cols(&["e1"])).unwrap();
        let err = add_key(&mut t, KeyType::Primary, None, &cols(&["e2"])).unwrap_err();
        assert!(matches!(err, MetaError::DuplicatePrimaryKey { .. }));
    }

    #[test]
    fn unknown_key_column_fails() {
        let f = MetadataFactory::new("vdb", 1, "pm1", true);
        let mut t = table(&f, "g1", &["e1", "e2"]);
        let err = add_key(&mut t, KeyType::Unique, None, &cols(&["e3"])).unwrap_err();
        assert!(matches!(err, MetaError::UnknownColumn { .. }));
        assert!(t.unique_keys.is_empty());
    }

    #[test]
    fn merge_resolves_same_schema_foreign_keys() {
        let mut f = MetadataFactory::new("vdb", 1, "pm1", true);
        let mut g1 = table(&f, "G1", &["a", "b"]);
        add_key(&mut g1, KeyType::Unique, None, &cols(&["a", "b"])).unwrap();
        let mut g2 = table(&f, "G2", &["x", "y", "z"]);
        add_foreign_key(&mut g2, None, &cols(&["x", "y"]), "G1", Some(cols(&["a", "b"]))).unwrap();
        add_foreign_key(&mut g2, None, &cols(&["z"]), "G1", None).unwrap();
        f.add_table(g1).unwrap();
        f.add_table(g2).unwrap();

        let store = f.as_metadata_store().unwrap();
        let g2 = store.schema("pm1").unwrap().table("g2").unwrap();
        let bound = g2.foreign_keys[0].resolved.as_ref().unwrap();
        assert_eq!(bound.key_type, KeyType::Unique);
        assert_eq!(bound.columns, cols(&["a", "b"]));
        // no primary key on G1: stays pending for the validator
        assert!(!g2.foreign_keys[1].is_resolved());
    }

    #[test]
    fn duplicate_table_is_rejected() {
        let mut f = MetadataFactory::new("vdb", 1, "pm1", true);
        f.add_table(table(&f, "g1", &["e1"])).unwrap();
        let dup = table(&f, "G1", &["e1"]);
        assert!(matches!(
            f.add_table(dup),
            Err(MetaError::DuplicateRecord { kind: "table", .. })
        ));
    }
}
