//! VDB descriptors: the models of a virtual database and their DDL.
//!
//! ```yaml
//! name: portfolio
//! version: 1
//! models:
//!   - name: pm1
//!     type: physical
//!     source: memory
//!     ddl: |
//!       CREATE FOREIGN TABLE g1(e1 varchar, e2 integer);
//!     rows:
//!       g1:
//!         - ["a", 1]
//!   - name: vm1
//!     type: virtual
//!     ddl: |
//!       CREATE VIEW v1 AS SELECT e1 FROM pm1.g1 WHERE e2 > 0;
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ddl::parse_ddl;
use crate::error::{MetaError, Result};
use crate::factory::MetadataFactory;
use crate::store::MetadataStore;
use crate::validator::{MetadataValidator, ValidatorReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Physical,
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetaData {
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default)]
    pub ddl: String,
    /// Connector name for physical models.
    #[serde(default)]
    pub source: Option<String>,
    /// Seed rows per table, for the in-memory connector.
    #[serde(default)]
    pub rows: BTreeMap<String, Vec<Vec<serde_json::Value>>>,
}

impl ModelMetaData {
    pub fn physical(name: impl Into<String>, ddl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_type: ModelType::Physical,
            ddl: ddl.into(),
            source: None,
            rows: BTreeMap::new(),
        }
    }

    pub fn virtual_model(name: impl Into<String>, ddl: impl Into<String>) -> Self {
        Self {
            model_type: ModelType::Virtual,
            ..Self::physical(name, ddl)
        }
    }

    pub fn is_physical(&self) -> bool {
        self.model_type == ModelType::Physical
    }
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VdbMetaData {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub models: Vec<ModelMetaData>,
}

impl VdbMetaData {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            models: Vec::new(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let vdb: VdbMetaData = serde_yaml::from_str(text)?;
        let mut seen = std::collections::HashSet::new();
        for m in &vdb.models {
            if !seen.insert(m.name.to_ascii_lowercase()) {
                return Err(MetaError::Vdb(format!("model '{}' is declared twice", m.name)));
            }
        }
        Ok(vdb)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MetaError::Vdb(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    pub fn add_model(&mut self, model: ModelMetaData) {
        self.models.push(model);
    }

    pub fn model(&self, name: &str) -> Option<&ModelMetaData> {
        self.models
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

/// Run every model's DDL through a factory and merge the results.
pub fn load_store(vdb: &VdbMetaData) -> Result<MetadataStore> {
    let mut store = MetadataStore::new();
    for model in &vdb.models {
        let mut factory =
            MetadataFactory::new(vdb.name.clone(), vdb.version, model.name.clone(), model.is_physical());
        parse_ddl(&mut factory, &model.ddl)?;
        factory.merge_into(&mut store)?;
        debug!(vdb = %vdb.name, model = %model.name, "model loaded");
    }
    Ok(store)
}

/// Run the standard validation pipeline.
pub fn validate(vdb: &VdbMetaData, store: &mut MetadataStore) -> ValidatorReport {
    MetadataValidator::new().validate(vdb, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: myVDB
models:
  - name: pm1
    type: physical
    source: memory
    ddl: "CREATE FOREIGN TABLE g1(e1 varchar, e2 integer);"
    rows:
      g1:
        - ["a", 1]
        - ["b", null]
  - name: vm1
    type: virtual
    ddl: "CREATE VIEW v1 AS SELECT e1 FROM pm1.g1;"
"#;

    #[test]
    fn yaml_descriptor_loads_and_validates() {
        let vdb = VdbMetaData::from_yaml(YAML).unwrap();
        assert_eq!(vdb.version, 1);
        assert_eq!(vdb.model("PM1").unwrap().rows["g1"].len(), 2);
        let mut store = load_store(&vdb).unwrap();
        let report = validate(&vdb, &mut store);
        assert!(!report.has_items(), "{}", report);
        let v1 = store.schema("vm1").unwrap().table("v1").unwrap();
        assert_eq!(v1.columns.len(), 1);
    }

    #[test]
    fn duplicate_models_are_rejected() {
        let yaml = "name: x\nmodels:\n  - {name: a, type: physical}\n  - {name: A, type: virtual}\n";
        assert!(matches!(VdbMetaData::from_yaml(yaml), Err(MetaError::Vdb(_))));
    }
}
