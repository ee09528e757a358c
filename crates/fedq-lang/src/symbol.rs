//! Group and element symbols.
//!
//! Names are case-insensitive everywhere: equality and hashing fold ASCII case.

use std::fmt;
use std::hash::{Hash, Hasher};

use fedq_core::schema::DataType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    PhysicalTable,
    View,
    InlineView,
    Procedure,
    Temp,
    /// `NEW` / `OLD` / procedure scopes that exist only while resolving a body.
    Scope,
}

/// What a group resolved to in metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBinding {
    /// `schema.table` as recorded in metadata.
    pub full_name: String,
    /// Owning model (schema) name.
    pub model: String,
    pub kind: GroupKind,
}

/// A table, view, inline view or procedure referenced by a command.
///
/// `name` is what the command uses to refer to the group (the alias when there
/// is one); `definition` is the aliased object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSymbol {
    pub name: String,
    pub definition: Option<String>,
    pub binding: Option<GroupBinding>,
}

impl GroupSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: None,
            binding: None,
        }
    }

    pub fn aliased(alias: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: alias.into(),
            definition: Some(definition.into()),
            binding: None,
        }
    }

    /// The name of the referenced object, ignoring any alias.
    pub fn non_correlation_name(&self) -> &str {
        self.definition.as_deref().unwrap_or(&self.name)
    }

    pub fn is_temp(&self) -> bool {
        self.name.starts_with('#')
            || self.non_correlation_name().starts_with('#')
            || matches!(self.binding.as_ref().map(|b| b.kind), Some(GroupKind::Temp))
    }

    pub fn is_resolved(&self) -> bool {
        self.binding.is_some()
    }

    pub fn kind(&self) -> Option<GroupKind> {
        self.binding.as_ref().map(|b| b.kind)
    }

    pub fn model(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.model.as_str())
    }

    pub fn canonical_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl PartialEq for GroupSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for GroupSymbol {}

impl Hash for GroupSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_name().hash(state);
    }
}

impl fmt::Display for GroupSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.definition {
            Some(def) => write!(f, "{} AS {}", def, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A column reference, optionally qualified by the name of its group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSymbol {
    pub short_name: String,
    pub group: Option<String>,
    pub data_type: Option<DataType>,
    /// Resolved against a group of an enclosing command (correlated reference).
    pub external: bool,
}

impl ElementSymbol {
    /// Build from a possibly dotted name: `pm1.g1.e1` is element `e1` of group `pm1.g1`.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match name.rsplit_once('.') {
            Some((group, short)) => Self::qualified(group, short),
            None => Self {
                short_name: name.to_string(),
                group: None,
                data_type: None,
                external: false,
            },
        }
    }

    pub fn qualified(group: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            short_name: short_name.into(),
            group: Some(group.into()),
            data_type: None,
            external: false,
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Full name as referenced: `group.short` or just `short`.
    pub fn name(&self) -> String {
        match &self.group {
            Some(g) => format!("{}.{}", g, self.short_name),
            None => self.short_name.clone(),
        }
    }

    pub fn canonical_name(&self) -> String {
        self.name().to_ascii_lowercase()
    }

    pub fn belongs_to(&self, group: &GroupSymbol) -> bool {
        self.group
            .as_deref()
            .map(|g| g.eq_ignore_ascii_case(&group.name))
            .unwrap_or(false)
    }
}

impl PartialEq for ElementSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.short_name.eq_ignore_ascii_case(&other.short_name)
            && match (&self.group, &other.group) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for ElementSymbol {}

impl Hash for ElementSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_name().hash(state);
    }
}

impl fmt::Display for ElementSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
