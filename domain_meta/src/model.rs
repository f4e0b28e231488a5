//! Tables and fields as described by domain metadata

use crate::checker::{check_extra, ExtraRule};
use crate::errors::DomainError;
use crate::lookup::LookupPath;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use type_mapping::DataKind;

/// Coordinates of the column a foreign key points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRef {
    pub db_name: String,
    pub table: String,
    pub field: String,
}

/// Inputs of a computed column; evaluation is left to the integrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaMeta {
    pub input_fields: Vec<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

/// Domain-specific role of a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum FieldRole {
    /// The single identifier other tables look this table up by
    LookupId,
    /// A value resolved through foreign hops, e.g. `anchor_id.faction_id.faction_name`
    LookupValue {
        tag: String,
        #[serde(skip)]
        path: Option<LookupPath>,
    },
    /// JSON document constrained by per-key rules
    Extra { rules: HashMap<String, ExtraRule> },
    Formula(FormulaMeta),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainField {
    pub name: String,
    /// Declared SQL type, e.g. `varchar(64)`
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub foreign: Option<ForeignRef>,
    #[serde(default)]
    pub role: Option<FieldRole>,
}

impl DomainField {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            unique: false,
            foreign: None,
            role: None,
        }
    }

    pub fn foreign(mut self, db_name: &str, table: &str, field: &str) -> Self {
        self.foreign = Some(ForeignRef {
            db_name: db_name.to_string(),
            table: table.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn role(mut self, role: FieldRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn kind(&self) -> DataKind {
        DataKind::from_type_name(&self.type_name)
    }

    pub fn is_foreign(&self) -> bool {
        self.foreign.is_some()
    }

    pub fn is_extra(&self) -> bool {
        matches!(self.role, Some(FieldRole::Extra { .. }))
    }

    pub fn is_lookup_id(&self) -> bool {
        matches!(self.role, Some(FieldRole::LookupId))
    }

    pub fn is_lookup_value(&self) -> bool {
        matches!(self.role, Some(FieldRole::LookupValue { .. }))
    }

    pub fn is_formula(&self) -> bool {
        matches!(self.role, Some(FieldRole::Formula(_)))
    }

    /// Resolved lookup path of a lookup-value field
    pub fn lookup_path(&self) -> Option<&LookupPath> {
        match &self.role {
            Some(FieldRole::LookupValue { path, .. }) => path.as_ref(),
            _ => None,
        }
    }

    /// Validate an extra column's JSON text. Fields without extra rules accept anything.
    pub fn check(&self, extra: &str) -> Result<(), DomainError> {
        match &self.role {
            Some(FieldRole::Extra { rules }) => check_extra(rules, extra),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainTable {
    #[serde(rename = "table")]
    pub table_name: String,
    #[serde(rename = "db")]
    pub db_name: String,
    pub fields: Vec<DomainField>,
}

impl DomainTable {
    pub fn new(db_name: impl Into<String>, table_name: impl Into<String>, fields: Vec<DomainField>) -> Self {
        Self {
            table_name: table_name.into(),
            db_name: db_name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&DomainField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn lookup_id_field(&self) -> Option<&DomainField> {
        self.fields.iter().find(|f| f.is_lookup_id())
    }

    pub fn foreign_fields(&self) -> impl Iterator<Item = &DomainField> {
        self.fields.iter().filter(|f| f.is_foreign())
    }

    pub fn extra_fields(&self) -> impl Iterator<Item = &DomainField> {
        self.fields.iter().filter(|f| f.is_extra())
    }

    pub fn formula_fields(&self) -> impl Iterator<Item = &DomainField> {
        self.fields.iter().filter(|f| f.is_formula())
    }

    pub fn lookup_value_fields(&self) -> impl Iterator<Item = &DomainField> {
        self.fields.iter().filter(|f| f.is_lookup_value())
    }
}
