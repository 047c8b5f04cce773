//! Typed table and form schemas as served by the admin API.
//!
//! Table schemas are JSON schemas with an `extra` envelope carrying admin UI
//! hints. Custom form schemas are plain OpenAPI schemas without `extra`, so
//! every resolver here falls back to the JSON schema keywords alone.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdminError, AdminResult};
use crate::query::OrderByConfig;

/// Schema for a table or a custom form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub properties: IndexMap<String, Property>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<SchemaExtra>,
}

/// Admin hints attached to table schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaExtra {
    #[serde(default)]
    pub primary_key_name: Option<String>,
    #[serde(default)]
    pub link_column_name: Option<String>,
    #[serde(default)]
    pub order_by: Vec<OrderByConfig>,
    #[serde(default)]
    pub visible_column_names: Vec<String>,
    #[serde(default)]
    pub visible_filter_names: Vec<String>,
    #[serde(default)]
    pub media_columns: Vec<String>,
    #[serde(default)]
    pub rich_text_columns: Vec<String>,
    #[serde(default)]
    pub time_resolution: IndexMap<String, f64>,
}

/// A single column or form field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<TypeVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeVariant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<PropertyExtra>,
}

/// One branch of an `anyOf`, or the `items` of an array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeVariant {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub variant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeVariant>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyExtra {
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub choices: Option<IndexMap<String, Value>>,
    #[serde(default)]
    pub foreign_key: Option<ForeignKey>,
    #[serde(default)]
    pub help_text: Option<String>,
    #[serde(default)]
    pub secret: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub widget: Option<String>,
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub to: String,
    #[serde(default)]
    pub target_column: Option<String>,
}

impl Property {
    /// `type` if present, else the first `anyOf` branch's type.
    pub fn effective_type(&self) -> Option<&str> {
        self.property_type
            .as_deref()
            .or_else(|| self.any_of.first().and_then(|v| v.variant_type.as_deref()))
    }

    /// `format` if present; for nullable arrays the item format, else the
    /// first `anyOf` branch's format.
    pub fn format(&self) -> Option<&str> {
        if let Some(format) = self.format.as_deref() {
            return Some(format);
        }
        let first = self.any_of.first()?;
        if first.variant_type.as_deref() == Some("array") {
            first
                .items
                .as_deref()
                .or(self.items.as_deref())
                .and_then(|items| items.format.as_deref())
        } else {
            first.format.as_deref()
        }
    }

    /// True when `extra.nullable` is set or any `anyOf` branch is `"null"`.
    pub fn is_nullable(&self) -> bool {
        let declared = self.extra.as_ref().map(|e| e.nullable).unwrap_or(false);
        declared
            || self
                .any_of
                .iter()
                .any(|v| v.variant_type.as_deref() == Some("null"))
    }

    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.extra.as_ref().and_then(|e| e.foreign_key.as_ref())
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key().is_some()
    }

    pub fn choices(&self) -> Option<&IndexMap<String, Value>> {
        self.extra.as_ref().and_then(|e| e.choices.as_ref())
    }
}

impl Schema {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Primary key column, `id` when the schema doesn't say.
    pub fn primary_key_name(&self) -> &str {
        self.extra
            .as_ref()
            .and_then(|e| e.primary_key_name.as_deref())
            .unwrap_or("id")
    }

    /// Ordering the server wants when the user hasn't picked one.
    pub fn default_order_by(&self) -> &[OrderByConfig] {
        self.extra
            .as_ref()
            .map(|e| e.order_by.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Check that every visible column and filter refers to a property.
    pub fn validate(&self) -> AdminResult<()> {
        let Some(extra) = &self.extra else {
            return Ok(());
        };

        let missing: Vec<&str> = extra
            .visible_column_names
            .iter()
            .chain(extra.visible_filter_names.iter())
            .filter(|name| !self.properties.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AdminError::InvalidSchema(format!(
                "unknown visible columns or filters: {}",
                missing.join(", ")
            )))
        }
    }
}
