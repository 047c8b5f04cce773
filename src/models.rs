//! Data models for Piccolo Admin API responses.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A table row, keyed by column name in server order.
pub type Row = serde_json::Map<String, Value>;

/// Count endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCount {
    pub count: usize,
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Rows endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowsResponse {
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Table names grouped by menu group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupedTables {
    #[serde(default)]
    pub grouped: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub ungrouped: Vec<String>,
}

/// A table referencing another via foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    #[serde(alias = "table_name")]
    pub table_name: String,
    #[serde(alias = "column_name")]
    pub column_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct References {
    #[serde(default)]
    pub references: Vec<TableReference>,
}

/// Custom form listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormConfig {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// What a custom form handler returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormOutcome {
    Message { message: String },
    File(FileDownload),
}

/// A file returned as an attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDownload {
    pub file_name: String,
    pub media_type: String,
    #[serde(skip)]
    pub contents: Vec<u8>,
    pub size: usize,
}

/// Chart listing entry. The chart's filter form is described by its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub title: String,
    #[serde(alias = "slug")]
    pub chart_slug: String,
    #[serde(default)]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Sidebar links, label to URL, in registration order.
pub type SidebarLinks = IndexMap<String, String>;

/// A file to store in a media column.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    pub table_name: String,
    pub column_name: String,
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// Key the server assigned to a stored file, e.g. `poster-<uuid>.jpg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileUrlRequest {
    pub table_name: String,
    pub column_name: String,
    pub file_key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileUrl {
    pub file_url: String,
}

/// Body of a password change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

/// Default text when the form handler doesn't supply one.
pub const FORM_SUCCESS_MESSAGE: &str = "Successfully submitted";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default = "default_version")]
    pub piccolo_admin_version: String,
}

fn default_site_name() -> String {
    "Piccolo Admin".to_string()
}

fn default_version() -> String {
    "Unknown".to_string()
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            site_name: default_site_name(),
            piccolo_admin_version: default_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationListItem {
    pub language_code: String,
    pub language_name: String,
}

/// Available translations, without their contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationList {
    #[serde(default)]
    pub translations: Vec<TranslationListItem>,
    #[serde(default = "default_language_code")]
    pub default_language_code: String,
}

fn default_language_code() -> String {
    "auto".to_string()
}

/// A single language bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub language_code: String,
    #[serde(default)]
    pub language_name: Option<String>,
    #[serde(default)]
    pub translations: IndexMap<String, String>,
}

/// Currently logged in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Kind of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
    Neutral,
}

/// Latest outcome message shown to the user. Replaced by the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponseMessage {
    pub contents: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl ApiResponseMessage {
    pub fn success(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            kind: MessageKind::Success,
        }
    }

    pub fn error(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            kind: MessageKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_meta_defaults() {
        let meta: Meta = serde_json::from_value(json!({})).unwrap();
        assert_eq!(meta, Meta::default());
        assert_eq!(meta.site_name, "Piccolo Admin");
    }

    #[test]
    fn test_references_accept_camel_case() {
        let refs: References = serde_json::from_value(json!({
            "references": [{"tableName": "movie", "columnName": "director"}]
        }))
        .unwrap();
        assert_eq!(refs.references[0].table_name, "movie");
        assert_eq!(refs.references[0].column_name, "director");
    }

    #[test]
    fn test_chart_config_accepts_short_slug() {
        let chart: ChartConfig = serde_json::from_value(json!({
            "title": "Movies per director",
            "slug": "movies-per-director",
            "chart_type": "Pie"
        }))
        .unwrap();
        assert_eq!(chart.chart_slug, "movies-per-director");
        assert_eq!(chart.description, None);
    }

    #[test]
    fn test_user_id_numeric() {
        let user: User =
            serde_json::from_value(json!({"username": "piccolo", "user_id": 1})).unwrap();
        assert_eq!(user.user_id, "1");
    }

    #[test]
    fn test_message_serializes_type() {
        let value = serde_json::to_value(ApiResponseMessage::error("Problem")).unwrap();
        assert_eq!(value, json!({"contents": "Problem", "type": "error"}));
    }
}
