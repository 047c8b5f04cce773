//! Piccolo Admin REST API access.

mod client;

use async_trait::async_trait;
use serde_json::Value;

pub use client::AdminClient;

use crate::error::AdminResult;
use crate::models::{
    ChartConfig, FormConfig, FormOutcome, GroupedTables, MediaUpload, Meta, PasswordChange,
    References, Row, RowCount, SidebarLinks, StoredFile, Translation, TranslationList, User,
};
use crate::query::{IdsQuery, QueryParams};
use crate::schema::Schema;

/// The admin REST surface consumed by the listing store and the daemon.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn table_names(&self) -> AdminResult<Vec<String>>;
    async fn table_groups(&self) -> AdminResult<GroupedTables>;
    async fn schema(&self, table: &str) -> AdminResult<Schema>;
    async fn count(&self, table: &str, params: &QueryParams) -> AdminResult<RowCount>;
    async fn rows(&self, table: &str, params: &QueryParams) -> AdminResult<Vec<Row>>;
    async fn row(&self, table: &str, id: &str) -> AdminResult<Row>;
    /// Id to readable label mapping, used by reference pickers.
    async fn ids(&self, table: &str, query: &IdsQuery) -> AdminResult<Value>;
    async fn references(&self, table: &str) -> AdminResult<References>;
    /// Default values for a new row.
    async fn new_row(&self, table: &str) -> AdminResult<Row>;
    async fn create_row(&self, table: &str, row: &Row) -> AdminResult<Value>;
    async fn update_row(&self, table: &str, id: &str, row: &Row) -> AdminResult<Value>;
    async fn delete_row(&self, table: &str, id: &str) -> AdminResult<()>;
    async fn forms(&self) -> AdminResult<Vec<FormConfig>>;
    async fn form(&self, slug: &str) -> AdminResult<FormConfig>;
    async fn form_schema(&self, slug: &str) -> AdminResult<Schema>;
    async fn submit_form(&self, slug: &str, data: &Row) -> AdminResult<FormOutcome>;
    async fn charts(&self) -> AdminResult<Vec<ChartConfig>>;
    async fn chart(&self, slug: &str) -> AdminResult<ChartConfig>;
    async fn chart_schema(&self, slug: &str) -> AdminResult<Schema>;
    /// Data points for a chart, filtered by the submitted chart form.
    async fn chart_data(&self, slug: &str, data: &Row) -> AdminResult<Value>;
    async fn links(&self) -> AdminResult<SidebarLinks>;
    async fn store_file(&self, upload: &MediaUpload) -> AdminResult<StoredFile>;
    /// URL a stored file can be fetched from.
    async fn generate_file_url(
        &self,
        table: &str,
        column: &str,
        file_key: &str,
    ) -> AdminResult<String>;
    async fn change_password(&self, change: &PasswordChange) -> AdminResult<()>;
    async fn translations(&self) -> AdminResult<TranslationList>;
    async fn translation(&self, code: &str) -> AdminResult<Translation>;
    async fn meta(&self) -> AdminResult<Meta>;
    async fn user(&self) -> AdminResult<User>;
}
