//! Listing state for one table view and the transitions that drive it.
//!
//! State changes go through [`reduce`], a pure function of the previous state
//! and an [`Action`]. [`ListingStore`] owns the current state, runs the
//! asynchronous fetch cycles against an [`AdminApi`] and publishes every new
//! snapshot on a `watch` channel.
//!
//! Each fetch cycle is tagged with a generation number. Results from a cycle
//! that has since been superseded are dropped, so a slow response can't
//! overwrite a newer one. Selecting a table or clearing filters supersedes
//! whatever cycle is in flight.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::api::AdminApi;
use crate::coercion::{coerce_row, RawRow};
use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::{AdminError, AdminResult};
use crate::models::{
    ApiResponseMessage, FormOutcome, MediaUpload, PasswordChange, Row, StoredFile, Translation,
};
use crate::preferences::{self, PreferenceStore};
use crate::query::{
    build_count_params, build_listing_params, is_reserved_key, FilterParams, OrderByConfig,
};
use crate::schema::Schema;
use crate::translations;

/// Everything a listing view renders from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingState {
    pub current_table_name: Option<String>,
    pub filter_params: FilterParams,
    pub order_by: Vec<OrderByConfig>,
    pub page_size: usize,
    /// 1-based.
    pub current_page_number: usize,
    pub row_count: usize,
    pub rows: Vec<Row>,
    pub loading_status: bool,
    pub schema: Option<Schema>,
    pub selected_row: Option<Row>,
    pub api_response_message: Option<ApiResponseMessage>,
    /// Messages of the latest failed operation.
    pub errors: Vec<String>,
    pub dark_mode: bool,
    pub language: Option<String>,
    /// Generation of the newest fetch cycle.
    pub generation: u64,
}

impl Default for ListingState {
    fn default() -> Self {
        Self {
            current_table_name: None,
            filter_params: FilterParams::new(),
            order_by: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            current_page_number: 1,
            row_count: 0,
            rows: Vec::new(),
            loading_status: false,
            schema: None,
            selected_row: None,
            api_response_message: None,
            errors: Vec::new(),
            dark_mode: false,
            language: None,
            generation: 0,
        }
    }
}

impl ListingState {
    /// Number of pages for the current row count, at least 1.
    pub fn page_count(&self) -> usize {
        self.row_count.div_ceil(self.page_size.max(1)).max(1)
    }

    /// Clear the listing and abandon any fetch cycle in flight.
    fn reset_listing(&mut self) {
        self.order_by.clear();
        self.filter_params.clear();
        self.current_page_number = 1;
        self.rows.clear();
        self.generation += 1;
        self.loading_status = false;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

/// State transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Switch to another table. Resets filters, ordering, paging and rows.
    SelectTable(String),
    ClearFilters,
    SetFilterParams(FilterParams),
    SetOrderBy(Vec<OrderByConfig>),
    SetPageSize(usize),
    SetPageNumber(usize),
    SchemaLoaded { table: String, schema: Schema },
    FetchStarted,
    CountLoaded { generation: u64, count: usize },
    RowsLoaded { generation: u64, rows: Vec<Row> },
    FetchFailed { generation: u64, table: String },
    FetchFinished { generation: u64 },
    RowSelected(Option<Row>),
    Succeeded(String),
    Failed(Vec<String>),
    SetDarkMode(bool),
    SetLanguage(String),
}

/// Apply `action` to `state`.
pub fn reduce(mut state: ListingState, action: Action) -> ListingState {
    match action {
        Action::SelectTable(table) => {
            state.reset_listing();
            state.current_table_name = Some(table);
            state.row_count = 0;
            state.schema = None;
            state.selected_row = None;
        }
        Action::ClearFilters => state.reset_listing(),
        Action::SetFilterParams(filters) => {
            state.filter_params = filters
                .into_iter()
                .filter(|(key, _)| !is_reserved_key(key))
                .collect();
        }
        Action::SetOrderBy(order_by) => state.order_by = order_by,
        Action::SetPageSize(page_size) => state.page_size = page_size.max(1),
        Action::SetPageNumber(page) => state.current_page_number = page.max(1),
        Action::SchemaLoaded { table, schema } => {
            if state.current_table_name.as_deref() == Some(table.as_str()) {
                if state.order_by.is_empty() {
                    state.order_by = schema.default_order_by().to_vec();
                }
                state.schema = Some(schema);
            }
        }
        Action::FetchStarted => {
            state.generation += 1;
            state.loading_status = true;
        }
        Action::CountLoaded { generation, count } => {
            if state.is_current(generation) {
                state.row_count = count;
                // Avoid landing on an empty page.
                if count < state.page_size {
                    state.current_page_number = 1;
                }
            }
        }
        Action::RowsLoaded { generation, rows } => {
            if state.is_current(generation) {
                state.rows = rows;
            }
        }
        Action::FetchFailed { generation, table } => {
            if state.is_current(generation) {
                state.api_response_message = Some(ApiResponseMessage::error(format!(
                    "Problem fetching {} rows.",
                    table
                )));
            }
        }
        Action::FetchFinished { generation } => {
            if state.is_current(generation) {
                state.loading_status = false;
            }
        }
        Action::RowSelected(row) => state.selected_row = row,
        Action::Succeeded(contents) => {
            state.errors.clear();
            state.api_response_message = Some(ApiResponseMessage::success(contents));
        }
        Action::Failed(errors) => {
            state.api_response_message = Some(ApiResponseMessage::error(errors.join("\n")));
            state.errors = errors;
        }
        Action::SetDarkMode(enabled) => state.dark_mode = enabled,
        Action::SetLanguage(code) => state.language = Some(code),
    }
    state
}

/// Owns the listing state of one view and talks to the API on its behalf.
pub struct ListingStore {
    api: Arc<dyn AdminApi>,
    preferences: Arc<dyn PreferenceStore>,
    state: watch::Sender<ListingState>,
}

impl ListingStore {
    /// Create a store. Dark mode and language come from `preferences`.
    pub fn new(api: Arc<dyn AdminApi>, preferences: Arc<dyn PreferenceStore>) -> Self {
        let initial = ListingState {
            dark_mode: preferences::load_dark_mode(preferences.as_ref()),
            language: preferences::load_default_language(preferences.as_ref()),
            ..ListingState::default()
        };
        let (state, _) = watch::channel(initial);

        Self {
            api,
            preferences,
            state,
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.dispatch(Action::SetPageSize(page_size));
        self
    }

    /// Receive a snapshot after every transition.
    pub fn subscribe(&self) -> watch::Receiver<ListingState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ListingState {
        self.state.borrow().clone()
    }

    /// Apply an action and return the resulting snapshot.
    pub fn dispatch(&self, action: Action) -> ListingState {
        tracing::trace!(?action, "Dispatching");
        let mut next = ListingState::default();
        self.state.send_modify(|state| {
            let current = std::mem::take(state);
            *state = reduce(current, action);
            next = state.clone();
        });
        next
    }

    fn current_table(&self) -> AdminResult<String> {
        self.state
            .borrow()
            .current_table_name
            .clone()
            .ok_or(AdminError::NoTableSelected)
    }

    fn report(&self, err: &AdminError) {
        tracing::warn!(error = %err, "Operation failed");
        self.dispatch(Action::Failed(err.messages()));
    }

    pub fn select_table(&self, table: &str) -> ListingState {
        tracing::info!(table, "Selecting table");
        self.dispatch(Action::SelectTable(table.to_string()))
    }

    pub fn clear_filters(&self) -> ListingState {
        self.dispatch(Action::ClearFilters)
    }

    pub fn set_filter_params(&self, filters: FilterParams) -> ListingState {
        self.dispatch(Action::SetFilterParams(filters))
    }

    pub fn set_order_by(&self, order_by: Vec<OrderByConfig>) -> ListingState {
        self.dispatch(Action::SetOrderBy(order_by))
    }

    pub fn set_page(&self, page: usize) -> ListingState {
        self.dispatch(Action::SetPageNumber(page))
    }

    pub fn set_page_size(&self, page_size: usize) -> ListingState {
        self.dispatch(Action::SetPageSize(page_size))
    }

    /// Select `table`, load its schema and fetch the first page.
    pub async fn open_table(&self, table: &str) -> AdminResult<ListingState> {
        self.select_table(table);
        self.load_schema().await?;
        self.fetch_rows().await
    }

    /// Load the schema of the current table. Applies its default ordering
    /// when none is chosen.
    pub async fn load_schema(&self) -> AdminResult<Schema> {
        let table = self.current_table()?;
        let schema = self.api.schema(&table).await?;
        schema.validate()?;

        self.dispatch(Action::SchemaLoaded {
            table,
            schema: schema.clone(),
        });
        Ok(schema)
    }

    async fn schema_for_current_table(&self) -> AdminResult<Schema> {
        let loaded = self.state.borrow().schema.clone();
        match loaded {
            Some(schema) => Ok(schema),
            None => self.load_schema().await,
        }
    }

    /// Fetch the row count, then the current page of rows.
    ///
    /// Failures become an error message; rows already shown are kept. The
    /// loading flag is cleared whatever the outcome.
    pub async fn fetch_rows(&self) -> AdminResult<ListingState> {
        let started = self.dispatch(Action::FetchStarted);
        let generation = started.generation;
        let Some(table) = started.current_table_name.clone() else {
            self.dispatch(Action::FetchFinished { generation });
            return Err(AdminError::NoTableSelected);
        };

        let outcome = self.run_fetch_cycle(&table, generation, &started).await;
        if let Err(e) = outcome {
            tracing::error!(table = %table, error = %e, "Problem fetching rows");
            self.dispatch(Action::FetchFailed {
                generation,
                table: table.clone(),
            });
        }

        Ok(self.dispatch(Action::FetchFinished { generation }))
    }

    async fn run_fetch_cycle(
        &self,
        table: &str,
        generation: u64,
        started: &ListingState,
    ) -> AdminResult<()> {
        let count = self
            .api
            .count(table, &build_count_params(&started.filter_params))
            .await?;

        // The page number feeds the rows request, so it must be settled first.
        let counted = self.dispatch(Action::CountLoaded {
            generation,
            count: count.count,
        });
        if !counted.is_current(generation) {
            tracing::debug!(table, generation, "Fetch superseded, skipping rows request");
            return Ok(());
        }

        let params = build_listing_params(
            &counted.filter_params,
            &counted.order_by,
            counted.current_page_number,
            counted.page_size,
        );
        let rows = self.api.rows(table, &params).await?;

        let loaded = self.dispatch(Action::RowsLoaded { generation, rows });
        if !loaded.is_current(generation) {
            tracing::warn!(table, generation, "Discarded stale rows response");
        }
        Ok(())
    }

    /// Fetch a single row for editing.
    pub async fn fetch_row(&self, id: &str) -> AdminResult<Row> {
        let table = self.current_table()?;
        let row = self.api.row(&table, id).await?;
        self.dispatch(Action::RowSelected(Some(row.clone())));
        Ok(row)
    }

    /// Coerce and create a row in the current table.
    pub async fn create_row(&self, raw: &RawRow) -> AdminResult<Value> {
        let result = self.try_create_row(raw).await;
        match &result {
            Ok(_) => {
                self.dispatch(Action::Succeeded("Successfully added row".to_string()));
            }
            Err(e) => self.report(e),
        }
        result
    }

    async fn try_create_row(&self, raw: &RawRow) -> AdminResult<Value> {
        let table = self.current_table()?;
        let schema = self.schema_for_current_table().await?;
        let row = coerce_row(raw, &schema)?;
        self.api.create_row(&table, &row).await
    }

    /// Coerce and save changes to an existing row.
    pub async fn update_row(&self, id: &str, raw: &RawRow) -> AdminResult<Value> {
        let result = self.try_update_row(id, raw).await;
        match &result {
            Ok(_) => {
                self.dispatch(Action::Succeeded("Successfully saved row".to_string()));
            }
            Err(e) => self.report(e),
        }
        result
    }

    async fn try_update_row(&self, id: &str, raw: &RawRow) -> AdminResult<Value> {
        let table = self.current_table()?;
        let schema = self.schema_for_current_table().await?;
        let row = coerce_row(raw, &schema)?;
        self.api.update_row(&table, id, &row).await
    }

    /// Delete a row, then refresh the listing.
    pub async fn delete_row(&self, id: &str) -> AdminResult<ListingState> {
        let table = self.current_table()?;
        if let Err(e) = self.api.delete_row(&table, id).await {
            self.report(&e);
            return Err(e);
        }
        self.dispatch(Action::Succeeded("Successfully deleted row".to_string()));
        self.fetch_rows().await
    }

    /// Coerce against the form's schema and submit a custom form.
    pub async fn submit_form(&self, slug: &str, raw: &RawRow) -> AdminResult<FormOutcome> {
        let result = self.try_submit_form(slug, raw).await;
        match &result {
            Ok(FormOutcome::Message { message }) => {
                self.dispatch(Action::Succeeded(message.clone()));
            }
            Ok(FormOutcome::File(file)) => {
                self.dispatch(Action::Succeeded(format!("Downloaded {}", file.file_name)));
            }
            Err(e) => self.report(e),
        }
        result
    }

    async fn try_submit_form(&self, slug: &str, raw: &RawRow) -> AdminResult<FormOutcome> {
        let schema = self.api.form_schema(slug).await?;
        let data = coerce_row(raw, &schema)?;
        self.api.submit_form(slug, &data).await
    }

    /// Coerce against the chart's filter schema and fetch its data points.
    pub async fn fetch_chart_data(&self, slug: &str, raw: &RawRow) -> AdminResult<Value> {
        let result = self.try_fetch_chart_data(slug, raw).await;
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    async fn try_fetch_chart_data(&self, slug: &str, raw: &RawRow) -> AdminResult<Value> {
        let schema = self.api.chart_schema(slug).await?;
        let data = coerce_row(raw, &schema)?;
        self.api.chart_data(slug, &data).await
    }

    /// Store a file for a media column of the current table.
    pub async fn upload_media(
        &self,
        column: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> AdminResult<StoredFile> {
        let result = async {
            let upload = MediaUpload {
                table_name: self.current_table()?,
                column_name: column.to_string(),
                file_name: file_name.to_string(),
                contents,
            };
            self.api.store_file(&upload).await
        }
        .await;

        match &result {
            Ok(stored) => {
                tracing::info!(column, file_key = %stored.file_key, "Stored media file");
                self.dispatch(Action::Succeeded(format!("Uploaded {}", file_name)));
            }
            Err(e) => self.report(e),
        }
        result
    }

    /// URL of a stored file in a media column of the current table.
    pub async fn media_url(&self, column: &str, file_key: &str) -> AdminResult<String> {
        let result = async {
            let table = self.current_table()?;
            self.api.generate_file_url(&table, column, file_key).await
        }
        .await;

        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    /// Change the logged in user's password. The server ends the session.
    pub async fn change_password(&self, change: &PasswordChange) -> AdminResult<()> {
        let result = self.api.change_password(change).await;
        match &result {
            Ok(()) => {
                self.dispatch(Action::Succeeded("Password changed".to_string()));
            }
            Err(e) => self.report(e),
        }
        result
    }

    /// Toggle dark mode and persist it.
    pub fn set_dark_mode(&self, enabled: bool) -> AdminResult<ListingState> {
        preferences::store_dark_mode(self.preferences.as_ref(), enabled)?;
        Ok(self.dispatch(Action::SetDarkMode(enabled)))
    }

    /// Pick and load the language to use. `locale` stands in for the
    /// caller's own language when the server default is `auto`.
    pub async fn setup_translations(&self, locale: Option<&str>) -> AdminResult<String> {
        let available = self.api.translations().await?;
        let stored = preferences::load_default_language(self.preferences.as_ref());
        let code = translations::resolve_language(&available, stored.as_deref(), locale);
        self.load_translation(&code).await?;
        Ok(code)
    }

    /// Load one language bundle and remember it as the default.
    pub async fn load_translation(&self, code: &str) -> AdminResult<Translation> {
        let translation = self.api.translation(code).await?;
        preferences::store_default_language(self.preferences.as_ref(), code)?;
        self.dispatch(Action::SetLanguage(translation.language_code.clone()));
        Ok(translation)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(id: i64) -> Row {
        match json!({"id": id}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn with_table(table: &str) -> ListingState {
        reduce(ListingState::default(), Action::SelectTable(table.into()))
    }

    #[test]
    fn test_defaults() {
        let state = ListingState::default();
        assert_eq!(state.page_size, 15);
        assert_eq!(state.current_page_number, 1);
        assert!(!state.loading_status);
    }

    #[test]
    fn test_select_table_resets_listing() {
        let mut state = with_table("movie");
        let mut filters = FilterParams::new();
        filters.insert("name".into(), "Alien".into());
        state = reduce(state, Action::SetFilterParams(filters));
        state = reduce(state, Action::SetOrderBy(vec![OrderByConfig::desc("id")]));
        state = reduce(state, Action::SetPageNumber(4));
        state = reduce(state, Action::FetchStarted);
        let generation = state.generation;
        state = reduce(
            state,
            Action::RowsLoaded {
                generation,
                rows: vec![row(1)],
            },
        );

        let state = reduce(state, Action::SelectTable("director".into()));
        assert_eq!(state.current_table_name.as_deref(), Some("director"));
        assert!(state.filter_params.is_empty());
        assert!(state.order_by.is_empty());
        assert_eq!(state.current_page_number, 1);
        assert!(state.rows.is_empty());
    }

    #[test]
    fn test_clear_filters_resets_listing() {
        let mut state = with_table("movie");
        state = reduce(state, Action::SetOrderBy(vec![OrderByConfig::asc("name")]));
        state = reduce(state, Action::SetPageNumber(2));
        let state = reduce(state, Action::ClearFilters);
        assert!(state.order_by.is_empty());
        assert_eq!(state.current_page_number, 1);
        assert_eq!(state.current_table_name.as_deref(), Some("movie"));
    }

    #[test]
    fn test_filter_params_drop_reserved_keys() {
        let mut filters = FilterParams::new();
        filters.insert("__page".into(), "3".into());
        filters.insert("name".into(), "Alien".into());
        let state = reduce(with_table("movie"), Action::SetFilterParams(filters));
        assert_eq!(state.filter_params.len(), 1);
        assert!(state.filter_params.contains_key("name"));
    }

    #[test]
    fn test_count_below_page_size_resets_page() {
        let mut state = reduce(with_table("movie"), Action::SetPageNumber(3));
        state = reduce(state, Action::FetchStarted);
        let generation = state.generation;

        let state = reduce(
            state,
            Action::CountLoaded {
                generation,
                count: 4,
            },
        );
        assert_eq!(state.row_count, 4);
        assert_eq!(state.current_page_number, 1);
    }

    #[test]
    fn test_count_above_page_size_keeps_page() {
        let mut state = reduce(with_table("movie"), Action::SetPageNumber(3));
        state = reduce(state, Action::FetchStarted);
        let generation = state.generation;

        let state = reduce(
            state,
            Action::CountLoaded {
                generation,
                count: 100,
            },
        );
        assert_eq!(state.current_page_number, 3);
        assert_eq!(state.page_count(), 7);
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut state = reduce(with_table("movie"), Action::FetchStarted);
        let stale = state.generation;
        state = reduce(state, Action::FetchStarted);
        let fresh = state.generation;

        state = reduce(
            state,
            Action::RowsLoaded {
                generation: fresh,
                rows: vec![row(2)],
            },
        );
        state = reduce(
            state,
            Action::RowsLoaded {
                generation: stale,
                rows: vec![row(1)],
            },
        );
        state = reduce(state, Action::FetchFinished { generation: stale });

        assert_eq!(state.rows, vec![row(2)]);
        assert!(state.loading_status);

        let state = reduce(state, Action::FetchFinished { generation: fresh });
        assert!(!state.loading_status);
    }

    #[test]
    fn test_table_switch_abandons_fetch_in_flight() {
        let mut state = reduce(with_table("movie"), Action::FetchStarted);
        let generation = state.generation;

        state = reduce(state, Action::SelectTable("director".into()));
        assert!(!state.loading_status);

        state = reduce(
            state,
            Action::CountLoaded {
                generation,
                count: 40,
            },
        );
        state = reduce(
            state,
            Action::RowsLoaded {
                generation,
                rows: vec![row(1)],
            },
        );
        state = reduce(
            state,
            Action::FetchFailed {
                generation,
                table: "movie".into(),
            },
        );

        assert_eq!(state.current_table_name.as_deref(), Some("director"));
        assert_eq!(state.row_count, 0);
        assert!(state.rows.is_empty());
        assert!(state.api_response_message.is_none());
    }

    #[test]
    fn test_clear_filters_abandons_fetch_in_flight() {
        let mut state = reduce(with_table("movie"), Action::FetchStarted);
        let generation = state.generation;

        state = reduce(state, Action::ClearFilters);
        state = reduce(
            state,
            Action::RowsLoaded {
                generation,
                rows: vec![row(1)],
            },
        );

        assert!(state.rows.is_empty());
        assert!(!state.loading_status);
    }

    #[test]
    fn test_fetch_failed_keeps_rows() {
        let mut state = reduce(with_table("movie"), Action::FetchStarted);
        let generation = state.generation;
        state = reduce(
            state,
            Action::RowsLoaded {
                generation,
                rows: vec![row(1)],
            },
        );

        let state = reduce(
            state,
            Action::FetchFailed {
                generation,
                table: "movie".into(),
            },
        );
        assert_eq!(state.rows, vec![row(1)]);
        assert_eq!(
            state.api_response_message,
            Some(ApiResponseMessage::error("Problem fetching movie rows."))
        );
    }

    #[test]
    fn test_schema_default_order_applies_once() {
        let schema: Schema = serde_json::from_value(json!({
            "properties": {"id": {"type": "integer"}},
            "extra": {"order_by": [{"column": "id", "ascending": false}]}
        }))
        .unwrap();

        let state = reduce(
            with_table("movie"),
            Action::SchemaLoaded {
                table: "movie".into(),
                schema: schema.clone(),
            },
        );
        assert_eq!(state.order_by, vec![OrderByConfig::desc("id")]);

        let state = reduce(state, Action::SetOrderBy(vec![OrderByConfig::asc("id")]));
        let state = reduce(
            state,
            Action::SchemaLoaded {
                table: "movie".into(),
                schema: schema.clone(),
            },
        );
        assert_eq!(state.order_by, vec![OrderByConfig::asc("id")]);

        // Schema for a table that's no longer selected.
        let state = reduce(state, Action::SelectTable("director".into()));
        let state = reduce(
            state,
            Action::SchemaLoaded {
                table: "movie".into(),
                schema,
            },
        );
        assert!(state.schema.is_none());
    }

    #[test]
    fn test_failed_replaces_message_list() {
        let state = reduce(
            ListingState::default(),
            Action::Failed(vec!["name field - required".into(), "age field - invalid".into()]),
        );
        assert_eq!(state.errors.len(), 2);
        assert_eq!(
            state.api_response_message.as_ref().unwrap().contents,
            "name field - required\nage field - invalid"
        );

        let state = reduce(state, Action::Succeeded("Successfully saved row".into()));
        assert!(state.errors.is_empty());
    }
}
