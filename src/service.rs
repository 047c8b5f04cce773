//! FGP service implementation for Piccolo Admin.

use anyhow::{Context, Result};
use fgp_daemon::service::{HealthStatus, MethodInfo, ParamInfo};
use fgp_daemon::FgpService;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

use fgp_piccolo_admin::api::{AdminApi, AdminClient};
use fgp_piccolo_admin::coercion::{raw_from_json, RawRow};
use fgp_piccolo_admin::config::AdminConfig;
use fgp_piccolo_admin::error::AdminError;
use fgp_piccolo_admin::models::PasswordChange;
use fgp_piccolo_admin::preferences::PreferenceStore;
use fgp_piccolo_admin::query::{parse_order_by_string, FilterParams, FilterValue, IdsQuery};
use fgp_piccolo_admin::store::{ListingState, ListingStore};

/// FGP service for Piccolo Admin operations.
pub struct AdminService {
    client: Arc<AdminClient>,
    store: Arc<ListingStore>,
    config: AdminConfig,
    runtime: Runtime,
}

/// Surface normalized messages rather than raw bodies to FGP callers.
fn user_error(err: AdminError) -> anyhow::Error {
    anyhow::anyhow!(err.messages().join("\n"))
}

/// Listing summary returned by the state-changing methods. Schema is left
/// out to keep responses small.
fn listing_json(state: &ListingState) -> Value {
    serde_json::json!({
        "table": state.current_table_name,
        "filters": state.filter_params,
        "order_by": state.order_by,
        "page": state.current_page_number,
        "page_size": state.page_size,
        "page_count": state.page_count(),
        "row_count": state.row_count,
        "rows": state.rows,
        "loading": state.loading_status,
        "message": state.api_response_message,
        "errors": state.errors,
    })
}

impl AdminService {
    /// Create a new AdminService for the admin described by `config`.
    pub fn new(config: AdminConfig, preferences: Arc<dyn PreferenceStore>) -> Result<Self> {
        let client = Arc::new(AdminClient::new(&config)?);
        let store = ListingStore::new(client.clone(), preferences).with_page_size(config.page_size);
        let runtime = Runtime::new()?;

        Ok(Self {
            client,
            store: Arc::new(store),
            config,
            runtime,
        })
    }

    /// Helper to get a usize parameter.
    fn get_param_usize(params: &HashMap<String, Value>, key: &str) -> Option<usize> {
        params
            .get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .map(|v| v as usize)
    }

    /// Helper to get a string parameter.
    fn get_param_str<'a>(params: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
        params.get(key).and_then(|v| v.as_str())
    }

    fn require_str(params: &HashMap<String, Value>, key: &str) -> Result<String> {
        Self::get_param_str(params, key)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {}", key))
    }

    /// Row ids may be given as numbers or strings.
    fn require_id(params: &HashMap<String, Value>) -> Result<String> {
        match params.get("id") {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => anyhow::bail!("Missing required parameter: id"),
        }
    }

    fn get_param_raw_row(params: &HashMap<String, Value>, key: &str) -> Result<RawRow> {
        let object = params
            .get(key)
            .and_then(|v| v.as_object())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {}", key))?;

        Ok(object
            .iter()
            .map(|(column, value)| (column.clone(), raw_from_json(value)))
            .collect())
    }

    fn get_param_filters(params: &HashMap<String, Value>) -> FilterParams {
        params
            .get("filters")
            .and_then(|v| v.as_object())
            .map(|object| {
                object
                    .iter()
                    .filter_map(|(column, value)| {
                        FilterValue::from_json(value).map(|v| (column.clone(), v))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Table named in params, else the currently selected one.
    fn table_param(&self, params: &HashMap<String, Value>) -> Result<String> {
        match Self::get_param_str(params, "table") {
            Some(table) => Ok(table.to_string()),
            None => self
                .store
                .snapshot()
                .current_table_name
                .ok_or_else(|| user_error(AdminError::NoTableSelected)),
        }
    }

    fn fetch(&self) -> Result<Value> {
        let store = self.store.clone();
        let state = self
            .runtime
            .block_on(async move { store.fetch_rows().await })
            .map_err(user_error)?;
        Ok(listing_json(&state))
    }

    /// Health check implementation.
    fn health(&self) -> Result<Value> {
        let client = self.client.clone();
        let ok = self
            .runtime
            .block_on(async move { client.ping().await })
            .map_err(user_error)?;

        Ok(serde_json::json!({
            "status": if ok { "healthy" } else { "unhealthy" },
            "api_connected": ok,
            "base_url": self.config.base_url,
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }

    fn list_tables(&self, params: HashMap<String, Value>) -> Result<Value> {
        let grouped = params
            .get("grouped")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let client = self.client.clone();

        if grouped {
            let groups = self
                .runtime
                .block_on(async move { client.table_groups().await })
                .map_err(user_error)?;
            return Ok(serde_json::to_value(groups)?);
        }

        let tables = self
            .runtime
            .block_on(async move { client.table_names().await })
            .map_err(user_error)?;

        Ok(serde_json::json!({
            "tables": tables,
            "count": tables.len(),
        }))
    }

    fn open_table(&self, params: HashMap<String, Value>) -> Result<Value> {
        let table = Self::require_str(&params, "table")?;
        let store = self.store.clone();

        let state = self
            .runtime
            .block_on(async move { store.open_table(&table).await })
            .map_err(user_error)?;

        Ok(listing_json(&state))
    }

    fn get_schema(&self, params: HashMap<String, Value>) -> Result<Value> {
        let table = self.table_param(&params)?;
        let client = self.client.clone();

        let schema = self
            .runtime
            .block_on(async move { client.schema(&table).await })
            .map_err(user_error)?;

        Ok(serde_json::to_value(schema)?)
    }

    fn filter(&self, params: HashMap<String, Value>) -> Result<Value> {
        self.store.set_filter_params(Self::get_param_filters(&params));
        self.fetch()
    }

    fn clear(&self) -> Result<Value> {
        self.store.clear_filters();
        self.fetch()
    }

    fn order(&self, params: HashMap<String, Value>) -> Result<Value> {
        let order = Self::get_param_str(&params, "order").unwrap_or("");
        let order_by = parse_order_by_string(order).map_err(user_error)?;
        self.store.set_order_by(order_by);
        self.fetch()
    }

    fn page(&self, params: HashMap<String, Value>) -> Result<Value> {
        if let Some(page_size) = Self::get_param_usize(&params, "page_size") {
            self.store.set_page_size(page_size);
        }
        let page = Self::get_param_usize(&params, "page")
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: page"))?;
        self.store.set_page(page);
        self.fetch()
    }

    fn state(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.store.snapshot())?)
    }

    fn get_row(&self, params: HashMap<String, Value>) -> Result<Value> {
        let id = Self::require_id(&params)?;
        let store = self.store.clone();

        let row = self
            .runtime
            .block_on(async move { store.fetch_row(&id).await })
            .map_err(user_error)?;

        Ok(Value::Object(row))
    }

    fn get_ids(&self, params: HashMap<String, Value>) -> Result<Value> {
        let table = self.table_param(&params)?;
        let query = IdsQuery {
            search: Self::get_param_str(&params, "search").map(str::to_string),
            limit: Self::get_param_usize(&params, "limit"),
            offset: Self::get_param_usize(&params, "offset"),
        };
        let client = self.client.clone();

        self.runtime
            .block_on(async move { client.ids(&table, &query).await })
            .map_err(user_error)
    }

    fn get_references(&self, params: HashMap<String, Value>) -> Result<Value> {
        let table = self.table_param(&params)?;
        let client = self.client.clone();

        let references = self
            .runtime
            .block_on(async move { client.references(&table).await })
            .map_err(user_error)?;

        Ok(serde_json::to_value(references)?)
    }

    fn new_row(&self, params: HashMap<String, Value>) -> Result<Value> {
        let table = self.table_param(&params)?;
        let client = self.client.clone();

        let row = self
            .runtime
            .block_on(async move { client.new_row(&table).await })
            .map_err(user_error)?;

        Ok(Value::Object(row))
    }

    fn create_row(&self, params: HashMap<String, Value>) -> Result<Value> {
        let data = Self::get_param_raw_row(&params, "data")?;
        let store = self.store.clone();

        let created = self
            .runtime
            .block_on(async move { store.create_row(&data).await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "created": created }))
    }

    fn update_row(&self, params: HashMap<String, Value>) -> Result<Value> {
        let id = Self::require_id(&params)?;
        let data = Self::get_param_raw_row(&params, "data")?;
        let store = self.store.clone();

        let updated = self
            .runtime
            .block_on(async move { store.update_row(&id, &data).await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "updated": updated }))
    }

    fn delete_row(&self, params: HashMap<String, Value>) -> Result<Value> {
        let id = Self::require_id(&params)?;
        let store = self.store.clone();

        let state = self
            .runtime
            .block_on(async move { store.delete_row(&id).await })
            .map_err(user_error)?;

        Ok(listing_json(&state))
    }

    fn list_forms(&self) -> Result<Value> {
        let client = self.client.clone();

        let forms = self
            .runtime
            .block_on(async move { client.forms().await })
            .map_err(user_error)?;

        Ok(serde_json::json!({
            "forms": forms,
            "count": forms.len(),
        }))
    }

    fn get_form(&self, params: HashMap<String, Value>) -> Result<Value> {
        let slug = Self::require_str(&params, "slug")?;
        let client = self.client.clone();

        let (form, schema) = self
            .runtime
            .block_on(async move {
                let form = client.form(&slug).await?;
                let schema = client.form_schema(&slug).await?;
                Ok::<_, AdminError>((form, schema))
            })
            .map_err(user_error)?;

        Ok(serde_json::json!({
            "form": form,
            "schema": schema,
        }))
    }

    fn submit_form(&self, params: HashMap<String, Value>) -> Result<Value> {
        let slug = Self::require_str(&params, "slug")?;
        let data = Self::get_param_raw_row(&params, "data")?;
        let store = self.store.clone();

        let outcome = self
            .runtime
            .block_on(async move { store.submit_form(&slug, &data).await })
            .map_err(user_error)?;

        Ok(serde_json::to_value(outcome)?)
    }

    fn list_charts(&self, params: HashMap<String, Value>) -> Result<Value> {
        let client = self.client.clone();

        if let Some(slug) = Self::get_param_str(&params, "slug").map(str::to_string) {
            let (chart, schema) = self
                .runtime
                .block_on(async move {
                    let chart = client.chart(&slug).await?;
                    let schema = client.chart_schema(&slug).await?;
                    Ok::<_, AdminError>((chart, schema))
                })
                .map_err(user_error)?;

            return Ok(serde_json::json!({
                "chart": chart,
                "schema": schema,
            }));
        }

        let charts = self
            .runtime
            .block_on(async move { client.charts().await })
            .map_err(user_error)?;

        Ok(serde_json::json!({
            "charts": charts,
            "count": charts.len(),
        }))
    }

    fn chart_data(&self, params: HashMap<String, Value>) -> Result<Value> {
        let slug = Self::require_str(&params, "slug")?;
        let data = match params.get("data") {
            Some(_) => Self::get_param_raw_row(&params, "data")?,
            None => RawRow::new(),
        };
        let store = self.store.clone();

        let points = self
            .runtime
            .block_on(async move { store.fetch_chart_data(&slug, &data).await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "data": points }))
    }

    fn links(&self) -> Result<Value> {
        let client = self.client.clone();

        let links = self
            .runtime
            .block_on(async move { client.links().await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "links": links }))
    }

    /// Reads the file from disk and stores it in a media column of the
    /// current table.
    fn upload(&self, params: HashMap<String, Value>) -> Result<Value> {
        let column = Self::require_str(&params, "column")?;
        let path = shellexpand::tilde(&Self::require_str(&params, "path")?).to_string();
        let file_name = Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path))?;
        let contents =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path))?;
        let store = self.store.clone();

        let (stored, url) = self
            .runtime
            .block_on(async move {
                let stored = store.upload_media(&column, &file_name, contents).await?;
                let url = store.media_url(&column, &stored.file_key).await?;
                Ok::<_, AdminError>((stored, url))
            })
            .map_err(user_error)?;

        Ok(serde_json::json!({
            "file_key": stored.file_key,
            "file_url": url,
        }))
    }

    fn media_url(&self, params: HashMap<String, Value>) -> Result<Value> {
        let column = Self::require_str(&params, "column")?;
        let file_key = Self::require_str(&params, "file_key")?;
        let store = self.store.clone();

        let url = self
            .runtime
            .block_on(async move { store.media_url(&column, &file_key).await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "file_url": url }))
    }

    fn change_password(&self, params: HashMap<String, Value>) -> Result<Value> {
        let new_password = Self::require_str(&params, "new_password")?;
        let change = PasswordChange {
            current_password: Self::require_str(&params, "current_password")?,
            confirm_new_password: Self::get_param_str(&params, "confirm_new_password")
                .map(str::to_string)
                .unwrap_or_else(|| new_password.clone()),
            new_password,
        };
        let store = self.store.clone();

        self.runtime
            .block_on(async move { store.change_password(&change).await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "changed": true }))
    }

    fn translations(&self, params: HashMap<String, Value>) -> Result<Value> {
        let store = self.store.clone();

        if let Some(code) = Self::get_param_str(&params, "language").map(str::to_string) {
            let translation = self
                .runtime
                .block_on(async move { store.load_translation(&code).await })
                .map_err(user_error)?;
            return Ok(serde_json::to_value(translation)?);
        }

        let locale = Self::get_param_str(&params, "locale").map(str::to_string);
        let language = self
            .runtime
            .block_on(async move { store.setup_translations(locale.as_deref()).await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "language": language }))
    }

    fn meta(&self) -> Result<Value> {
        let client = self.client.clone();

        let meta = self
            .runtime
            .block_on(async move { client.meta().await })
            .map_err(user_error)?;

        Ok(serde_json::to_value(meta)?)
    }

    fn user(&self) -> Result<Value> {
        let client = self.client.clone();

        let user = self
            .runtime
            .block_on(async move { client.user().await })
            .map_err(user_error)?;

        Ok(serde_json::to_value(user)?)
    }

    fn logout(&self) -> Result<Value> {
        let client = self.client.clone();

        self.runtime
            .block_on(async move { client.logout().await })
            .map_err(user_error)?;

        Ok(serde_json::json!({ "logged_out": true }))
    }

    fn dark_mode(&self, params: HashMap<String, Value>) -> Result<Value> {
        let enabled = params
            .get("enabled")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: enabled"))?;

        let state = self.store.set_dark_mode(enabled).map_err(user_error)?;
        Ok(serde_json::json!({ "dark_mode": state.dark_mode }))
    }
}

fn param(name: &str, param_type: &str, required: bool, default: Option<Value>) -> ParamInfo {
    ParamInfo {
        name: name.into(),
        param_type: param_type.into(),
        required,
        default,
    }
}

fn method(name: &str, description: &str, params: Vec<ParamInfo>) -> MethodInfo {
    MethodInfo {
        name: name.into(),
        description: description.into(),
        params,
    }
}

impl FgpService for AdminService {
    fn name(&self) -> &str {
        "piccolo-admin"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn dispatch(&self, method: &str, params: HashMap<String, Value>) -> Result<Value> {
        match method {
            "health" => self.health(),
            "tables" | "admin.tables" => self.list_tables(params),
            "open" | "admin.open" => self.open_table(params),
            "schema" | "admin.schema" => self.get_schema(params),
            "rows" | "admin.rows" => self.fetch(),
            "filter" | "admin.filter" => self.filter(params),
            "clear" | "admin.clear" => self.clear(),
            "order" | "admin.order" => self.order(params),
            "page" | "admin.page" => self.page(params),
            "state" | "admin.state" => self.state(),
            "row" | "admin.row" => self.get_row(params),
            "ids" | "admin.ids" => self.get_ids(params),
            "references" | "admin.references" => self.get_references(params),
            "new_row" | "admin.new_row" => self.new_row(params),
            "create" | "admin.create" => self.create_row(params),
            "update" | "admin.update" => self.update_row(params),
            "delete" | "admin.delete" => self.delete_row(params),
            "forms" | "admin.forms" => self.list_forms(),
            "form" | "admin.form" => self.get_form(params),
            "submit_form" | "admin.submit_form" => self.submit_form(params),
            "charts" | "admin.charts" => self.list_charts(params),
            "chart_data" | "admin.chart_data" => self.chart_data(params),
            "links" | "admin.links" => self.links(),
            "upload" | "admin.upload" => self.upload(params),
            "media_url" | "admin.media_url" => self.media_url(params),
            "change_password" | "admin.change_password" => self.change_password(params),
            "translations" | "admin.translations" => self.translations(params),
            "meta" | "admin.meta" => self.meta(),
            "user" | "admin.user" => self.user(),
            "logout" | "admin.logout" => self.logout(),
            "dark_mode" | "admin.dark_mode" => self.dark_mode(params),
            _ => anyhow::bail!("Unknown method: {}", method),
        }
    }

    fn method_list(&self) -> Vec<MethodInfo> {
        let table = || param("table", "string", false, None);
        let id = || param("id", "string", true, None);
        let data = || param("data", "object", true, None);

        vec![
            method(
                "admin.tables",
                "List table names",
                vec![param("grouped", "boolean", false, Some(serde_json::json!(false)))],
            ),
            method(
                "admin.open",
                "Select a table, load its schema and fetch the first page",
                vec![param("table", "string", true, None)],
            ),
            method("admin.schema", "Get a table schema", vec![table()]),
            method("admin.rows", "Fetch the current page of rows", vec![]),
            method(
                "admin.filter",
                "Replace filters and refetch",
                vec![param("filters", "object", true, None)],
            ),
            method("admin.clear", "Clear filters and ordering, then refetch", vec![]),
            method(
                "admin.order",
                "Set ordering (e.g. \"-rating,name\") and refetch",
                vec![param("order", "string", true, None)],
            ),
            method(
                "admin.page",
                "Go to a page and refetch",
                vec![
                    param("page", "integer", true, None),
                    param("page_size", "integer", false, None),
                ],
            ),
            method("admin.state", "Get the full listing state", vec![]),
            method("admin.row", "Get a single row of the current table", vec![id()]),
            method(
                "admin.ids",
                "List ids and readable labels for reference pickers",
                vec![
                    table(),
                    param("search", "string", false, None),
                    param("limit", "integer", false, None),
                    param("offset", "integer", false, None),
                ],
            ),
            method("admin.references", "List tables referencing a table", vec![table()]),
            method("admin.new_row", "Get default values for a new row", vec![table()]),
            method("admin.create", "Create a row in the current table", vec![data()]),
            method("admin.update", "Update a row in the current table", vec![id(), data()]),
            method("admin.delete", "Delete a row and refetch", vec![id()]),
            method("admin.forms", "List custom forms", vec![]),
            method(
                "admin.form",
                "Get a custom form and its schema",
                vec![param("slug", "string", true, None)],
            ),
            method(
                "admin.submit_form",
                "Submit a custom form",
                vec![param("slug", "string", true, None), data()],
            ),
            method(
                "admin.charts",
                "List charts, or get one chart and its filter schema",
                vec![param("slug", "string", false, None)],
            ),
            method(
                "admin.chart_data",
                "Fetch chart data for the given filter values",
                vec![
                    param("slug", "string", true, None),
                    param("data", "object", false, None),
                ],
            ),
            method("admin.links", "List sidebar links", vec![]),
            method(
                "admin.upload",
                "Upload a local file to a media column of the current table",
                vec![
                    param("column", "string", true, None),
                    param("path", "string", true, None),
                ],
            ),
            method(
                "admin.media_url",
                "Get the URL of a stored media file",
                vec![
                    param("column", "string", true, None),
                    param("file_key", "string", true, None),
                ],
            ),
            method(
                "admin.change_password",
                "Change the password of the logged in user",
                vec![
                    param("current_password", "string", true, None),
                    param("new_password", "string", true, None),
                    param("confirm_new_password", "string", false, None),
                ],
            ),
            method(
                "admin.translations",
                "Load a language, or pick one from the stored preference and locale",
                vec![
                    param("language", "string", false, None),
                    param("locale", "string", false, None),
                ],
            ),
            method("admin.meta", "Get site name and admin version", vec![]),
            method("admin.user", "Get the logged in user", vec![]),
            method("admin.logout", "End the admin session", vec![]),
            method(
                "admin.dark_mode",
                "Toggle and persist dark mode",
                vec![param("enabled", "boolean", true, None)],
            ),
        ]
    }

    fn on_start(&self) -> Result<()> {
        tracing::info!("AdminService starting, verifying API connection...");
        let client = self.client.clone();
        let credentials = self.config.username.clone().zip(self.config.password.clone());

        self.runtime.block_on(async move {
            match client.ping().await {
                Ok(true) => tracing::info!("Piccolo Admin API connection verified"),
                Ok(false) => tracing::warn!("Piccolo Admin API returned unsuccessful response"),
                Err(e) => {
                    tracing::error!("Failed to connect to Piccolo Admin API: {}", e);
                    return Err(user_error(e));
                }
            }

            if let Some((username, password)) = credentials {
                client.login(&username, &password).await.map_err(user_error)?;
            }
            Ok(())
        })
    }

    fn health_check(&self) -> HashMap<String, HealthStatus> {
        let mut checks = HashMap::new();

        let client = self.client.clone();
        let start = std::time::Instant::now();
        let result = self.runtime.block_on(async move { client.ping().await });

        let latency = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(true) => {
                checks.insert(
                    "piccolo_admin_api".into(),
                    HealthStatus::healthy_with_latency(latency),
                );
            }
            Ok(false) => {
                checks.insert(
                    "piccolo_admin_api".into(),
                    HealthStatus::unhealthy("API returned error"),
                );
            }
            Err(e) => {
                checks.insert(
                    "piccolo_admin_api".into(),
                    HealthStatus::unhealthy(e.to_string()),
                );
            }
        }

        checks
    }
}
