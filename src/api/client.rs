//! Piccolo Admin HTTP client with connection pooling and a cookie session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::AdminApi;
use crate::config::AdminConfig;
use crate::error::{AdminError, AdminResult};
use crate::models::{
    ChartConfig, FileDownload, FileUrl, FileUrlRequest, FormConfig, FormOutcome, GroupedTables,
    MediaUpload, Meta, PasswordChange, References, Row, RowCount, RowsResponse, SidebarLinks,
    StoredFile, Translation, TranslationList, User, FORM_SUCCESS_MESSAGE,
};
use crate::query::{IdsQuery, QueryParams, READABLE_KEY};
use crate::response::ResponseBody;
use crate::schema::Schema;

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";
const SESSION_COOKIE: &str = "id";

/// Piccolo Admin HTTP client with a persistent session.
pub struct AdminClient {
    client: Client,
    base_url: Url,
    cookies: Arc<Jar>,
}

impl AdminClient {
    /// Create a client for the admin rooted at `config.base_url`.
    pub fn new(config: &AdminConfig) -> AdminResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AdminError::Config(format!("Invalid base URL {}: {}", config.base_url, e))
        })?;

        let cookies = Arc::new(Jar::default());
        if let Some(session_id) = &config.session_id {
            cookies.add_cookie_str(
                &format!("{}={}; Path=/", SESSION_COOKIE, session_id),
                &base_url,
            );
        }
        if let Some(token) = &config.csrf_token {
            cookies.add_cookie_str(&format!("{}={}; Path=/", CSRF_COOKIE, token), &base_url);
        }

        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_provider(cookies.clone())
            .build()
            .map_err(|e| AdminError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            cookies,
        })
    }

    fn url(&self, path: &str) -> AdminResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AdminError::Config(format!("Invalid path {}: {}", path, e)))
    }

    fn api_url(&self, path: &str) -> AdminResult<Url> {
        self.url(&format!("api/{}", path))
    }

    fn public_url(&self, path: &str) -> AdminResult<Url> {
        self.url(&format!("public/{}", path))
    }

    /// CSRF token from the cookie jar.
    fn csrf_token(&self) -> Option<String> {
        let header = self.cookies.cookies(&self.base_url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == CSRF_COOKIE).then(|| value.to_string())
        })
    }

    /// Turn non-success responses into [`AdminError::Http`].
    async fn check(response: Response) -> AdminResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = %text, "API request rejected");
        Err(AdminError::Http {
            status: status.as_u16(),
            body: ResponseBody::from_text(text),
        })
    }

    /// Make a GET request.
    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(String, String)],
    ) -> AdminResult<T> {
        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    /// Start a mutating request. Carries the CSRF token when one is known.
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(method = %method, url = %url, "Sending request");

        let request = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match self.csrf_token() {
            Some(token) => request.header(CSRF_HEADER, token),
            None => {
                tracing::warn!("No CSRF token available, request may be rejected");
                request
            }
        }
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> AdminResult<Response> {
        let mut request = self.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        Self::check(request.send().await?).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> AdminResult<T> {
        Ok(self.send(method, url, body).await?.json().await?)
    }

    /// Log in with username and password. Picks up the CSRF cookie first.
    pub async fn login(&self, username: &str, password: &str) -> AdminResult<()> {
        let root = self.base_url.clone();
        Self::check(self.client.get(root).send().await?).await?;

        let body = serde_json::json!({
            "username": username,
            "password": password,
            "csrftoken": self.csrf_token(),
        });
        self.send(Method::POST, self.url("auth/login/")?, Some(&body))
            .await?;

        tracing::info!(username, "Logged in to Piccolo Admin");
        Ok(())
    }

    pub async fn logout(&self) -> AdminResult<()> {
        self.send(Method::POST, self.url("auth/logout/")?, None)
            .await?;
        Ok(())
    }

    /// Check if the admin is reachable.
    pub async fn ping(&self) -> AdminResult<bool> {
        let response = self
            .client
            .get(self.public_url("meta/")?)
            .header("Accept", "application/json")
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

/// Body of a successful custom form submission.
#[derive(Deserialize)]
struct FormSuccess {
    #[serde(default)]
    custom_form_success: Option<String>,
}

/// Extract the file name of an attachment from `Content-Disposition`.
fn attachment_file_name(header: &str) -> Option<String> {
    if !header.trim_start().starts_with("attachment") {
        return None;
    }
    let name = header
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("filename="))
        .next()
        .unwrap_or("download");
    Some(name.trim_matches('"').to_string())
}

#[async_trait]
impl AdminApi for AdminClient {
    async fn table_names(&self) -> AdminResult<Vec<String>> {
        self.get(self.api_url("tables/")?, &[]).await
    }

    async fn table_groups(&self) -> AdminResult<GroupedTables> {
        self.get(self.api_url("tables/grouped/")?, &[]).await
    }

    async fn schema(&self, table: &str) -> AdminResult<Schema> {
        self.get(self.api_url(&format!("tables/{}/schema/", table))?, &[])
            .await
    }

    async fn count(&self, table: &str, params: &QueryParams) -> AdminResult<RowCount> {
        self.get(
            self.api_url(&format!("tables/{}/count/", table))?,
            &params.to_pairs(),
        )
        .await
    }

    async fn rows(&self, table: &str, params: &QueryParams) -> AdminResult<Vec<Row>> {
        let mut query = vec![(READABLE_KEY.to_string(), "true".to_string())];
        query.extend(params.to_pairs());

        let response: RowsResponse = self
            .get(self.api_url(&format!("tables/{}/", table))?, &query)
            .await?;
        Ok(response.rows)
    }

    async fn row(&self, table: &str, id: &str) -> AdminResult<Row> {
        self.get(
            self.api_url(&format!("tables/{}/{}/", table, id))?,
            &[(READABLE_KEY.to_string(), "true".to_string())],
        )
        .await
    }

    async fn ids(&self, table: &str, query: &IdsQuery) -> AdminResult<Value> {
        self.get(
            self.api_url(&format!("tables/{}/ids/", table))?,
            &query.to_params().to_pairs(),
        )
        .await
    }

    async fn references(&self, table: &str) -> AdminResult<References> {
        self.get(self.api_url(&format!("tables/{}/references/", table))?, &[])
            .await
    }

    async fn new_row(&self, table: &str) -> AdminResult<Row> {
        self.get(self.api_url(&format!("tables/{}/new/", table))?, &[])
            .await
    }

    async fn create_row(&self, table: &str, row: &Row) -> AdminResult<Value> {
        let body = Value::Object(row.clone());
        self.send_json(
            Method::POST,
            self.api_url(&format!("tables/{}/", table))?,
            Some(&body),
        )
        .await
    }

    async fn update_row(&self, table: &str, id: &str, row: &Row) -> AdminResult<Value> {
        let body = Value::Object(row.clone());
        self.send_json(
            Method::PATCH,
            self.api_url(&format!("tables/{}/{}/", table, id))?,
            Some(&body),
        )
        .await
    }

    async fn delete_row(&self, table: &str, id: &str) -> AdminResult<()> {
        self.send(
            Method::DELETE,
            self.api_url(&format!("tables/{}/{}/", table, id))?,
            None,
        )
        .await?;
        Ok(())
    }

    async fn forms(&self) -> AdminResult<Vec<FormConfig>> {
        self.get(self.api_url("forms/")?, &[]).await
    }

    async fn form(&self, slug: &str) -> AdminResult<FormConfig> {
        self.get(self.api_url(&format!("forms/{}/", slug))?, &[]).await
    }

    async fn form_schema(&self, slug: &str) -> AdminResult<Schema> {
        self.get(self.api_url(&format!("forms/{}/schema/", slug))?, &[])
            .await
    }

    async fn submit_form(&self, slug: &str, data: &Row) -> AdminResult<FormOutcome> {
        let body = Value::Object(data.clone());
        let response = self
            .send(
                Method::POST,
                self.api_url(&format!("forms/{}/", slug))?,
                Some(&body),
            )
            .await?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_file_name);

        if let Some(file_name) = file_name {
            let media_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let contents = response.bytes().await?.to_vec();
            return Ok(FormOutcome::File(FileDownload {
                file_name,
                media_type,
                size: contents.len(),
                contents,
            }));
        }

        let success: FormSuccess = response.json().await?;
        Ok(FormOutcome::Message {
            message: success
                .custom_form_success
                .unwrap_or_else(|| FORM_SUCCESS_MESSAGE.to_string()),
        })
    }

    async fn charts(&self) -> AdminResult<Vec<ChartConfig>> {
        self.get(self.api_url("charts/")?, &[]).await
    }

    async fn chart(&self, slug: &str) -> AdminResult<ChartConfig> {
        self.get(self.api_url(&format!("charts/{}/", slug))?, &[]).await
    }

    async fn chart_schema(&self, slug: &str) -> AdminResult<Schema> {
        self.get(self.api_url(&format!("charts/{}/schema/", slug))?, &[])
            .await
    }

    async fn chart_data(&self, slug: &str, data: &Row) -> AdminResult<Value> {
        let body = Value::Object(data.clone());
        self.send_json(
            Method::POST,
            self.api_url(&format!("charts/{}/data/", slug))?,
            Some(&body),
        )
        .await
    }

    async fn links(&self) -> AdminResult<SidebarLinks> {
        self.get(self.api_url("links/")?, &[]).await
    }

    async fn store_file(&self, upload: &MediaUpload) -> AdminResult<StoredFile> {
        let file = Part::bytes(upload.contents.clone()).file_name(upload.file_name.clone());
        let form = Form::new()
            .text("table_name", upload.table_name.clone())
            .text("column_name", upload.column_name.clone())
            .part("file", file);

        let response = self
            .request(Method::POST, self.api_url("media/")?)
            .multipart(form)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn generate_file_url(
        &self,
        table: &str,
        column: &str,
        file_key: &str,
    ) -> AdminResult<String> {
        let body = serde_json::to_value(FileUrlRequest {
            table_name: table.to_string(),
            column_name: column.to_string(),
            file_key: file_key.to_string(),
        })?;
        let url: FileUrl = self
            .send_json(
                Method::POST,
                self.api_url("media/generate-file-url/")?,
                Some(&body),
            )
            .await?;
        Ok(url.file_url)
    }

    async fn change_password(&self, change: &PasswordChange) -> AdminResult<()> {
        let body = serde_json::to_value(change)?;
        self.send(Method::POST, self.api_url("change-password/")?, Some(&body))
            .await?;
        tracing::info!("Password changed, session ended by the server");
        Ok(())
    }

    async fn translations(&self) -> AdminResult<TranslationList> {
        self.get(self.public_url("translations/")?, &[]).await
    }

    async fn translation(&self, code: &str) -> AdminResult<Translation> {
        self.get(self.public_url(&format!("translations/{}/", code))?, &[])
            .await
    }

    async fn meta(&self) -> AdminResult<Meta> {
        self.get(self.public_url("meta/")?, &[]).await
    }

    async fn user(&self) -> AdminResult<User> {
        self.get(self.api_url("user/")?, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AdminClient {
        let mut config = AdminConfig::new("http://localhost:8000/admin");
        config.csrf_token = Some("abc123".into());
        AdminClient::new(&config).unwrap()
    }

    #[test]
    fn test_urls_join_under_admin_root() {
        let client = client();
        assert_eq!(
            client.api_url("tables/movie/count/").unwrap().as_str(),
            "http://localhost:8000/admin/api/tables/movie/count/"
        );
        assert_eq!(
            client.public_url("meta/").unwrap().as_str(),
            "http://localhost:8000/admin/public/meta/"
        );
    }

    #[test]
    fn test_csrf_token_from_cookie() {
        assert_eq!(client().csrf_token().as_deref(), Some("abc123"));

        let anonymous =
            AdminClient::new(&AdminConfig::new("http://localhost:8000/admin/")).unwrap();
        assert_eq!(anonymous.csrf_token(), None);
    }

    #[test]
    fn test_attachment_file_name() {
        assert_eq!(
            attachment_file_name(r#"attachment; filename="director.csv""#).as_deref(),
            Some("director.csv")
        );
        assert_eq!(attachment_file_name("attachment").as_deref(), Some("download"));
        assert_eq!(attachment_file_name("inline"), None);
    }
}
