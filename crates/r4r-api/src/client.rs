use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};
use serde_json::{Value, json};
use tracing::debug;

use r4r_types::{Deploy, Job, Owner, Service};

use crate::convert::{deploy_from_json, extract_items, job_from_json, owner_from_json, service_from_json};
use crate::error::ApiError;
use crate::logs::{LogPage, LogQuery, LogTransport};

pub const DEFAULT_BASE_URL: &str = "https://api.render.com/v1/";

/// Page size for the services listing
const SERVICE_PAGE_SIZE: usize = 100;

/// Render REST client
#[derive(Clone)]
pub struct RenderClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
    owner_id: Option<String>,
}

impl RenderClient {
    /// Create a client for `base_url` authenticated with `api_key`
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        // Relative joins drop the last path segment unless the base ends in '/'
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| ApiError::Transport("API key contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ApiError::Transport(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            timeout,
            owner_id: None,
        })
    }

    /// Scope log queries to a workspace
    pub fn with_owner_id(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn map_send_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::from(err)
        }
    }

    /// Turn a non-success response into an error using the body's `message`
    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    code,
                    status.canonical_reason().unwrap_or("unknown status")
                )
            });
        Err(ApiError::from_status(code, message))
    }

    async fn read_json(&self, response: Response) -> Result<Value, ApiError> {
        let response = Self::check(response).await?;
        let bytes = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        if bytes.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_json(&self, url: Url) -> Result<Value, ApiError> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.read_json(response).await
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Value, ApiError> {
        debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.read_json(response).await
    }

    // ========================================================================
    // Services
    // ========================================================================

    /// List services, following the cursor until a short page
    pub async fn list_services(&self, limit: Option<usize>) -> Result<Vec<Service>, ApiError> {
        let mut services = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = self.endpoint("services")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &SERVICE_PAGE_SIZE.to_string());
                if let Some(cursor) = &cursor {
                    query.append_pair("cursor", cursor);
                }
            }

            let body = self.get_json(url).await?;
            let Value::Array(items) = &body else {
                services.extend(extract_items(&body, "service").into_iter().map(service_from_json));
                break;
            };

            let mut next = None;
            for item in items {
                if let Some(service) = item.get("service") {
                    services.push(service_from_json(service));
                }
                next = item.get("cursor").and_then(Value::as_str).map(str::to_string);
            }

            let reached_limit = limit.is_some_and(|l| services.len() >= l);
            if items.len() < SERVICE_PAGE_SIZE || next.is_none() || next == cursor || reached_limit {
                break;
            }
            cursor = next;
        }

        if let Some(limit) = limit {
            services.truncate(limit);
        }
        Ok(services)
    }

    /// Find a service by exact name or id
    pub async fn find_service(&self, name_or_id: &str) -> Result<Option<Service>, ApiError> {
        let services = self.list_services(None).await?;
        Ok(services
            .into_iter()
            .find(|s| s.name == name_or_id || s.id == name_or_id))
    }

    pub async fn get_service(&self, service_id: &str) -> Result<Service, ApiError> {
        let body = self.get_json(self.endpoint(&format!("services/{service_id}"))?).await?;
        Ok(service_from_json(&body))
    }

    // ========================================================================
    // Deploys
    // ========================================================================

    pub async fn list_deploys(&self, service_id: &str, limit: u32) -> Result<Vec<Deploy>, ApiError> {
        let mut url = self.endpoint(&format!("services/{service_id}/deploys"))?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let body = self.get_json(url).await?;
        Ok(extract_items(&body, "deploy")
            .into_iter()
            .map(deploy_from_json)
            .collect())
    }

    pub async fn trigger_deploy(&self, service_id: &str, clear_cache: bool) -> Result<Deploy, ApiError> {
        let url = self.endpoint(&format!("services/{service_id}/deploys"))?;
        let cache = if clear_cache { "clear" } else { "do_not_clear" };
        let body = self.post_json(url, &json!({ "clearCache": cache })).await?;
        Ok(deploy_from_json(&body))
    }

    pub async fn get_deploy(&self, service_id: &str, deploy_id: &str) -> Result<Deploy, ApiError> {
        let url = self.endpoint(&format!("services/{service_id}/deploys/{deploy_id}"))?;
        let body = self.get_json(url).await?;
        Ok(deploy_from_json(&body))
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub async fn create_job(&self, service_id: &str, command: &str) -> Result<Job, ApiError> {
        let url = self.endpoint(&format!("services/{service_id}/jobs"))?;
        let body = self.post_json(url, &json!({ "startCommand": command })).await?;
        Ok(job_from_json(&body))
    }

    pub async fn list_jobs(&self, service_id: &str, limit: u32) -> Result<Vec<Job>, ApiError> {
        let mut url = self.endpoint(&format!("services/{service_id}/jobs"))?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let body = self.get_json(url).await?;
        Ok(extract_items(&body, "job").into_iter().map(job_from_json).collect())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, ApiError> {
        let body = self.get_json(self.endpoint(&format!("jobs/{job_id}"))?).await?;
        Ok(job_from_json(&body))
    }

    // ========================================================================
    // Account
    // ========================================================================

    pub async fn owners(&self) -> Result<Vec<Owner>, ApiError> {
        let body = self.get_json(self.endpoint("owners")?).await?;
        Ok(extract_items(&body, "owner")
            .into_iter()
            .map(owner_from_json)
            .collect())
    }

    /// Id of the first workspace the key can see
    pub async fn owner_id(&self) -> Result<Option<String>, ApiError> {
        Ok(self
            .owners()
            .await?
            .into_iter()
            .map(|o| o.id)
            .find(|id| !id.is_empty()))
    }

    /// The user the API key belongs to
    pub async fn whoami(&self) -> Result<Owner, ApiError> {
        let body = self.get_json(self.endpoint("users")?).await?;
        Ok(owner_from_json(body.get("user").unwrap_or(&body)))
    }
}

#[async_trait]
impl LogTransport for RenderClient {
    async fn list_logs(&self, query: &LogQuery) -> Result<LogPage, ApiError> {
        let mut url = self.endpoint("logs")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(owner_id) = &self.owner_id {
                pairs.append_pair("ownerId", owner_id);
            }
            for (key, value) in query.params() {
                pairs.append_pair(key, &value);
            }
        }
        let body = self.get_json(url).await?;
        LogPage::from_value(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;
    use httpmock::MockServer;

    fn client_for(server: &MockServer) -> RenderClient {
        RenderClient::new("test-key", &server.base_url(), Duration::from_secs(5))
            .expect("client builds")
    }

    #[tokio::test]
    async fn test_list_services_follows_cursor() {
        let server = MockServer::start_async().await;
        let first_page: Vec<Value> = (0..SERVICE_PAGE_SIZE)
            .map(|i| json!({ "service": { "id": format!("srv-{i}"), "name": format!("svc-{i}") }, "cursor": "page-2" }))
            .collect();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/services")
                .query_param("limit", "100")
                .query_param_missing("cursor")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(Value::Array(first_page));
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/services").query_param("cursor", "page-2");
            then.status(200).json_body(json!([
                { "service": { "id": "srv-last", "name": "last", "suspended": "suspended" }, "cursor": "page-3" }
            ]));
        });

        let services = client_for(&server).list_services(None).await.unwrap();

        first.assert();
        second.assert();
        assert_eq!(services.len(), SERVICE_PAGE_SIZE + 1);
        assert_eq!(services.last().map(|s| s.name.as_str()), Some("last"));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/owners");
            then.status(401).json_body(json!({ "message": "invalid api key" }));
        });

        let err = client_for(&server).owners().await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/jobs/job-1");
            then.status(502).body("bad gateway");
        });

        let err = client_for(&server).get_job("job-1").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_trigger_deploy_body() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/services/srv-1/deploys")
                .json_body(json!({ "clearCache": "clear" }));
            then.status(201).json_body(json!({ "id": "dep-9", "status": "created" }));
        });

        let deploy = client_for(&server).trigger_deploy("srv-1", true).await.unwrap();
        mock.assert();
        assert_eq!(deploy.id, "dep-9");
    }

    #[tokio::test]
    async fn test_list_logs_query() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/logs")
                .query_param("ownerId", "own-1")
                .query_param("resourceIds", "srv-1,srv-2")
                .query_param("limit", "50")
                .query_param("level", "error");
            then.status(200).json_body(json!({
                "logs": [{ "message": "boom", "level": "error" }],
                "hasMore": false
            }));
        });

        let client = client_for(&server).with_owner_id(Some("own-1".into()));
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut query = LogQuery::new(vec!["srv-1".into(), "srv-2".into()], start, start);
        query.limit = 50;
        query.level = Some(r4r_types::LogLevel::Error);

        let page = client.list_logs(&query).await.unwrap();
        mock.assert();
        assert_eq!(page.logs.len(), 1);
        assert_ne!(page.has_more, Some(true));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = RenderClient::new("k", "https://api.render.com/v1", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint("services").unwrap().as_str(), "https://api.render.com/v1/services");
    }
}
