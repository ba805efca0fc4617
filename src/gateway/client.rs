use std::time::Duration;

use async_trait::async_trait;
use hass::ServiceCall;
use url::Url;

use growlink_api::Gateway;

use crate::error::{ApiError, ApiResult};
use crate::gateway::{GatewayApi, check_status, endpoint_url};

/// REST client for one Home Assistant instance.
pub struct HassClient {
    name: String,
    base_url: Url,
    http: reqwest::Client,
    token: String,
}

impl HassClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(gateway: &Gateway, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let token = gateway.api_key.trim();
        if token.is_empty() {
            return Err(ApiError::Validation(format!(
                "[{}] Home Assistant token not configured",
                gateway.name
            )));
        }

        Ok(Self {
            name: gateway.name.clone(),
            base_url: Url::parse(gateway.api_url.trim())?,
            http,
            token: token.to_string(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        let url = endpoint_url(&self.base_url, endpoint)?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = check_status(&self.name, response, &format!("GET {endpoint}")).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GatewayApi for HassClient {
    async fn fetch_states(&self) -> ApiResult<Vec<hass::State>> {
        self.get("/api/states").await
    }

    async fn call_service(&self, call: &ServiceCall, entity_id: &str) -> ApiResult<()> {
        let path = call.path();
        let action = format!("POST {path}");
        let url = endpoint_url(&self.base_url, &path)?;
        let payload = call.payload(entity_id);

        log::debug!("[{}] {} {}", self.name, action, payload);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        check_status(&self.name, response, &action).await?;
        Ok(())
    }

    async fn api_info(&self) -> ApiResult<hass::ApiInfo> {
        self.get("/api/").await
    }
}
