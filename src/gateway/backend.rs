use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use growlink_api::config::BackendConfig;
use growlink_api::{
    EntityUpdate, Gateway, GatewayId, GatewayUpdate, Grow, LinkRequest, LinkedEntity, NewEntity,
    RecordId,
};

use crate::error::{ApiError, ApiResult};
use crate::gateway::{EntityStore, check_status, endpoint_url};

/// REST client for the backend that stores gateways and entity links.
pub struct BackendClient {
    base_url: Url,
    http: reqwest::Client,
    token: String,
}

impl BackendClient {
    const LABEL: &'static str = "backend";

    pub fn new(config: &BackendConfig, token: String) -> ApiResult<Self> {
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(ApiError::Validation(
                "backend token cannot be empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            base_url: config.url.clone(),
            http,
            token,
        })
    }

    /// Builds a client with the token taken from the configured env var.
    pub fn from_env(config: &BackendConfig) -> ApiResult<Self> {
        let token_env = config.token_env_name();
        let token = std::env::var(token_env).map_err(|_| {
            ApiError::Unauthorized(format!("Missing backend token env var {token_env}"))
        })?;
        Self::new(config, token)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        action: &str,
    ) -> ApiResult<T> {
        let response = req.bearer_auth(&self.token).send().await?;
        let response = check_status(Self::LABEL, response, action).await?;
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        let url = endpoint_url(&self.base_url, endpoint)?;
        self.send(self.http.get(url), &format!("GET {endpoint}"))
            .await
    }

    async fn put<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = endpoint_url(&self.base_url, endpoint)?;
        self.send(self.http.put(url).json(body), &format!("PUT {endpoint}"))
            .await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = endpoint_url(&self.base_url, endpoint)?;
        self.send(self.http.post(url).json(body), &format!("POST {endpoint}"))
            .await
    }

    async fn delete(&self, endpoint: &str) -> ApiResult<reqwest::Response> {
        let url = endpoint_url(&self.base_url, endpoint)?;
        let response = self.http.delete(url).bearer_auth(&self.token).send().await?;
        check_status(Self::LABEL, response, &format!("DELETE {endpoint}")).await
    }

    pub async fn list_gateways(&self) -> ApiResult<Vec<Gateway>> {
        self.get("/iot-gateways/").await
    }

    pub async fn get_gateway(&self, gateway_id: GatewayId) -> ApiResult<Gateway> {
        self.get(&format!("/iot-gateways/{gateway_id}")).await
    }

    pub async fn update_gateway(
        &self,
        gateway_id: GatewayId,
        update: &GatewayUpdate,
    ) -> ApiResult<Gateway> {
        self.put(&format!("/iot-gateways/{gateway_id}"), update)
            .await
    }

    pub async fn set_gateway_enabled(
        &self,
        gateway_id: GatewayId,
        enabled: bool,
    ) -> ApiResult<Gateway> {
        let action = if enabled { "enable" } else { "disable" };
        self.put(
            &format!("/iot-gateways/{gateway_id}/{action}"),
            &serde_json::Value::Null,
        )
        .await
    }

    pub async fn list_grows(&self) -> ApiResult<Vec<Grow>> {
        self.get("/grows/").await
    }
}

#[async_trait]
impl EntityStore for BackendClient {
    async fn list_entities(&self, gateway_id: GatewayId) -> ApiResult<Vec<LinkedEntity>> {
        self.get(&format!("/iot-gateways/{gateway_id}/entities"))
            .await
    }

    async fn create_entity(
        &self,
        gateway_id: GatewayId,
        entity: NewEntity,
    ) -> ApiResult<LinkedEntity> {
        self.post(&format!("/iot-gateways/{gateway_id}/entities"), &entity)
            .await
    }

    async fn update_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
        update: EntityUpdate,
    ) -> ApiResult<LinkedEntity> {
        self.put(&format!("/iot-gateways/{gateway_id}/entities/{id}"), &update)
            .await
    }

    async fn link_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
        link: LinkRequest,
    ) -> ApiResult<LinkedEntity> {
        self.put(
            &format!("/iot-gateways/{gateway_id}/entities/{id}/link"),
            &link,
        )
        .await
    }

    async fn unlink_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
    ) -> ApiResult<LinkedEntity> {
        let response = self
            .delete(&format!("/iot-gateways/{gateway_id}/entities/{id}/unlink"))
            .await?;
        Ok(response.json().await?)
    }

    async fn delete_entity(&self, gateway_id: GatewayId, id: RecordId) -> ApiResult<()> {
        self.delete(&format!("/iot-gateways/{gateway_id}/entities/{id}"))
            .await?;
        Ok(())
    }
}
