//! Seams to the two external REST surfaces: the Home Assistant gateway and
//! the backend that persists entity links.

pub mod backend;
pub mod client;

use async_trait::async_trait;
use hass::ServiceCall;
use url::Url;

use growlink_api::{
    EntityUpdate, GatewayId, LinkRequest, LinkedEntity, NewEntity, RecordId,
};

use crate::error::{ApiError, ApiResult};

pub use self::backend::BackendClient;
pub use self::client::HassClient;

/// Live device access on one Home Assistant instance.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn fetch_states(&self) -> ApiResult<Vec<hass::State>>;

    async fn call_service(&self, call: &ServiceCall, entity_id: &str) -> ApiResult<()>;

    async fn api_info(&self) -> ApiResult<hass::ApiInfo>;
}

/// Persisted entity records of one user's gateways.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn list_entities(&self, gateway_id: GatewayId) -> ApiResult<Vec<LinkedEntity>>;

    async fn create_entity(
        &self,
        gateway_id: GatewayId,
        entity: NewEntity,
    ) -> ApiResult<LinkedEntity>;

    async fn update_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
        update: EntityUpdate,
    ) -> ApiResult<LinkedEntity>;

    async fn link_entity(
        &self,
        gateway_id: GatewayId,
        id: RecordId,
        link: LinkRequest,
    ) -> ApiResult<LinkedEntity>;

    async fn unlink_entity(&self, gateway_id: GatewayId, id: RecordId)
    -> ApiResult<LinkedEntity>;

    async fn delete_entity(&self, gateway_id: GatewayId, id: RecordId) -> ApiResult<()>;
}

/// Joins an endpoint onto a base url, keeping any path prefix of the base
/// (`http://host/ha` + `/api/states` is `http://host/ha/api/states`).
pub(crate) fn endpoint_url(base_url: &Url, endpoint: &str) -> ApiResult<Url> {
    let base = if base_url.path().ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    let base = Url::parse(&base)?;
    Ok(base.join(endpoint.trim_start_matches('/'))?)
}

/// Maps a non-success response onto the error taxonomy. `401` always
/// becomes [`ApiError::Unauthorized`] so callers can send the user back to
/// authentication.
pub(crate) fn status_error(
    label: &str,
    action: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> ApiError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized(format!("[{label}] unauthorized during {action}"));
    }

    let details = if body.is_empty() {
        format!("{status}")
    } else {
        format!("{status}: {body}")
    };
    ApiError::service_error(format!("[{label}] error during {action}: {details}"))
}

pub(crate) async fn check_status(
    label: &str,
    response: reqwest::Response,
    action: &str,
) -> ApiResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let err = status_error(label, action, status, &body);
    if err.is_unauthorized() {
        log::warn!("{err}");
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use url::Url;

    use crate::error::ErrorKind;
    use crate::gateway::{endpoint_url, status_error};

    #[test]
    fn endpoint_url_keeps_prefix() {
        let base = Url::parse("http://ha.local:8123").unwrap();
        assert_eq!(
            endpoint_url(&base, "/api/states").unwrap().as_str(),
            "http://ha.local:8123/api/states"
        );

        let base = Url::parse("https://proxy.example/homeassistant").unwrap();
        assert_eq!(
            endpoint_url(&base, "/api/services/switch/turn_on")
                .unwrap()
                .as_str(),
            "https://proxy.example/homeassistant/api/services/switch/turn_on"
        );
    }

    #[test]
    fn unauthorized_is_distinct() {
        let err = status_error("gw", "GET /api/states", StatusCode::UNAUTHORIZED, "");
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = status_error("gw", "GET /api/states", StatusCode::FORBIDDEN, "nope");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("nope"));

        let err = status_error("gw", "GET /api/states", StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
