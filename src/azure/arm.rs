//! Azure Resource Manager REST client.
//!
//! Implements [`NetworkClient`] with plain `reqwest` calls against
//! `management.azure.com`, authenticated with an `azure_identity` credential.

use super::client::NetworkClient;
use super::credential::MANAGEMENT_SCOPE;
use crate::config;
use crate::error::CloudError;
use crate::models::{Peering, PeeringSettings, PeeringState, SyncLevel, TenantSubscription, VnetRecord};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
const NETWORK_API_VERSION: &str = "2023-09-01";
const SUBSCRIPTION_API_VERSION: &str = "2022-12-01";

/// One page of an ARM list response.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    next_link: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ArmSubscription {
    subscription_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    state: String,
}

#[derive(Deserialize, Debug)]
struct ArmVnet {
    id: String,
    name: String,
    location: String,
    tags: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Debug)]
struct SubResource {
    id: String,
}

#[derive(Deserialize, Debug)]
struct ArmPeering {
    name: String,
    #[serde(default)]
    properties: ArmPeeringProperties,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct ArmPeeringProperties {
    peering_state: Option<PeeringState>,
    peering_sync_level: Option<SyncLevel>,
    allow_virtual_network_access: bool,
    allow_forwarded_traffic: bool,
    allow_gateway_transit: bool,
    use_remote_gateways: bool,
    remote_virtual_network: Option<SubResource>,
    provisioning_state: Option<String>,
}

impl ArmPeering {
    fn into_peering(self, owner_vnet_id: &str) -> Peering {
        let p = self.properties;
        Peering {
            name: self.name,
            owner_vnet_id: owner_vnet_id.to_string(),
            remote_vnet_id: p.remote_virtual_network.map(|r| r.id).unwrap_or_default(),
            connection_state: p.peering_state.unwrap_or(PeeringState::Unknown),
            allow_virtual_network_access: p.allow_virtual_network_access,
            allow_forwarded_traffic: p.allow_forwarded_traffic,
            allow_gateway_transit: p.allow_gateway_transit,
            use_remote_gateways: p.use_remote_gateways,
            sync_level: p.peering_sync_level,
            provisioning_state: p.provisioning_state,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ArmErrorBody {
    error: ArmErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ArmErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Azure Resource Manager client for subscriptions, VNets and peerings.
pub struct ArmClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: String,
    provisioning_timeout: Duration,
    poll_interval: Duration,
}

impl ArmClient {
    /// # Arguments
    /// * `credential` - Token source for the management scope
    /// * `provisioning_timeout` - How long create/delete may wait for ARM to finish
    pub fn new(
        credential: Arc<dyn TokenCredential>,
        provisioning_timeout: Duration,
    ) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .timeout(config::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| transport_error("build http client", e))?;
        Ok(ArmClient {
            http,
            credential,
            endpoint: MANAGEMENT_ENDPOINT.to_string(),
            provisioning_timeout,
            poll_interval: config::POLL_INTERVAL,
        })
    }

    async fn bearer(&self) -> Result<String, CloudError> {
        let token = self
            .credential
            .get_token(&[MANAGEMENT_SCOPE])
            .await
            .map_err(|e| CloudError::Auth(e.to_string()))?;
        Ok(token.token.secret().to_string())
    }

    /// Send one request and return status and body, whatever the status.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        operation: &str,
    ) -> Result<(StatusCode, String), CloudError> {
        log::trace!("{method} {url}");
        let token = self.bearer().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(operation, e))?;
        log::trace!("{operation}: HTTP {status} body.len()={}", text.len());
        Ok((status, text))
    }

    /// Send one request, turning any non-2xx status into an error.
    async fn call(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        operation: &str,
    ) -> Result<String, CloudError> {
        let (status, text) = self.send(method, url, body, operation).await?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(api_error(operation, status, &text))
        }
    }

    /// GET a list, following `nextLink` until the last page.
    async fn get_paged<T: DeserializeOwned>(
        &self,
        first_url: String,
        operation: &str,
    ) -> Result<Vec<T>, CloudError> {
        let mut items = Vec::new();
        let mut seen_links = HashSet::new();
        let mut next = Some(first_url);
        let mut count_pages = 0;

        while let Some(url) = next.take() {
            if !seen_links.insert(url.clone()) {
                return Err(CloudError::Decode {
                    operation: operation.to_string(),
                    message: "nextLink not unique - possible infinite loop".to_string(),
                });
            }
            let text = self.call(Method::GET, &url, None, operation).await?;
            let page: Page<T> = decode(operation, &text)?;
            log::debug!(
                "{operation}: page#{count_pages:2} record_count=+{:3}",
                page.value.len()
            );
            items.extend(page.value);
            next = page.next_link;
            count_pages += 1;
        }
        Ok(items)
    }

    fn peering_url(&self, vnet_id: &str, name: &str) -> String {
        format!(
            "{}{vnet_id}/virtualNetworkPeerings/{name}?api-version={NETWORK_API_VERSION}",
            self.endpoint
        )
    }

    /// GET a single peering; `None` when it does not exist.
    async fn get_peering(
        &self,
        vnet_id: &str,
        name: &str,
        operation: &str,
    ) -> Result<Option<Peering>, CloudError> {
        let (status, text) = self
            .send(Method::GET, &self.peering_url(vnet_id, name), None, operation)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(api_error(operation, status, &text));
        }
        let peering: ArmPeering = decode(operation, &text)?;
        Ok(Some(peering.into_peering(vnet_id)))
    }

    /// Poll a peering until ARM reports a terminal provisioning state.
    async fn wait_for_provisioning(
        &self,
        vnet_id: &str,
        name: &str,
        operation: &str,
    ) -> Result<Peering, CloudError> {
        let started = Instant::now();
        loop {
            match self.get_peering(vnet_id, name, operation).await? {
                Some(peering) => match peering.provisioning_state.as_deref() {
                    None | Some("Succeeded") => return Ok(peering),
                    Some(state @ ("Failed" | "Canceled")) => {
                        return Err(CloudError::Provisioning {
                            operation: operation.to_string(),
                            state: state.to_string(),
                        })
                    }
                    Some(state) => log::debug!("{operation}: provisioningState={state}"),
                },
                None => log::debug!("{operation}: peering {name} not visible yet"),
            }
            if started.elapsed() >= self.provisioning_timeout {
                return Err(CloudError::Timeout {
                    operation: operation.to_string(),
                    message: format!(
                        "provisioning not finished after {}s",
                        self.provisioning_timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll a peering until it is gone.
    async fn wait_for_deletion(
        &self,
        vnet_id: &str,
        name: &str,
        operation: &str,
    ) -> Result<(), CloudError> {
        let started = Instant::now();
        while self.get_peering(vnet_id, name, operation).await?.is_some() {
            if started.elapsed() >= self.provisioning_timeout {
                return Err(CloudError::Timeout {
                    operation: operation.to_string(),
                    message: format!(
                        "peering still present after {}s",
                        self.provisioning_timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkClient for ArmClient {
    async fn list_subscriptions(&self) -> Result<Vec<TenantSubscription>, CloudError> {
        let url = format!(
            "{}/subscriptions?api-version={SUBSCRIPTION_API_VERSION}",
            self.endpoint
        );
        let subs: Vec<ArmSubscription> = self.get_paged(url, "list subscriptions").await?;
        Ok(subs
            .into_iter()
            .map(|s| TenantSubscription {
                id: s.subscription_id,
                display_name: s.display_name,
                state: s.state,
            })
            .collect())
    }

    async fn list_virtual_networks(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<VnetRecord>, CloudError> {
        let url = format!(
            "{}/subscriptions/{subscription_id}/providers/Microsoft.Network/virtualNetworks?api-version={NETWORK_API_VERSION}",
            self.endpoint
        );
        let operation = format!("list VNets in {subscription_id}");
        let vnets: Vec<ArmVnet> = self.get_paged(url, &operation).await?;
        Ok(vnets
            .into_iter()
            .map(|v| VnetRecord {
                id: v.id,
                name: v.name,
                subscription_id: subscription_id.to_string(),
                location: v.location,
                tags: v.tags.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_peerings(&self, vnet_id: &str) -> Result<Vec<Peering>, CloudError> {
        let url = format!(
            "{}{vnet_id}/virtualNetworkPeerings?api-version={NETWORK_API_VERSION}",
            self.endpoint
        );
        let operation = format!("list peerings of {vnet_id}");
        let peerings: Vec<ArmPeering> = self.get_paged(url, &operation).await?;
        Ok(peerings
            .into_iter()
            .map(|p| p.into_peering(vnet_id))
            .collect())
    }

    async fn create_peering(
        &self,
        vnet_id: &str,
        name: &str,
        remote_vnet_id: &str,
        settings: &PeeringSettings,
    ) -> Result<Peering, CloudError> {
        let operation = format!("create peering {name}");
        let body = serde_json::json!({
            "properties": {
                "remoteVirtualNetwork": { "id": remote_vnet_id },
                "allowVirtualNetworkAccess": settings.allow_virtual_network_access,
                "allowForwardedTraffic": settings.allow_forwarded_traffic,
                "allowGatewayTransit": settings.allow_gateway_transit,
                "useRemoteGateways": settings.use_remote_gateways,
            }
        })
        .to_string();
        self.call(
            Method::PUT,
            &self.peering_url(vnet_id, name),
            Some(body),
            &operation,
        )
        .await?;
        self.wait_for_provisioning(vnet_id, name, &operation).await
    }

    async fn delete_peering(&self, vnet_id: &str, name: &str) -> Result<(), CloudError> {
        let operation = format!("delete peering {name}");
        let (status, text) = self
            .send(
                Method::DELETE,
                &self.peering_url(vnet_id, name),
                None,
                &operation,
            )
            .await?;
        if status == StatusCode::NOT_FOUND {
            log::debug!("{operation}: already gone");
            return Ok(());
        }
        if !status.is_success() {
            return Err(api_error(&operation, status, &text));
        }
        self.wait_for_deletion(vnet_id, name, &operation).await
    }

    async fn virtual_network_exists(&self, vnet_id: &str) -> Result<bool, CloudError> {
        let url = format!(
            "{}{vnet_id}?api-version={NETWORK_API_VERSION}",
            self.endpoint
        );
        let operation = format!("check VNet {vnet_id}");
        let (status, text) = self.send(Method::GET, &url, None, &operation).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(api_error(&operation, s, &text)),
        }
    }
}

fn decode<T: DeserializeOwned>(operation: &str, text: &str) -> Result<T, CloudError> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| CloudError::Decode {
        operation: operation.to_string(),
        message: format!("path={} error={}", e.path(), e),
    })
}

fn api_error(operation: &str, status: StatusCode, body: &str) -> CloudError {
    let (code, message) = match serde_json::from_str::<ArmErrorBody>(body) {
        Ok(parsed) => (parsed.error.code, parsed.error.message),
        Err(_) => (
            status.canonical_reason().unwrap_or("Unknown").to_string(),
            body.chars().take(500).collect(),
        ),
    };
    CloudError::Http {
        operation: operation.to_string(),
        status: status.as_u16(),
        code,
        message,
    }
}

fn transport_error(operation: &str, e: reqwest::Error) -> CloudError {
    if e.is_timeout() {
        CloudError::Timeout {
            operation: operation.to_string(),
            message: e.to_string(),
        }
    } else if e.is_decode() {
        CloudError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        }
    } else {
        CloudError::Connection {
            operation: operation.to_string(),
            message: e.to_string(),
        }
    }
}
