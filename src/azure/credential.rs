//! Credential construction for the configured authentication method.

use crate::config::{AuthMethod, AuthSettings};
use crate::error::Error;
use azure_core::auth::TokenCredential;
use azure_identity::{
    ClientSecretCredential, DefaultAzureCredentialBuilder, ImdsManagedIdentityCredential,
    TokenCredentialOptions,
};
use std::sync::Arc;

/// Token scope of the Azure Resource Manager API.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Build the token credential for `auth`.
///
/// Only construction happens here; [`verify_credential`] proves it works.
pub fn create_credential(auth: &AuthSettings) -> Result<Arc<dyn TokenCredential>, Error> {
    match auth.method {
        AuthMethod::ServicePrincipal => {
            let (tenant_id, client_id, client_secret) = auth.service_principal()?;
            log::info!("Using service principal {client_id} in tenant {tenant_id}");
            Ok(Arc::new(ClientSecretCredential::new(
                azure_core::new_http_client(),
                tenant_id.to_string(),
                client_id.to_string(),
                client_secret.to_string(),
                TokenCredentialOptions::default(),
            )))
        }
        AuthMethod::ManagedIdentity => {
            let credential = ImdsManagedIdentityCredential::new(azure_core::new_http_client());
            // A client id selects a user-assigned identity.
            match auth.client_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                Some(client_id) => {
                    log::info!("Using user-assigned managed identity {client_id}");
                    Ok(Arc::new(credential.with_client_id(client_id)))
                }
                None => {
                    log::info!("Using system-assigned managed identity");
                    Ok(Arc::new(credential))
                }
            }
        }
        AuthMethod::Default => {
            log::info!("Using default credential chain");
            Ok(Arc::new(DefaultAzureCredentialBuilder::new().build()))
        }
    }
}

/// Fetch one management token so a bad credential aborts before any discovery.
pub async fn verify_credential(credential: &dyn TokenCredential) -> Result<(), Error> {
    credential
        .get_token(&[MANAGEMENT_SCOPE])
        .await
        .map(|_| ())
        .map_err(|e| Error::Authentication(e.to_string()))
}
