//! Service endpoint HTTP client

use crate::error::{BindError, Result};
use fleetstack_core::Service;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Serialize)]
struct BindRequest<'a> {
    hostname: &'a str,
}

/// Client for the resource API every service exposes
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    environment: String,
}

impl ServiceClient {
    /// `environment` selects which of a service's endpoints is used
    /// (e.g. "production")
    pub fn new(environment: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), environment)
    }

    pub fn with_client(client: reqwest::Client, environment: impl Into<String>) -> Self {
        Self {
            client,
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Base URL of the service for the configured environment
    pub fn endpoint(&self, service: &Service) -> Result<String> {
        service
            .endpoint_for(&self.environment)
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| BindError::EndpointNotFound {
                service: service.name.clone(),
                environment: self.environment.clone(),
            })
    }

    /// `POST <endpoint>/resources/<instance>`; the response body is the set
    /// of variables to inject.
    ///
    /// A 2xx whose body is not a flat string map is `InvalidResponse`: the
    /// service has bound the app by then.
    pub async fn bind(
        &self,
        endpoint: &str,
        instance: &str,
        hostname: &str,
    ) -> Result<HashMap<String, String>> {
        let url = format!("{}/resources/{}", endpoint, instance);
        debug!(url = %url, hostname, "binding");

        let response = self
            .client
            .post(&url)
            .json(&BindRequest { hostname })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BindError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| BindError::InvalidResponse(e.to_string()))
    }

    /// `DELETE <endpoint>/resources/<instance>/hostname/<hostname>`
    pub async fn unbind(&self, endpoint: &str, instance: &str, hostname: &str) -> Result<()> {
        let url = format!("{}/resources/{}/hostname/{}", endpoint, instance, hostname);
        debug!(url = %url, "unbinding");

        let response = self.client.delete(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BindError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
