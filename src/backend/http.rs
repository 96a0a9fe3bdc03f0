//! HTTP client for a forecast persistence service.
//!
//! Requires the `http` feature.
//!
//! ## Routes
//!
//! - `GET {base}/{resource}?scenario={id}` returns a JSON array of forecast lines.
//! - `POST {base}/{resource}/bulk` with a JSON [`BulkWrite`] body; any 2xx is success.

use async_trait::async_trait;
use reqwest::{Client, Response};

use super::{BulkWrite, ForecastBackend};
use crate::error::BackendError;
use crate::forecast::{ForecastLine, ScenarioId};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Use a preconfigured client (timeouts, headers, TLS).
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpBackend { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(BackendError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ForecastBackend for HttpBackend {
    async fn list(
        &self,
        resource: &str,
        scenario: &ScenarioId,
    ) -> Result<Vec<ForecastLine>, BackendError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, resource))
            .query(&[("scenario", scenario.as_str())])
            .send()
            .await
            .map_err(transport)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn bulk_write(&self, request: BulkWrite) -> Result<(), BackendError> {
        let response = self
            .client
            .post(format!("{}/{}/bulk", self.base_url, request.resource))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }
}
