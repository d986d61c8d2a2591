//! Raw HTTP access to the Scaleway APIs.
//!
//! `scaleway-rs` covers image listing but not security groups, IAM keys, or
//! user data, so those calls go through `reqwest` with the same
//! `X-Auth-Token` authentication.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::ScalewayComputeError;
use super::models::ApiErrorModel;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Public Scaleway API endpoint.
pub const SCALEWAY_API_BASE: &str = "https://api.scaleway.com";

#[derive(Clone, Debug)]
pub(super) struct ScalewayHttp {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl ScalewayHttp {
    pub(super) fn new(
        secret_key: &str,
        base_url: &str,
    ) -> Result<Self, ScalewayComputeError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ScalewayComputeError::provider)?;
        Ok(Self {
            client,
            secret_key: secret_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub(super) fn instance_url(&self, zone: &str, path: &str) -> String {
        format!("{}/instance/v1/zones/{zone}/{path}", self.base_url)
    }

    pub(super) fn iam_url(&self, path: &str) -> String {
        format!("{}/iam/v1alpha1/{path}", self.base_url)
    }

    pub(super) async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ScalewayComputeError> {
        let (status, body) = self.execute(self.client.get(url).query(query)).await?;
        decode(status, &body)
    }

    /// Like [`ScalewayHttp::get`], but a 404 yields `None`.
    pub(super) async fn get_optional<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ScalewayComputeError> {
        let (status, body) = self.execute(self.client.get(url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(status, &body).map(Some)
    }

    pub(super) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        url: &str,
        payload: &B,
    ) -> Result<T, ScalewayComputeError> {
        let (status, body) = self.execute(self.client.post(url).json(payload)).await?;
        decode(status, &body)
    }

    /// Posts `payload` and discards the response body.
    pub(super) async fn post_ignoring_body<B: Serialize + Sync>(
        &self,
        url: &str,
        payload: &B,
    ) -> Result<(), ScalewayComputeError> {
        let (status, body) = self.execute(self.client.post(url).json(payload)).await?;
        check(status, &body)
    }

    pub(super) async fn patch_text(
        &self,
        url: &str,
        payload: &str,
    ) -> Result<(), ScalewayComputeError> {
        let request = self
            .client
            .patch(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(payload.to_owned());
        let (status, body) = self.execute(request).await?;
        check(status, &body)
    }

    pub(super) async fn delete(&self, url: &str) -> Result<(), ScalewayComputeError> {
        let (status, body) = self.execute(self.client.delete(url)).await?;
        check(status, &body)
    }

    async fn execute(
        &self,
        request: RequestBuilder,
    ) -> Result<(StatusCode, Vec<u8>), ScalewayComputeError> {
        let response = request
            .header("X-Auth-Token", &self.secret_key)
            .send()
            .await
            .map_err(ScalewayComputeError::provider)?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "scaleway response");
        let body = response
            .bytes()
            .await
            .map_err(ScalewayComputeError::provider)?;
        Ok((status, body.to_vec()))
    }
}

fn check(status: StatusCode, body: &[u8]) -> Result<(), ScalewayComputeError> {
    if status.is_success() {
        return Ok(());
    }
    Err(api_error(status, body))
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, ScalewayComputeError> {
    check(status, body)?;
    serde_json::from_slice(body).map_err(ScalewayComputeError::provider)
}

fn api_error(status: StatusCode, body: &[u8]) -> ScalewayComputeError {
    match serde_json::from_slice::<ApiErrorModel>(body) {
        Ok(api_err) => ScalewayComputeError::Http {
            status: status.as_u16(),
            message: api_err.message,
            resource: api_err.resource,
        },
        Err(_) => ScalewayComputeError::Http {
            status: status.as_u16(),
            message: String::from_utf8_lossy(body).into_owned(),
            resource: None,
        },
    }
}
