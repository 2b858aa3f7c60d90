//! Instagram Graph API publishing backend
//!
//! Reels go through the container protocol:
//! 1. `POST /{account}/media` with `media_type=REELS` returns a creation id
//! 2. `GET /{creation}?fields=status_code` until `FINISHED` or `ERROR`
//! 3. `POST /{account}/media_publish` returns the media id
//! 4. `GET /{media}?fields=permalink` for the public URL

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::backends::{
    network_error, BackendResult, ContainerHandle, ContainerStatus, PublishedMedia,
    PublishingBackend, TargetAccount,
};
use crate::config::InstagramConfig;
use crate::error::{PublishError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Graph API error code for an invalid or expired access token
const INVALID_TOKEN_CODE: i64 = 190;

/// Graph API throttling codes
const RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    code: Option<i64>,
}

pub struct InstagramGraphBackend {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl InstagramGraphBackend {
    pub fn new(config: &InstagramConfig) -> Result<Self> {
        Self::with_token(&config.graph_api_url, config.access_token()?)
    }

    /// Build a backend for `base_url` with an explicit token
    pub fn with_token(base_url: &str, access_token: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| network_error("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        fields: &str,
        on_error: fn(String) -> PublishError,
    ) -> BackendResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(&[
                ("fields", fields),
                ("access_token", self.access_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| network_error("Graph API request failed", e))?;

        read_response(response, on_error).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        on_error: fn(String) -> PublishError,
    ) -> BackendResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .query(&[("access_token", self.access_token.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error("Graph API request failed", e))?;

        read_response(response, on_error).await
    }
}

/// Decode a success body, or map a Graph error to the matching
/// `PublishError`, using `on_error` for errors specific to the step
async fn read_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    on_error: fn(String) -> PublishError,
) -> BackendResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| on_error(format!("Invalid Graph API response: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    Err(map_graph_error(status.as_u16(), &body, on_error))
}

fn map_graph_error(status: u16, body: &str, on_error: fn(String) -> PublishError) -> PublishError {
    let (message, code) = match serde_json::from_str::<GraphErrorResponse>(body) {
        Ok(parsed) => (parsed.error.message, parsed.error.code),
        Err(_) => (format!("HTTP {}: {}", status, body), None),
    };

    if status == 401 || code == Some(INVALID_TOKEN_CODE) {
        return PublishError::Authentication(message);
    }
    if status == 429 || code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c)) {
        return PublishError::RateLimit(message);
    }
    on_error(message)
}

#[async_trait]
impl PublishingBackend for InstagramGraphBackend {
    async fn create_container(
        &self,
        account: &TargetAccount,
        public_url: &str,
        caption: &str,
        share_to_feed: bool,
    ) -> BackendResult<ContainerHandle> {
        let body = json!({
            "media_type": "REELS",
            "video_url": public_url,
            "caption": caption,
            "share_to_feed": share_to_feed,
        });

        let created: IdResponse = self
            .post_json(
                &format!("{}/media", account.account_id),
                body,
                PublishError::Container,
            )
            .await?;

        tracing::debug!(creation_id = %created.id, "Instagram container created");
        Ok(ContainerHandle {
            creation_id: created.id,
        })
    }

    async fn container_status(&self, creation_id: &str) -> BackendResult<ContainerStatus> {
        let response: StatusResponse = self
            .get_json(creation_id, "status_code,status", PublishError::Processing)
            .await?;

        let code = response.status_code.unwrap_or_default();
        Ok(ContainerStatus::from_code(&code, response.status))
    }

    async fn publish(
        &self,
        account: &TargetAccount,
        creation_id: &str,
    ) -> BackendResult<PublishedMedia> {
        let published: IdResponse = self
            .post_json(
                &format!("{}/media_publish", account.account_id),
                json!({ "creation_id": creation_id }),
                PublishError::Publish,
            )
            .await?;

        // The reel is live at this point; a failed permalink lookup must not
        // turn the publish into a failure
        let permalink = match self
            .get_json::<PermalinkResponse>(&published.id, "permalink", PublishError::Publish)
            .await
        {
            Ok(PermalinkResponse {
                permalink: Some(permalink),
            }) => permalink,
            Ok(PermalinkResponse { permalink: None }) => {
                tracing::warn!(media_id = %published.id, "Graph API returned no permalink");
                self.url(&published.id)
            }
            Err(e) => {
                tracing::warn!(media_id = %published.id, error = %e, "Permalink lookup failed");
                self.url(&published.id)
            }
        };

        Ok(PublishedMedia {
            remote_id: published.id,
            permalink,
        })
    }

    fn name(&self) -> &str {
        "instagram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> InstagramGraphBackend {
        InstagramGraphBackend::with_token(&server.uri(), SecretString::from("tok".to_string()))
            .unwrap()
    }

    fn account() -> TargetAccount {
        TargetAccount::new("1784")
    }

    #[tokio::test]
    async fn test_create_container_sends_reel_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .and(query_param("access_token", "tok"))
            .and(body_json(json!({
                "media_type": "REELS",
                "video_url": "https://cdn/x.mp4",
                "caption": "hello",
                "share_to_feed": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "c1" })))
            .expect(1)
            .mount(&server)
            .await;

        let handle = backend(&server)
            .create_container(&account(), "https://cdn/x.mp4", "hello", true)
            .await
            .unwrap();
        assert_eq!(handle.creation_id, "c1");
    }

    #[tokio::test]
    async fn test_container_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c-done"))
            .and(query_param("fields", "status_code,status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status_code": "FINISHED", "id": "c-done" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c-wait"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status_code": "IN_PROGRESS" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c-bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": "ERROR",
                "status": "Error: unsupported video codec"
            })))
            .mount(&server)
            .await;

        let backend = backend(&server);
        assert_eq!(
            backend.container_status("c-done").await.unwrap(),
            ContainerStatus::Finished
        );
        assert_eq!(
            backend.container_status("c-wait").await.unwrap(),
            ContainerStatus::InProgress
        );
        assert_eq!(
            backend.container_status("c-bad").await.unwrap(),
            ContainerStatus::Error(Some("Error: unsupported video codec".to_string()))
        );
    }

    #[tokio::test]
    async fn test_publish_fetches_permalink() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media_publish"))
            .and(body_json(json!({ "creation_id": "c1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/m1"))
            .and(query_param("fields", "permalink"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "permalink": "https://instagram.com/p/m1",
                "id": "m1"
            })))
            .mount(&server)
            .await;

        let published = backend(&server).publish(&account(), "c1").await.unwrap();
        assert_eq!(published.remote_id, "m1");
        assert_eq!(published.permalink, "https://instagram.com/p/m1");
    }

    #[tokio::test]
    async fn test_publish_survives_permalink_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media_publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m2" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/m2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let published = backend(&server).publish(&account(), "c1").await.unwrap();
        assert_eq!(published.remote_id, "m2");
        assert!(published.permalink.ends_with("/m2"));
    }

    #[tokio::test]
    async fn test_invalid_token_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "Error validating access token",
                    "type": "OAuthException",
                    "code": 190
                }
            })))
            .mount(&server)
            .await;

        let err = backend(&server)
            .create_container(&account(), "https://cdn/x.mp4", "hello", true)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Authentication(ref m) if m.contains("access token")));
    }

    #[tokio::test]
    async fn test_throttling_is_rate_limit_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media_publish"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Application request limit reached", "code": 4 }
            })))
            .mount(&server)
            .await;

        let err = backend(&server).publish(&account(), "c1").await.unwrap_err();
        assert!(matches!(err, PublishError::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_other_errors_map_to_step() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1784/media"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Invalid parameter", "code": 100 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let backend = backend(&server);
        let err = backend
            .create_container(&account(), "https://cdn/x.mp4", "hello", true)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Container(ref m) if m == "Invalid parameter"));

        let err = backend.container_status("c1").await.unwrap_err();
        assert!(matches!(err, PublishError::Processing(ref m) if m.contains("upstream down")));
    }

    #[test]
    fn test_map_graph_error_unparseable_body() {
        let err = map_graph_error(429, "slow down", PublishError::Publish);
        assert!(matches!(err, PublishError::RateLimit(ref m) if m.contains("429")));
    }
}
