use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;

use atlas_slo::{errors, Result};

use crate::JwkSet;

/// Where a [`crate::JwksCache`] gets the issuer's key set from.
#[automock]
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet>;
}

/// Fetches the key set from the issuer's publication endpoint.
#[derive(Debug, Clone)]
pub struct HttpKeySetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(errors::any)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<JwkSet> {
        self.client
            .get(&self.url)
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(errors::any)?
            .error_for_status()
            .map_err(errors::any)?
            .json::<JwkSet>()
            .await
            .map_err(errors::any)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn fetches_published_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{"kty": "RSA", "use": "sig", "kid": "k1", "alg": "RS256", "n": "bW9k", "e": "AQAB"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpKeySetSource::new(
            format!("{}/.well-known/jwks.json", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        let set = source.fetch().await.unwrap();
        assert_eq!(set.keys.len(), 1);
        assert_eq!(set.keys[0].kid, "k1");
    }

    #[tokio::test]
    async fn error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source =
            HttpKeySetSource::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn slow_issuer_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"keys": []}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let source =
            HttpKeySetSource::new(server.uri(), Duration::from_millis(50))
                .unwrap();
        assert!(source.fetch().await.is_err());
    }
}
