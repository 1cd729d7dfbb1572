//! HTTP client for the product service.
//!
//! `GET {base_url}/api/products/{id}` answers 200 with the product or 404.
//! Transient failures are retried with backoff before the lookup is
//! reported as unreachable.

use async_trait::async_trait;
use backon::Retryable;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ClientError, ProductLookup, ProductOracle};
use crate::config::ProductServiceConfig;
use crate::order::ProductAttributes;
use crate::utils::retry::{is_retryable_status, is_retryable_transport, lookup_backoff};

/// Product service client.
pub struct HttpProductClient {
    client: Client,
    base_url: String,
    max_retries: usize,
}

impl HttpProductClient {
    /// Create a client from configuration.
    pub fn new(config: &ProductServiceConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("base_url '{}': {}", base_url, e)))?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url,
            max_retries: config.max_retries,
        })
    }

    fn product_url(&self, product_id: Uuid) -> String {
        format!("{}/api/products/{}", self.base_url, product_id)
    }

    /// One request. `Ok(None)` means the service answered 404.
    async fn fetch(&self, product_id: Uuid) -> Result<Option<ProductAttributes>, ClientError> {
        let response = self.client.get(self.product_url(product_id)).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        let product = response.json::<ProductAttributes>().await?;
        Ok(Some(product))
    }

    fn is_retryable(err: &ClientError) -> bool {
        match err {
            ClientError::Http(e) => is_retryable_transport(e),
            ClientError::Status(status) => is_retryable_status(*status),
            ClientError::Config(_) => false,
        }
    }
}

#[async_trait]
impl ProductOracle for HttpProductClient {
    #[tracing::instrument(name = "product.resolve", skip(self))]
    async fn resolve(&self, product_id: Uuid) -> ProductLookup {
        let result = (|| async { self.fetch(product_id).await })
            .retry(lookup_backoff(self.max_retries))
            .when(Self::is_retryable)
            .notify(|err, delay| {
                warn!(
                    error = %err,
                    retry_in_ms = %delay.as_millis(),
                    "Product lookup failed, retrying"
                );
            })
            .await;

        match result {
            Ok(Some(product)) => {
                debug!(name = %product.name, "Product found");
                ProductLookup::Found(product)
            }
            Ok(None) => ProductLookup::NotFound,
            Err(e) => {
                warn!(error = %e, "Product service unreachable");
                ProductLookup::Unreachable(e.to_string())
            }
        }
    }
}
