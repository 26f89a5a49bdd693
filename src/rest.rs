//! REST transport for the Concerto API
//!
//! The resource client only ever needs three verbs against paths relative to
//! the configured endpoint. [`RestTransport`] is that boundary; [`HttpTransport`]
//! is the production implementation, a blocking `reqwest` client presenting the
//! configured TLS client certificate.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Identity};

use crate::config::ConnectionConfig;
use crate::{Error, Result};

/// Raw answer to a REST call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RestResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// GET/POST/DELETE against the Concerto API
///
/// Implementations do not retry and do not interpret status codes.
pub trait RestTransport {
    fn get(&self, path: &str) -> Result<RestResponse>;
    fn post(&self, path: &str, body: &[u8]) -> Result<RestResponse>;
    fn delete(&self, path: &str) -> Result<RestResponse>;
}

impl<T: RestTransport + ?Sized> RestTransport for &T {
    fn get(&self, path: &str) -> Result<RestResponse> {
        (**self).get(path)
    }

    fn post(&self, path: &str, body: &[u8]) -> Result<RestResponse> {
        (**self).post(path, body)
    }

    fn delete(&self, path: &str) -> Result<RestResponse> {
        (**self).delete(path)
    }
}

impl<T: RestTransport + ?Sized> RestTransport for Arc<T> {
    fn get(&self, path: &str) -> Result<RestResponse> {
        (**self).get(path)
    }

    fn post(&self, path: &str, body: &[u8]) -> Result<RestResponse> {
        (**self).post(path, body)
    }

    fn delete(&self, path: &str) -> Result<RestResponse> {
        (**self).delete(path)
    }
}

/// HTTPS transport authenticating with a client certificate
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// Build the client from the connection settings
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        // rustls wants certificate and key in a single PEM bundle
        let mut pem = read_pem(&config.cert)?;
        pem.push(b'\n');
        pem.extend(read_pem(&config.key)?);
        let identity = Identity::from_pem(&pem)
            .map_err(|e| Error::Config(format!("invalid client certificate or key: {}", e)))?;

        let mut builder = Client::builder().use_rustls_tls().identity(identity);

        if let Some(ca_cert) = &config.ca_cert {
            let ca = Certificate::from_pem(&read_pem(ca_cert)?)
                .map_err(|e| Error::Config(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(ca);
        }

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(endpoint = %config.api_endpoint, "Concerto REST transport ready");

        Ok(Self {
            client,
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Base endpoint every path is appended to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.endpoint, path)
        } else {
            format!("{}/{}", self.endpoint, path)
        }
    }

    fn execute(&self, method: &str, path: &str, request: RequestBuilder) -> Result<RestResponse> {
        let response = request.send().map_err(|e| {
            tracing::error!(method, path, error = %e, "Request failed");
            Error::transport(e)
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(Error::transport)?.to_vec();
        tracing::debug!(method, path, status, bytes = body.len(), "Response received");

        Ok(RestResponse { status, body })
    }
}

impl RestTransport for HttpTransport {
    fn get(&self, path: &str) -> Result<RestResponse> {
        self.execute("GET", path, self.client.get(self.url(path)))
    }

    fn post(&self, path: &str, body: &[u8]) -> Result<RestResponse> {
        let request = self
            .client
            .post(self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        self.execute("POST", path, request)
    }

    fn delete(&self, path: &str) -> Result<RestResponse> {
        self.execute("DELETE", path, self.client.delete(self.url(path)))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))
}
