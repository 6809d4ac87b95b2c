//! # HTTP Endpoint Client
//!
//! The production `EndpointClient`: an asynchronous `reqwest` client wrapped in
//! `reqwest-middleware`, with an optional transient-retry policy. A single
//! client is shared by every service so connections are pooled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use super::{EndpointClient, EndpointResponse};
use crate::error::RequestError;
use crate::model::{EndpointDescriptor, ServiceDescriptor};

/// # Client Options
#[derive(Debug, Clone)]
pub struct ReqwestEndpointClientOptions {
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// Transient failures retried by the middleware before the poll is reported
    /// as failed. Zero leaves retrying to the next scheduled poll.
    pub max_retries: u32,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ReqwestEndpointClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            user_agent: concat!("rest-adapter/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// An `EndpointClient` backed by `reqwest`.
pub struct ReqwestEndpointClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
}

impl ReqwestEndpointClient {
    /// Builds the client.
    ///
    /// # Errors
    /// Returns `RequestError::Transport` if the TLS backend cannot be initialised.
    pub fn new(options: ReqwestEndpointClientOptions) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| RequestError::Transport(e.to_string()))?;

        let mut builder = ClientBuilder::new(client);
        if options.max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self { inner: builder.build() })
    }

    fn endpoint_url(service: &ServiceDescriptor, endpoint: &EndpointDescriptor) -> Result<Url, RequestError> {
        let origin = Url::parse(&service.origin())
            .map_err(|e| RequestError::Transport(format!("invalid origin {}: {}", service.origin(), e)))?;
        origin
            .join(&endpoint.url)
            .map_err(|e| RequestError::Transport(format!("invalid endpoint url {}: {}", endpoint.url, e)))
    }
}

fn map_middleware_error(err: reqwest_middleware::Error) -> RequestError {
    match err {
        reqwest_middleware::Error::Reqwest(e) => map_reqwest_error(e),
        other => RequestError::Transport(other.to_string()),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout
    } else {
        RequestError::Transport(err.to_string())
    }
}

#[async_trait]
impl EndpointClient for ReqwestEndpointClient {
    async fn request(
        &self,
        service: &ServiceDescriptor,
        endpoint: &EndpointDescriptor,
    ) -> Result<EndpointResponse, RequestError> {
        let url = Self::endpoint_url(service, endpoint)?;
        let mut req = self.inner.get(url);

        if let Some(credentials) = &service.credentials {
            req = req.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = req.send().await.map_err(map_middleware_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        log::trace!(
            "GET {}{} returned {} ({} bytes)",
            service.origin(),
            endpoint.url,
            status,
            body.len()
        );
        Ok(EndpointResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn joins_the_endpoint_path_onto_the_origin() {
        let service = ServiceDescriptor::new("svc", "example.com", "rest").with_origin(8080, false);
        let endpoint = EndpointDescriptor::new("a", "/v1/items?limit=5", "a", "auto");
        let url = ReqwestEndpointClient::endpoint_url(&service, &endpoint).unwrap();
        assert_eq!(url.as_str(), "http://example.com:8080/v1/items?limit=5");
    }

    #[tokio::test]
    async fn returns_status_headers_and_body() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let payload = r#"{"a":1}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                    payload.len(),
                    payload
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });

        let client = ReqwestEndpointClient::new(ReqwestEndpointClientOptions::default()).unwrap();
        let service = ServiceDescriptor::new("svc", "127.0.0.1", "rest").with_origin(port, false);
        let endpoint = EndpointDescriptor::new("a", "/a", "a", "auto");

        let response = client.request(&service, &endpoint).await.unwrap();
        handle.join().unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(&response.body[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        // Bind then drop to obtain a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = ReqwestEndpointClient::new(ReqwestEndpointClientOptions::default()).unwrap();
        let service = ServiceDescriptor::new("svc", "127.0.0.1", "rest").with_origin(port, false);
        let endpoint = EndpointDescriptor::new("a", "/a", "a", "auto");

        let err = client.request(&service, &endpoint).await.unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }
}
