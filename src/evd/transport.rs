//! Request transports for [`super::EvdClient`]
//!
//! [`LocalTransport`] frames every request and hands it to an in-process
//! [`EvdService`], so it exercises the same encoding as the network path.
//! [`HttpTransport`] posts the frames to an `evd-server`.

use std::sync::Arc;

use crate::error::Result;

use super::protocol::{decode_message, encode_message, Reply, Request};
use super::service::EvdService;

/// Carries one request to the service and brings back its reply.
pub trait Transport: Send + Sync {
    /// Sends `request`, returning the reply with errors already unpacked
    fn round_trip(&self, request: &Request) -> Result<Reply>;
}

/// Transport to a service in the same process
#[derive(Clone)]
pub struct LocalTransport {
    service: Arc<EvdService>,
}

impl LocalTransport {
    /// Sends every request straight to `service`
    pub fn new(service: Arc<EvdService>) -> Self {
        Self { service }
    }

    /// The service behind this transport
    pub fn service(&self) -> &Arc<EvdService> {
        &self.service
    }
}

impl Transport for LocalTransport {
    fn round_trip(&self, request: &Request) -> Result<Reply> {
        let degree = self.service.params().degree;
        let frame = encode_message(request, degree)?;
        let reply = self.service.handle_bytes(&frame);
        decode_message::<Reply>(&reply, degree)?.into_result()
    }
}

#[cfg(feature = "server")]
pub use http::HttpTransport;

#[cfg(feature = "server")]
mod http {
    use std::time::Duration;

    use reqwest::blocking::Client;

    use super::*;
    use crate::error::network_err;

    /// Blocking HTTP transport to an `evd-server`.
    ///
    /// Must not be used from inside an async runtime.
    pub struct HttpTransport {
        base_url: String,
        degree: usize,
        client: Client,
    }

    impl HttpTransport {
        /// Connects lazily to `base_url`, e.g. `http://127.0.0.1:3000`
        pub fn new(base_url: impl Into<String>, degree: usize, timeout: Duration) -> Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| network_err!("failed to build HTTP client: {}", e))?;
            Ok(Self {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                degree,
                client,
            })
        }

        fn route(request: &Request) -> (reqwest::Method, String) {
            let path = match request {
                Request::Setup { .. } => "/collections/setup".to_string(),
                Request::DropCollection { name } => {
                    return (reqwest::Method::DELETE, format!("/collections/{}", name));
                }
                Request::Insert { .. } => "/collections/insert".to_string(),
                Request::Query { .. } => "/collections/query".to_string(),
                Request::QueryPlain { .. } => "/collections/query_ptxt".to_string(),
                Request::Retrieve { .. } => "/collections/retrieve".to_string(),
                Request::PirRetrieve { .. } => "/collections/pir_retrieve".to_string(),
                Request::Terminate => "/terminate".to_string(),
            };
            (reqwest::Method::POST, path)
        }
    }

    impl Transport for HttpTransport {
        fn round_trip(&self, request: &Request) -> Result<Reply> {
            let (method, path) = Self::route(request);
            let frame = encode_message(request, self.degree)?;
            let response = self
                .client
                .request(method, format!("{}{}", self.base_url, path))
                .header("content-type", "application/octet-stream")
                .body(frame)
                .send()
                .map_err(|e| network_err!("request to {} failed: {}", path, e))?;
            let status = response.status();
            let bytes = response
                .bytes()
                .map_err(|e| network_err!("reading reply from {} failed: {}", path, e))?;
            match decode_message::<Reply>(&bytes, self.degree) {
                Ok(reply) => reply.into_result(),
                Err(_) if !status.is_success() => {
                    Err(network_err!("{} answered with status {}", path, status))
                }
                Err(err) => Err(err),
            }
        }
    }
}
