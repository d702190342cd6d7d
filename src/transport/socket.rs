use core::fmt;

use bytes::Bytes;
use futures_util::{TryStreamExt, future::BoxFuture};
use http_body_util::{BodyDataStream, BodyExt, Empty, Full, StreamBody, combinators::UnsyncBoxBody};
use hyper::body::Frame;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::{AbortSignal, HopRequest, HopResponse, Transport};
use crate::{ByteStream, Error, Payload, Result};

type OutgoingBody = UnsyncBoxBody<Bytes, Error>;

/// Connection pool for the socket transport.
///
/// Cloning shares the pool. Pass one through [`Options::agent`](crate::Options::agent)
/// to reuse connections across calls; without it every call gets a fresh pool.
/// The pool is tied to the tokio runtime that first drives it.
#[derive(Clone)]
pub struct Agent {
    client: HyperClient<HttpsConnector<HttpConnector>, OutgoingBody>,
}

impl Agent {
    /// Create an agent speaking HTTP/1.1 over plain TCP or rustls.
    pub fn new() -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let mut builder = HyperClient::builder(TokioExecutor::new());
        builder.http1_title_case_headers(true);
        Self {
            client: builder.build(connector),
        }
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent").finish_non_exhaustive()
    }
}

/// Socket-level transport over hyper.
#[derive(Debug)]
pub struct SocketTransport {
    agent: Agent,
}

impl SocketTransport {
    /// Transport sending every hop through `agent`'s pool.
    pub const fn new(agent: Agent) -> Self {
        Self { agent }
    }
}

fn outgoing(body: Option<Payload>) -> OutgoingBody {
    match body {
        None => Empty::new().map_err(|never| match never {}).boxed_unsync(),
        Some(Payload::Bytes(bytes)) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
        Some(Payload::Stream(stream)) => StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync(),
    }
}

impl Transport for SocketTransport {
    fn execute(&self, request: HopRequest, _signal: AbortSignal) -> BoxFuture<'_, Result<HopResponse>> {
        Box::pin(async move {
            let HopRequest {
                method,
                url,
                headers,
                body,
                ..
            } = request;

            let uri: http::Uri = url.as_str().parse().map_err(|_| Error::InvalidParam("url"))?;
            let mut outbound = http::Request::new(outgoing(body));
            *outbound.method_mut() = method;
            *outbound.uri_mut() = uri;
            *outbound.headers_mut() = headers;

            tracing::trace!(method = %outbound.method(), url = %url, "socket hop");
            let response = self.agent.client.request(outbound).await.map_err(Error::transport)?;

            Ok(response.map(|incoming| {
                Some(ByteStream::new(
                    BodyDataStream::new(incoming).map_err(Error::transport),
                ))
            }))
        })
    }
}
