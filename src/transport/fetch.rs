use core::{fmt, future::Future};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{FutureExt, future::BoxFuture};
use http::{HeaderMap, Method};
use url::Url;

use super::{AbortSignal, HopRequest, HopResponse, Transport};
use crate::{Payload, Result};

/// One fetch-style call, as handed to a [`Fetch`] implementation.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute target.
    pub url: Url,
    /// Request method.
    pub method: Method,
    /// Headers to send.
    pub headers: HeaderMap,
    /// Fully buffered body.
    pub body: Option<Bytes>,
    /// Aborted when the hop's deadline expires.
    pub signal: AbortSignal,
    /// Whether the implementation may follow redirects itself.
    pub follow_redirects: bool,
}

/// A fetch-style HTTP function.
///
/// Unless [`FetchRequest::follow_redirects`] is set, implementations must
/// hand redirect responses back unchanged instead of following them. They
/// must leave `content-encoding` in the response headers if the body is
/// still encoded.
///
/// Any `Fn(FetchRequest) -> impl Future<Output = Result<HopResponse>>` closure
/// implements this trait.
pub trait Fetch: Send + Sync {
    /// Perform the request.
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<HopResponse>>;
}

impl<F, Fut> Fetch for F
where
    F: Fn(FetchRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HopResponse>> + Send + 'static,
{
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<HopResponse>> {
        self(request).boxed()
    }
}

/// Transport driven by a [`Fetch`] implementation.
pub struct FetchTransport {
    fetch: Arc<dyn Fetch>,
    follows_redirects: bool,
}

impl FetchTransport {
    /// Wrap a fetch implementation that returns redirects unfollowed.
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self {
            fetch,
            follows_redirects: false,
        }
    }

    /// Wrap a fetch implementation that can only follow redirects, such as
    /// the browser's, which hides redirect responses from scripts.
    pub fn following(fetch: Arc<dyn Fetch>) -> Self {
        Self {
            fetch,
            follows_redirects: true,
        }
    }
}

impl fmt::Debug for FetchTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchTransport").finish_non_exhaustive()
    }
}

impl Transport for FetchTransport {
    fn execute(&self, request: HopRequest, signal: AbortSignal) -> BoxFuture<'_, Result<HopResponse>> {
        Box::pin(async move {
            // Fetch takes a complete body; streams are collected first.
            let body = match request.body {
                None => None,
                Some(Payload::Bytes(bytes)) => Some(bytes),
                Some(Payload::Stream(stream)) => Some(stream.into_bytes().await?),
            };

            tracing::trace!(method = %request.method, url = %request.url, "fetch hop");
            self.fetch
                .fetch(FetchRequest {
                    url: request.url,
                    method: request.method,
                    headers: request.headers,
                    body,
                    signal,
                    follow_redirects: self.follows_redirects && request.follow_redirects,
                })
                .await
        })
    }

    fn follows_redirects(&self) -> bool {
        self.follows_redirects
    }
}
