//! Transports that perform one hop's network exchange.
//!
//! Two implementations share the [`Transport`] contract: the socket-level
//! transport backed by hyper (native targets), and the fetch-style transport
//! driven by a [`Fetch`] implementation (always used in the browser, opt-in
//! elsewhere). Redirects are followed by the redirect controller, except in
//! the browser, where only fetch itself can see them.

use futures_util::future::{AbortHandle, AbortRegistration, BoxFuture};
use http::{HeaderMap, Method};
use url::Url;

use crate::{ByteStream, Error, Payload, Result, options::FetchMode};

mod fetch;
pub use fetch::{Fetch, FetchRequest, FetchTransport};

#[cfg(not(target_arch = "wasm32"))]
mod socket;
#[cfg(not(target_arch = "wasm32"))]
pub use socket::{Agent, SocketTransport};

#[cfg(target_arch = "wasm32")]
mod web;
#[cfg(target_arch = "wasm32")]
pub(crate) use web::SingleThreaded;
#[cfg(target_arch = "wasm32")]
pub use web::{Agent, WebFetch};

/// Response of one hop: status, headers, and the raw body stream, if any.
pub type HopResponse = http::Response<Option<ByteStream>>;

/// Everything a transport needs to perform one hop.
#[derive(Debug)]
pub struct HopRequest {
    /// Request method.
    pub method: Method,
    /// Absolute `http`/`https` target.
    pub url: Url,
    /// Headers to send.
    pub headers: HeaderMap,
    /// Serialized body, if any.
    pub body: Option<Payload>,
    /// Whether the transport may follow redirects on its own.
    ///
    /// Only ever set for transports that report
    /// [`Transport::follows_redirects`].
    pub follow_redirects: bool,
}

/// Response extension naming the URL that actually produced the response.
///
/// Set by transports that followed redirects themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalUrl(pub Url);

/// A backend able to perform a single request/response exchange.
pub trait Transport: Send + Sync {
    /// Send `request` and resolve once response headers are available.
    ///
    /// The returned body stream is live; dropping it releases the
    /// underlying connection. Implementations should stop work when
    /// `signal` reports an abort.
    fn execute(&self, request: HopRequest, signal: AbortSignal) -> BoxFuture<'_, Result<HopResponse>>;

    /// Whether this transport can only observe redirects by following them.
    ///
    /// Such transports get [`HopRequest::follow_redirects`] whenever the call
    /// has a redirect budget, and report where they ended up via [`FinalUrl`].
    fn follows_redirects(&self) -> bool {
        false
    }
}

/// Cancellation flag handed to a transport for one hop.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    handle: AbortHandle,
}

impl AbortSignal {
    /// Whether the hop has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.handle.is_aborted()
    }
}

/// Owner side of an [`AbortSignal`].
#[derive(Debug)]
pub(crate) struct AbortController {
    handle: AbortHandle,
}

impl AbortController {
    /// A controller and the registration that ties a future to it.
    pub(crate) fn new() -> (Self, AbortRegistration) {
        let (handle, registration) = AbortHandle::new_pair();
        (Self { handle }, registration)
    }

    pub(crate) fn signal(&self) -> AbortSignal {
        AbortSignal {
            handle: self.handle.clone(),
        }
    }

    pub(crate) fn abort(&self) {
        self.handle.abort();
    }
}

/// Pick the transport for one top-level call.
pub(crate) fn select(fetch: &FetchMode, agent: Option<&Agent>) -> Result<Box<dyn Transport>> {
    match fetch {
        FetchMode::Custom(fetch) => {
            tracing::debug!("using caller-supplied fetch transport");
            Ok(Box::new(FetchTransport::new(fetch.clone())))
        }
        FetchMode::Environment => environment_fetch(),
        FetchMode::Disabled => socket(agent),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn environment_fetch() -> Result<Box<dyn Transport>> {
    Err(Error::InvalidParam("fetch"))
}

#[cfg(not(target_arch = "wasm32"))]
fn socket(agent: Option<&Agent>) -> Result<Box<dyn Transport>> {
    tracing::debug!(pooled = agent.is_some(), "using socket transport");
    Ok(Box::new(SocketTransport::new(
        agent.cloned().unwrap_or_default(),
    )))
}

#[cfg(target_arch = "wasm32")]
fn environment_fetch() -> Result<Box<dyn Transport>> {
    tracing::debug!("using browser fetch transport");
    let fetch = WebFetch::new().ok_or(Error::InvalidParam("fetch"))?;
    Ok(Box::new(FetchTransport::following(std::sync::Arc::new(fetch))))
}

// The browser has no socket access; fetch is the only transport.
#[cfg(target_arch = "wasm32")]
fn socket(_agent: Option<&Agent>) -> Result<Box<dyn Transport>> {
    environment_fetch()
}
