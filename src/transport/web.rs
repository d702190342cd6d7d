use core::{
    fmt,
    future::Future,
    ops::Deref,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, future::BoxFuture};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use url::Url;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{RequestRedirect, ResponseType, Window};

use super::{Fetch, FetchRequest, FinalUrl, HopResponse};
use crate::{ByteStream, Error, Result};

/// Stand-in for the socket transport's connection pool.
///
/// Browsers manage their own connections, so an agent has no effect here.
#[derive(Debug, Clone, Default)]
pub struct Agent;

impl Agent {
    /// Create an agent.
    pub const fn new() -> Self {
        Self
    }
}

/// [`Fetch`] backed by the browser's `window.fetch`.
pub struct WebFetch {
    window: SingleThreaded<Window>,
}

impl fmt::Debug for WebFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebFetch").finish()
    }
}

// Browser is not multi-threaded, so we can safely implement `Send` and `Sync`
// since values wrapped here never leave the main thread.
pub(crate) struct SingleThreaded<T>(pub T);

impl<T: Stream> Stream for SingleThreaded<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // SAFETY: SingleThreaded<T> is a newtype wrapper, and we do not move T out.
        let this = unsafe { self.get_unchecked_mut() };
        unsafe { Pin::new_unchecked(&mut this.0).poll_next(cx) }
    }
}

unsafe impl<T> Send for SingleThreaded<T> {}
unsafe impl<T> Sync for SingleThreaded<T> {}

impl<T> Deref for SingleThreaded<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Future> Future for SingleThreaded<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: SingleThreaded<T> is a newtype wrapper, and we do not move T out.
        let this = unsafe { self.get_unchecked_mut() };
        unsafe { Pin::new_unchecked(&mut this.0).poll(cx) }
    }
}

impl WebFetch {
    /// Bind to the global `window`, if there is one.
    pub fn new() -> Option<Self> {
        web_sys::window().map(|window| Self {
            window: SingleThreaded(window),
        })
    }
}

impl Fetch for WebFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'static, Result<HopResponse>> {
        let window = SingleThreaded(self.window.0.clone());
        Box::pin(SingleThreaded(async move { fetch(&window, request).await }))
    }
}

/// Aborts the browser request unless disarmed, so a dropped hop
/// (timeout, cancelled call) does not leave it running.
struct AbortOnDrop {
    controller: web_sys::AbortController,
    armed: bool,
}

impl AbortOnDrop {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("aborting browser fetch");
            self.controller.abort();
        }
    }
}

async fn fetch(window: &Window, request: FetchRequest) -> Result<HopResponse> {
    if request.signal.is_aborted() {
        return Err(Error::TimedOut);
    }

    let init = web_sys::RequestInit::new();
    init.set_method(request.method.as_str());
    // Manual mode only ever yields an opaque response, so it is used when
    // redirects must not be followed at all.
    init.set_redirect(if request.follow_redirects {
        RequestRedirect::Follow
    } else {
        RequestRedirect::Manual
    });

    let mut guard = AbortOnDrop {
        controller: web_sys::AbortController::new().map_err(js_error)?,
        armed: true,
    };
    init.set_signal(Some(&guard.controller.signal()));

    let headers = web_sys::Headers::new().map_err(js_error)?;
    for (name, value) in &request.headers {
        let value = value.to_str().map_err(|_| Error::InvalidParam("headers"))?;
        headers.set(name.as_str(), value).map_err(js_error)?;
    }
    init.set_headers(headers.as_ref());

    if let Some(body) = request.body.as_ref() {
        let array = js_sys::Uint8Array::from(body.as_ref());
        init.set_body(array.as_ref());
    }

    let fetch_request =
        web_sys::Request::new_with_str_and_init(request.url.as_str(), &init).map_err(js_error)?;
    let response = JsFuture::from(window.fetch_with_request(&fetch_request))
        .await
        .map_err(js_error)?;
    guard.disarm();
    let response: web_sys::Response = response
        .dyn_into()
        .map_err(|_| Error::transport("fetch did not return a Response"))?;

    // Status and location of an unfollowed redirect are hidden from scripts.
    if response.type_() == ResponseType::Opaqueredirect {
        let mut hop = http::Response::new(None);
        *hop.status_mut() = StatusCode::FOUND;
        return Ok(hop);
    }

    let status = StatusCode::from_u16(response.status()).map_err(Error::transport)?;
    let mut headers = HeaderMap::new();
    for pair in response.headers().entries() {
        let entry: js_sys::Array = pair.map_err(js_error)?.unchecked_into();
        let (Some(name), Some(value)) = (entry.get(0).as_string(), entry.get(1).as_string()) else {
            continue;
        };
        headers.append(
            HeaderName::from_bytes(name.as_bytes()).map_err(Error::transport)?,
            HeaderValue::from_str(&value).map_err(Error::transport)?,
        );
    }
    // The browser has already decoded the body.
    headers.remove(header::CONTENT_ENCODING);
    headers.remove(header::CONTENT_LENGTH);

    let body = response.body().map(|body| {
        let stream = wasm_streams::ReadableStream::from_raw(body)
            .into_stream()
            .map(|result| {
                result
                    .map(|chunk| Bytes::from(js_sys::Uint8Array::new(&chunk).to_vec()))
                    .map_err(js_error)
            });
        ByteStream::new(SingleThreaded(stream))
    });

    let mut hop = http::Response::new(body);
    *hop.status_mut() = status;
    *hop.headers_mut() = headers;
    if response.redirected() {
        let url = Url::parse(&response.url()).map_err(Error::transport)?;
        hop.extensions_mut().insert(FinalUrl(url));
    }
    Ok(hop)
}

fn js_error(value: JsValue) -> Error {
    Error::transport(value.as_string().unwrap_or_else(|| format!("{value:?}")))
}
