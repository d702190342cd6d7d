//! # One-call HTTP requests
//! candyget issues an HTTP request and hands back the body in the shape you
//! asked for, in one call.
//! - Method inference (`POST` when there is a body, `GET` otherwise)
//! - Five body representations: text, bytes, live stream, JSON, nothing
//! - Redirect following with credential stripping on cross-origin hops
//! - Transparent gzip / brotli / deflate decoding
//! - Per-hop timeouts
//! - Socket-level (hyper) and fetch-style transports behind one contract
//!
//! # Quick start
//! ```rust,no_run
//! # async fn example() -> Result<(), candyget::Error> {
//! use candyget::{ReturnType, candyget};
//!
//! let response = candyget(["https://example.com/", "string"]).await?;
//! println!("{} {}", response.status_code, response.body.as_text().unwrap_or_default());
//!
//! let response = candyget::get("https://example.com/", ReturnType::Json, None).await?;
//! println!("{:?}", response.body.as_json());
//! # Ok(())
//! # }
//! ```
//!
//! Process-wide defaults live in [`update_default_options`] and friends; they
//! are read once at the start of every call.

mod args;
mod body;
mod client;
pub mod decode;
mod error;
mod materialize;
pub mod options;
mod plugin;
mod redirect;
mod response;
mod timeout;
pub mod transport;

pub use args::{Arg, RequestDescriptor};
pub use body::{ByteStream, Payload, RequestBody, ResponseBody, ReturnType};
pub use bytes::Bytes;
pub use client::Client;
pub use error::{Error, ErrorKind, Result};
pub use http::{HeaderMap, Method, StatusCode};
pub use options::{
    DefaultOptions, FetchMode, Headers, Options, TransformOptions, Validator, default_options, reset_default_options,
    set_default_options, update_default_options,
};
pub use plugin::{Plugin, ResponseFuture};
pub use response::{RequestHead, Response};
pub use transport::{Agent, Fetch, FetchRequest, HopResponse};
pub use url::Url;

/// Issue a request from positional arguments.
///
/// Accepts `(url, returnType, options?, body?)` or
/// `(method, url, returnType, options?, body?)`; see [`Client::request`].
pub fn candyget<I>(args: I) -> ResponseFuture
where
    I: IntoIterator,
    I::Item: Into<Arg>,
{
    Client::default().request(args)
}

/// Fetch as text; `POST` when `body` is present, `GET` otherwise.
pub fn string(url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
    Client::default().string(url, options, body)
}

/// Fetch as bytes; `POST` when `body` is present, `GET` otherwise.
pub fn buffer(url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
    Client::default().buffer(url, options, body)
}

/// Fetch as a live stream; `POST` when `body` is present, `GET` otherwise.
pub fn stream(url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
    Client::default().stream(url, options, body)
}

/// Fetch as JSON; `POST` when `body` is present, `GET` otherwise.
pub fn json(url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
    Client::default().json(url, options, body)
}

/// Fetch and discard the body; `POST` when `body` is present, `GET` otherwise.
pub fn empty(url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
    Client::default().empty(url, options, body)
}

/// `GET` request.
pub fn get(url: impl Into<Arg>, return_type: ReturnType, options: Option<Options>) -> ResponseFuture {
    Client::default().get(url, return_type, options)
}

/// `HEAD` request.
pub fn head(url: impl Into<Arg>, options: Option<Options>) -> ResponseFuture {
    Client::default().head(url, options)
}

/// `POST` request.
pub fn post(
    url: impl Into<Arg>,
    return_type: ReturnType,
    options: Option<Options>,
    body: Option<RequestBody>,
) -> ResponseFuture {
    Client::default().post(url, return_type, options, body)
}

/// `PUT` request.
pub fn put(url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
    Client::default().put(url, options, body)
}

/// `DELETE` request.
pub fn delete(
    url: impl Into<Arg>,
    return_type: ReturnType,
    options: Option<Options>,
    body: Option<RequestBody>,
) -> ResponseFuture {
    Client::default().delete(url, return_type, options, body)
}

/// `OPTIONS` request.
pub fn options(url: impl Into<Arg>, return_type: ReturnType, options: Option<Options>) -> ResponseFuture {
    Client::default().options(url, return_type, options)
}

/// `TRACE` request.
pub fn trace(url: impl Into<Arg>, options: Option<Options>) -> ResponseFuture {
    Client::default().trace(url, options)
}

/// `PATCH` request.
pub fn patch(
    url: impl Into<Arg>,
    return_type: ReturnType,
    options: Option<Options>,
    body: Option<RequestBody>,
) -> ResponseFuture {
    Client::default().patch(url, return_type, options, body)
}
