//! Manual redirect following.
//!
//! Transports never follow redirects themselves. Each hop is dispatched here,
//! and a 301/302/303/307/308 with budget left turns into the next hop:
//! `Cookie` and `Authorization` are dropped once the target leaves the
//! origin of the *first* request, `Host` is always dropped, and a `POST`
//! becomes a bodyless `GET`. When the budget runs out the redirect response
//! itself is the result, with its `Location` resolved to an absolute URL.
//!
//! Transports that cannot see redirects at all (the browser's fetch) are
//! instead allowed to follow them while budget remains, and report the URL
//! they ended on.

use std::collections::BTreeMap;

use http::{
    HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    header::{CONTENT_ENCODING, CONTENT_LENGTH, LOCATION},
};
use url::Url;

use crate::{
    ByteStream, Error, Payload, RequestBody, Response, Result, ReturnType, decode,
    materialize::materialize,
    options::MergedOptions,
    response::RequestHead,
    timeout,
    transport::{FinalUrl, HopRequest, HopResponse, Transport},
};

const REDIRECT_STATUSES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// Whether `status` is one of the redirect statuses that are followed.
pub(crate) fn is_redirect(status: StatusCode) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Where the call currently stands.
#[derive(Debug)]
pub(crate) struct RedirectState {
    redirect_count: u32,
    original_url: Url,
    url: Url,
    method: Method,
    headers: BTreeMap<String, String>,
    body: Option<Payload>,
}

impl RedirectState {
    pub(crate) fn new(
        method: Method,
        url: Url,
        headers: BTreeMap<String, String>,
        body: Option<Payload>,
    ) -> Self {
        Self {
            redirect_count: 0,
            original_url: url.clone(),
            url,
            method,
            headers,
            body,
        }
    }

    /// Build the next hop's request and a record of what it sends.
    ///
    /// Buffered bodies are replayed on every hop; a stream body is sent once.
    fn hop(&mut self, follow_redirects: bool) -> Result<(HopRequest, RequestHead)> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidParam("headers"))?;
            let value = HeaderValue::from_str(value).map_err(|_| Error::InvalidParam("headers"))?;
            headers.insert(name, value);
        }

        let body = match self.body.take() {
            Some(Payload::Bytes(bytes)) => {
                self.body = Some(Payload::Bytes(bytes.clone()));
                Some(Payload::Bytes(bytes))
            }
            other => other,
        };

        let head = RequestHead {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: headers.clone(),
        };
        let request = HopRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
            body,
            follow_redirects,
        };
        Ok((request, head))
    }

    /// The state for the hop that follows a redirect to `target`.
    #[must_use]
    pub(crate) fn follow(self, target: Url) -> Self {
        let Self {
            redirect_count,
            original_url,
            mut method,
            mut headers,
            mut body,
            ..
        } = self;

        if !same_origin(&original_url, &target) {
            tracing::trace!(%target, "cross-origin redirect, dropping credentials");
            headers.remove("Cookie");
            headers.remove("Authorization");
        }
        headers.remove("Host");

        if method == Method::POST {
            method = Method::GET;
            body = None;
            headers.remove("Content-Type");
            headers.remove("Content-Length");
        }

        Self {
            redirect_count: redirect_count + 1,
            original_url,
            url: target,
            method,
            headers,
            body,
        }
    }
}

/// Drive a call to completion on `transport`, following redirects.
pub(crate) async fn run(
    transport: &dyn Transport,
    method: Method,
    url: Url,
    return_type: ReturnType,
    body: Option<RequestBody>,
    options: MergedOptions,
) -> Result<Response> {
    let headers = options.headers.clone();
    let mut state = RedirectState::new(method, url, headers, body.map(RequestBody::into_payload));

    let delegate = transport.follows_redirects();

    loop {
        let follow_redirects = delegate && state.redirect_count < options.max_redirects;
        let (request, mut head) = state.hop(follow_redirects)?;
        tracing::debug!(method = %head.method, url = %head.url, redirects = state.redirect_count, "dispatching hop");
        let response = timeout::dispatch(transport, request, options.timeout).await?;
        let status = response.status();

        if let Some(FinalUrl(url)) = response.extensions().get::<FinalUrl>() {
            tracing::debug!(%url, "transport followed redirects");
            head.url = url.clone();
        }

        if !is_redirect(status) || follow_redirects || state.redirect_count >= options.max_redirects {
            return settle(response, head, return_type, &options).await;
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or(Error::RedirectWithoutLocation)?
            .to_str()
            .map_err(Error::transport)?;
        let target = state.url.join(location).map_err(Error::transport)?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(Error::transport(format!("unsupported redirect target: {target}")));
        }

        // Releases this hop's connection before the next one is opened.
        drop(response);
        tracing::debug!(%status, %target, "following redirect");
        state = state.follow(target);
    }
}

/// Decode and materialize the final hop's body, then assemble the result.
async fn settle(
    response: HopResponse,
    request: RequestHead,
    return_type: ReturnType,
    options: &MergedOptions,
) -> Result<Response> {
    let (parts, body) = response.into_parts();
    let mut body = body.unwrap_or_else(ByteStream::empty);

    let mut headers = parts.headers.clone();
    if let Some(location) = headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| request.url.join(value).ok())
        .and_then(|target| HeaderValue::from_str(target.as_str()).ok())
    {
        headers.insert(LOCATION, location);
    }

    let declared_empty = parts
        .headers
        .get(CONTENT_LENGTH)
        .is_some_and(|length| length.as_bytes() == b"0");
    if request.method != Method::HEAD && return_type != ReturnType::Empty && !declared_empty {
        let encoding = parts
            .headers
            .get_all(CONTENT_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        if !encoding.is_empty() {
            body = decode::decode(body, &encoding);
        }
    }

    let body = materialize(
        body,
        return_type,
        &options.transformer_options,
        options.validator.as_ref(),
    )
    .await?;

    Ok(Response {
        status_code: parts.status,
        headers,
        body,
        url: request.url.clone(),
        request,
        response: parts,
    })
}
