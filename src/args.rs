//! Call-shape resolution and up-front validation.
//!
//! The entry point accepts `(url, returnType, options?, body?)` or
//! `(method, url, returnType, options?, body?)`. [`normalize`] picks the
//! shape and collects the pieces; [`validate`] rejects anything malformed
//! before a transport is touched.

use http::Method;
use url::Url;

use crate::{Error, Options, RequestBody, Result, ReturnType};

/// One positional argument of the dynamic call surface.
#[derive(Debug)]
pub enum Arg {
    /// A URL, method token or return-type token; also a text body.
    Str(String),
    /// An already parsed URL.
    Url(Url),
    /// Per-call options.
    Options(Box<Options>),
    /// A request payload.
    Body(RequestBody),
    /// An explicitly omitted argument.
    Null,
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Url> for Arg {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

impl From<Options> for Arg {
    fn from(options: Options) -> Self {
        Self::Options(Box::new(options))
    }
}

impl From<RequestBody> for Arg {
    fn from(body: RequestBody) -> Self {
        Self::Body(body)
    }
}

impl From<ReturnType> for Arg {
    fn from(return_type: ReturnType) -> Self {
        Self::Str(return_type.as_str().to_owned())
    }
}

impl From<Method> for Arg {
    fn from(method: Method) -> Self {
        Self::Str(method.as_str().to_owned())
    }
}

impl<T: Into<Self>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Canonical request, after normalization and validation.
///
/// This is what [`Plugin::param_hook`](crate::Plugin::param_hook) sees.
#[derive(Debug)]
pub struct RequestDescriptor {
    /// One of GET, HEAD, POST, PUT, DELETE, OPTIONS, TRACE, PATCH.
    pub method: Method,
    /// Absolute `http`/`https` target.
    pub url: Url,
    /// How the response body is handed back.
    pub return_type: ReturnType,
    /// Per-call options; `body` has been moved out into [`Self::body`].
    pub options: Options,
    /// The payload to send.
    pub body: Option<RequestBody>,
}

/// Output of [`normalize`]: the call shape is resolved but nothing is checked yet.
#[derive(Debug)]
pub(crate) struct Normalized {
    method: String,
    url: Arg,
    return_type: Arg,
    options: Arg,
    body: Option<RequestBody>,
}

const METHODS: [Method; 8] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

/// Resolve which call shape `args` uses.
///
/// If the first argument parses as an absolute URL the short form is used and
/// the method is inferred: `POST` when a body is present, `GET` otherwise.
/// Otherwise a string first argument is taken as the method token.
pub(crate) fn normalize(args: Vec<Arg>) -> Result<Normalized> {
    let mut args = args.into_iter();
    let first = args.next().unwrap_or(Arg::Null);

    let explicit_method = match &first {
        Arg::Url(_) => None,
        Arg::Str(text) if Url::parse(text).is_ok() => None,
        Arg::Str(method) => Some(method.to_ascii_uppercase()),
        _ => return Err(Error::InvalidParam("url")),
    };

    let (url, return_type, options, body) = match explicit_method {
        None => (first, next(&mut args), next(&mut args), next(&mut args)),
        Some(_) => (next(&mut args), next(&mut args), next(&mut args), next(&mut args)),
    };

    let mut options = options;
    let body = match body_arg(body)? {
        Some(body) => Some(body),
        None => match &mut options {
            Arg::Options(options) => options.body.take(),
            _ => None,
        },
    }
    .filter(RequestBody::is_present);

    let method = explicit_method.unwrap_or_else(|| String::from(if body.is_some() { "POST" } else { "GET" }));

    Ok(Normalized {
        method,
        url,
        return_type,
        options,
        body,
    })
}

fn next(args: &mut impl Iterator<Item = Arg>) -> Arg {
    args.next().unwrap_or(Arg::Null)
}

fn body_arg(arg: Arg) -> Result<Option<RequestBody>> {
    match arg {
        Arg::Null => Ok(None),
        Arg::Str(text) => Ok(Some(RequestBody::Text(text))),
        Arg::Url(url) => Ok(Some(RequestBody::Text(url.into()))),
        Arg::Body(body) => Ok(Some(body)),
        Arg::Options(_) => Err(Error::InvalidParam("body")),
    }
}

/// Check a normalized call, in order: method, return type, options, URL.
pub(crate) fn validate(normalized: Normalized) -> Result<RequestDescriptor> {
    let Normalized {
        method,
        url,
        return_type,
        options,
        body,
    } = normalized;

    let method = METHODS
        .into_iter()
        .find(|candidate| candidate.as_str() == method)
        .ok_or(Error::InvalidParam("method"))?;

    let return_type = match return_type {
        Arg::Str(token) => token.parse::<ReturnType>()?,
        _ => return Err(Error::InvalidParam("returnType")),
    };

    let options = match options {
        Arg::Options(options) => *options,
        Arg::Null => Options::default(),
        _ => return Err(Error::InvalidParam("options")),
    };

    let url = match url {
        Arg::Url(url) => url,
        Arg::Str(text) => Url::parse(&text).map_err(|_| Error::InvalidParam("url"))?,
        _ => return Err(Error::InvalidParam("url")),
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidParam("url"));
    }

    Ok(RequestDescriptor {
        method,
        url,
        return_type,
        options,
        body,
    })
}

/// Normalize then validate.
pub(crate) fn parse(args: Vec<Arg>) -> Result<RequestDescriptor> {
    validate(normalize(args)?)
}
