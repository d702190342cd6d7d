//! Call options, the process-wide defaults, and the merge between them.
//!
//! Options are layered: built-in defaults, then the process-wide
//! [`DefaultOptions`], then the per-call [`Options`]. The process-wide layer
//! is ordinary global configuration: it is initialised with the built-in
//! values on first use, may be changed at any time with
//! [`set_default_options`] or [`update_default_options`], and is read once at
//! the start of every call. Changing it never affects calls already in
//! flight.

use core::{fmt, time::Duration};
use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, RequestBody, Result, transport::Agent, transport::Fetch};

/// Predicate applied to a parsed JSON body.
pub type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

const DEFAULT_TIMEOUT_MS: f64 = 10_000.0;
const DEFAULT_MAX_REDIRECTS: i64 = 10;
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9";
const DEFAULT_ACCEPT_LANGUAGE: &str = "*";
const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

static DEFAULT_OPTIONS: Lazy<RwLock<DefaultOptions>> =
    Lazy::new(|| RwLock::new(DefaultOptions::builtin()));

/// Snapshot of the current process-wide default options.
pub fn default_options() -> DefaultOptions {
    DEFAULT_OPTIONS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide default options.
pub fn set_default_options(options: DefaultOptions) {
    *DEFAULT_OPTIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner) = options;
}

/// Modify the process-wide default options in place.
pub fn update_default_options(f: impl FnOnce(&mut DefaultOptions)) {
    f(&mut DEFAULT_OPTIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner));
}

/// Restore the process-wide default options to the built-in values.
pub fn reset_default_options() {
    set_default_options(DefaultOptions::builtin());
}

/// Ordered header list as supplied by the caller.
///
/// Names are kept as written; they are normalized when options are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// An empty header list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Case-insensitive lookup; the last matching entry wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Iterate over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for Headers {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Canonical form of a header name.
///
/// `x-` prefixed names are lower-cased; every other name is Title-Cased per
/// `-` separated segment, so `content-TYPE` becomes `Content-Type`.
pub fn normalize_header_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("x-") {
        return lower;
    }
    lower
        .split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Options for the stream materialization stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Split chunks so none is longer than this many bytes.
    pub chunk_size: Option<usize>,
}

/// Transport selection.
#[derive(Clone, Default)]
pub enum FetchMode {
    /// Use the socket-level transport.
    #[default]
    Disabled,
    /// Use the environment's fetch implementation.
    Environment,
    /// Use the supplied fetch implementation.
    Custom(Arc<dyn Fetch>),
}

impl FetchMode {
    /// Use a caller-supplied fetch implementation.
    pub fn custom(fetch: impl Fetch + 'static) -> Self {
        Self::Custom(Arc::new(fetch))
    }
}

impl From<bool> for FetchMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Environment
        } else {
            Self::Disabled
        }
    }
}

impl fmt::Debug for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Environment => f.write_str("Environment"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// The process-wide option layer.
///
/// Only the plain-data keys can be loaded from configuration files; the
/// transport handles are set from code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefaultOptions {
    /// Per-hop timeout in milliseconds.
    pub timeout: Option<f64>,
    /// Headers sent with every request.
    pub headers: Headers,
    /// Maximum number of redirects to follow.
    pub max_redirects: Option<i64>,
    /// Connection-reuse handle for the socket transport.
    #[serde(skip)]
    pub agent: Option<Agent>,
    /// Options for `stream` bodies.
    #[serde(skip)]
    pub transformer_options: Option<TransformOptions>,
    /// Transport selection.
    #[serde(skip)]
    pub fetch: Option<FetchMode>,
}

impl DefaultOptions {
    /// The built-in defaults.
    pub fn builtin() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT_MS),
            headers: [
                ("Accept", DEFAULT_ACCEPT),
                ("Accept-Language", DEFAULT_ACCEPT_LANGUAGE),
                ("Accept-Encoding", DEFAULT_ACCEPT_ENCODING),
                ("User-Agent", DEFAULT_USER_AGENT),
            ]
            .into_iter()
            .collect(),
            max_redirects: Some(DEFAULT_MAX_REDIRECTS),
            ..Self::default()
        }
    }
}

/// Per-call options.
#[derive(Default)]
pub struct Options {
    /// Per-hop timeout in milliseconds. Must be at least 1; infinity disables it.
    pub timeout: Option<f64>,
    /// Headers for this call; they override the defaults case-insensitively.
    pub headers: Headers,
    /// Maximum number of redirects to follow. Must not be negative.
    pub max_redirects: Option<i64>,
    /// Connection-reuse handle for the socket transport.
    pub agent: Option<Agent>,
    /// Options for `stream` bodies.
    pub transformer_options: Option<TransformOptions>,
    /// Transport selection.
    pub fetch: Option<FetchMode>,
    /// Request body, used when no positional body is given.
    pub body: Option<RequestBody>,
    /// Predicate the parsed body must satisfy for `json` calls.
    pub validator: Option<Validator>,
}

impl Options {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-hop timeout in milliseconds.
    #[must_use]
    pub const fn timeout(mut self, millis: f64) -> Self {
        self.timeout = Some(millis);
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the redirect budget.
    #[must_use]
    pub const fn max_redirects(mut self, max: i64) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// Reuse connections through `agent`.
    #[must_use]
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Configure the `stream` body.
    #[must_use]
    pub const fn transformer_options(mut self, options: TransformOptions) -> Self {
        self.transformer_options = Some(options);
        self
    }

    /// Select the transport.
    #[must_use]
    pub fn fetch(mut self, fetch: impl Into<FetchMode>) -> Self {
        self.fetch = Some(fetch.into());
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Require the parsed JSON body to satisfy `validator`.
    #[must_use]
    pub fn validator(mut self, validator: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("max_redirects", &self.max_redirects)
            .field("agent", &self.agent)
            .field("transformer_options", &self.transformer_options)
            .field("fetch", &self.fetch)
            .field("body", &self.body)
            .field("validator", &self.validator.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Fully merged and validated options for one call.
pub(crate) struct MergedOptions {
    /// `None` when the timeout is infinite.
    pub timeout: Option<Duration>,
    /// Normalized header names.
    pub headers: BTreeMap<String, String>,
    pub max_redirects: u32,
    pub agent: Option<Agent>,
    pub transformer_options: TransformOptions,
    pub fetch: FetchMode,
    pub validator: Option<Validator>,
}

/// Merge `overrides` over the current process-wide defaults.
pub(crate) fn merge(overrides: Options, body: Option<&RequestBody>) -> Result<MergedOptions> {
    merge_layers(&DefaultOptions::builtin(), &default_options(), overrides, body)
}

pub(crate) fn merge_layers(
    builtin: &DefaultOptions,
    global: &DefaultOptions,
    overrides: Options,
    body: Option<&RequestBody>,
) -> Result<MergedOptions> {
    let mut headers = BTreeMap::new();
    for (name, value) in global.headers.iter().chain(overrides.headers.iter()) {
        headers.insert(normalize_header_name(name), value.to_owned());
    }

    if body.is_some_and(RequestBody::is_structured) && !headers.contains_key("Content-Type") {
        headers.insert("Content-Type".to_owned(), "application/json".to_owned());
    }

    let timeout = overrides
        .timeout
        .or(global.timeout)
        .or(builtin.timeout)
        .ok_or(Error::InvalidParam("timeout"))?;
    if timeout.is_nan() || timeout < 1.0 {
        return Err(Error::InvalidParam("timeout"));
    }
    // Out-of-range values (infinity included) leave the hop without a deadline.
    let timeout = Duration::try_from_secs_f64(timeout / 1000.0).ok();

    let max_redirects = overrides
        .max_redirects
        .or(global.max_redirects)
        .or(builtin.max_redirects)
        .ok_or(Error::InvalidParam("maxRedirects"))?;
    if max_redirects < 0 {
        return Err(Error::InvalidParam("maxRedirects"));
    }

    Ok(MergedOptions {
        timeout,
        headers,
        max_redirects: u32::try_from(max_redirects).unwrap_or(u32::MAX),
        agent: overrides
            .agent
            .or_else(|| global.agent.clone())
            .or_else(|| builtin.agent.clone()),
        transformer_options: overrides
            .transformer_options
            .or(global.transformer_options)
            .or(builtin.transformer_options)
            .unwrap_or_default(),
        fetch: overrides
            .fetch
            .or_else(|| global.fetch.clone())
            .or_else(|| builtin.fetch.clone())
            .unwrap_or_default(),
        validator: overrides.validator,
    })
}
