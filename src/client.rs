use core::fmt;
use std::sync::Arc;

use http::Method;

use crate::{
    Arg, Options, RequestBody, RequestDescriptor, Response, Result, ReturnType, args, options,
    plugin::{Plugin, ResponseFuture},
    redirect, transport,
};

/// Entry point holding the registered plugins.
///
/// `Client::default()` has no plugins; the free functions in the crate root
/// use one.
#[derive(Clone, Default)]
pub struct Client {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl Client {
    /// A client without plugins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Plugins run in registration order.
    #[must_use]
    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Issue a request from positional arguments.
    ///
    /// Accepts `(url, returnType, options?, body?)` or
    /// `(method, url, returnType, options?, body?)`. Every failure, including
    /// malformed arguments, is reported through the returned future.
    pub fn request<I>(&self, args: I) -> ResponseFuture
    where
        I: IntoIterator,
        I::Item: Into<Arg>,
    {
        let args: Vec<Arg> = args.into_iter().map(Into::into).collect();
        let future: ResponseFuture = Box::pin(execute(args, self.plugins.clone()));
        self.plugins
            .iter()
            .fold(future, |future, plugin| plugin.result_hook(future))
    }

    fn typed(
        &self,
        return_type: ReturnType,
        url: impl Into<Arg>,
        options: Option<Options>,
        body: Option<RequestBody>,
    ) -> ResponseFuture {
        self.request([url.into(), return_type.into(), options.into(), body.into()])
    }

    fn verb(
        &self,
        method: Method,
        url: impl Into<Arg>,
        return_type: ReturnType,
        options: Option<Options>,
        body: Option<RequestBody>,
    ) -> ResponseFuture {
        self.request([
            method.into(),
            url.into(),
            return_type.into(),
            options.into(),
            body.into(),
        ])
    }

    /// Fetch as text; `POST` when `body` is present, `GET` otherwise.
    pub fn string(&self, url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
        self.typed(ReturnType::String, url, options, body)
    }

    /// Fetch as bytes; `POST` when `body` is present, `GET` otherwise.
    pub fn buffer(&self, url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
        self.typed(ReturnType::Buffer, url, options, body)
    }

    /// Fetch as a live stream; `POST` when `body` is present, `GET` otherwise.
    pub fn stream(&self, url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
        self.typed(ReturnType::Stream, url, options, body)
    }

    /// Fetch as JSON; `POST` when `body` is present, `GET` otherwise.
    pub fn json(&self, url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
        self.typed(ReturnType::Json, url, options, body)
    }

    /// Fetch and discard the body; `POST` when `body` is present, `GET` otherwise.
    pub fn empty(&self, url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
        self.typed(ReturnType::Empty, url, options, body)
    }

    /// `GET` request.
    pub fn get(&self, url: impl Into<Arg>, return_type: ReturnType, options: Option<Options>) -> ResponseFuture {
        self.verb(Method::GET, url, return_type, options, None)
    }

    /// `HEAD` request; the result has no body.
    pub fn head(&self, url: impl Into<Arg>, options: Option<Options>) -> ResponseFuture {
        self.verb(Method::HEAD, url, ReturnType::Empty, options, None)
    }

    /// `POST` request.
    pub fn post(
        &self,
        url: impl Into<Arg>,
        return_type: ReturnType,
        options: Option<Options>,
        body: Option<RequestBody>,
    ) -> ResponseFuture {
        self.verb(Method::POST, url, return_type, options, body)
    }

    /// `PUT` request; the result has no body.
    pub fn put(&self, url: impl Into<Arg>, options: Option<Options>, body: Option<RequestBody>) -> ResponseFuture {
        self.verb(Method::PUT, url, ReturnType::Empty, options, body)
    }

    /// `DELETE` request.
    pub fn delete(
        &self,
        url: impl Into<Arg>,
        return_type: ReturnType,
        options: Option<Options>,
        body: Option<RequestBody>,
    ) -> ResponseFuture {
        self.verb(Method::DELETE, url, return_type, options, body)
    }

    /// `OPTIONS` request.
    pub fn options(&self, url: impl Into<Arg>, return_type: ReturnType, options: Option<Options>) -> ResponseFuture {
        self.verb(Method::OPTIONS, url, return_type, options, None)
    }

    /// `TRACE` request; the result has no body.
    pub fn trace(&self, url: impl Into<Arg>, options: Option<Options>) -> ResponseFuture {
        self.verb(Method::TRACE, url, ReturnType::Empty, options, None)
    }

    /// `PATCH` request.
    pub fn patch(
        &self,
        url: impl Into<Arg>,
        return_type: ReturnType,
        options: Option<Options>,
        body: Option<RequestBody>,
    ) -> ResponseFuture {
        self.verb(Method::PATCH, url, return_type, options, body)
    }
}

async fn execute(args: Vec<Arg>, plugins: Vec<Arc<dyn Plugin>>) -> Result<Response> {
    let mut descriptor = args::parse(args)?;
    for plugin in &plugins {
        descriptor = plugin.param_hook(descriptor);
    }

    let RequestDescriptor {
        method,
        url,
        return_type,
        options,
        body,
    } = descriptor;
    let merged = options::merge(options, body.as_ref())?;
    let transport = transport::select(&merged.fetch, merged.agent.as_ref())?;
    redirect::run(transport.as_ref(), method, url, return_type, body, merged).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteStream, Error, FetchMode, FetchRequest, HopResponse};
    use futures_util::FutureExt;
    use http::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<FetchRequest>>>;

    /// A fetch that records requests and answers `200` with the request path.
    fn echo_fetch(seen: Seen) -> FetchMode {
        FetchMode::custom(move |request: FetchRequest| {
            let path = request.url.path().to_owned();
            seen.lock().unwrap().push(request);
            async move {
                let mut response = http::Response::new(Some(ByteStream::from_bytes(path)));
                *response.status_mut() = StatusCode::OK;
                Ok::<HopResponse, Error>(response)
            }
        })
    }

    struct Rewrite;

    impl Plugin for Rewrite {
        fn param_hook(&self, mut descriptor: RequestDescriptor) -> RequestDescriptor {
            descriptor.url.set_path("/rewritten");
            descriptor
        }
    }

    struct Fallback;

    impl Plugin for Fallback {
        fn result_hook(&self, result: ResponseFuture) -> ResponseFuture {
            result
                .map(|outcome| match outcome {
                    Err(Error::InvalidParam("url")) => Err(Error::InvalidParam("fetch")),
                    other => other,
                })
                .boxed()
        }
    }

    #[tokio::test]
    async fn plugins_see_params_and_results() {
        let seen = Seen::default();
        let client = Client::new().with(Rewrite).with(Fallback);

        let response = client
            .string(
                "http://example.com/original",
                Some(Options::new().fetch(echo_fetch(seen.clone()))),
                None,
            )
            .await
            .unwrap();
        assert_eq!(response.body.as_text(), Some("/rewritten"));
        assert_eq!(seen.lock().unwrap()[0].url.path(), "/rewritten");

        let err = client.request(["ftp://example.com/", "string"]).await.unwrap_err();
        assert_eq!(err.param(), Some("fetch"));
    }

    #[tokio::test]
    async fn shorthands_pick_method_and_return_type() {
        let seen = Seen::default();
        let client = Client::new();
        let options = || Some(Options::new().fetch(echo_fetch(seen.clone())));

        let response = client.head("http://example.com/h", options()).await.unwrap();
        assert!(response.body.is_empty());
        client.put("http://example.com/p", options(), Some("x".into())).await.unwrap();
        client.trace("http://example.com/t", options()).await.unwrap();
        client
            .patch("http://example.com/pa", ReturnType::String, options(), Some(RequestBody::Json(json!({"a": 5}))))
            .await
            .unwrap();
        client.json("http://example.com/j", options(), Some("body".into())).await.unwrap();

        let seen = seen.lock().unwrap();
        let methods: Vec<_> = seen.iter().map(|request| request.method.clone()).collect();
        assert_eq!(methods, [Method::HEAD, Method::PUT, Method::TRACE, Method::PATCH, Method::POST]);
        assert_eq!(seen[3].headers.get("content-type").unwrap(), "application/json");
        assert_eq!(seen[3].body.as_deref(), Some(&br#"{"a":5}"#[..]));
    }

    #[tokio::test]
    async fn invalid_arguments_reject_without_io() {
        let seen = Seen::default();
        let options = Options::new().fetch(echo_fetch(seen.clone()));

        let err = Client::new()
            .request([Arg::from("FOO"), "http://example.com/".into(), "string".into(), options.into()])
            .await
            .unwrap_err();
        assert_eq!(err.param(), Some("method"));
        assert!(seen.lock().unwrap().is_empty());
    }
}
