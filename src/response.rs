//! The settled result of a call.

use http::{HeaderMap, Method, StatusCode, response::Parts};
use url::Url;

use crate::ResponseBody;

/// What was actually sent on the final hop.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Method of the final hop (a downgraded `GET` after a `POST` redirect).
    pub method: Method,
    /// Target of the final hop.
    pub url: Url,
    /// Headers sent on the final hop, after any stripping.
    pub headers: HeaderMap,
}

/// Result of a call.
#[derive(Debug)]
pub struct Response {
    /// Status of the final hop.
    pub status_code: StatusCode,
    /// Headers of the final hop, as received.
    pub headers: HeaderMap,
    /// Body in the requested representation.
    pub body: ResponseBody,
    /// Final URL after redirects.
    pub url: Url,
    /// The final outgoing request.
    pub request: RequestHead,
    /// Raw parts of the final incoming response.
    pub response: Parts,
}

impl Response {
    /// Look up a response header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Whether the final hop is a redirect left unfollowed because the limit was reached.
    pub fn is_redirect(&self) -> bool {
        crate::redirect::is_redirect(self.status_code)
    }

    /// Whether the final status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }
}
