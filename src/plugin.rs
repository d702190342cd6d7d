//! Interception points around a call.

use futures_util::future::BoxFuture;

use crate::{RequestDescriptor, Response, Result};

/// Future of a call's settled outcome, as seen by [`Plugin::result_hook`].
pub type ResponseFuture = BoxFuture<'static, Result<Response>>;

/// Hooks run by a [`Client`](crate::Client) on every call.
///
/// Plugins run in registration order at both boundaries.
pub trait Plugin: Send + Sync {
    /// Rewrite the validated request before options are merged.
    fn param_hook(&self, descriptor: RequestDescriptor) -> RequestDescriptor {
        descriptor
    }

    /// Wrap the future of the call's outcome.
    fn result_hook(&self, result: ResponseFuture) -> ResponseFuture {
        result
    }
}
