//! Per-hop deadline.
//!
//! Each hop gets its own budget: the timer starts when the hop is dispatched
//! and stops once response headers arrive. When it fires, the transport's
//! signal is aborted, the in-flight future is dropped and the call fails with
//! [`Error::TimedOut`]. Body streaming is not covered.

use core::time::Duration;

use futures_util::{
    future::{Abortable, Aborted, Either},
    pin_mut,
};

use crate::{
    Error, Result,
    transport::{AbortController, HopRequest, HopResponse, Transport},
};

/// Run one hop on `transport`, failing with [`Error::TimedOut`] after `timeout`.
///
/// `None` means no deadline.
pub(crate) async fn dispatch(
    transport: &dyn Transport,
    request: HopRequest,
    timeout: Option<Duration>,
) -> Result<HopResponse> {
    let (controller, registration) = AbortController::new();
    let response_future = Abortable::new(transport.execute(request, controller.signal()), registration);

    let Some(duration) = timeout else {
        return flatten(response_future.await);
    };

    let timeout_future = sleep(duration);
    pin_mut!(response_future);
    pin_mut!(timeout_future);

    match futures_util::future::select(response_future, timeout_future).await {
        Either::Left((result, _)) => flatten(result),
        Either::Right(((), _)) => {
            controller.abort();
            tracing::debug!(?duration, "hop timed out");
            Err(Error::TimedOut)
        }
    }
}

fn flatten(result: Result<Result<HopResponse>, Aborted>) -> Result<HopResponse> {
    result.unwrap_or(Err(Error::TimedOut))
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep(duration: Duration) {
    async_io::Timer::after(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep(duration: Duration) {
    let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
    crate::transport::SingleThreaded(gloo_timers::future::TimeoutFuture::new(millis)).await;
}
