use std::future::Future;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::admission::AdmissionRequest;
use crate::error::BoxError;
use crate::writer::ResponseWriter;

/// Decides on an admission request.
///
/// Implementations record their verdict on the [`ResponseWriter`]: nothing recorded
/// means allowed without changes. Returning an error fails the whole review with a
/// HTTP 500. The token is cancelled once the client goes away or the server stops.
pub trait AdmissionHandler: Send + Sync + 'static {
    fn handle(
        &self,
        ctx: CancellationToken,
        request: AdmissionRequest,
        writer: ResponseWriter,
    ) -> BoxFuture<'static, Result<(), BoxError>>;
}

/// Handler used when none is configured: allows everything untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AdmissionHandler for AllowAll {
    fn handle(
        &self,
        _ctx: CancellationToken,
        _request: AdmissionRequest,
        _writer: ResponseWriter,
    ) -> BoxFuture<'static, Result<(), BoxError>> {
        Box::pin(async { Ok(()) })
    }
}

/// [`AdmissionHandler`] built from a closure, see [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F> {
    f: F,
}

/// Build an [`AdmissionHandler`] from an async closure.
///
/// ```
/// use kadmit_webhook::{BoxError, handler_fn};
///
/// let handler = handler_fn(|_ctx, request, writer| async move {
///     if request.namespace.as_deref() == Some("kube-system") {
///         writer.deny("kube-system is off limits");
///     }
///     writer.patch_add("/metadata/labels/admitted", "true");
///     Ok::<_, BoxError>(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CancellationToken, AdmissionRequest, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> AdmissionHandler for HandlerFn<F>
where
    F: Fn(CancellationToken, AdmissionRequest, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn handle(
        &self,
        ctx: CancellationToken,
        request: AdmissionRequest,
        writer: ResponseWriter,
    ) -> BoxFuture<'static, Result<(), BoxError>> {
        Box::pin((self.f)(ctx, request, writer))
    }
}
