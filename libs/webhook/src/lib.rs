//! Kubernetes admission webhooks in a few lines.
//!
//! An [`AdmissionHandler`] inspects each [`AdmissionRequest`] and records its verdict on
//! a [`ResponseWriter`]: deny with a message, append JSON Patch operations, or do nothing
//! to allow. [`WebhookServer`] serves it over HTTPS and handles graceful shutdown.
//!
//! ```no_run
//! use kadmit_webhook::{BoxError, WebhookServer, WebhookServerOptions, handler_fn};
//!
//! # async fn run() -> kadmit_webhook::Result<()> {
//! let server = WebhookServer::new(WebhookServerOptions::default().with_handler(handler_fn(
//!     |_ctx, request, writer| async move {
//!         if request.object.is_some() {
//!             writer.patch_add("/metadata/labels/mutated", "true");
//!         }
//!         Ok::<_, BoxError>(())
//!     },
//! )));
//! server.listen_and_serve_gracefully().await
//! # }
//! ```

pub mod admission;
pub mod error;
pub mod handler;
pub mod review;
pub mod server;
pub mod telemetry;
pub mod tls;
mod writer;

pub use admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation, PatchType};
pub use error::{BoxError, Error, Result};
pub use handler::{AdmissionHandler, AllowAll, HandlerFn, handler_fn};
pub use review::{MAX_REVIEW_BYTES, ReviewOptions, admission_router};
pub use server::{WebhookServer, WebhookServerOptions};
pub use writer::ResponseWriter;
