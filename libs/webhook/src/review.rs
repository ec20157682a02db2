use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::admission::{AdmissionResponse, AdmissionReview, PatchType, Status};
use crate::error::{Error, Result};
use crate::handler::AdmissionHandler;
use crate::writer::{ResponseWriter, Verdict};

/// Largest review body read, above the API server's own request size limit.
pub const MAX_REVIEW_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default)]
pub struct ReviewOptions {
    /// Log the raw request review and the recorded verdict.
    pub debug: bool,
}

/// Turns admission reviews into handler calls and handler verdicts into reviews.
pub(crate) struct Reviewer {
    handler: Arc<dyn AdmissionHandler>,
    debug: bool,
    cancel: CancellationToken,
}

impl Reviewer {
    pub(crate) fn new(
        options: ReviewOptions,
        handler: Arc<dyn AdmissionHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            handler,
            debug: options.debug,
            cancel,
        }
    }

    /// Run one review, returning the serialized response review.
    pub(crate) async fn admit(&self, body: &[u8]) -> Result<Vec<u8>> {
        let review: AdmissionReview = serde_json::from_slice(body).map_err(Error::DecodeReview)?;
        let AdmissionReview {
            api_version,
            kind,
            request,
            ..
        } = review;
        let request = request.ok_or(Error::MissingRequest)?;

        if self.debug {
            info!(review = %String::from_utf8_lossy(body), "admission request");
        }

        let uid = request.uid.clone();
        let writer = ResponseWriter::default();
        let ctx = self.cancel.child_token();
        // cancels the handler token when the request future is dropped, e.g. client gone
        let _guard = ctx.clone().drop_guard();

        self.handler
            .handle(ctx, request, writer.clone())
            .await
            .map_err(Error::Handler)?;

        let verdict = writer.take();
        if self.debug {
            log_verdict(&verdict);
        }
        debug!(
            uid = %uid,
            allowed = verdict.deny.is_empty(),
            patches = verdict.patches.len(),
            "admission reviewed"
        );

        let response = verdict.into_response(uid)?;
        serde_json::to_vec(&AdmissionReview::respond(api_version, kind, response))
            .map_err(Error::EncodeReview)
    }
}

impl Verdict {
    fn into_response(self, uid: String) -> Result<AdmissionResponse> {
        let (patch, patch_type) = if self.patches.is_empty() {
            (None, None)
        } else {
            let patch = serde_json::to_vec(&self.patches).map_err(Error::EncodePatches)?;
            (Some(patch), Some(PatchType::JsonPatch))
        };
        let allowed = self.deny.is_empty();
        let result = (!allowed).then(|| Status::bad_request(self.deny));

        Ok(AdmissionResponse {
            uid,
            allowed,
            result,
            patch,
            patch_type,
        })
    }
}

fn log_verdict(verdict: &Verdict) {
    if verdict.patches.is_empty() {
        info!(patches = "NONE", deny = %verdict.deny, "admission verdict");
    } else {
        let patches = serde_json::to_string_pretty(&verdict.patches).unwrap_or_default();
        info!(patches = %patches, deny = %verdict.deny, "admission verdict");
    }
}

async fn review(State(reviewer): State<Arc<Reviewer>>, body: Body) -> Response {
    let body: Bytes = match axum::body::to_bytes(body, MAX_REVIEW_BYTES).await {
        Ok(body) => body,
        Err(e) => return Error::ReadBody(e).into_response(),
    };

    match reviewer.admit(&body).await {
        Ok(buf) => (
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                ),
                (header::CONTENT_LENGTH, HeaderValue::from(buf.len())),
            ],
            buf,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub(crate) fn router(reviewer: Reviewer) -> Router {
    Router::new()
        .route("/", post(review))
        .route("/{*path}", post(review))
        .with_state(Arc::new(reviewer))
}

/// Router answering admission reviews on every path with `handler`.
pub fn admission_router(options: ReviewOptions, handler: Arc<dyn AdmissionHandler>) -> Router {
    router(Reviewer::new(options, handler, CancellationToken::new()))
}
