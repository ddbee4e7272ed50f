//! Render Pipeline
//!
//! The per-request state machine:
//!
//! ```text
//! ResolvingRoute -> Scoping -> GatingSession -> ActivatingHatch
//!     -> Rendering -> { Redirecting | Streaming } -> Done
//! ```
//!
//! Phases are strictly sequential within one request; concurrency across
//! requests comes from each request owning its own scope. Failures local
//! to one concern (route, session, one hatch) are contained at that
//! boundary and never abort the request; only renderer-level faults reach
//! the top-level failure response.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::body::Bytes;
use tokio::sync::mpsc;

use hatchway_common::routes::RouteTable;
use hatchway_common::scope::{RequestScope, ScopeTemplate};

use crate::config::DEFAULT_ACTIVATION_TIMEOUT;
use crate::hatch::HatchRegistry;
use crate::renderer::{Renderer, RouteContext};
use crate::session::SessionGate;
use crate::stream::StreamAssembler;

/// One inbound page request, as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub method: String,
    /// Request path including the query string, e.g. `/user/123?tab=cards`
    pub path: String,
    /// Raw cookie header, empty when absent
    pub cookies: String,
}

/// Pipeline phase, used for request tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    ResolvingRoute,
    Scoping,
    GatingSession,
    ActivatingHatch,
    Rendering,
    Redirecting,
    Streaming,
    Done,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::ResolvingRoute => "resolving-route",
            PipelinePhase::Scoping => "scoping",
            PipelinePhase::GatingSession => "gating-session",
            PipelinePhase::ActivatingHatch => "activating-hatch",
            PipelinePhase::Rendering => "rendering",
            PipelinePhase::Redirecting => "redirecting",
            PipelinePhase::Streaming => "streaming",
            PipelinePhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal result of one pipeline run, consumed by the transport
/// boundary.
pub enum PipelineResponse {
    /// Redirect discovered during the request: no body, 3xx status.
    Redirect {
        location: String,
        cookies: Vec<String>,
    },
    /// Ordered HTML chunk stream plus outbound cookies.
    Stream {
        body: mpsc::Receiver<Bytes>,
        cookies: Vec<String>,
    },
    /// Renderer-level fault; minimal failure response.
    Failure { status: u16, message: String },
}

pub struct RenderPipeline {
    routes: Arc<RouteTable>,
    template: Arc<ScopeTemplate>,
    registry: Arc<HatchRegistry>,
    gate: Arc<SessionGate>,
    renderer: Arc<dyn Renderer>,
    assembler: StreamAssembler,
    activation_timeout: Duration,
}

impl RenderPipeline {
    pub fn new(
        routes: Arc<RouteTable>,
        template: Arc<ScopeTemplate>,
        registry: Arc<HatchRegistry>,
        gate: Arc<SessionGate>,
        renderer: Arc<dyn Renderer>,
        assembler: StreamAssembler,
    ) -> Self {
        Self {
            routes,
            template,
            registry,
            gate,
            renderer,
            assembler,
            activation_timeout: DEFAULT_ACTIVATION_TIMEOUT,
        }
    }

    pub fn with_activation_timeout(mut self, timeout: Duration) -> Self {
        self.activation_timeout = timeout;
        self
    }

    /// Runs the full pipeline for one request.
    pub async fn handle(&self, request: PageRequest) -> PipelineResponse {
        let started = Instant::now();
        tracing::info!(method = %request.method, path = %request.path, "[REQUEST]");

        tracing::debug!(phase = %PipelinePhase::ResolvingRoute);
        let matched = match self.routes.resolve(&request.path) {
            Ok(matched) => {
                tracing::trace!(pattern = %matched.route.pattern, "route resolved");
                Some(matched)
            }
            Err(error) => {
                // Operational fault: there is no 404 page path in the
                // routing layer, rendering continues with an empty match.
                tracing::error!(path = %request.path, %error, "no route matched for this path");
                None
            }
        };

        tracing::debug!(phase = %PipelinePhase::Scoping);
        let scope = self.template.fork(request.cookies.as_str());

        tracing::debug!(phase = %PipelinePhase::GatingSession);
        self.gate.ensure_resolved(&scope).await;

        tracing::debug!(phase = %PipelinePhase::ActivatingHatch);
        self.registry
            .activate(&scope, matched.as_ref(), self.activation_timeout)
            .await;

        if let Some(location) = scope.redirect_target() {
            return self.redirect(&scope, location, &request, started);
        }

        tracing::debug!(phase = %PipelinePhase::Rendering);
        let route_context = RouteContext::from_match(&request.path, matched.as_ref());
        let view = match self
            .renderer
            .render(Arc::clone(&scope), route_context)
            .await
        {
            Ok(view) => view,
            Err(error) => {
                tracing::error!(%error, "render failed");
                return PipelineResponse::Failure {
                    status: 500,
                    message: "render failed".to_string(),
                };
            }
        };

        // A redirect signaled during markup generation still wins over
        // streaming as long as nothing has been emitted.
        if let Some(location) = scope.redirect_target() {
            return self.redirect(&scope, location, &request, started);
        }

        tracing::debug!(phase = %PipelinePhase::Streaming);
        let cookies = scope.response_cookies();
        let body = self.assembler.assemble(view, Arc::clone(&scope));
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "[PERF] streaming page"
        );
        tracing::debug!(phase = %PipelinePhase::Done);
        PipelineResponse::Stream { body, cookies }
    }

    fn redirect(
        &self,
        scope: &Arc<RequestScope>,
        location: String,
        request: &PageRequest,
        started: Instant,
    ) -> PipelineResponse {
        tracing::debug!(phase = %PipelinePhase::Redirecting);
        tracing::info!(
            from = %request.path,
            to = %location,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "[REDIRECT]"
        );
        tracing::debug!(phase = %PipelinePhase::Done);
        PipelineResponse::Redirect {
            location,
            cookies: scope.response_cookies(),
        }
    }
}
