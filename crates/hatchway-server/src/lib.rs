//! Hatchway Server
//!
//! This crate implements the per-request rendering pipeline of the Hatchway
//! SSR system and the HTTP front that drives it.
//!
//! # Architecture
//!
//! One inbound page request flows through a strictly sequential pipeline:
//!
//! 1. **Route resolution** - the static route table picks the page
//! 2. **Scoping** - an isolated request scope is forked from the template
//! 3. **Session gating** - session status resolves before any page logic
//! 4. **Hatch activation** - the matched page's data-loading lifecycle runs
//! 5. **Rendering** - the renderer produces a markup stream from the scope
//! 6. **Streaming or redirecting** - the stream assembler emits the
//!    document, or a redirect discovered mid-render short-circuits it
//!
//! Concurrency across requests comes from interleaving suspension points
//! (session fetch, hatch loads, markup emission), never from sharing state:
//! the route table and hatch registry are read-only after startup, and the
//! request scope is exclusively owned by its pipeline instance.
//!
//! # Components
//!
//! - [`pipeline`] - The request state machine and its response types
//! - [`session`] - Session gate with single-flight resolution and the
//!   `require_authenticated` / `require_anonymous` helpers
//! - [`hatch`] - The per-page lifecycle trait and registry
//! - [`renderer`] - The renderer seam plus a minimal built-in renderer
//! - [`stream`] - Ordered prologue / markup / epilogue assembly
//! - [`assets`] - Client asset manifest referenced by the prologue
//! - [`http_server`] - hyper http1 front with TLS, static files and the
//!   backend API proxy

pub mod assets;
pub mod config;
pub mod hatch;
pub mod http_server;
pub mod pipeline;
pub mod proxy;
pub mod renderer;
pub mod session;
pub mod stream;
pub mod tls;

pub use assets::AssetManifest;
pub use config::{ServerConfig, TlsConfig};
pub use hatch::{Hatch, HatchParams, HatchRegistry};
pub use http_server::HttpServer;
pub use pipeline::{PageRequest, PipelineResponse, RenderPipeline};
pub use renderer::{DefaultRenderer, PageMetadata, RenderedView, Renderer, RouteContext};
pub use session::{GateConfig, GateDecision, SessionGate};
pub use stream::StreamAssembler;
