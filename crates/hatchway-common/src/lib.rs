//! Hatchway Common Types
//!
//! This crate provides the shared building blocks of the Hatchway
//! server-side rendering pipeline: the route table, the per-request state
//! scope, and the session model.
//!
//! # Overview
//!
//! Hatchway renders pages on the server in response to inbound requests.
//! Every request gets its own isolated [`scope::RequestScope`], forked from
//! an immutable [`scope::ScopeTemplate`] at the start of the request and
//! destroyed when the response finishes sending. The scope carries all
//! mutable per-request state: loaded page data, the resolved session, the
//! inbound cookie header, outbound `Set-Cookie` values and the redirect
//! target. Concurrent requests never share a scope.
//!
//! # Components
//!
//! - [`routes`] - Static ordered route table with `:param` path patterns
//! - [`scope`] - Scope template and the forked per-request scope
//! - [`session`] - Session status and user identity types
//! - [`error`] - Error taxonomy shared by all Hatchway crates

pub mod error;
pub mod routes;
pub mod scope;
pub mod session;

pub use error::{HatchwayError, Result};
pub use routes::{MatchedRoute, PageId, Route, RouteTable};
pub use scope::{RequestScope, ScopeTemplate};
pub use session::{Session, SessionStatus, SessionUser};
