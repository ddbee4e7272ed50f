//! Hatchway Backend Client
//!
//! This crate provides the HTTP client the rendering pipeline uses to talk
//! to the upstream backend API: session lookups and page data loads issued
//! by hatches during activation.
//!
//! The pipeline only depends on the [`BackendClient`] trait, so tests and
//! embedders can substitute their own transport. [`HttpBackendClient`] is
//! the production implementation over the hyper legacy client.
//!
//! Cookies received from the inbound page request are forwarded verbatim on
//! every backend call, and `Set-Cookie` values on backend responses are
//! surfaced on the answer so the pipeline can replay them to the browser.

pub mod client;

pub use client::{
    query_to_string, BackendAnswer, BackendClient, BackendRequest, HttpBackendClient,
};
