//! Hatch Registry & Lifecycle Controller
//!
//! A hatch is a page's data-loading lifecycle controller: `enter` runs when
//! the page's route matches and loads whatever the page needs into the
//! request scope; `exit` runs when routing moves away. Hatch instances are
//! registered once per page identifier for the lifetime of the process;
//! their open/closed state is tracked per scope, so they carry no mutable
//! state of their own across requests.
//!
//! The registry drives the transitions for one request: every hatch left
//! open in the scope that no longer matches is exited first, then the
//! matched page's hatch is entered, guaranteeing at most one open hatch
//! per scope at render time. Activation is an all-settled, bounded step: a
//! failing or slow `enter` never aborts the request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hatchway_common::error::Result;
use hatchway_common::routes::{MatchedRoute, PageId};
use hatchway_common::scope::RequestScope;

/// Parameters handed to `enter`: captured path parameters plus the parsed
/// query string.
#[derive(Debug, Clone, Default)]
pub struct HatchParams {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl HatchParams {
    pub fn from_match(matched: &MatchedRoute) -> Self {
        Self {
            params: matched.params.clone(),
            query: matched.query.clone(),
        }
    }
}

/// Per-page lifecycle controller.
///
/// All data loaded by `enter` is written into the request scope it is
/// invoked with; the hatch itself must stay stateless across requests.
#[async_trait]
pub trait Hatch: Send + Sync {
    /// Loads the page's data into the scope.
    ///
    /// Errors are contained by the registry: the page renders from
    /// partial or empty state.
    async fn enter(&self, scope: &Arc<RequestScope>, params: HatchParams) -> Result<()>;

    /// Tears down whatever `enter` set up. Default: nothing to do.
    async fn exit(&self, _scope: &Arc<RequestScope>) {}
}

/// Process-wide, read-only map of page identifiers to their hatches.
#[derive(Default)]
pub struct HatchRegistry {
    hatches: HashMap<PageId, Arc<dyn Hatch>>,
}

impl HatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, page_id: impl Into<PageId>, hatch: Arc<dyn Hatch>) -> Self {
        self.hatches.insert(page_id.into(), hatch);
        self
    }

    pub fn get(&self, page_id: &str) -> Option<&Arc<dyn Hatch>> {
        self.hatches.get(page_id)
    }

    pub fn len(&self) -> usize {
        self.hatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hatches.is_empty()
    }

    /// Drives enter/exit transitions for one request.
    ///
    /// Awaited to completion even if individual loads fail, so state is
    /// maximally populated before markup generation; bounded by `timeout`,
    /// after which the pipeline renders with whatever state is available.
    pub async fn activate(
        &self,
        scope: &Arc<RequestScope>,
        matched: Option<&MatchedRoute>,
        timeout: Duration,
    ) {
        let target = matched.and_then(|m| m.route.page_id.clone());
        let params = matched.map(HatchParams::from_match).unwrap_or_default();

        if tokio::time::timeout(timeout, self.drive(scope, target, params))
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "hatch activation timed out; rendering with available state"
            );
        }
    }

    async fn drive(&self, scope: &Arc<RequestScope>, target: Option<PageId>, params: HatchParams) {
        // Exit stale hatches before the next enter.
        for page_id in scope.open_pages() {
            if target.as_deref() == Some(page_id.as_str()) {
                continue;
            }
            if scope.mark_closed(&page_id) {
                if let Some(hatch) = self.hatches.get(&page_id) {
                    tracing::trace!(%page_id, "hatch exit");
                    hatch.exit(scope).await;
                }
            }
        }

        let Some(page_id) = target else {
            return;
        };
        let Some(hatch) = self.hatches.get(&page_id) else {
            // A page without a hatch renders from default state.
            tracing::trace!(%page_id, "no hatch for page");
            return;
        };

        if !scope.mark_open(&page_id) {
            tracing::warn!(%page_id, "hatch already open in this scope; skipping enter");
            return;
        }

        tracing::trace!(%page_id, "hatch enter");
        if let Err(error) = hatch.enter(scope, params).await {
            // Contained: the component layer decides fallback UI from
            // partial or empty state.
            tracing::warn!(%page_id, %error, "hatch enter failed");
        }
    }
}
