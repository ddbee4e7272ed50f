//! Application page set.
//!
//! This is the assembly point between the generic pipeline and concrete
//! pages: the route table, the state template the scopes fork from, and
//! one hatch per page that loads data. Pages that need no data (the user
//! profile of a missing user, an unmatched path) simply render from
//! default state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use hatchway_client::{BackendClient, BackendRequest};
use hatchway_common::error::Result;
use hatchway_common::routes::RouteTable;
use hatchway_common::scope::{RequestScope, ScopeTemplate};
use hatchway_server::{GateDecision, Hatch, HatchParams, HatchRegistry, SessionGate};

pub fn routes() -> Arc<RouteTable> {
    // Declaration order is matching order: "/card/new" must shadow
    // "/card/:cardId".
    Arc::new(
        RouteTable::new()
            .route("/", Some("home"), true)
            .route("/login", Some("login"), true)
            .route("/card/new", Some("card-create"), true)
            .route("/card/:cardId", Some("card-view"), true)
            .route("/user/:username", Some("user-view"), true),
    )
}

pub fn state_template() -> Result<Arc<ScopeTemplate>> {
    let mut defaults = Map::new();
    defaults.insert("pageTitle".to_string(), json!(""));
    defaults.insert("featuredCards".to_string(), json!([]));
    defaults.insert("currentCard".to_string(), Value::Null);
    defaults.insert("viewedUser".to_string(), Value::Null);
    Ok(Arc::new(ScopeTemplate::new(defaults)?))
}

pub fn registry(backend: Arc<dyn BackendClient>, gate: Arc<SessionGate>) -> Arc<HatchRegistry> {
    Arc::new(
        HatchRegistry::new()
            .register(
                "home",
                Arc::new(HomeHatch {
                    backend: Arc::clone(&backend),
                }),
            )
            .register("login", Arc::new(LoginHatch { gate: Arc::clone(&gate) }))
            .register("card-create", Arc::new(CardCreateHatch { gate }))
            .register(
                "card-view",
                Arc::new(CardViewHatch {
                    backend: Arc::clone(&backend),
                }),
            )
            .register("user-view", Arc::new(UserViewHatch { backend })),
    )
}

struct HomeHatch {
    backend: Arc<dyn BackendClient>,
}

#[async_trait]
impl Hatch for HomeHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, _params: HatchParams) -> Result<()> {
        scope.insert("pageTitle", json!("Home"));
        let answer = self
            .backend
            .fetch(BackendRequest::get("/cards/featured").with_cookies(scope.request_cookies()))
            .await?;
        if answer.ok {
            scope.insert("featuredCards", answer.body);
        }
        Ok(())
    }
}

struct CardViewHatch {
    backend: Arc<dyn BackendClient>,
}

#[async_trait]
impl Hatch for CardViewHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, params: HatchParams) -> Result<()> {
        let card_id = params.params.get("cardId").cloned().unwrap_or_default();
        let answer = self
            .backend
            .fetch(
                BackendRequest::get(format!("/cards/{card_id}"))
                    .with_cookies(scope.request_cookies()),
            )
            .await?;
        if answer.ok {
            if let Some(title) = answer.body["title"].as_str() {
                scope.insert("pageTitle", json!(title));
            }
            scope.insert("currentCard", answer.body);
        }
        Ok(())
    }
}

struct UserViewHatch {
    backend: Arc<dyn BackendClient>,
}

#[async_trait]
impl Hatch for UserViewHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, params: HatchParams) -> Result<()> {
        let username = params.params.get("username").cloned().unwrap_or_default();
        scope.insert("pageTitle", json!(username.clone()));
        let answer = self
            .backend
            .fetch(
                BackendRequest::get(format!("/users/{username}"))
                    .with_cookies(scope.request_cookies()),
            )
            .await?;
        if answer.ok {
            scope.insert("viewedUser", answer.body);
        }
        Ok(())
    }
}

/// Card creation is for signed-in users only.
struct CardCreateHatch {
    gate: Arc<SessionGate>,
}

#[async_trait]
impl Hatch for CardCreateHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, _params: HatchParams) -> Result<()> {
        if let GateDecision::Redirected(_) = self.gate.require_authenticated(scope).await {
            return Ok(());
        }
        scope.insert("pageTitle", json!("New card"));
        Ok(())
    }
}

/// The login page only makes sense for anonymous visitors.
struct LoginHatch {
    gate: Arc<SessionGate>,
}

#[async_trait]
impl Hatch for LoginHatch {
    async fn enter(&self, scope: &Arc<RequestScope>, _params: HatchParams) -> Result<()> {
        if let GateDecision::Redirected(_) = self.gate.require_anonymous(scope).await {
            return Ok(());
        }
        scope.insert("pageTitle", json!("Sign in"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_new_shadows_card_id() {
        let routes = routes();
        let matched = routes.resolve("/card/new").unwrap();
        assert_eq!(matched.route.page_id.as_deref(), Some("card-create"));

        let matched = routes.resolve("/card/42").unwrap();
        assert_eq!(matched.route.page_id.as_deref(), Some("card-view"));
    }

    #[test]
    fn test_template_is_valid() {
        let template = state_template().unwrap();
        assert_eq!(template.defaults()["pageTitle"], json!(""));
    }
}
