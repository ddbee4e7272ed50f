//! Renderer Seam
//!
//! The pipeline treats the component tree as an opaque collaborator: given
//! a populated scope and the resolved route context, a [`Renderer`]
//! produces a stream of markup fragments plus the page metadata embedded
//! in the document prologue.
//!
//! [`DefaultRenderer`] is a deliberately small built-in implementation that
//! renders the changed scope values as plain sections; real applications
//! plug their own component renderer in at this seam.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Bytes;
use tokio::sync::mpsc;

use hatchway_common::error::Result;
use hatchway_common::routes::{MatchedRoute, PageId};
use hatchway_common::scope::RequestScope;

/// Route context handed to the renderer.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    pub path: String,
    pub page_id: Option<PageId>,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl RouteContext {
    pub fn from_match(path: &str, matched: Option<&MatchedRoute>) -> Self {
        Self {
            path: path.to_string(),
            page_id: matched.and_then(|m| m.route.page_id.clone()),
            params: matched.map(|m| m.params.clone()).unwrap_or_default(),
            query: matched.map(|m| m.query.clone()).unwrap_or_default(),
        }
    }
}

/// Head/document metadata produced by the component tree.
///
/// Each entry in the tag vectors is a serialized tag, emitted verbatim in
/// the prologue (meta, link, style) or the epilogue (script, noscript).
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub title: String,
    pub html_attrs: String,
    pub body_attrs: String,
    pub meta: Vec<String>,
    pub links: Vec<String>,
    pub styles: Vec<String>,
    pub scripts: Vec<String>,
    pub noscript: Vec<String>,
}

/// A rendered page: metadata plus an ordered stream of markup fragments.
pub struct RenderedView {
    pub metadata: PageMetadata,
    pub markup: mpsc::Receiver<Bytes>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, scope: Arc<RequestScope>, route: RouteContext) -> Result<RenderedView>;
}

/// Minimal built-in renderer.
///
/// Emits one fragment per changed scope value so the assembler always has a
/// multi-chunk stream to interleave. The page title is taken from the
/// `pageTitle` scope value when present.
pub struct DefaultRenderer;

#[async_trait]
impl Renderer for DefaultRenderer {
    async fn render(&self, scope: Arc<RequestScope>, route: RouteContext) -> Result<RenderedView> {
        let title = scope
            .get("pageTitle")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Hatchway".to_string());

        let metadata = PageMetadata {
            title,
            meta: vec![r#"<meta charset='utf-8'>"#.to_string()],
            ..PageMetadata::default()
        };

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let page_id = route.page_id.as_deref().unwrap_or("");
            let open = format!(
                "<main data-path='{}' data-page='{}'>",
                escape_html(&route.path),
                escape_html(page_id)
            );
            if tx.send(Bytes::from(open)).await.is_err() {
                return;
            }

            for (key, value) in scope.serialize() {
                let section = format!(
                    "<section data-store='{}'><pre>{}</pre></section>",
                    escape_html(&key),
                    escape_html(&value.to_string())
                );
                if tx.send(Bytes::from(section)).await.is_err() {
                    return;
                }
            }

            let _ = tx.send(Bytes::from("</main>")).await;
        });

        Ok(RenderedView {
            metadata,
            markup: rx,
        })
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatchway_common::scope::ScopeTemplate;
    use serde_json::json;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&'\""), "a&lt;b&gt;&amp;&#39;&quot;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[tokio::test]
    async fn test_default_renderer_emits_sections_in_order() {
        let template = Arc::new(ScopeTemplate::empty());
        let scope = template.fork("");
        scope.insert("pageTitle", json!("Card 42"));
        scope.insert("currentCard", json!({"id": 42}));

        let route = RouteContext {
            path: "/card/42".to_string(),
            page_id: Some("card-view".to_string()),
            ..RouteContext::default()
        };

        let mut view = DefaultRenderer
            .render(Arc::clone(&scope), route)
            .await
            .unwrap();
        assert_eq!(view.metadata.title, "Card 42");

        let mut chunks = Vec::new();
        while let Some(chunk) = view.markup.recv().await {
            chunks.push(String::from_utf8(chunk.to_vec()).unwrap());
        }

        assert!(chunks.first().unwrap().starts_with("<main"));
        assert!(chunks.first().unwrap().contains("data-page='card-view'"));
        assert_eq!(chunks.last().unwrap(), "</main>");
        assert!(chunks.iter().any(|c| c.contains("data-store='pageTitle'")));
    }
}
