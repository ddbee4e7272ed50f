//! Stream Assembler
//!
//! Turns a rendered view into one ordered byte stream: a document prologue
//! written lazily on receipt of the first markup chunk, every markup chunk
//! unmodified and in emission order, then an epilogue embedding the
//! serialized state snapshot and the trailing metadata.
//!
//! The prologue is deferred because the page metadata may depend on what
//! rendering produced. The snapshot is serialized only after the markup
//! source completes, so it reflects everything the render wrote into the
//! scope.
//!
//! If the client disconnects mid-stream the pump stops at the failed send
//! and returns, dropping its scope handle; nothing is retried and nothing
//! panics.

use std::sync::Arc;

use hyper::body::Bytes;
use tokio::sync::mpsc;

use hatchway_common::scope::RequestScope;

use crate::assets::AssetManifest;
use crate::renderer::{PageMetadata, RenderedView};

#[derive(Clone)]
pub struct StreamAssembler {
    assets: Arc<AssetManifest>,
}

impl StreamAssembler {
    pub fn new(assets: Arc<AssetManifest>) -> Self {
        Self { assets }
    }

    /// Spawns the stream pump and returns the ordered chunk receiver.
    ///
    /// The scope handle is held by the pump until the stream completes or
    /// the client goes away, then released.
    pub fn assemble(&self, view: RenderedView, scope: Arc<RequestScope>) -> mpsc::Receiver<Bytes> {
        let assets = Arc::clone(&self.assets);
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let RenderedView {
                metadata,
                mut markup,
            } = view;
            let mut prologue_sent = false;

            while let Some(chunk) = markup.recv().await {
                if !prologue_sent {
                    let prologue = document_start(&metadata, &assets);
                    if tx.send(Bytes::from(prologue)).await.is_err() {
                        tracing::debug!("client disconnected before prologue");
                        return;
                    }
                    prologue_sent = true;
                }
                if tx.send(chunk).await.is_err() {
                    tracing::debug!("client disconnected mid-stream");
                    return;
                }
            }

            // A markup source that completes without chunks still yields a
            // complete document.
            if !prologue_sent {
                let prologue = document_start(&metadata, &assets);
                if tx.send(Bytes::from(prologue)).await.is_err() {
                    return;
                }
            }

            let snapshot = serde_json::Value::Object(scope.serialize());
            let _ = tx.send(Bytes::from(document_end(&metadata, &snapshot))).await;
            // Scope handle dropped here; per-request resources are sealed.
        });

        rx
    }
}

fn document_start(metadata: &PageMetadata, assets: &AssetManifest) -> String {
    let mut head = String::new();
    for tag in &metadata.meta {
        head.push_str(tag);
        head.push('\n');
    }
    head.push_str(&format!(
        "<title>{}</title>\n",
        crate::renderer::escape_html(&metadata.title)
    ));
    for tag in metadata.links.iter().chain(metadata.styles.iter()) {
        head.push_str(tag);
        head.push('\n');
    }
    if let Some(css) = &assets.client.css {
        head.push_str(&format!("<link rel='stylesheet' href='{css}'>\n"));
    }
    if let Some(js) = &assets.client.js {
        head.push_str(&format!("<script src='{js}' defer></script>\n"));
    }

    format!(
        "<!doctype html>\n<html {} lang='en'>\n<head>\n{}</head>\n<body {}>\n<div id='root'>",
        metadata.html_attrs, head, metadata.body_attrs
    )
}

fn document_end(metadata: &PageMetadata, snapshot: &serde_json::Value) -> String {
    let mut trailer = String::new();
    for tag in metadata.scripts.iter().chain(metadata.noscript.iter()) {
        trailer.push_str(tag);
        trailer.push('\n');
    }

    format!(
        "</div>\n<script>window['INITIAL_STATE'] = {}</script>\n{}</body>\n</html>\n",
        snapshot, trailer
    )
}
