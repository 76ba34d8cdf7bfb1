//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gdsview_core::{
    Cell, EngineError, EngineOptions, Frame, GeometryEngine, LayerKey, LayoutFile, Library, Point, RenderRequest,
    Shape,
};
use gdsview_engine::GdsWriter;
use gdsview_server::application::{ClientSink, SessionRegistry};
use gdsview_server::domain::{ServerConfig, ServerMessage, ViewError};

/// Scratch directory removed on drop.
pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("gdsview-server-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        Self(dir)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Writes `bytes` to `name` inside the directory.
    pub fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.0.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, bytes).expect("write fixture");
        path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// A real GDSII stream: TOP holds a 10×10 µm square on 1/0 and a 2×2 µm
/// square on 2/0 placed through SUB. Database unit is 1 nm.
pub fn sample_gds() -> Vec<u8> {
    let mut w = GdsWriter::new();
    w.begin_library("SAMPLE", 0.001);
    w.begin_cell("SUB").rect(2, 0, 0, 0, 2000, 2000).end_cell();
    w.begin_cell("TOP")
        .boundary_with_properties(
            1,
            0,
            &[(0, 0), (10000, 0), (10000, 10000), (0, 10000)],
            &[(1, "owner:chip-team")],
        )
        .sref("SUB", (4000, 4000), 0.0, false)
        .end_cell();
    w.end_library();
    w.into_bytes()
}

/// RDB JSON with `n` box violations spread over two rules.
pub fn rdb_json(n: usize) -> String {
    let items: Vec<String> = (0..n)
        .map(|i| {
            let rule = if i % 3 == 0 { "M1.W.1" } else { "M1.S.1" };
            format!(
                r#"{{"rule":"{rule}","message":"item {i}","shape":{{"type":"box","x1":{i},"y1":1,"x2":{},"y2":2}}}}"#,
                i + 1
            )
        })
        .collect();
    format!(
        r#"{{"description":"DRC","top_cell":"TOP","rules":[{{"name":"M1.S.1","severity":"error"}},{{"name":"M1.W.1","severity":"warning"}}],"items":[{}]}}"#,
        items.join(",")
    )
}

pub fn config_for(root: &Path) -> ServerConfig {
    ServerConfig {
        root: root.to_path_buf(),
        ..ServerConfig::default()
    }
}

pub fn registry_with(engine: Arc<dyn GeometryEngine>, config: ServerConfig) -> SessionRegistry {
    SessionRegistry::new(engine, Arc::new(config))
}

// ── Stub engines ──────────────────────────────────────────────────────────────

/// In-memory layout with geometry on 1/0 and 2/0, served for any existing
/// path. Renders blank frames after an optional delay.
pub struct StubEngine {
    pub render_delay: Duration,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            render_delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { render_delay: delay }
    }
}

impl GeometryEngine for StubEngine {
    fn open_file(&self, path: &Path, _options: &EngineOptions) -> Result<LayoutFile, EngineError> {
        if !path.exists() {
            return Err(EngineError::NotFound(path.to_path_buf()));
        }
        let mut top = Cell::new("TOP");
        for layer in [1, 2] {
            top.shapes.push(Shape {
                layer: LayerKey::new(layer, 0),
                points: vec![Point::new(0, 0), Point::new(100, 0), Point::new(100, 100), Point::new(0, 100)],
            });
        }
        Ok(LayoutFile::new(path, Library::new("LIB", 0.1, vec![top]), Vec::new()))
    }

    fn render(&self, _file: &LayoutFile, request: &RenderRequest) -> Result<Frame, EngineError> {
        if !self.render_delay.is_zero() {
            std::thread::sleep(self.render_delay);
        }
        Ok(Frame::blank(request.canvas, request.format))
    }
}

// ── Recording sink ────────────────────────────────────────────────────────────

/// Outbound traffic captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub enum Sent {
    Json(serde_json::Value),
    Binary(Vec<u8>),
}

#[derive(Default)]
pub struct RecordingSink {
    pub sent: Vec<Sent>,
}

impl RecordingSink {
    /// JSON messages only.
    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Json(v) => Some(v.clone()),
                Sent::Binary(_) => None,
            })
            .collect()
    }

    /// `msg` tags in send order.
    pub fn tags(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| m["msg"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn last_error_kind(&self) -> Option<String> {
        self.messages()
            .iter()
            .rev()
            .find(|m| m["msg"] == "error")
            .map(|m| m["kind"].as_str().unwrap_or_default().to_string())
    }

    pub fn binaries(&self) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter_map(|s| match s {
                Sent::Binary(b) => Some(b.clone()),
                Sent::Json(_) => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

#[async_trait]
impl ClientSink for RecordingSink {
    async fn send_message(&mut self, message: &ServerMessage) -> Result<(), ViewError> {
        let value = serde_json::to_value(message).map_err(|e| ViewError::Connection(e.to_string()))?;
        self.sent.push(Sent::Json(value));
        Ok(())
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), ViewError> {
        self.sent.push(Sent::Binary(bytes));
        Ok(())
    }
}
