//! The view state of one open layout file.
//!
//! A [`RenderSession`] owns the engine's handle to the file and everything
//! every client viewing that file shares: current cell, viewport, canvas
//! size, the layer table with visibility and style overrides, the loaded
//! violation database and the marker groups overlaid on every frame.
//!
//! # State machine
//!
//! ```text
//! Unopened ──open──▶ Opening ──ok──▶ Ready ◀──▶ Rendering
//!    ▲                  │              │
//!    └──────failed──────┘            close
//!                                      ▼
//!                                   Closed
//! ```
//!
//! # Rendering
//!
//! Engine calls block, so they run on the blocking pool under
//! `tokio::time::timeout`, marker compositing included. A render that misses the deadline is abandoned
//! (its thread finishes in the background) and the session goes straight
//! back to `Ready`. The render gate, a `std::sync::Mutex<()>` taken on the
//! blocking thread, keeps a late render and the next one from running the
//! engine on the same file at once.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use gdsview_core::{
    Canvas, CellInfo, EngineOptions, Frame, FrameFormat, GeometryEngine, ItemMarkerGroup, LayerInfo, LayerKey,
    LayoutFile, RenderRequest, Rgba, SequenceCounter, Viewport, MAX_LINE_WIDTH,
};
use tracing::{debug, info, warn};

use crate::application::paths::resolve_under_root;
use crate::application::rdb::RdbResultSet;
use crate::domain::{ServerConfig, ViewError};

/// Lifecycle of a [`RenderSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unopened,
    Opening,
    Ready,
    Rendering,
    Closed,
}

/// Partial layer style change; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerStyleUpdate {
    pub color: Option<Rgba>,
    pub dither_pattern: Option<u8>,
    pub line_width: Option<u16>,
}

/// Consistent copy of the state clients may read without waiting for a
/// render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub path: Option<PathBuf>,
    pub cell: Option<String>,
    pub viewport: Viewport,
    pub canvas: Canvas,
    pub layers: Vec<LayerInfo>,
    pub marker_groups: usize,
}

/// A finished frame plus the view it was drawn for.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub frame: Frame,
    pub viewport: Viewport,
    /// Markers drawn on top of the geometry.
    pub markers: usize,
}

pub struct RenderSession {
    engine: Arc<dyn GeometryEngine>,
    config: Arc<ServerConfig>,
    state: SessionState,
    file: Option<Arc<LayoutFile>>,
    cell: Option<String>,
    viewport: Viewport,
    canvas: Canvas,
    /// Draw order is table order.
    layers: Vec<LayerInfo>,
    rdb: Option<Arc<RdbResultSet>>,
    /// Shared with the render task.
    markers: Arc<Vec<ItemMarkerGroup>>,
    seq: SequenceCounter,
    render_gate: Arc<Mutex<()>>,
}

impl RenderSession {
    pub fn new(engine: Arc<dyn GeometryEngine>, config: Arc<ServerConfig>) -> Self {
        let canvas = config.canvas;
        Self {
            engine,
            config,
            state: SessionState::Unopened,
            file: None,
            cell: None,
            viewport: Viewport::default(),
            canvas,
            layers: Vec::new(),
            rdb: None,
            markers: Arc::default(),
            seq: SequenceCounter::new(),
            render_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn file(&self) -> Option<&Arc<LayoutFile>> {
        self.file.as_ref()
    }

    pub fn cell(&self) -> Option<&str> {
        self.cell.as_deref()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    pub fn marker_groups(&self) -> &[ItemMarkerGroup] {
        self.markers.as_slice()
    }

    /// The violation database loaded by the last `load-rdb`.
    pub fn rdb(&self) -> Option<&Arc<RdbResultSet>> {
        self.rdb.as_ref()
    }

    pub fn editable(&self) -> bool {
        self.config.editable
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Opens `requested` (relative to the served root, or absolute inside
    /// it), builds the layer table, selects the top cell and zoom-fits.
    ///
    /// On failure the session is left `Unopened` with nothing loaded.
    ///
    /// # Errors
    ///
    /// [`ViewError::PathEscape`], [`ViewError::NotFound`],
    /// [`ViewError::Format`] for files the engine rejects, and
    /// [`ViewError::SessionClosed`] after [`close`](Self::close).
    pub async fn open(&mut self, requested: &Path) -> Result<(), ViewError> {
        if self.state == SessionState::Closed {
            return Err(ViewError::SessionClosed);
        }
        self.state = SessionState::Opening;
        match self.load(requested).await {
            Ok(file) => {
                self.layers = build_layer_table(&file, self.config.add_missing_layers);
                self.cell = file.top_cell().map(str::to_string);
                info!(
                    "session opened {} (cell {:?}, {} layers)",
                    file.path().display(),
                    self.cell,
                    self.layers.len()
                );
                self.file = Some(Arc::new(file));
                self.state = SessionState::Ready;
                self.fit_viewport();
                Ok(())
            }
            Err(e) => {
                self.file = None;
                self.cell = None;
                self.layers.clear();
                self.rdb = None;
                self.markers = Arc::default();
                self.state = SessionState::Unopened;
                Err(e)
            }
        }
    }

    async fn load(&self, requested: &Path) -> Result<LayoutFile, ViewError> {
        let path = resolve_under_root(&self.config.root, requested)?;
        let engine = Arc::clone(&self.engine);
        let options = EngineOptions {
            meta_splitter: self.config.meta_splitter.clone(),
        };
        let file = tokio::task::spawn_blocking(move || engine.open_file(&path, &options))
            .await
            .map_err(|e| ViewError::Engine(format!("open task failed: {e}")))??;
        if file.library().cells().is_empty() {
            return Err(ViewError::Format(format!("{}: layout has no cells", file.path().display())));
        }
        Ok(file)
    }

    /// Re-reads the file from disk.
    ///
    /// Viewport and the visibility of layers that still exist are kept. If
    /// the current cell is gone the top cell is selected and fitted. On
    /// failure the previously loaded file stays in place.
    pub async fn reload(&mut self) -> Result<(), ViewError> {
        self.require_open()?;
        let path = self
            .file
            .as_ref()
            .map(|f| f.path().to_path_buf())
            .ok_or(ViewError::NoSession)?;
        let fresh = self.load(&path).await?;

        let mut table = build_layer_table(&fresh, self.config.add_missing_layers);
        for layer in &mut table {
            if let Some(old) = self.layers.iter().find(|old| old.key == layer.key) {
                layer.visible = old.visible;
            }
        }
        let kept_cell = self
            .cell
            .take()
            .filter(|name| fresh.library().cell(name).is_some());
        let refit = kept_cell.is_none();

        self.cell = kept_cell.or_else(|| fresh.top_cell().map(str::to_string));
        self.layers = table;
        self.file = Some(Arc::new(fresh));
        if refit {
            self.fit_viewport();
        }
        info!("session reloaded {}", path.display());
        Ok(())
    }

    /// Releases the file handle, the violation database and marker groups.
    /// Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(file) = &self.file {
            info!("session closed {}", file.path().display());
        }
        self.state = SessionState::Closed;
        self.file = None;
        self.cell = None;
        self.layers.clear();
        self.rdb = None;
        self.markers = Arc::default();
    }

    // ── View state ────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// [`ViewError::InvalidViewport`] unless all values are finite and
    /// `scale > 0`; the current viewport is kept.
    pub fn set_viewport(&mut self, x: f64, y: f64, scale: f64) -> Result<Viewport, ViewError> {
        self.require_open()?;
        self.viewport = Viewport::new(x, y, scale)?;
        Ok(self.viewport)
    }

    /// Changes the canvas size. The layout point at the canvas centre stays
    /// put.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ViewError> {
        self.canvas = Canvas::new(width, height)?;
        Ok(())
    }

    pub fn zoom_fit(&mut self) -> Result<Viewport, ViewError> {
        self.require_open()?;
        self.fit_viewport();
        Ok(self.viewport)
    }

    /// Shows `name` instead of the current cell and zoom-fits it.
    pub fn select_cell(&mut self, name: &str) -> Result<(), ViewError> {
        self.require_open()?;
        let exists = self
            .file
            .as_ref()
            .is_some_and(|f| f.library().cell(name).is_some());
        if !exists {
            return Err(ViewError::UnknownCell(name.to_string()));
        }
        self.cell = Some(name.to_string());
        self.fit_viewport();
        Ok(())
    }

    fn fit_viewport(&mut self) {
        if let (Some(file), Some(cell)) = (&self.file, &self.cell) {
            self.viewport = Viewport::fit(&file.library().bbox(cell), self.canvas);
        }
    }

    // ── Layers ────────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// [`ViewError::UnknownLayer`] if `key` is not in the layer table and
    /// missing layers are not added.
    pub fn set_layer_visibility(&mut self, key: LayerKey, visible: bool) -> Result<(), ViewError> {
        self.require_open()?;
        let slot = self.layer_slot(key)?;
        self.layers[slot].visible = visible;
        Ok(())
    }

    /// Changes how a layer is drawn.
    ///
    /// # Errors
    ///
    /// [`ViewError::ReadOnly`] when the server is not editable (nothing
    /// changes), [`ViewError::InvalidStyle`] for a line width outside
    /// `1..=MAX_LINE_WIDTH`, and
    /// [`ViewError::UnknownLayer`] as for visibility.
    pub fn set_layer_style(&mut self, key: LayerKey, update: LayerStyleUpdate) -> Result<(), ViewError> {
        self.require_open()?;
        if !self.config.editable {
            return Err(ViewError::ReadOnly);
        }
        if let Some(width) = update.line_width.filter(|w| !(1..=MAX_LINE_WIDTH).contains(w)) {
            return Err(ViewError::InvalidStyle(format!(
                "line width must be in 1..={MAX_LINE_WIDTH}, got {width}"
            )));
        }
        let slot = self.layer_slot(key)?;
        let style = &mut self.layers[slot].style;
        if let Some(color) = update.color {
            style.color = color;
        }
        if let Some(pattern) = update.dither_pattern {
            style.dither_pattern = pattern;
        }
        if let Some(width) = update.line_width {
            style.line_width = width;
        }
        Ok(())
    }

    fn layer_slot(&mut self, key: LayerKey) -> Result<usize, ViewError> {
        if let Some(slot) = self.layers.iter().position(|l| l.key == key) {
            return Ok(slot);
        }
        if !self.config.add_missing_layers {
            return Err(ViewError::UnknownLayer(key));
        }
        debug!("synthesizing layer {key}");
        self.layers.push(LayerInfo::synthesized(key));
        Ok(self.layers.len() - 1)
    }

    // ── Markers ───────────────────────────────────────────────────────────────

    /// Replaces the overlay with `groups`; later groups are drawn over
    /// earlier ones.
    pub fn attach_marker_groups(&mut self, groups: Vec<ItemMarkerGroup>) -> Result<(), ViewError> {
        self.require_open()?;
        self.markers = Arc::new(groups);
        Ok(())
    }

    /// Makes `rdb` the session's database and overlays `groups` built from it.
    pub fn attach_rdb(&mut self, rdb: Arc<RdbResultSet>, groups: Vec<ItemMarkerGroup>) -> Result<(), ViewError> {
        self.attach_marker_groups(groups)?;
        self.rdb = Some(rdb);
        Ok(())
    }

    /// Drops the overlay. The database stays loaded.
    pub fn clear_marker_groups(&mut self) {
        self.markers = Arc::default();
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    /// Renders the current view and overlays the marker groups recorded
    /// against the current cell.
    ///
    /// # Errors
    ///
    /// [`ViewError::RenderTimeout`] when the engine misses the configured
    /// deadline; the session stays usable. Engine failures are converted
    /// from [`gdsview_core::EngineError`].
    pub async fn render_frame(&mut self, format: FrameFormat) -> Result<RenderedFrame, ViewError> {
        self.require_open()?;
        let file = self.file.clone().ok_or(ViewError::NoSession)?;
        let cell = self.cell.clone().ok_or(ViewError::NoSession)?;
        let viewport = self.viewport;
        let request = RenderRequest {
            viewport: self.viewport,
            canvas: self.canvas,
            cell,
            layers: self
                .layers
                .iter()
                .filter(|l| l.visible)
                .map(|l| (l.key, l.style))
                .collect(),
            format,
        };
        let engine = Arc::clone(&self.engine);
        let gate = Arc::clone(&self.render_gate);
        let markers = Arc::clone(&self.markers);
        let deadline = self.config.render_timeout;

        self.state = SessionState::Rendering;
        let task = tokio::task::spawn_blocking(move || {
            let _turn = gate.lock().unwrap_or_else(PoisonError::into_inner);
            let mut frame = engine.render(&file, &request)?;
            let drawn = frame.composite_markers(&markers, &viewport, &request.cell);
            Ok::<_, ViewError>((frame, drawn))
        });
        let outcome = tokio::time::timeout(deadline, task).await;
        self.state = SessionState::Ready;

        let (mut frame, markers) = match outcome {
            Err(_) => {
                warn!("render exceeded {} ms; frame dropped", deadline.as_millis());
                return Err(ViewError::RenderTimeout(deadline));
            }
            Ok(Err(join)) => return Err(ViewError::Engine(format!("render task failed: {join}"))),
            Ok(Ok(result)) => result?,
        };
        frame.seq = self.seq.next();
        Ok(RenderedFrame {
            frame,
            viewport,
            markers,
        })
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            path: self.file.as_ref().map(|f| f.path().to_path_buf()),
            cell: self.cell.clone(),
            viewport: self.viewport,
            canvas: self.canvas,
            layers: self.layers.clone(),
            marker_groups: self.markers.len(),
        }
    }

    /// Meta-info of the current cell.
    pub fn metainfo(&self) -> Result<(String, BTreeMap<String, String>), ViewError> {
        self.require_open()?;
        let (Some(file), Some(cell)) = (&self.file, &self.cell) else {
            return Err(ViewError::NoSession);
        };
        let entries = file
            .library()
            .cell(cell)
            .map(|c| c.metainfo.clone())
            .unwrap_or_default();
        Ok((cell.clone(), entries))
    }

    /// Top cells and the parent/child relation of every cell.
    pub fn hierarchy(&self) -> Result<(Vec<String>, Vec<CellInfo>), ViewError> {
        self.require_open()?;
        let file = self.file.as_ref().ok_or(ViewError::NoSession)?;
        let library = file.library();
        let tops = library.top_cells().into_iter().map(str::to_string).collect();
        Ok((tops, library.hierarchy()))
    }

    fn require_open(&self) -> Result<(), ViewError> {
        match self.state {
            // `Rendering` outlives a render only when the awaiting caller was
            // dropped mid-render; the session is still usable.
            SessionState::Ready | SessionState::Rendering => Ok(()),
            SessionState::Unopened | SessionState::Opening => Err(ViewError::NoSession),
            SessionState::Closed => Err(ViewError::SessionClosed),
        }
    }
}

/// Declared layers first, in declaration order, then synthesized entries for
/// undeclared geometry layers when `add_missing` is set. A file with no
/// declarations at all shows every geometry layer.
fn build_layer_table(file: &LayoutFile, add_missing: bool) -> Vec<LayerInfo> {
    let declared = file.declared_layers();
    let mut table = declared.to_vec();
    if add_missing || declared.is_empty() {
        for key in file.geometry_layers() {
            if !table.iter().any(|l| l.key == key) {
                table.push(LayerInfo::synthesized(key));
            }
        }
    }
    table
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gdsview_core::{Cell, EngineError, Library, Point, Shape};

    /// Engine that serves one in-memory layout for any path.
    struct FixedEngine {
        declared: Vec<LayerInfo>,
    }

    impl GeometryEngine for FixedEngine {
        fn open_file(&self, path: &Path, _options: &EngineOptions) -> Result<LayoutFile, EngineError> {
            let mut top = Cell::new("TOP");
            top.metainfo.insert("owner".into(), "chip-team".into());
            for layer in [1, 2] {
                top.shapes.push(Shape {
                    layer: LayerKey::new(layer, 0),
                    points: vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)],
                });
            }
            Ok(LayoutFile::new(path, Library::new("LIB", 1.0, vec![top]), self.declared.clone()))
        }

        fn render(&self, _file: &LayoutFile, request: &RenderRequest) -> Result<Frame, EngineError> {
            Ok(Frame::blank(request.canvas, request.format))
        }
    }

    fn scratch_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gdsview-session-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("chip.gds"), b"stub").unwrap();
        dir
    }

    fn session(config: ServerConfig, declared: Vec<LayerInfo>) -> RenderSession {
        RenderSession::new(Arc::new(FixedEngine { declared }), Arc::new(config))
    }

    fn config(root: &Path) -> ServerConfig {
        ServerConfig {
            root: root.to_path_buf(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_selects_top_cell_and_fits() {
        // Arrange
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());

        // Act
        s.open(Path::new("chip.gds")).await.unwrap();

        // Assert
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.cell(), Some("TOP"));
        assert_eq!((s.viewport().x(), s.viewport().y()), (5.0, 5.0));
        assert_eq!(s.layers().len(), 2);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_failed_open_returns_to_unopened() {
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());

        let err = s.open(Path::new("missing.gds")).await.unwrap_err();

        assert_eq!(err.kind(), "not-found");
        assert_eq!(s.state(), SessionState::Unopened);
        assert!(s.file().is_none());
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_declared_layers_come_first_then_missing_ones() {
        let root = scratch_root();
        let declared = vec![LayerInfo::synthesized(LayerKey::new(2, 0))];
        let mut s = session(config(&root), declared);

        s.open(Path::new("chip.gds")).await.unwrap();

        let keys: Vec<_> = s.layers().iter().map(|l| l.key).collect();
        assert_eq!(keys, vec![LayerKey::new(2, 0), LayerKey::new(1, 0)]);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_without_add_missing_only_declared_layers_are_listed() {
        let root = scratch_root();
        let cfg = ServerConfig {
            add_missing_layers: false,
            ..config(&root)
        };
        let mut s = session(cfg, vec![LayerInfo::synthesized(LayerKey::new(2, 0))]);

        s.open(Path::new("chip.gds")).await.unwrap();

        assert_eq!(s.layers().len(), 1);
        let err = s.set_layer_visibility(LayerKey::new(1, 0), false).unwrap_err();
        assert_eq!(err.kind(), "unknown-layer");
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_invalid_viewport_keeps_previous() {
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();
        let before = s.viewport();

        assert!(s.set_viewport(0.0, 0.0, 0.0).is_err());
        assert!(s.set_viewport(f64::NAN, 0.0, 1.0).is_err());

        assert_eq!(s.viewport(), before);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_render_stamps_increasing_sequence_numbers() {
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();

        let first = s.render_frame(FrameFormat::Vector).await.unwrap();
        let second = s.render_frame(FrameFormat::Vector).await.unwrap();

        assert!(second.frame.seq > first.frame.seq);
        assert_eq!(s.state(), SessionState::Ready);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_render_before_open_is_no_session() {
        let mut s = session(ServerConfig::default(), Vec::new());
        let err = s.render_frame(FrameFormat::Raster).await.unwrap_err();
        assert_eq!(err.kind(), "no-session");
    }

    #[tokio::test]
    async fn test_select_unknown_cell_is_rejected() {
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();

        assert_eq!(s.select_cell("NOPE").unwrap_err().kind(), "unknown-cell");
        assert_eq!(s.cell(), Some("TOP"));
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_metainfo_and_hierarchy() {
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();

        let (cell, entries) = s.metainfo().unwrap();
        let (tops, cells) = s.hierarchy().unwrap();

        assert_eq!(cell, "TOP");
        assert_eq!(entries.get("owner").map(String::as_str), Some("chip-team"));
        assert_eq!(tops, vec!["TOP".to_string()]);
        assert_eq!(cells.len(), 1);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_reload_keeps_visibility_and_viewport() {
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();
        s.set_layer_visibility(LayerKey::new(1, 0), false).unwrap();
        let vp = s.set_viewport(1.0, 2.0, 3.0).unwrap();

        s.reload().await.unwrap();

        assert_eq!(s.viewport(), vp);
        assert!(!s.layers().iter().find(|l| l.key == LayerKey::new(1, 0)).unwrap().visible);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();

        s.close();
        s.close();

        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.file().is_none());
        assert_eq!(s.render_frame(FrameFormat::Raster).await.unwrap_err().kind(), "session-closed");
        std::fs::remove_dir_all(root).ok();
    }

    fn group_of(id: &str, n: u64) -> ItemMarkerGroup {
        let mut group = ItemMarkerGroup::new(id, gdsview_core::MarkerCategory::default());
        for violation_id in 0..n {
            group.add(gdsview_core::Marker {
                shape: gdsview_core::MarkerShape::Box { x1: 1.0, y1: 1.0, x2: 2.0, y2: 2.0 },
                violation_id,
                message: None,
                cell: None,
            });
        }
        group
    }

    #[tokio::test]
    async fn test_attaching_markers_replaces_the_overlay() {
        // Arrange
        let root = scratch_root();
        let mut s = session(config(&root), Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();
        s.attach_marker_groups(vec![group_of("a", 3), group_of("b", 3)]).unwrap();

        // Act
        s.attach_marker_groups(vec![group_of("a", 2)]).unwrap();
        let rendered = s.render_frame(FrameFormat::Vector).await.unwrap();

        // Assert
        assert_eq!(s.marker_groups().len(), 1);
        assert_eq!(rendered.markers, 2);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_style_line_width_is_bounded() {
        let root = scratch_root();
        let cfg = ServerConfig {
            editable: true,
            ..config(&root)
        };
        let mut s = session(cfg, Vec::new());
        s.open(Path::new("chip.gds")).await.unwrap();
        let key = LayerKey::new(1, 0);

        for width in [0, MAX_LINE_WIDTH + 1, u16::MAX] {
            let update = LayerStyleUpdate {
                line_width: Some(width),
                ..LayerStyleUpdate::default()
            };
            assert_eq!(s.set_layer_style(key, update).unwrap_err().kind(), "invalid-style");
        }
        let widest = LayerStyleUpdate {
            line_width: Some(MAX_LINE_WIDTH),
            ..LayerStyleUpdate::default()
        };
        s.set_layer_style(key, widest).unwrap();

        let style = s.layers().iter().find(|l| l.key == key).unwrap().style;
        assert_eq!(style.line_width, MAX_LINE_WIDTH);
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_resize_rejects_zero_edge() {
        let mut s = session(ServerConfig::default(), Vec::new());
        assert_eq!(s.resize(0, 10).unwrap_err().kind(), "invalid-viewport");
        assert!(s.resize(1024, 768).is_ok());
        assert_eq!(s.canvas().width, 1024);
    }
}
