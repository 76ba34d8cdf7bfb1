//! Per-connection command handling.
//!
//! A [`LayoutViewEndpoint`] is what one browser tab talks to. It holds the
//! tab's lease on a shared render session and its choice of frame format,
//! turns each inbound command into session calls, and pushes the results
//! back through a [`ClientSink`].
//!
//! # Error policy
//!
//! Every command failure is reported to the client as an `error` message and
//! the connection carries on. Only a failing sink
//! ([`ViewError::Connection`]) is returned to the caller, which then drops
//! the connection.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gdsview_core::{encode_frame, FrameFormat, LayerKey, Rgba};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::paths::resolve_under_root;
use crate::application::rdb::RdbAdapter;
use crate::application::registry::{SessionLease, SessionRegistry, SharedSession};
use crate::application::render_session::{LayerStyleUpdate, RenderedFrame};
use crate::domain::messages::{WireCell, WireLayer};
use crate::domain::{ClientCommand, ServerMessage, ViewError};

/// Where an endpoint's outbound traffic goes.
///
/// The WebSocket implementation lives in the infrastructure layer; tests use
/// an in-memory recorder.
#[async_trait]
pub trait ClientSink: Send {
    /// Sends one JSON message.
    async fn send_message(&mut self, message: &ServerMessage) -> Result<(), ViewError>;

    /// Sends one binary message.
    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), ViewError>;
}

/// What the connection should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct LayoutViewEndpoint<S: ClientSink> {
    id: Uuid,
    registry: SessionRegistry,
    sink: S,
    lease: Option<SessionLease>,
    format: FrameFormat,
}

impl<S: ClientSink> LayoutViewEndpoint<S> {
    pub fn new(registry: SessionRegistry, sink: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            sink,
            lease: None,
            format: FrameFormat::default(),
        }
    }

    /// Connection id used in log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The session this connection is attached to, if any.
    pub fn session(&self) -> Option<&std::sync::Arc<SharedSession>> {
        self.lease.as_ref().map(SessionLease::session)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Attaches to the requested file, or the server's pinned default file,
    /// and sends the initial state. Attach failures are reported to the
    /// client and leave the connection open.
    ///
    /// # Errors
    ///
    /// Only [`ViewError::Connection`].
    pub async fn on_connect(&mut self, requested: Option<&str>) -> Result<(), ViewError> {
        let target = requested
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.registry.config().default_file.clone());
        let outcome = match target {
            Some(path) => self.open(&path).await,
            None => Err(ViewError::NoSession),
        };
        self.report(outcome).await
    }

    /// Handles one inbound text message.
    ///
    /// # Errors
    ///
    /// Only [`ViewError::Connection`].
    pub async fn handle_text(&mut self, text: &str) -> Result<Flow, ViewError> {
        let command = match ClientCommand::parse(text) {
            Ok(command) => command,
            Err(e) => {
                warn!("client {}: {e}", self.id);
                self.sink.send_message(&ServerMessage::error(e.kind(), e.to_string())).await?;
                return Ok(Flow::Continue);
            }
        };
        debug!("client {}: {}", self.id, command.name());

        if command == ClientCommand::Close {
            self.detach().await;
            self.sink.send_message(&ServerMessage::Closed).await?;
            return Ok(Flow::Close);
        }
        let outcome = self.dispatch(command).await;
        self.report(outcome).await?;
        Ok(Flow::Continue)
    }

    /// Releases the session lease. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        self.detach().await;
    }

    async fn detach(&mut self) {
        if let Some(lease) = self.lease.take() {
            debug!("client {} detached from session {}", self.id, lease.session().id());
            lease.release().await;
        }
    }

    /// Sends command errors to the client; passes connection errors up.
    async fn report(&mut self, outcome: Result<(), ViewError>) -> Result<(), ViewError> {
        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("client {}: {} ({e})", self.id, e.kind());
                self.sink.send_message(&ServerMessage::error(e.kind(), e.to_string())).await
            }
        }
    }

    fn current(&self) -> Result<std::sync::Arc<SharedSession>, ViewError> {
        self.session().cloned().ok_or(ViewError::NoSession)
    }

    async fn dispatch(&mut self, command: ClientCommand) -> Result<(), ViewError> {
        match command {
            ClientCommand::Open { path } => self.open(Path::new(&path)).await,

            ClientCommand::SetViewport { x, y, scale } => {
                let session = self.current()?;
                let rendered = {
                    let mut s = session.lock().await;
                    s.set_viewport(x, y, scale)?;
                    s.render_frame(self.format).await?
                };
                self.send_frame(rendered).await
            }

            ClientCommand::SetLayerVisibility { layer, datatype, visible } => {
                let session = self.current()?;
                let rendered = {
                    let mut s = session.lock().await;
                    s.set_layer_visibility(LayerKey::new(layer, datatype), visible)?;
                    s.render_frame(self.format).await?
                };
                self.send_layer_list(&session).await?;
                self.send_frame(rendered).await
            }

            ClientCommand::SetLayerStyle {
                layer,
                datatype,
                color,
                dither_pattern,
                line_width,
            } => {
                let session = self.current()?;
                let update = LayerStyleUpdate {
                    color: color.as_deref().map(Rgba::parse).transpose()?,
                    dither_pattern,
                    line_width,
                };
                let rendered = {
                    let mut s = session.lock().await;
                    s.set_layer_style(LayerKey::new(layer, datatype), update)?;
                    s.render_frame(self.format).await?
                };
                self.send_layer_list(&session).await?;
                self.send_frame(rendered).await
            }

            ClientCommand::LoadRdb { path } => self.load_rdb(&path).await,

            ClientCommand::RdbRecords { category_id, cell_id } => {
                let session = self.current()?;
                let rdb = session.lock().await.rdb().cloned().ok_or(ViewError::NoRdb)?;
                let limit = self.registry.config().max_rdb_limit;
                let reply = rdb.records(category_id, cell_id, limit)?.to_message();
                self.sink.send_message(&reply).await
            }

            ClientCommand::RdbSelected { items } => {
                let session = self.current()?;
                let limit = self.registry.config().max_rdb_limit;
                let rendered = {
                    let mut s = session.lock().await;
                    let rdb = s.rdb().cloned().ok_or(ViewError::NoRdb)?;
                    let groups = RdbAdapter::selected_marker_groups(&rdb, &items, limit)?;
                    debug!("client {}: drawing {} selected violations", self.id, items.len().min(limit));
                    s.attach_marker_groups(groups)?;
                    s.render_frame(self.format).await?
                };
                self.send_frame(rendered).await
            }

            ClientCommand::ClearMarkers => {
                let session = self.current()?;
                let rendered = {
                    let mut s = session.lock().await;
                    s.clear_marker_groups();
                    s.render_frame(self.format).await?
                };
                self.send_frame(rendered).await
            }

            ClientCommand::Resize { width, height } => {
                let session = self.current()?;
                let rendered = {
                    let mut s = session.lock().await;
                    s.resize(width, height)?;
                    s.render_frame(self.format).await?
                };
                self.send_frame(rendered).await
            }

            ClientCommand::ZoomFit => {
                let session = self.current()?;
                let rendered = {
                    let mut s = session.lock().await;
                    s.zoom_fit()?;
                    s.render_frame(self.format).await?
                };
                self.send_frame(rendered).await
            }

            ClientCommand::SelectCell { cell } => {
                let session = self.current()?;
                let rendered = {
                    let mut s = session.lock().await;
                    s.select_cell(&cell)?;
                    s.render_frame(self.format).await?
                };
                self.send_metainfo(&session).await?;
                self.send_frame(rendered).await
            }

            ClientCommand::Reload => {
                let session = self.current()?;
                session.lock().await.reload().await?;
                self.send_initial_state(&session).await
            }

            ClientCommand::GetLayers => {
                let session = self.current()?;
                self.send_layer_list(&session).await
            }

            ClientCommand::SetFormat { format } => {
                self.format = format;
                let session = self.current()?;
                let rendered = session.lock().await.render_frame(self.format).await?;
                self.send_frame(rendered).await
            }

            // Handled before dispatch.
            ClientCommand::Close => Ok(()),
        }
    }

    /// Attaches to `path`, replacing any current attachment only once the new
    /// one succeeded.
    async fn open(&mut self, path: &Path) -> Result<(), ViewError> {
        let lease = self.registry.attach(path).await?;
        info!(
            "client {} attached to session {} ({})",
            self.id,
            lease.session().id(),
            lease.path().display()
        );
        let session = std::sync::Arc::clone(lease.session());
        if let Some(previous) = self.lease.replace(lease) {
            previous.release().await;
        }
        self.send_initial_state(&session).await
    }

    async fn load_rdb(&mut self, requested: &str) -> Result<(), ViewError> {
        let session = self.current()?;
        let config = std::sync::Arc::clone(self.registry.config());
        let path = resolve_under_root(&config.root, Path::new(requested))?;
        let load_path = path.clone();
        let mut set = tokio::task::spawn_blocking(move || RdbAdapter::load(&load_path))
            .await
            .map_err(|e| ViewError::Engine(format!("RDB load task failed: {e}")))??;
        let groups = RdbAdapter::to_marker_groups(&mut set, config.max_rdb_limit)?;
        let summary = set.summary(&groups, requested);
        let index = set.info();
        info!(
            "client {} loaded RDB {}: {} of {} markers shown",
            self.id,
            path.display(),
            set.shown(),
            set.total()
        );

        let rendered = {
            let mut s = session.lock().await;
            s.attach_rdb(std::sync::Arc::new(set), groups)?;
            s.render_frame(self.format).await?
        };
        self.sink.send_message(&summary).await?;
        self.sink.send_message(&index).await?;
        self.send_frame(rendered).await
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    async fn send_initial_state(&mut self, session: &SharedSession) -> Result<(), ViewError> {
        let (opened, hierarchy, metainfo, rendered) = {
            let mut s = session.lock().await;
            let file = s.file().cloned().ok_or(ViewError::NoSession)?;
            let (top_cells, cells) = s.hierarchy()?;
            let (cell, entries) = s.metainfo()?;
            let opened = ServerMessage::Opened {
                session: session.id(),
                path: file.path().display().to_string(),
                cell: cell.clone(),
                top_cells: top_cells.clone(),
                dbu_um: file.library().dbu_um,
                editable: s.editable(),
            };
            let hierarchy = ServerMessage::Hierarchy {
                top_cells,
                cells: cells.iter().map(WireCell::from).collect(),
            };
            let metainfo = ServerMessage::Metainfo { cell, entries };
            let rendered = s.render_frame(self.format).await;
            (opened, hierarchy, metainfo, rendered)
        };
        self.sink.send_message(&opened).await?;
        self.send_layer_list(session).await?;
        self.sink.send_message(&hierarchy).await?;
        self.sink.send_message(&metainfo).await?;
        self.send_frame(rendered?).await
    }

    async fn send_layer_list(&mut self, session: &SharedSession) -> Result<(), ViewError> {
        let layers = session.snapshot().layers.iter().map(WireLayer::from).collect();
        self.sink.send_message(&ServerMessage::LayerList { layers }).await
    }

    async fn send_metainfo(&mut self, session: &SharedSession) -> Result<(), ViewError> {
        let (cell, entries) = session.lock().await.metainfo()?;
        self.sink.send_message(&ServerMessage::Metainfo { cell, entries }).await
    }

    async fn send_frame(&mut self, rendered: RenderedFrame) -> Result<(), ViewError> {
        let bytes = encode_frame(&rendered.frame)?;
        let header = ServerMessage::Frame {
            seq: rendered.frame.seq,
            format: rendered.frame.format(),
            width: rendered.frame.width,
            height: rendered.frame.height,
            viewport: rendered.viewport,
            markers: rendered.markers,
            bytes: bytes.len(),
        };
        self.sink.send_message(&header).await?;
        self.sink.send_binary(bytes).await
    }
}
