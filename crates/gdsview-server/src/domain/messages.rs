//! JSON message types for the browser-facing WebSocket protocol.
//!
//! # Message flow
//!
//! ```text
//! Browser → Server:  JSON text frame  →  ClientCommand
//! Server  → Browser: ServerMessage    →  JSON text frame
//!                    (a `frame` message is followed by one binary message
//!                     carrying the encoded frame)
//! ```
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"msg"` field naming the variant in
//! kebab-case. All other fields sit in the same object:
//!
//! ```json
//! {"msg":"set-viewport","x":12.5,"y":-3.0,"scale":40.0}
//! ```
//!
//! Inbound text is parsed in two steps so the two client mistakes can be told
//! apart: a `msg` this server does not know is an *unknown command*, while
//! broken JSON or a known command with bad fields is a *malformed command*.

use std::collections::BTreeMap;

use gdsview_core::{CellInfo, FrameFormat, LayerInfo, Viewport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

// ── Browser → Server ──────────────────────────────────────────────────────────

/// Every `msg` value the server accepts.
pub const COMMAND_NAMES: &[&str] = &[
    "set-viewport",
    "set-layer-visibility",
    "load-rdb",
    "clear-markers",
    "close",
    "open",
    "resize",
    "zoom-fit",
    "select-cell",
    "reload",
    "get-layers",
    "set-format",
    "set-layer-style",
    "rdb-records",
    "rdb-selected",
];

/// All commands a browser can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Move or zoom the view. `(x, y)` is the layout point (microns) at the
    /// canvas centre; `scale` is pixels per micron.
    SetViewport { x: f64, y: f64, scale: f64 },

    SetLayerVisibility {
        layer: u16,
        #[serde(default)]
        datatype: u16,
        visible: bool,
    },

    /// Load a violation database (path relative to the served root) and
    /// overlay its markers.
    LoadRdb { path: String },

    /// Drop every marker group from the session. The loaded database stays
    /// available for browsing.
    ClearMarkers,

    /// List items of the loaded database. Ids come from `rdb-info`; a missing
    /// id matches everything.
    RdbRecords {
        #[serde(default)]
        category_id: Option<usize>,
        #[serde(default)]
        cell_id: Option<usize>,
    },

    /// Draw only these items of the loaded database.
    RdbSelected { items: Vec<u64> },

    /// Detach from the session and close the connection.
    Close,

    /// Switch this connection to another layout file.
    Open { path: String },

    /// The browser canvas changed size.
    Resize { width: u32, height: u32 },

    ZoomFit,

    SelectCell { cell: String },

    /// Re-read the layout file from disk.
    Reload,

    /// Ask for the current layer table without rendering.
    GetLayers,

    /// Choose raster or vector frames for this connection.
    SetFormat { format: FrameFormat },

    /// Change how a layer is drawn. Requires an editable server.
    SetLayerStyle {
        layer: u16,
        #[serde(default)]
        datatype: u16,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        dither_pattern: Option<u8>,
        #[serde(default)]
        line_width: Option<u16>,
    },
}

/// Why an inbound text message could not be turned into a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("malformed command: {0}")]
    Malformed(String),
}

impl CommandParseError {
    /// Wire name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandParseError::Unknown(_) => "unknown-command",
            CommandParseError::Malformed(_) => "malformed-command",
        }
    }
}

impl ClientCommand {
    /// Parses one inbound text message.
    ///
    /// # Errors
    ///
    /// [`CommandParseError::Unknown`] when `msg` is missing or not a known
    /// command, [`CommandParseError::Malformed`] for invalid JSON or bad
    /// fields on a known command.
    pub fn parse(text: &str) -> Result<Self, CommandParseError> {
        let value: Value = serde_json::from_str(text).map_err(|e| CommandParseError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(CommandParseError::Malformed("expected a JSON object".to_string()));
        }
        let name = match value.get("msg") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => return Err(CommandParseError::Unknown(other.to_string())),
            None => return Err(CommandParseError::Unknown("<missing msg>".to_string())),
        };
        if !COMMAND_NAMES.contains(&name.as_str()) {
            return Err(CommandParseError::Unknown(name));
        }
        serde_json::from_value(value).map_err(|e| CommandParseError::Malformed(format!("{name}: {e}")))
    }

    /// The `msg` value of this command, for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::SetViewport { .. } => "set-viewport",
            ClientCommand::SetLayerVisibility { .. } => "set-layer-visibility",
            ClientCommand::LoadRdb { .. } => "load-rdb",
            ClientCommand::ClearMarkers => "clear-markers",
            ClientCommand::Close => "close",
            ClientCommand::Open { .. } => "open",
            ClientCommand::Resize { .. } => "resize",
            ClientCommand::ZoomFit => "zoom-fit",
            ClientCommand::SelectCell { .. } => "select-cell",
            ClientCommand::Reload => "reload",
            ClientCommand::GetLayers => "get-layers",
            ClientCommand::SetFormat { .. } => "set-format",
            ClientCommand::SetLayerStyle { .. } => "set-layer-style",
            ClientCommand::RdbRecords { .. } => "rdb-records",
            ClientCommand::RdbSelected { .. } => "rdb-selected",
        }
    }
}

// ── Server → Browser ──────────────────────────────────────────────────────────

/// One row of the layer table as sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLayer {
    pub layer: u16,
    pub datatype: u16,
    pub name: String,
    /// `#rrggbb` or `#rrggbbaa`.
    pub color: String,
    pub dither_pattern: u8,
    pub line_width: u16,
    pub visible: bool,
}

impl From<&LayerInfo> for WireLayer {
    fn from(info: &LayerInfo) -> Self {
        Self {
            layer: info.key.layer,
            datatype: info.key.datatype,
            name: info.name.clone(),
            color: info.style.color.to_hex(),
            dither_pattern: info.style.dither_pattern,
            line_width: info.style.line_width,
            visible: info.visible,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCell {
    pub name: String,
    pub children: Vec<String>,
}

impl From<&CellInfo> for WireCell {
    fn from(info: &CellInfo) -> Self {
        Self {
            name: info.name.clone(),
            children: info.children.clone(),
        }
    }
}

/// Per-rule line of an `rdb-summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRule {
    pub name: String,
    pub severity: String,
    pub description: String,
    /// Violations of this rule in the database.
    pub count: usize,
    /// Violations of this rule actually drawn.
    pub shown: usize,
    /// `#rrggbb` marker color.
    pub color: String,
}

/// A category or cell of a loaded database with the id clients filter by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRdbEntry {
    pub id: usize,
    pub name: String,
}

/// One violation as listed in `rdb-items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRdbItem {
    /// Pass back in `rdb-selected` to draw this item.
    pub id: u64,
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// All messages the server sends to a browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// The connection is attached to a layout.
    Opened {
        /// Render session id; clients viewing the same file share it.
        session: Uuid,
        path: String,
        cell: String,
        top_cells: Vec<String>,
        /// Microns per database unit.
        dbu_um: f64,
        editable: bool,
    },

    LayerList { layers: Vec<WireLayer> },

    Hierarchy { top_cells: Vec<String>, cells: Vec<WireCell> },

    /// Meta-info of the current cell.
    Metainfo { cell: String, entries: BTreeMap<String, String> },

    /// Header for the binary message that follows.
    Frame {
        seq: u64,
        format: FrameFormat,
        width: u32,
        height: u32,
        viewport: Viewport,
        /// Markers drawn into this frame.
        markers: usize,
        /// Length of the binary message.
        bytes: usize,
    },

    RdbSummary {
        path: String,
        description: String,
        rules: Vec<WireRule>,
        total: usize,
        shown: usize,
        truncated: bool,
        omitted_count: usize,
    },

    /// Browsing index of the loaded database; follows `rdb-summary`.
    RdbInfo {
        categories: Vec<WireRdbEntry>,
        cells: Vec<WireRdbEntry>,
    },

    /// Reply to `rdb-records`.
    RdbItems {
        items: Vec<WireRdbItem>,
        /// Items matching the query, listed or not.
        matched: usize,
        truncated: bool,
    },

    Error { kind: String, message: String },

    /// The session was detached; no further messages follow.
    Closed,
}

impl ServerMessage {
    /// `error` message with the given kind.
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
