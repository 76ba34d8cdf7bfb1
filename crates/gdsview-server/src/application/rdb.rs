//! Rule-violation database (RDB) adapter.
//!
//! Reads a DRC result database and turns it into [`ItemMarkerGroup`]s, one
//! per rule, ready to be attached to a render session. A loaded set can also
//! be browsed: items filtered by rule and cell, and a hand-picked selection
//! drawn instead of the whole database.
//!
//! # File format
//!
//! ```json
//! {
//!   "description": "DRC run",
//!   "top_cell": "TOP",
//!   "rules": [ { "name": "M1.S.1", "severity": "error", "description": "M1 spacing" } ],
//!   "items": [
//!     { "rule": "M1.S.1", "cell": "TOP", "message": "0.08 < 0.1",
//!       "shape": { "type": "box", "x1": 0.0, "y1": 0.0, "x2": 1.0, "y2": 1.0 } }
//!   ]
//! }
//! ```
//!
//! Coordinates are microns, in the coordinate system of the item's `cell`.
//! An item without a cell belongs to the database's `top_cell`. Items may
//! reference rules the `rules` list does not declare; those rules are
//! appended in order of first use with severity `error`.
//!
//! # Volume limiting
//!
//! [`RdbAdapter::to_marker_groups`] applies one global ceiling across all
//! rules: markers are taken in item order until the ceiling is hit, the rest
//! are counted in `omitted_count`. Truncation is reported as data, never as
//! an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gdsview_core::domain::color::palette_color;
use gdsview_core::{CategoryConfig, ItemMarkerGroup, Marker, MarkerCategory, MarkerShape};
use serde::{Deserialize, Serialize};

use crate::domain::messages::{WireRdbEntry, WireRdbItem, WireRule};
use crate::domain::{ServerMessage, ViewError};

/// How bad a rule violation is. Picks the marker style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Marker settings for a rule of this severity. The color comes from the
    /// rule name so a rule keeps its color across loads.
    fn category_config(self, rule: &str) -> CategoryConfig {
        let (dither_pattern, line_width, halo) = match self {
            Severity::Error => (5, 2, 1),
            Severity::Warning => (9, 1, -1),
            Severity::Info => (1, 1, -1),
        };
        CategoryConfig {
            dither_pattern: Some(dither_pattern),
            line_width: Some(line_width),
            halo: Some(halo),
            color: Some(palette_color(rule.as_bytes()).to_hex()),
        }
    }
}

// ── File schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RdbDocument {
    #[serde(default)]
    description: String,
    #[serde(default)]
    top_cell: Option<String>,
    #[serde(default)]
    rules: Vec<RuleDecl>,
    #[serde(default)]
    items: Vec<ItemDecl>,
}

#[derive(Debug, Deserialize)]
struct RuleDecl {
    name: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ItemDecl {
    rule: String,
    #[serde(default)]
    cell: Option<String>,
    #[serde(default)]
    message: Option<String>,
    shape: MarkerShape,
}

// ── Result set ────────────────────────────────────────────────────────────────

/// One rule of a loaded database.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEntry {
    pub name: String,
    pub severity: Severity,
    pub description: String,
    /// Violations of this rule in the database.
    pub count: usize,
}

/// One violation of a loaded database.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationItem {
    /// Position in the database's item list.
    pub id: u64,
    pub rule: String,
    /// Cell the shape is drawn in; `None` only when the database names no
    /// top cell either.
    pub cell: Option<String>,
    pub message: Option<String>,
    pub shape: MarkerShape,
}

impl ViolationItem {
    fn to_wire(&self) -> WireRdbItem {
        WireRdbItem {
            id: self.id,
            rule: self.rule.clone(),
            cell: self.cell.clone(),
            message: self.message.clone(),
        }
    }
}

/// Items matching an `rdb-records` query.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage<'a> {
    pub items: Vec<&'a ViolationItem>,
    /// Matching items, including those past the limit.
    pub matched: usize,
}

impl RecordPage<'_> {
    /// Builds the `rdb-items` reply.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::RdbItems {
            items: self.items.iter().map(|item| item.to_wire()).collect(),
            matched: self.matched,
            truncated: self.matched > self.items.len(),
        }
    }
}

/// A loaded violation database.
///
/// `truncated` and `omitted_count` are filled in by
/// [`RdbAdapter::to_marker_groups`].
#[derive(Debug, Clone, PartialEq)]
pub struct RdbResultSet {
    pub path: PathBuf,
    pub description: String,
    pub top_cell: Option<String>,
    pub rules: Vec<RuleEntry>,
    pub items: Vec<ViolationItem>,
    pub truncated: bool,
    pub omitted_count: usize,
}

impl RdbResultSet {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Markers drawn after grouping.
    pub fn shown(&self) -> usize {
        self.total() - self.omitted_count
    }

    /// Distinct item cells in order of first use. A cell's position is its
    /// id in `rdb-info` and `rdb-records`.
    pub fn cells(&self) -> Vec<&str> {
        let mut cells: Vec<&str> = Vec::new();
        for cell in self.items.iter().filter_map(|item| item.cell.as_deref()) {
            if !cells.contains(&cell) {
                cells.push(cell);
            }
        }
        cells
    }

    /// Builds the `rdb-info` message: rule categories and cells with the ids
    /// `rdb-records` filters by.
    pub fn info(&self) -> ServerMessage {
        ServerMessage::RdbInfo {
            categories: self
                .rules
                .iter()
                .enumerate()
                .map(|(id, rule)| WireRdbEntry {
                    id,
                    name: rule.name.clone(),
                })
                .collect(),
            cells: self
                .cells()
                .into_iter()
                .enumerate()
                .map(|(id, name)| WireRdbEntry {
                    id,
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    /// Items of category `category_id` in cell `cell_id`, in item order, at
    /// most `limit` of them. `None` matches everything.
    ///
    /// # Errors
    ///
    /// [`ViewError::UnknownRdbEntry`] for an id [`info`](Self::info) did not
    /// hand out.
    pub fn records(
        &self,
        category_id: Option<usize>,
        cell_id: Option<usize>,
        limit: usize,
    ) -> Result<RecordPage<'_>, ViewError> {
        let rule = category_id
            .map(|id| {
                self.rules
                    .get(id)
                    .map(|r| r.name.as_str())
                    .ok_or_else(|| ViewError::UnknownRdbEntry(format!("category {id}")))
            })
            .transpose()?;
        let cells = self.cells();
        let cell = cell_id
            .map(|id| {
                cells
                    .get(id)
                    .copied()
                    .ok_or_else(|| ViewError::UnknownRdbEntry(format!("cell {id}")))
            })
            .transpose()?;

        let mut page = RecordPage {
            items: Vec::new(),
            matched: 0,
        };
        let matching = self.items.iter().filter(|item| {
            rule.map_or(true, |r| item.rule == r) && cell.map_or(true, |c| item.cell.as_deref() == Some(c))
        });
        for item in matching {
            page.matched += 1;
            if page.items.len() < limit {
                page.items.push(item);
            }
        }
        Ok(page)
    }

    /// Builds the `rdb-summary` message for this set and its groups.
    pub fn summary(&self, groups: &[ItemMarkerGroup], display_path: &str) -> ServerMessage {
        let rules = self
            .rules
            .iter()
            .map(|rule| {
                let group = groups.iter().find(|g| g.name() == rule.name);
                WireRule {
                    name: rule.name.clone(),
                    severity: rule.severity.as_str().to_string(),
                    description: rule.description.clone(),
                    count: rule.count,
                    shown: group.map_or(0, ItemMarkerGroup::len),
                    color: group.map(|g| g.category().color().to_hex()).unwrap_or_default(),
                }
            })
            .collect();
        ServerMessage::RdbSummary {
            path: display_path.to_string(),
            description: self.description.clone(),
            rules,
            total: self.total(),
            shown: self.shown(),
            truncated: self.truncated,
            omitted_count: self.omitted_count,
        }
    }
}

// ── Adapter ───────────────────────────────────────────────────────────────────

/// Reads violation databases and groups them into markers.
pub struct RdbAdapter;

impl RdbAdapter {
    /// Reads and parses the database at `path`.
    ///
    /// # Errors
    ///
    /// [`ViewError::NotFound`] if the file does not exist,
    /// [`ViewError::Format`] if it cannot be read or parsed.
    pub fn load(path: &Path) -> Result<RdbResultSet, ViewError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ViewError::NotFound(path.to_path_buf())
            } else {
                ViewError::Format(format!("{}: {e}", path.display()))
            }
        })?;
        Self::parse(path, &text)
    }

    /// Parses database text; `path` is recorded as the source.
    ///
    /// # Errors
    ///
    /// [`ViewError::Format`] for invalid JSON, a schema violation, a rule
    /// declared twice, or an item whose shape cannot be drawn.
    pub fn parse(path: &Path, text: &str) -> Result<RdbResultSet, ViewError> {
        let doc: RdbDocument =
            serde_json::from_str(text).map_err(|e| ViewError::Format(format!("{}: {e}", path.display())))?;

        let mut rules: Vec<RuleEntry> = Vec::with_capacity(doc.rules.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for decl in doc.rules {
            if index.contains_key(&decl.name) {
                return Err(ViewError::Format(format!("rule '{}' declared twice", decl.name)));
            }
            index.insert(decl.name.clone(), rules.len());
            rules.push(RuleEntry {
                name: decl.name,
                severity: decl.severity,
                description: decl.description,
                count: 0,
            });
        }

        let mut items = Vec::with_capacity(doc.items.len());
        for (id, item) in doc.items.into_iter().enumerate() {
            if !item.shape.is_drawable() {
                return Err(ViewError::Format(format!(
                    "item {id} of rule '{}' has an unusable shape",
                    item.rule
                )));
            }
            let slot = *index.entry(item.rule.clone()).or_insert_with(|| {
                rules.push(RuleEntry {
                    name: item.rule.clone(),
                    severity: Severity::Error,
                    description: String::new(),
                    count: 0,
                });
                rules.len() - 1
            });
            rules[slot].count += 1;
            items.push(ViolationItem {
                id: id as u64,
                rule: item.rule,
                cell: item.cell.or_else(|| doc.top_cell.clone()),
                message: item.message,
                shape: item.shape,
            });
        }

        tracing::debug!(
            "parsed RDB {}: {} rules, {} items",
            path.display(),
            rules.len(),
            items.len()
        );
        Ok(RdbResultSet {
            path: path.to_path_buf(),
            description: doc.description,
            top_cell: doc.top_cell,
            rules,
            items,
            truncated: false,
            omitted_count: 0,
        })
    }

    /// Groups the set's violations into one marker group per rule, in rule
    /// order, taking at most `limit` markers overall.
    ///
    /// Sets `truncated` and `omitted_count` on `set`.
    ///
    /// # Errors
    ///
    /// [`ViewError::Format`] if a rule's marker style cannot be built.
    pub fn to_marker_groups(set: &mut RdbResultSet, limit: usize) -> Result<Vec<ItemMarkerGroup>, ViewError> {
        let groups = group_items(set, set.items.iter().take(limit))?;

        let total = set.items.len();
        set.truncated = total > limit;
        set.omitted_count = total.saturating_sub(limit);
        if set.truncated {
            tracing::info!(
                "RDB {} truncated at {limit} markers ({} omitted)",
                set.path.display(),
                set.omitted_count
            );
        }
        Ok(groups)
    }

    /// Groups only the items listed in `ids`, in item order, at most `limit`
    /// of them. Empty groups are dropped.
    ///
    /// # Errors
    ///
    /// [`ViewError::UnknownRdbEntry`] for an id not in the set,
    /// [`ViewError::Format`] as for [`to_marker_groups`](Self::to_marker_groups).
    pub fn selected_marker_groups(
        set: &RdbResultSet,
        ids: &[u64],
        limit: usize,
    ) -> Result<Vec<ItemMarkerGroup>, ViewError> {
        if let Some(unknown) = ids.iter().find(|&&id| id >= set.items.len() as u64) {
            return Err(ViewError::UnknownRdbEntry(format!("item {unknown}")));
        }
        let picked = set.items.iter().filter(|item| ids.contains(&item.id)).take(limit);
        let mut groups = group_items(set, picked)?;
        groups.retain(|g| !g.is_empty());
        Ok(groups)
    }
}

/// One group per rule of `set`, in rule order, filled with `items`.
fn group_items<'a>(
    set: &RdbResultSet,
    items: impl Iterator<Item = &'a ViolationItem>,
) -> Result<Vec<ItemMarkerGroup>, ViewError> {
    let mut groups = Vec::with_capacity(set.rules.len());
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(set.rules.len());
    for rule in &set.rules {
        let category = MarkerCategory::from_config(&rule.severity.category_config(&rule.name))?;
        slots.insert(rule.name.as_str(), groups.len());
        groups.push(ItemMarkerGroup::new(rule.name.clone(), category));
    }
    for item in items {
        if let Some(&slot) = slots.get(item.rule.as_str()) {
            groups[slot].add(Marker {
                shape: item.shape.clone(),
                violation_id: item.id,
                message: item.message.clone(),
                cell: item.cell.clone(),
            });
        }
    }
    Ok(groups)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
