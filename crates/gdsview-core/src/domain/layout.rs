//! In-memory layout database and the opened-file handle.
//!
//! A [`Library`] is a flat list of named cells. Each cell holds polygons on
//! layers plus placements ("instances") of other cells. The renderer flattens
//! that hierarchy on demand via [`Library::flatten`].
//!
//! Coordinates are stored in database units (integers). `Library::dbu_um`
//! converts them to microns, which is the unit every public query returns.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::domain::geometry::{BBox, Point};
use crate::domain::layer::{LayerInfo, LayerKey};

/// Hierarchy depth at which flattening gives up on a branch.
///
/// Also the guard against self-referencing cells in malformed files.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// Placement of a cell: mirror about the x axis, magnify, rotate, translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation in database units.
    pub dx: f64,
    pub dy: f64,
    /// Counter-clockwise rotation in degrees.
    pub angle_deg: f64,
    pub magnification: f64,
    /// Mirror about the x axis before rotating.
    pub mirror_x: bool,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        dx: 0.0,
        dy: 0.0,
        angle_deg: 0.0,
        magnification: 1.0,
        mirror_x: false,
    };

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self { dx, dy, ..Self::IDENTITY }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 2×3 affine matrix used while walking the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    tx: f64,
    ty: f64,
}

impl Affine {
    const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 };

    fn from_transform(t: &Transform) -> Self {
        let (sin, cos) = t.angle_deg.to_radians().sin_cos();
        let m = t.magnification;
        let flip = if t.mirror_x { -1.0 } else { 1.0 };
        Affine {
            a: m * cos,
            b: -m * sin * flip,
            c: m * sin,
            d: m * cos * flip,
            tx: t.dx,
            ty: t.dy,
        }
    }

    /// `self ∘ inner`: applies `inner` first.
    fn compose(&self, inner: &Affine) -> Affine {
        Affine {
            a: self.a * inner.a + self.b * inner.c,
            b: self.a * inner.b + self.b * inner.d,
            c: self.c * inner.a + self.d * inner.c,
            d: self.c * inner.b + self.d * inner.d,
            tx: self.a * inner.tx + self.b * inner.ty + self.tx,
            ty: self.c * inner.tx + self.d * inner.ty + self.ty,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.a * x + self.b * y + self.tx, self.c * x + self.d * y + self.ty)
    }
}

/// A closed polygon on one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub layer: LayerKey,
    pub points: Vec<Point>,
}

/// A placement of another cell inside this one.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub cell: String,
    pub transform: Transform,
}

/// One named cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub name: String,
    pub shapes: Vec<Shape>,
    pub instances: Vec<Instance>,
    /// Key/value annotations collected by the engine.
    pub metainfo: BTreeMap<String, String>,
}

impl Cell {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Cell name plus the distinct names of the cells it places.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellInfo {
    pub name: String,
    pub children: Vec<String>,
}

/// A complete layout database.
#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    pub name: String,
    /// Microns per database unit.
    pub dbu_um: f64,
    cells: Vec<Cell>,
    index: HashMap<String, usize>,
}

impl Library {
    /// Builds a library. Later cells win on duplicate names.
    pub fn new(name: impl Into<String>, dbu_um: f64, cells: Vec<Cell>) -> Self {
        let index = cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            name: name.into(),
            dbu_um,
            cells,
            index,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.index.get(name).map(|&i| &self.cells[i])
    }

    /// Cells no other cell places, in file order.
    pub fn top_cells(&self) -> Vec<&str> {
        let referenced: BTreeSet<&str> = self
            .cells
            .iter()
            .flat_map(|c| c.instances.iter().map(|i| i.cell.as_str()))
            .collect();
        self.cells
            .iter()
            .map(|c| c.name.as_str())
            .filter(|n| !referenced.contains(n))
            .collect()
    }

    /// Every layer that carries at least one shape, sorted.
    pub fn layers(&self) -> BTreeSet<LayerKey> {
        self.cells
            .iter()
            .flat_map(|c| c.shapes.iter().map(|s| s.layer))
            .collect()
    }

    pub fn hierarchy(&self) -> Vec<CellInfo> {
        self.cells
            .iter()
            .map(|c| {
                let mut children: Vec<String> = Vec::new();
                for inst in &c.instances {
                    if !children.contains(&inst.cell) {
                        children.push(inst.cell.clone());
                    }
                }
                CellInfo {
                    name: c.name.clone(),
                    children,
                }
            })
            .collect()
    }

    /// Walks every polygon reachable from `cell`, in microns.
    ///
    /// `visit` receives the polygon's layer and its transformed vertices.
    /// Unknown child cells are skipped, as is anything deeper than
    /// [`MAX_HIERARCHY_DEPTH`]. Returns `false` if `cell` does not exist.
    pub fn flatten<F>(&self, cell: &str, mut visit: F) -> bool
    where
        F: FnMut(LayerKey, &[(f64, f64)]),
    {
        let Some(root) = self.cell(cell) else {
            return false;
        };
        let scale = Affine {
            a: self.dbu_um,
            d: self.dbu_um,
            ..Affine::IDENTITY
        };
        let mut scratch = Vec::new();
        self.flatten_into(root, &scale, 0, &mut scratch, &mut visit);
        true
    }

    fn flatten_into<F>(
        &self,
        cell: &Cell,
        xf: &Affine,
        depth: usize,
        scratch: &mut Vec<(f64, f64)>,
        visit: &mut F,
    ) where
        F: FnMut(LayerKey, &[(f64, f64)]),
    {
        for shape in &cell.shapes {
            scratch.clear();
            scratch.extend(shape.points.iter().map(|p| xf.apply(p.x as f64, p.y as f64)));
            visit(shape.layer, scratch);
        }
        if depth >= MAX_HIERARCHY_DEPTH {
            tracing::warn!("cell '{}': hierarchy deeper than {MAX_HIERARCHY_DEPTH}, truncated", cell.name);
            return;
        }
        for inst in &cell.instances {
            if let Some(child) = self.cell(&inst.cell) {
                let child_xf = xf.compose(&Affine::from_transform(&inst.transform));
                self.flatten_into(child, &child_xf, depth + 1, scratch, visit);
            }
        }
    }

    /// Bounding box of everything under `cell`, in microns.
    pub fn bbox(&self, cell: &str) -> BBox {
        let mut bbox = BBox::EMPTY;
        self.flatten(cell, |_, pts| {
            bbox = bbox.union(BBox::of_points(pts.iter().copied()));
        });
        bbox
    }
}

/// An opened layout file: the engine's handle shared by render sessions.
#[derive(Debug, Clone)]
pub struct LayoutFile {
    path: PathBuf,
    library: Library,
    top_cell: Option<String>,
    declared_layers: Vec<LayerInfo>,
}

impl LayoutFile {
    /// Wraps a parsed library. The top cell is the first unreferenced cell,
    /// falling back to the first cell.
    pub fn new(path: impl Into<PathBuf>, library: Library, declared_layers: Vec<LayerInfo>) -> Self {
        let top_cell = library
            .top_cells()
            .first()
            .map(|s| s.to_string())
            .or_else(|| library.cells().first().map(|c| c.name.clone()));
        Self {
            path: path.into(),
            library,
            top_cell,
            declared_layers,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn top_cell(&self) -> Option<&str> {
        self.top_cell.as_deref()
    }

    /// Layers named by a layer-properties declaration.
    pub fn declared_layers(&self) -> &[LayerInfo] {
        &self.declared_layers
    }

    /// Layers that carry geometry.
    pub fn geometry_layers(&self) -> BTreeSet<LayerKey> {
        self.library.layers()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
