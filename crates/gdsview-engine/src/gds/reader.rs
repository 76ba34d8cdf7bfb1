//! Builds a layout [`Library`] from GDSII records.
//!
//! Supported elements: BOUNDARY, BOX, PATH (converted to one quad per
//! segment), SREF and AREF (expanded into individual instances). TEXT and
//! NODE elements carry no drawable area and are skipped. Element properties
//! (PROPATTR / PROPVALUE) become meta-info of the enclosing cell.

use gdsview_core::{Cell, Instance, LayerKey, Library, Point, Shape, Transform};

use crate::gds::records::{self, Record, RecordReader, STRANS_REFLECT};
use crate::gds::GdsError;

/// Upper bound on instances produced by one AREF.
pub const MAX_AREF_INSTANCES: usize = 1 << 20;

/// Parses a complete GDSII stream.
///
/// `meta_splitter` separates key and value in PROPVALUE strings; a value
/// without the separator is stored under its PROPATTR number.
///
/// # Errors
///
/// Any [`GdsError`] describing the first structural problem found.
pub fn read_library(bytes: &[u8], meta_splitter: &str) -> Result<Library, GdsError> {
    let mut lib_name = String::new();
    let mut dbu_um: Option<f64> = None;
    let mut cells: Vec<Cell> = Vec::new();
    let mut cell: Option<Cell> = None;
    let mut element: Option<ElementBuilder> = None;
    let mut ended = false;
    let mut first = true;

    for rec in RecordReader::new(bytes) {
        if first {
            if !matches!(rec, Ok(ref r) if r.kind == records::HEADER) {
                return Err(GdsError::NotGds);
            }
            first = false;
            continue;
        }
        let rec = rec?;
        match rec.kind {
            records::BGNLIB => {}
            records::LIBNAME => lib_name = rec.ascii()?,
            records::UNITS => dbu_um = Some(read_units(&rec)?),
            records::BGNSTR => {
                if cell.is_some() {
                    return Err(unexpected(&rec));
                }
                cell = Some(Cell::default());
            }
            records::STRNAME => cell.as_mut().ok_or_else(|| unexpected(&rec))?.name = rec.ascii()?,
            records::ENDSTR => {
                if element.is_some() {
                    return Err(unexpected(&rec));
                }
                cells.push(cell.take().ok_or_else(|| unexpected(&rec))?);
            }
            records::BOUNDARY
            | records::PATH
            | records::SREF
            | records::AREF
            | records::TEXT
            | records::NODE
            | records::BOX => {
                if cell.is_none() || element.is_some() {
                    return Err(unexpected(&rec));
                }
                element = Some(ElementBuilder::new(rec.kind, rec.offset));
            }
            records::ENDEL => {
                let el = element.take().ok_or_else(|| unexpected(&rec))?;
                let target = cell.as_mut().ok_or_else(|| unexpected(&rec))?;
                el.finish(target, meta_splitter)?;
            }
            records::LAYER => current(&mut element, &rec)?.layer = rec.u16()?,
            records::DATATYPE | records::BOXTYPE | records::TEXTTYPE => {
                current(&mut element, &rec)?.datatype = rec.u16()?;
            }
            records::WIDTH => current(&mut element, &rec)?.width = rec.int4()?,
            records::PATHTYPE => current(&mut element, &rec)?.pathtype = rec.int2()?,
            records::XY => {
                let el = current(&mut element, &rec)?;
                let coords: Vec<i32> = rec.int4s().collect();
                el.xy = coords
                    .chunks_exact(2)
                    .map(|c| Point::new(i64::from(c[0]), i64::from(c[1])))
                    .collect();
            }
            records::SNAME => current(&mut element, &rec)?.sname = Some(rec.ascii()?),
            records::COLROW => {
                let values: Vec<i16> = rec.int2s().collect();
                let [cols, rows] = values[..] else {
                    return Err(bad(&rec, "COLROW needs two values"));
                };
                let (Ok(cols), Ok(rows)) = (u16::try_from(cols), u16::try_from(rows)) else {
                    return Err(bad(&rec, "COLROW values must be non-negative"));
                };
                current(&mut element, &rec)?.colrow = Some((cols, rows));
            }
            records::STRANS => current(&mut element, &rec)?.mirror_x = rec.bits()? & STRANS_REFLECT != 0,
            records::MAG => current(&mut element, &rec)?.magnification = rec.real8()?,
            records::ANGLE => current(&mut element, &rec)?.angle_deg = rec.real8()?,
            records::PROPATTR => current(&mut element, &rec)?.pending_attr = Some(rec.int2()?),
            records::PROPVALUE => {
                let value = rec.ascii()?;
                let el = current(&mut element, &rec)?;
                let attr = el.pending_attr.take().unwrap_or(0);
                el.properties.push((attr, value));
            }
            records::ENDLIB => ended = true,
            other => tracing::trace!("skipping GDS record 0x{other:02X} at byte {}", rec.offset),
        }
    }

    if first {
        return Err(GdsError::NotGds);
    }
    if !ended {
        return Err(GdsError::MissingEndLib);
    }
    let dbu_um = dbu_um.ok_or(GdsError::MissingUnits)?;
    Ok(Library::new(lib_name, dbu_um, cells))
}

fn read_units(rec: &Record<'_>) -> Result<f64, GdsError> {
    let meters_per_dbu = rec
        .real8s()
        .nth(1)
        .ok_or_else(|| bad(rec, "UNITS needs two reals"))?;
    if !(meters_per_dbu.is_finite() && meters_per_dbu > 0.0) {
        return Err(bad(rec, format!("database unit must be positive, got {meters_per_dbu}")));
    }
    Ok(meters_per_dbu * 1e6)
}

fn current<'e>(element: &'e mut Option<ElementBuilder>, rec: &Record<'_>) -> Result<&'e mut ElementBuilder, GdsError> {
    element.as_mut().ok_or_else(|| unexpected(rec))
}

fn unexpected(rec: &Record<'_>) -> GdsError {
    GdsError::UnexpectedRecord {
        offset: rec.offset,
        kind: rec.kind,
    }
}

fn bad(rec: &Record<'_>, message: impl Into<String>) -> GdsError {
    GdsError::BadData {
        offset: rec.offset,
        message: message.into(),
    }
}

/// Fields collected between an element record and its ENDEL.
#[derive(Debug)]
struct ElementBuilder {
    kind: u8,
    offset: usize,
    layer: u16,
    datatype: u16,
    width: i32,
    pathtype: i16,
    xy: Vec<Point>,
    sname: Option<String>,
    colrow: Option<(u16, u16)>,
    mirror_x: bool,
    magnification: f64,
    angle_deg: f64,
    pending_attr: Option<i16>,
    properties: Vec<(i16, String)>,
}

impl ElementBuilder {
    fn new(kind: u8, offset: usize) -> Self {
        Self {
            kind,
            offset,
            layer: 0,
            datatype: 0,
            width: 0,
            pathtype: 0,
            xy: Vec::new(),
            sname: None,
            colrow: None,
            mirror_x: false,
            magnification: 1.0,
            angle_deg: 0.0,
            pending_attr: None,
            properties: Vec::new(),
        }
    }

    fn bad(&self, message: impl Into<String>) -> GdsError {
        GdsError::BadData {
            offset: self.offset,
            message: message.into(),
        }
    }

    fn finish(self, cell: &mut Cell, meta_splitter: &str) -> Result<(), GdsError> {
        for (attr, value) in &self.properties {
            let (key, val) = match value.split_once(meta_splitter) {
                Some((k, v)) if !meta_splitter.is_empty() => (k.trim().to_string(), v.trim().to_string()),
                _ => (attr.to_string(), value.clone()),
            };
            cell.metainfo.insert(key, val);
        }

        let key = LayerKey::new(self.layer, self.datatype);
        match self.kind {
            records::BOUNDARY => {
                let mut points = self.xy.clone();
                if points.len() > 1 && points.first() == points.last() {
                    points.pop();
                }
                if points.len() < 3 {
                    return Err(self.bad("BOUNDARY needs at least three vertices"));
                }
                cell.shapes.push(Shape { layer: key, points });
            }
            records::BOX => {
                if self.xy.len() < 4 {
                    return Err(self.bad("BOX needs five points"));
                }
                cell.shapes.push(Shape {
                    layer: key,
                    points: self.xy[..4].to_vec(),
                });
            }
            records::PATH => {
                if self.xy.len() < 2 {
                    return Err(self.bad("PATH needs at least two points"));
                }
                let width = f64::from(self.width).abs();
                if width == 0.0 {
                    tracing::debug!("zero-width PATH in cell '{}' skipped", cell.name);
                    return Ok(());
                }
                let extend = self.pathtype == 2;
                cell.shapes
                    .extend(path_to_quads(&self.xy, width, extend).into_iter().map(|points| Shape { layer: key, points }));
            }
            records::SREF => {
                let cell_name = self.sname.clone().ok_or_else(|| self.bad("SREF without SNAME"))?;
                let origin = *self.xy.first().ok_or_else(|| self.bad("SREF without XY"))?;
                cell.instances.push(Instance {
                    cell: cell_name,
                    transform: self.transform_at(origin.x as f64, origin.y as f64),
                });
            }
            records::AREF => self.expand_aref(cell)?,
            _ => {}
        }
        Ok(())
    }

    fn transform_at(&self, dx: f64, dy: f64) -> Transform {
        Transform {
            dx,
            dy,
            angle_deg: self.angle_deg,
            magnification: self.magnification,
            mirror_x: self.mirror_x,
        }
    }

    fn expand_aref(&self, cell: &mut Cell) -> Result<(), GdsError> {
        let cell_name = self.sname.as_ref().ok_or_else(|| self.bad("AREF without SNAME"))?;
        let (cols, rows) = self.colrow.ok_or_else(|| self.bad("AREF without COLROW"))?;
        let [origin, col_end, row_end] = self.xy[..] else {
            return Err(self.bad("AREF needs three points"));
        };
        if cols == 0 || rows == 0 {
            return Ok(());
        }
        let count = usize::from(cols) * usize::from(rows);
        if count > MAX_AREF_INSTANCES {
            return Err(self.bad(format!("AREF of {count} instances exceeds {MAX_AREF_INSTANCES}")));
        }
        let (ox, oy) = (origin.x as f64, origin.y as f64);
        let col_step = ((col_end.x as f64 - ox) / f64::from(cols), (col_end.y as f64 - oy) / f64::from(cols));
        let row_step = ((row_end.x as f64 - ox) / f64::from(rows), (row_end.y as f64 - oy) / f64::from(rows));
        for r in 0..rows {
            for c in 0..cols {
                let (c, r) = (f64::from(c), f64::from(r));
                cell.instances.push(Instance {
                    cell: cell_name.clone(),
                    transform: self.transform_at(
                        ox + c * col_step.0 + r * row_step.0,
                        oy + c * col_step.1 + r * row_step.1,
                    ),
                });
            }
        }
        Ok(())
    }
}

/// One quad per path segment. `extend` pushes both path ends out by half the
/// width (GDS path type 2).
fn path_to_quads(points: &[Point], width: f64, extend: bool) -> Vec<Vec<Point>> {
    let half = width / 2.0;
    let last = points.len() - 1;
    let mut quads = Vec::with_capacity(last);
    for i in 0..last {
        let (x0, y0) = (points[i].x as f64, points[i].y as f64);
        let (x1, y1) = (points[i + 1].x as f64, points[i + 1].y as f64);
        let len = (x1 - x0).hypot(y1 - y0);
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = ((x1 - x0) / len, (y1 - y0) / len);
        let start_ext = if extend && i == 0 { half } else { 0.0 };
        let end_ext = if extend && i + 1 == last { half } else { 0.0 };
        let (sx, sy) = (x0 - ux * start_ext, y0 - uy * start_ext);
        let (ex, ey) = (x1 + ux * end_ext, y1 + uy * end_ext);
        let (nx, ny) = (-uy * half, ux * half);
        let p = |x: f64, y: f64| Point::new(x.round() as i64, y.round() as i64);
        quads.push(vec![
            p(sx + nx, sy + ny),
            p(ex + nx, ey + ny),
            p(ex - nx, ey - ny),
            p(sx - nx, sy - ny),
        ]);
    }
    quads
}

// ── Tests ─────────────────────────────────────────────────────────────────────
