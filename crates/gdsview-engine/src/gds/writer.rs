//! Minimal GDSII stream writer.
//!
//! Produces the subset of records the reader understands. Used to build
//! fixture files and to export generated layouts.

use gdsview_core::{Cell, Library};

use crate::gds::records::{self, data, f64_to_real8};

/// Appends GDSII records to an in-memory buffer.
#[derive(Debug, Default)]
pub struct GdsWriter {
    buf: Vec<u8>,
}

impl GdsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn record(&mut self, kind: u8, data_type: u8, payload: &[u8]) -> &mut Self {
        let len = (payload.len() + 4) as u16;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.push(kind);
        self.buf.push(data_type);
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn empty(&mut self, kind: u8) -> &mut Self {
        self.record(kind, data::NONE, &[])
    }

    pub fn int2(&mut self, kind: u8, values: &[i16]) -> &mut Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.record(kind, data::INT2, &payload)
    }

    pub fn int4(&mut self, kind: u8, values: &[i32]) -> &mut Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.record(kind, data::INT4, &payload)
    }

    pub fn bits(&mut self, kind: u8, value: u16) -> &mut Self {
        self.record(kind, data::BITARRAY, &value.to_be_bytes())
    }

    pub fn real8(&mut self, kind: u8, values: &[f64]) -> &mut Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| f64_to_real8(*v)).collect();
        self.record(kind, data::REAL8, &payload)
    }

    /// ASCII record, NUL-padded to even length.
    pub fn ascii(&mut self, kind: u8, value: &str) -> &mut Self {
        let mut payload = value.as_bytes().to_vec();
        if payload.len() % 2 != 0 {
            payload.push(0);
        }
        self.record(kind, data::ASCII, &payload)
    }

    /// XY record from points.
    pub fn xy(&mut self, points: &[(i32, i32)]) -> &mut Self {
        let flat: Vec<i32> = points.iter().flat_map(|&(x, y)| [x, y]).collect();
        self.int4(records::XY, &flat)
    }

    /// HEADER, BGNLIB, LIBNAME and UNITS.
    pub fn begin_library(&mut self, name: &str, dbu_um: f64) -> &mut Self {
        self.int2(records::HEADER, &[600])
            .int2(records::BGNLIB, &[0; 12])
            .ascii(records::LIBNAME, name)
            .real8(records::UNITS, &[dbu_um, dbu_um * 1e-6])
    }

    pub fn end_library(&mut self) -> &mut Self {
        self.empty(records::ENDLIB)
    }

    pub fn begin_cell(&mut self, name: &str) -> &mut Self {
        self.int2(records::BGNSTR, &[0; 12]).ascii(records::STRNAME, name)
    }

    pub fn end_cell(&mut self) -> &mut Self {
        self.empty(records::ENDSTR)
    }

    /// A closed BOUNDARY; the closing point is added here.
    pub fn boundary(&mut self, layer: i16, datatype: i16, points: &[(i32, i32)]) -> &mut Self {
        self.boundary_with_properties(layer, datatype, points, &[])
    }

    /// A closed BOUNDARY carrying PROPATTR/PROPVALUE pairs.
    pub fn boundary_with_properties(
        &mut self,
        layer: i16,
        datatype: i16,
        points: &[(i32, i32)],
        properties: &[(i16, &str)],
    ) -> &mut Self {
        let mut closed = points.to_vec();
        if let Some(&first) = points.first() {
            closed.push(first);
        }
        self.empty(records::BOUNDARY)
            .int2(records::LAYER, &[layer])
            .int2(records::DATATYPE, &[datatype])
            .xy(&closed);
        for (attr, value) in properties {
            self.int2(records::PROPATTR, &[*attr]).ascii(records::PROPVALUE, value);
        }
        self.empty(records::ENDEL)
    }

    /// Axis-aligned rectangle as a BOUNDARY.
    pub fn rect(&mut self, layer: i16, datatype: i16, x1: i32, y1: i32, x2: i32, y2: i32) -> &mut Self {
        self.boundary(layer, datatype, &[(x1, y1), (x2, y1), (x2, y2), (x1, y2)])
    }

    /// An SREF with optional rotation and reflection.
    pub fn sref(&mut self, cell: &str, at: (i32, i32), angle_deg: f64, mirror_x: bool) -> &mut Self {
        self.empty(records::SREF).ascii(records::SNAME, cell);
        if angle_deg != 0.0 || mirror_x {
            self.bits(records::STRANS, if mirror_x { records::STRANS_REFLECT } else { 0 });
            if angle_deg != 0.0 {
                self.real8(records::ANGLE, &[angle_deg]);
            }
        }
        self.xy(&[at]).empty(records::ENDEL)
    }

    /// Serializes a whole library. Cell meta-info is not written.
    pub fn write_library(library: &Library) -> Vec<u8> {
        let mut w = GdsWriter::new();
        w.begin_library(&library.name, library.dbu_um);
        for cell in library.cells() {
            w.write_cell(cell);
        }
        w.end_library();
        w.into_bytes()
    }

    fn write_cell(&mut self, cell: &Cell) {
        self.begin_cell(&cell.name);
        for shape in &cell.shapes {
            let pts: Vec<(i32, i32)> = shape.points.iter().map(|p| (p.x as i32, p.y as i32)).collect();
            self.boundary(shape.layer.layer as i16, shape.layer.datatype as i16, &pts);
        }
        for inst in &cell.instances {
            let t = &inst.transform;
            self.empty(records::SREF).ascii(records::SNAME, &inst.cell);
            if t.mirror_x || t.angle_deg != 0.0 || t.magnification != 1.0 {
                self.bits(records::STRANS, if t.mirror_x { records::STRANS_REFLECT } else { 0 });
                if t.magnification != 1.0 {
                    self.real8(records::MAG, &[t.magnification]);
                }
                if t.angle_deg != 0.0 {
                    self.real8(records::ANGLE, &[t.angle_deg]);
                }
            }
            self.xy(&[(t.dx as i32, t.dy as i32)]).empty(records::ENDEL);
        }
        self.end_cell();
    }
}
