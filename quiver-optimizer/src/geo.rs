//! Cell-covering support for geo-predicate index selection.
//!
//! Storage keys geography values by quantized cells in Morton (Z-curve)
//! order at a fixed storage level; coarser covering cells therefore map to
//! contiguous key ranges. The covering here is a deterministic
//! quantized-grid model: the region's bounding box is covered at the
//! coarsest level that respects the configured cell budget.

use quiver_plan::hints::{IndexColumnHint, ScanKind};
use quiver_plan::value::Geography;
use quiver_plan::Value;

/// Storage-side quantization level; covering levels never exceed it.
const STORAGE_LEVEL: u8 = 12;

/// Rough degrees-per-meter at the equator, used by `d_within` expansion.
const DEGREES_PER_METER: f64 = 1.0 / 111_320.0;

#[derive(Debug, Clone, Copy)]
pub struct RegionCoverParams {
    pub max_cell_level: u8,
    pub max_cell_num: usize,
}

impl Default for RegionCoverParams {
    fn default() -> Self {
        RegionCoverParams {
            max_cell_level: 30,
            max_cell_num: 8,
        }
    }
}

/// A contiguous storage-key interval; `end` is exclusive, `None` for a
/// single-cell lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub begin: i64,
    pub end: Option<i64>,
}

impl ScanRange {
    pub fn to_column_hint(&self, column_name: &str) -> IndexColumnHint {
        match self.end {
            None => IndexColumnHint::prefix(column_name, Value::Int(self.begin)),
            Some(end) => IndexColumnHint {
                column_name: column_name.to_owned(),
                scan_kind: ScanKind::Range,
                begin_value: Some(Value::Int(self.begin)),
                end_value: Some(Value::Int(end)),
                include_begin: true,
                include_end: false,
            },
        }
    }
}

pub struct GeoIndex {
    params: RegionCoverParams,
    point_only: bool,
}

/// Interleave the low `level` bits of x and y into a Morton code.
fn morton(x: u32, y: u32, level: u8) -> i64 {
    let mut code: i64 = 0;
    for bit in (0..level).rev() {
        code = (code << 2)
            | (((x >> bit) & 1) as i64) << 1
            | ((y >> bit) & 1) as i64;
    }
    code
}

/// Quantize a coordinate in [lo, hi) to a `level`-bit grid index.
fn quantize(v: f64, lo: f64, hi: f64, level: u8) -> u32 {
    let cells = 1u64 << level;
    let clamped = v.clamp(lo, hi - f64::EPSILON);
    (((clamped - lo) / (hi - lo) * cells as f64) as u64).min(cells - 1) as u32
}

impl GeoIndex {
    pub fn new(params: RegionCoverParams, point_only: bool) -> Self {
        GeoIndex { params, point_only }
    }

    fn cover_level(&self, nx: u64, ny: u64) -> u8 {
        let mut level = self.params.max_cell_level.min(STORAGE_LEVEL);
        // Coarsen until the bounding box fits the cell budget.
        loop {
            let shift = (STORAGE_LEVEL - level) as u64;
            let cols = (nx >> shift) + 1;
            let rows = (ny >> shift) + 1;
            if (cols * rows) as usize <= self.params.max_cell_num || level == 0 {
                return level;
            }
            level -= 1;
        }
    }

    /// Covering cells of the region's bounding box, as storage-key ranges.
    fn cover(&self, geography: &Geography) -> Vec<ScanRange> {
        let (min_lng, min_lat, max_lng, max_lat) = geography.bounding_box();
        let x0 = quantize(min_lng, -180.0, 180.0, STORAGE_LEVEL);
        let x1 = quantize(max_lng, -180.0, 180.0, STORAGE_LEVEL);
        let y0 = quantize(min_lat, -90.0, 90.0, STORAGE_LEVEL);
        let y1 = quantize(max_lat, -90.0, 90.0, STORAGE_LEVEL);

        let level = self.cover_level((x1 - x0) as u64, (y1 - y0) as u64);
        let shift = STORAGE_LEVEL - level;

        let mut ranges = Vec::new();
        for cx in (x0 >> shift)..=(x1 >> shift) {
            for cy in (y0 >> shift)..=(y1 >> shift) {
                let begin = morton(cx, cy, level) << (2 * shift);
                if shift == 0 {
                    ranges.push(ScanRange { begin, end: None });
                } else {
                    ranges.push(ScanRange {
                        begin,
                        end: Some(begin + (1i64 << (2 * shift))),
                    });
                }
            }
        }
        ranges.sort_by_key(|r| r.begin);
        ranges.dedup();
        ranges.truncate(self.params.max_cell_num.max(1));
        ranges
    }

    /// Cells whose contents may intersect the region.
    pub fn intersects(&self, geography: &Geography) -> Vec<ScanRange> {
        self.cover(geography)
    }

    /// Cells containing shapes the region could cover. A point column can
    /// only be covered by cells inside the region itself.
    pub fn covered_by(&self, geography: &Geography) -> Vec<ScanRange> {
        self.cover(geography)
    }

    /// Cells of shapes that could cover the region: the covering cells
    /// plus their ancestors, since a large indexed shape is keyed by a
    /// coarse cell.
    pub fn covers(&self, geography: &Geography) -> Vec<ScanRange> {
        if self.point_only {
            // A point can cover something only by coinciding with it.
            return self.cover(geography);
        }
        let mut ranges = self.cover(geography);
        let (min_lng, min_lat, _, _) = geography.bounding_box();
        let x = quantize(min_lng, -180.0, 180.0, STORAGE_LEVEL);
        let y = quantize(min_lat, -90.0, 90.0, STORAGE_LEVEL);
        for level in (0..STORAGE_LEVEL.min(self.params.max_cell_level)).rev() {
            let shift = STORAGE_LEVEL - level;
            let begin = morton(x >> shift, y >> shift, level) << (2 * shift);
            ranges.push(ScanRange {
                begin,
                end: Some(begin + (1i64 << (2 * shift))),
            });
        }
        ranges.sort_by_key(|r| r.begin);
        ranges.dedup();
        ranges.truncate(self.params.max_cell_num.max(1));
        ranges
    }

    /// Cells within `meters` of the region.
    pub fn d_within(&self, geography: &Geography, meters: f64) -> Vec<ScanRange> {
        let (min_lng, min_lat, max_lng, max_lat) = geography.bounding_box();
        let pad = meters.max(0.0) * DEGREES_PER_METER;
        let expanded = Geography::Polygon(vec![
            quiver_plan::value::GeoPoint::new(min_lng - pad, min_lat - pad),
            quiver_plan::value::GeoPoint::new(max_lng + pad, min_lat - pad),
            quiver_plan::value::GeoPoint::new(max_lng + pad, max_lat + pad),
            quiver_plan::value::GeoPoint::new(min_lng - pad, max_lat + pad),
        ]);
        self.cover(&expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_plan::value::GeoPoint;

    fn point(lng: f64, lat: f64) -> Geography {
        Geography::Point(GeoPoint::new(lng, lat))
    }

    #[test]
    fn point_covering_is_a_single_cell() {
        let index = GeoIndex::new(RegionCoverParams::default(), true);
        let ranges = index.intersects(&point(10.0, 20.0));
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].end, None);
    }

    #[test]
    fn covering_is_deterministic() {
        let index = GeoIndex::new(RegionCoverParams::default(), false);
        let poly = Geography::Polygon(vec![
            GeoPoint::new(10.0, 20.0),
            GeoPoint::new(10.5, 20.0),
            GeoPoint::new(10.5, 20.5),
            GeoPoint::new(10.0, 20.5),
        ]);
        assert_eq!(index.intersects(&poly), index.intersects(&poly));
    }

    #[test]
    fn cell_budget_is_respected() {
        let params = RegionCoverParams {
            max_cell_level: 30,
            max_cell_num: 4,
        };
        let index = GeoIndex::new(params, false);
        let poly = Geography::Polygon(vec![
            GeoPoint::new(-10.0, -10.0),
            GeoPoint::new(40.0, -10.0),
            GeoPoint::new(40.0, 30.0),
            GeoPoint::new(-10.0, 30.0),
        ]);
        assert!(index.intersects(&poly).len() <= 4);
    }

    #[test]
    fn dwithin_expands_the_region() {
        let index = GeoIndex::new(RegionCoverParams::default(), false);
        let near = index.d_within(&point(10.0, 20.0), 1.0);
        let far = index.d_within(&point(10.0, 20.0), 500_000.0);
        assert!(far.len() >= near.len());
    }
}
