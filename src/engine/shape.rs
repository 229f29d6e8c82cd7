use crate::model::ShapePoint;

/// Orders a trip's shape points into a `(lat, lon)` polyline.
///
/// Points are kept one-for-one; equal sequence numbers keep their input order.
pub fn assemble_polyline(points: &[ShapePoint]) -> Vec<(f64, f64)> {
    let mut ordered = points.to_vec();
    ordered.sort_by_key(|p| p.sequence);
    ordered.into_iter().map(|p| (p.lat, p.lon)).collect()
}
