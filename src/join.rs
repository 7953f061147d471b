use crate::error::{MapError, Result};
use crate::types::{Crs, JoinedRecord, PointSet, PolygonFeature, PolygonKind, PolygonLayer};
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BoundingRect, Coord, Intersects, Line, LineString, Point};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::BTreeMap;
use tracing::debug;

// Bounding box of one feature or ring segment, by position
struct Envelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for Envelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// A polygon layer with a bounding-box index, ready for point-in-polygon lookups.
pub struct IndexedLayer {
    layer: PolygonLayer,
    tree: RTree<Envelope>,
    areas: Vec<f64>,
}

impl IndexedLayer {
    /// Validates every boundary and builds the index.
    pub fn new(layer: PolygonLayer) -> Result<Self> {
        let mut envelopes = Vec::with_capacity(layer.features.len());
        let mut areas = Vec::with_capacity(layer.features.len());

        for (index, feature) in layer.features.iter().enumerate() {
            validate_boundary(feature)?;
            let rect = feature
                .boundary
                .bounding_rect()
                .ok_or_else(|| invalid(feature, "boundary has no extent"))?;
            envelopes.push(Envelope {
                index,
                aabb: corners(rect.min(), rect.max()),
            });
            areas.push(feature.boundary.unsigned_area());
        }

        debug!(
            "Indexed {} {} polygons",
            envelopes.len(),
            layer.kind.layer_name()
        );

        Ok(Self {
            tree: RTree::bulk_load(envelopes),
            areas,
            layer,
        })
    }

    pub fn layer(&self) -> &PolygonLayer {
        &self.layer
    }

    pub fn kind(&self) -> PolygonKind {
        self.layer.kind
    }

    pub fn crs(&self) -> &Crs {
        &self.layer.crs
    }

    /// Polygon covering `point` (boundary included). When several do, the one
    /// with the smallest area wins, then the earliest in layer order.
    pub fn locate(&self, point: &Point<f64>) -> Option<&PolygonFeature> {
        let envelope = AABB::from_point([point.x(), point.y()]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| {
                let feature = self.layer.features.get(candidate.index)?;
                feature
                    .boundary
                    .intersects(point)
                    .then_some((candidate.index, feature))
            })
            .min_by(|(a, _), (b, _)| {
                self.areas[*a]
                    .total_cmp(&self.areas[*b])
                    .then_with(|| a.cmp(b))
            })
            .map(|(_, feature)| feature)
    }
}

fn validate_boundary(feature: &PolygonFeature) -> Result<()> {
    if feature.boundary.0.is_empty() {
        return Err(invalid(feature, "boundary is empty"));
    }
    for polygon in &feature.boundary {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for ring in rings {
            if ring.0.len() < 4 {
                return Err(invalid(feature, "ring has fewer than four coordinates"));
            }
            if !ring.is_closed() {
                return Err(invalid(feature, "ring is not closed"));
            }
            if !ring.coords().all(is_geographic) {
                return Err(invalid(feature, "coordinates are outside the geographic range"));
            }
            if self_intersects(ring) {
                return Err(invalid(feature, "ring intersects itself"));
            }
        }
    }
    Ok(())
}

fn is_geographic(c: &Coord<f64>) -> bool {
    c.x.is_finite()
        && c.y.is_finite()
        && (-180.0..=180.0).contains(&c.x)
        && (-90.0..=90.0).contains(&c.y)
}

fn corners(a: Coord<f64>, b: Coord<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([a.x, a.y], [b.x, b.y])
}

// Neighbouring segments may only share their common vertex; any other
// contact between two segments of a closed ring is a self-intersection.
fn self_intersects(ring: &LineString<f64>) -> bool {
    let segments: Vec<Line<f64>> = ring.lines().filter(|l| l.start != l.end).collect();
    let last = segments.len().saturating_sub(1);
    let tree = RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(index, l)| Envelope {
                index,
                aabb: corners(l.start, l.end),
            })
            .collect(),
    );

    segments.iter().enumerate().any(|(i, a)| {
        tree.locate_in_envelope_intersecting(&corners(a.start, a.end))
            .filter(|candidate| candidate.index > i)
            .any(|candidate| {
                let j = candidate.index;
                let adjacent = j == i + 1 || (i == 0 && j == last);
                match line_intersection(*a, segments[j]) {
                    None => false,
                    Some(LineIntersection::Collinear { .. }) => true,
                    Some(LineIntersection::SinglePoint { is_proper, .. }) => is_proper || !adjacent,
                }
            })
    })
}

fn invalid(feature: &PolygonFeature, reason: &str) -> MapError {
    MapError::InvalidGeometry {
        id: feature.assess_unit_id.clone(),
        reason: reason.to_string(),
    }
}

/// Left-outer containment join of `points` against one polygon layer.
///
/// Returns one record per input point, in input order.
pub fn join(points: &PointSet, layer: &IndexedLayer) -> Result<Vec<JoinedRecord>> {
    join_layers(points, &[layer])
}

/// Fails with `CrsMismatch` unless `layer` is expressed in `points`.
pub fn check_crs(points: &Crs, layer: &PolygonLayer) -> Result<()> {
    if &layer.crs != points {
        return Err(MapError::CrsMismatch {
            points: points.clone(),
            polygons: layer.crs.clone(),
        });
    }
    Ok(())
}

/// Joins `points` against several polygon layers at once; each record carries
/// one entry per layer.
pub fn join_layers(points: &PointSet, layers: &[&IndexedLayer]) -> Result<Vec<JoinedRecord>> {
    for layer in layers {
        check_crs(&points.crs, layer.layer())?;
    }

    let joined: Vec<JoinedRecord> = points
        .records
        .par_iter()
        .map(|record| {
            let point = record.point();
            let matches: BTreeMap<_, _> = layers
                .iter()
                .map(|layer| (layer.kind(), layer.locate(&point).map(PolygonFeature::identity)))
                .collect();
            JoinedRecord {
                point: record.clone(),
                matches,
            }
        })
        .collect();

    debug!(
        "Joined {} points against {} polygon layers",
        joined.len(),
        layers.len()
    );

    Ok(joined)
}
