//! Scalar and per-point values derived from an ingested run.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{NormalizedRun, PathPoint, RunVizError};

/// Direction used when a point has no usable neighbour.
const FALLBACK_DIRECTION: [f64; 2] = [1.0, 0.0];

/// Highest value on the up axis across the path.
pub fn highest_point(points: &[PathPoint]) -> Result<f64, RunVizError> {
    points
        .iter()
        .map(|p| OrderedFloat(p.y))
        .max()
        .map(|v| v.into_inner())
        .ok_or(RunVizError::EmptyInput("points"))
}

/// Distance the solid body is pushed down so that it spans from the path's
/// peak through the base plane before being cut flat.
pub fn extrusion_distance(points: &[PathPoint]) -> Result<f64, RunVizError> {
    Ok(highest_point(points)? * -2.0)
}

/// Total climbed elevation: the sum of positive deltas in recorded order.
pub fn altitude_gain(altitudes: &[f64]) -> f64 {
    altitudes
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .sum()
}

/// Reciprocal of the mean pace. Paces are distance per minute, so the result
/// reads as minutes per distance unit.
pub fn average_pace(paces: &[f64]) -> Result<f64, RunVizError> {
    if paces.is_empty() {
        return Err(RunVizError::EmptyInput("paces"));
    }
    if let Some((index, &pace)) = paces
        .iter()
        .enumerate()
        .find(|(_, &p)| !(p > 0.0) || !p.is_finite())
    {
        return Err(RunVizError::InvalidPace { index, pace });
    }
    let mean = paces.iter().sum::<f64>() / paces.len() as f64;
    Ok(1.0 / mean)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointRadius {
    /// Unit normal in the horizontal plane, perpendicular to travel.
    pub normal: [f64; 2],
    pub radius: f64,
}

/// Per-point tube radius. Each point's width is applied along the in-plane
/// normal of its travel direction, taken from the previous point when there
/// is one and from the next point otherwise.
pub fn point_radii(
    points: &[PathPoint],
    widths: &[f64],
    base_radius: f64,
) -> Result<Vec<PointRadius>, RunVizError> {
    if points.is_empty() {
        return Err(RunVizError::EmptyInput("points"));
    }
    if widths.len() != points.len() {
        return Err(RunVizError::DimensionMismatch {
            what: "widths",
            expected: points.len(),
            actual: widths.len(),
        });
    }

    let last = points.len() - 1;
    let radii = points
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (point, &width))| {
            let direction = if i > 0 {
                unit_direction(points[i - 1].horizontal(), point.horizontal())
            } else if i < last {
                unit_direction(point.horizontal(), points[i + 1].horizontal())
            } else {
                FALLBACK_DIRECTION
            };
            let normal = [-direction[1], direction[0]];
            let length = normal[0].hypot(normal[1]);
            PointRadius {
                normal,
                radius: base_radius + width * length,
            }
        })
        .collect();
    Ok(radii)
}

fn unit_direction(from: [f64; 2], to: [f64; 2]) -> [f64; 2] {
    let dx = to[0] - from[0];
    let dy = to[1] - from[1];
    let len = dx.hypot(dy);
    if len > f64::EPSILON {
        [dx / len, dy / len]
    } else {
        FALLBACK_DIRECTION
    }
}

/// Map each pace onto a light brightness: the lowest pace gets `max` and the
/// highest pace gets `min`.
pub fn light_brightness(paces: &[f64], min: f64, max: f64) -> Result<Vec<f64>, RunVizError> {
    let lo = paces
        .iter()
        .copied()
        .map(OrderedFloat)
        .min()
        .ok_or(RunVizError::EmptyInput("paces"))?
        .into_inner();
    let hi = paces
        .iter()
        .copied()
        .map(OrderedFloat)
        .max()
        .ok_or(RunVizError::EmptyInput("paces"))?
        .into_inner();
    let mut range = hi - lo;
    if range == 0.0 {
        range = 1.0;
    }
    Ok(paces
        .iter()
        .map(|&pace| max - ((pace - lo) / range) * (max - min))
        .collect())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub start_coords: (f64, f64),
    pub total_distance: f64,
    pub total_gain: f64,
    pub average_pace: f64,
    pub highest_point: f64,
    pub extrusion_distance: f64,
}

impl RunSummary {
    /// Multi-line text engraved on the platform.
    pub fn engraving(&self, label: &str) -> String {
        format!(
            "{label}\nTotal Distance: {:.2}km\nElevation Gain: {:.0}m\nAvg. Pace: {:.1}min/km",
            self.total_distance, self.total_gain, self.average_pace
        )
    }
}

pub fn summarize(run: &NormalizedRun) -> Result<RunSummary, RunVizError> {
    let highest = highest_point(&run.points)?;
    Ok(RunSummary {
        start_coords: run.start_coords,
        total_distance: run.total_distance,
        total_gain: altitude_gain(&run.altitudes),
        average_pace: average_pace(&run.paces)?,
        highest_point: highest,
        extrusion_distance: highest * -2.0,
    })
}
