use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RunVizError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Planar position in metres relative to the run's starting point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub coordinates: Coordinates,
    /// Metres above the run's lowest altitude.
    pub altitude_from_zero: f64,
    /// Heart rate already mapped onto the width scale.
    #[serde(rename = "HR")]
    pub hr: f64,
    pub pace: f64,
    pub real_distance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub starting_coordinates: GeoCoordinates,
    pub ttl_distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_altitude: Option<i64>,
    pub norm_points: Vec<Sample>,
}

/// Parse a run record from JSON bytes.
pub fn parse_run_record(input: &[u8]) -> Result<RunRecord, RunVizError> {
    let record: RunRecord =
        serde_json::from_slice(input).map_err(|e| RunVizError::MalformedInput(e.to_string()))?;
    if record.norm_points.is_empty() {
        return Err(RunVizError::MalformedInput(
            "normPoints must contain at least one sample".into(),
        ));
    }
    Ok(record)
}

impl RunRecord {
    pub fn to_json_pretty(&self) -> Result<String, RunVizError> {
        serde_json::to_string_pretty(self).map_err(|e| RunVizError::MalformedInput(e.to_string()))
    }

    /// Drop interior samples that sit within `min_distance` of a sample that
    /// was already kept. The first and last samples always survive.
    pub fn remove_close_points(&mut self, min_distance: f64) {
        if self.norm_points.len() <= 2 {
            return;
        }
        let before = self.norm_points.len();
        let last = self.norm_points.len() - 1;
        let mut kept: Vec<Sample> = Vec::with_capacity(before);
        kept.push(self.norm_points[0].clone());

        for sample in &self.norm_points[1..last] {
            let far_enough = kept.iter().all(|other| {
                let dx = sample.coordinates.x - other.coordinates.x;
                let dy = sample.coordinates.y - other.coordinates.y;
                (dx * dx + dy * dy).sqrt() >= min_distance
            });
            if far_enough {
                kept.push(sample.clone());
            }
        }
        kept.push(self.norm_points[last].clone());

        debug!(
            "Close-point thinning kept {} of {} samples",
            kept.len(),
            before
        );
        self.norm_points = kept;
    }
}
