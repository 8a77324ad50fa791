//! Core run-sculpture library: turns a recorded run into the path, widths and
//! summary values a scene builder needs to produce a printable run object.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod activity;
pub mod derive;
pub mod record;
pub mod resize;
pub mod scene;

pub use activity::{
    bin_activity, normalize_activity, parse_activity_records, ActivityBin, ActivityRecord,
    NormalizeParams,
};
pub use derive::{
    altitude_gain, average_pace, extrusion_distance, highest_point, light_brightness,
    point_radii, summarize, PointRadius, RunSummary,
};
pub use record::{parse_run_record, Coordinates, GeoCoordinates, RunRecord, Sample};
pub use resize::{resize_extent, resize_linear, ResizePolicy};
pub use scene::{ManifestBuilder, SceneBuilder, SceneManifest};

#[derive(Error, Debug)]
pub enum RunVizError {
    #[error("malformed run record: {0}")]
    MalformedInput(String),
    #[error("empty input: {0} must contain at least one value")]
    EmptyInput(&'static str),
    #[error("invalid pace {pace} at sample {index}: paces must be positive")]
    InvalidPace { index: usize, pace: f64 },
    #[error("dimension mismatch: {what} has {actual} values, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse FIT file: {0}")]
    FitParse(String),
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Divides the record's planar coordinates into geometry units.
    pub planar_divisor: f64,
    /// Multiplies `altitudeFromZero`; larger values give more dramatic relief.
    pub vertical_scale: f64,
    pub base_radius: f64,
    pub tube_extrude: f64,
    /// Largest footprint a run could theoretically reach.
    pub obj_max: f64,
    /// Upper bound of the display envelope.
    pub scale_max: f64,
    pub resize_policy: ResizePolicy,
    pub label: String,
    pub light_brightness: (f64, f64),
    pub min_point_spacing: Option<f64>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            planar_divisor: 100.0,
            vertical_scale: 0.02,
            base_radius: 1.0,
            tube_extrude: 0.5,
            obj_max: 300.0,
            scale_max: 100.0,
            resize_policy: ResizePolicy::Linear,
            label: "myRun!".to_string(),
            light_brightness: (10.0, 100.0),
            min_point_spacing: None,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), RunVizError> {
        if !(self.planar_divisor > 0.0) {
            return Err(RunVizError::InvalidParameter(format!(
                "planar_divisor must be positive, got {}",
                self.planar_divisor
            )));
        }
        if !(self.obj_max > 1.0) {
            return Err(RunVizError::InvalidParameter(format!(
                "obj_max must be greater than 1, got {}",
                self.obj_max
            )));
        }
        if !(self.scale_max >= 1.0) {
            return Err(RunVizError::InvalidParameter(format!(
                "scale_max must be at least 1, got {}",
                self.scale_max
            )));
        }
        let (min_b, max_b) = self.light_brightness;
        if min_b > max_b {
            return Err(RunVizError::InvalidParameter(format!(
                "light brightness range is inverted: {min_b} > {max_b}"
            )));
        }
        if let Some(spacing) = self.min_point_spacing {
            if !(spacing >= 0.0) {
                return Err(RunVizError::InvalidParameter(format!(
                    "min_point_spacing must not be negative, got {spacing}"
                )));
            }
        }
        self.resize_policy.validate()
    }
}

/// One point of the path in geometry space. `y` is the up axis and carries
/// scaled altitude; `x` and `z` come from the record's planar `x` and `y`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PathPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Projection onto the horizontal plane.
    pub fn horizontal(&self) -> [f64; 2] {
        [self.x, self.z]
    }
}

/// Parallel per-sample series produced by ingestion. Every vector has one
/// entry per sample, in recorded order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizedRun {
    pub start_coords: (f64, f64),
    pub total_distance: f64,
    pub points: Vec<PathPoint>,
    pub widths: Vec<f64>,
    pub paces: Vec<f64>,
    pub altitudes: Vec<f64>,
    pub real_distances: Vec<f64>,
}

impl NormalizedRun {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Convert a run record into parallel geometry series.
pub fn process_run(record: &RunRecord, params: &Params) -> Result<NormalizedRun, RunVizError> {
    if record.norm_points.is_empty() {
        return Err(RunVizError::MalformedInput(
            "normPoints must contain at least one sample".into(),
        ));
    }
    if !(params.planar_divisor > 0.0) {
        return Err(RunVizError::InvalidParameter(
            "planar_divisor must be positive".into(),
        ));
    }

    let n = record.norm_points.len();
    let mut points = Vec::with_capacity(n);
    let mut widths = Vec::with_capacity(n);
    let mut paces = Vec::with_capacity(n);
    let mut altitudes = Vec::with_capacity(n);
    let mut real_distances = Vec::with_capacity(n);

    for sample in &record.norm_points {
        let x = sample.coordinates.x / params.planar_divisor;
        let z = sample.coordinates.y / params.planar_divisor;
        let y = sample.altitude_from_zero * params.vertical_scale;
        points.push(PathPoint::new(x, y, z));
        widths.push(sample.hr);
        paces.push(sample.pace);
        altitudes.push(sample.altitude_from_zero);
        real_distances.push(sample.real_distance);
    }
    debug!("Ingested {} samples", n);

    Ok(NormalizedRun {
        start_coords: (
            record.starting_coordinates.latitude,
            record.starting_coordinates.longitude,
        ),
        total_distance: record.ttl_distance,
        points,
        widths,
        paces,
        altitudes,
        real_distances,
    })
}

/// Parse a run record file's bytes and ingest it in one step.
pub fn process_run_file(input: &[u8], params: &Params) -> Result<NormalizedRun, RunVizError> {
    let mut record = parse_run_record(input)?;
    if let Some(spacing) = params.min_point_spacing {
        record.remove_close_points(spacing);
    }
    process_run(&record, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f64, y: f64, alt: f64, hr: f64, pace: f64) -> Sample {
        Sample {
            coordinates: Coordinates { x, y },
            altitude_from_zero: alt,
            hr,
            pace,
            real_distance: 1.0,
        }
    }

    fn record(samples: Vec<Sample>) -> RunRecord {
        RunRecord {
            starting_coordinates: GeoCoordinates {
                latitude: 43.6,
                longitude: -79.4,
            },
            ttl_distance: 5.0,
            zero_altitude: None,
            norm_points: samples,
        }
    }

    #[test]
    fn process_run_swaps_axes_and_scales() {
        let rec = record(vec![sample(250.0, -100.0, 40.0, 3.0, 0.2)]);
        let run = process_run(&rec, &Params::default()).unwrap();
        let p = run.points[0];
        assert!((p.x - 2.5).abs() < 1e-12);
        assert!((p.y - 0.8).abs() < 1e-12);
        assert!((p.z + 1.0).abs() < 1e-12);
        assert_eq!(run.widths, vec![3.0]);
        assert_eq!(run.start_coords, (43.6, -79.4));
    }

    #[test]
    fn process_run_keeps_series_parallel() {
        let rec = record(
            (0..7)
                .map(|i| sample(i as f64 * 10.0, 0.0, i as f64, 1.0, 0.2))
                .collect(),
        );
        let run = process_run(&rec, &Params::default()).unwrap();
        assert_eq!(run.len(), 7);
        assert_eq!(run.widths.len(), 7);
        assert_eq!(run.paces.len(), 7);
        assert_eq!(run.altitudes.len(), 7);
        assert_eq!(run.real_distances.len(), 7);
        assert!(run.points.windows(2).all(|w| w[0].x < w[1].x));
    }

    #[test]
    fn process_run_rejects_empty_record() {
        let rec = record(Vec::new());
        assert!(matches!(
            process_run(&rec, &Params::default()),
            Err(RunVizError::MalformedInput(_))
        ));
    }

    #[test]
    fn vertical_scale_controls_relief() {
        let rec = record(vec![sample(0.0, 0.0, 50.0, 0.0, 0.2)]);
        let params = Params {
            vertical_scale: 0.01,
            ..Params::default()
        };
        let run = process_run(&rec, &params).unwrap();
        assert!((run.points[0].y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn nan_spacing_is_rejected() {
        let params = Params {
            min_point_spacing: Some(f64::NAN),
            ..Params::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RunVizError::InvalidParameter(_))
        ));
        let params = Params {
            min_point_spacing: Some(0.0),
            ..Params::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn default_params_validate() {
        assert!(Params::default().validate().is_ok());
        let bad = Params {
            obj_max: 1.0,
            ..Params::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(RunVizError::InvalidParameter(_))
        ));
    }
}
