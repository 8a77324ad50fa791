//! Raw activity files (FIT/GPX) to run records: parsing, fixed-interval
//! binning and normalisation onto the record's planar/width scales.

use chrono::{DateTime, Utc};
use ndarray::Array1;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::record::{Coordinates, GeoCoordinates, RunRecord, Sample};
use super::RunVizError;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const SEMICIRCLES_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Seconds since the first timestamp in the file.
    pub t: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub hr: Option<f64>,
    /// Cumulative distance in metres.
    pub dist: Option<f64>,
}

impl ActivityRecord {
    fn new(t: f64) -> Self {
        Self {
            t,
            ..Self::default()
        }
    }

    fn position(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// One fixed-length slice of an activity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityBin {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
    pub hr: Option<f64>,
    /// Distance covered inside the bin, in km.
    pub distance_km: f64,
    /// km per minute over the bin.
    pub pace: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    pub interval_s: f64,
    pub hr_floor: f64,
    pub hr_ceiling: f64,
    pub width_max: f64,
    pub min_point_spacing: Option<f64>,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            interval_s: 300.0,
            hr_floor: 130.0,
            hr_ceiling: 175.0,
            width_max: 10.0,
            min_point_spacing: None,
        }
    }
}

/// Parse FIT or GPX records from bytes using the provided format hint (extension).
pub fn parse_activity_records(
    input: &[u8],
    format: &str,
) -> Result<Vec<ActivityRecord>, RunVizError> {
    let format_lc = format.to_ascii_lowercase();
    if format_lc.ends_with(".fit") || format_lc == "fit" {
        parse_fit_records(input)
    } else if format_lc.ends_with(".gpx") || format_lc == "gpx" {
        parse_gpx_records(input)
    } else {
        Err(RunVizError::UnsupportedFormat(format.to_string()))
    }
}

fn parse_fit_records(input: &[u8]) -> Result<Vec<ActivityRecord>, RunVizError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;
    let records = from_bytes(input).map_err(|e| RunVizError::FitParse(e.to_string()))?;
    let mut out = Vec::new();
    let mut t0: Option<DateTime<Utc>> = None;

    for record in records.into_iter() {
        if record.kind() != MesgNum::Record {
            continue;
        }
        let mut row = ActivityRecord::new(0.0);
        let mut has_timestamp = false;
        for field in record.fields() {
            match field.name() {
                "timestamp" => {
                    if let fitparser::Value::Timestamp(ts) = field.value() {
                        let utc = ts.with_timezone(&Utc);
                        let base = *t0.get_or_insert(utc);
                        row.t = (utc - base).num_milliseconds() as f64 / 1000.0;
                        has_timestamp = true;
                    }
                }
                "position_lat" => {
                    row.lat = fit_value_to_f64(field.value()).map(semicircles_to_degrees);
                }
                "position_long" => {
                    row.lon = fit_value_to_f64(field.value()).map(semicircles_to_degrees);
                }
                "altitude" | "enhanced_altitude" => {
                    if let Some(val) = fit_value_to_f64(field.value()) {
                        row.alt = Some(val);
                    }
                }
                "heart_rate" => {
                    row.hr = fit_value_to_f64(field.value());
                }
                "distance" | "enhanced_distance" => {
                    if let Some(val) = fit_value_to_f64(field.value()) {
                        row.dist = Some(val);
                    }
                }
                _ => {}
            }
        }
        if has_timestamp {
            out.push(row);
        }
    }

    debug!("Parsed {} FIT records", out.len());
    Ok(out)
}

/// FIT positions are stored as semicircles; anything already within degree
/// range is passed through.
fn semicircles_to_degrees(value: f64) -> f64 {
    if value.abs() > 180.0 {
        value * SEMICIRCLES_TO_DEGREES
    } else {
        value
    }
}

fn fit_value_to_f64(value: &fitparser::Value) -> Option<f64> {
    match value {
        fitparser::Value::Float32(v) => Some(*v as f64),
        fitparser::Value::Float64(v) => Some(*v),
        fitparser::Value::SInt16(v) => Some(*v as f64),
        fitparser::Value::UInt16(v) => Some(*v as f64),
        fitparser::Value::SInt32(v) => Some(*v as f64),
        fitparser::Value::UInt32(v) => Some(*v as f64),
        fitparser::Value::SInt64(v) => Some(*v as f64),
        fitparser::Value::UInt64(v) => Some(*v as f64),
        fitparser::Value::UInt16z(v) => Some(*v as f64),
        fitparser::Value::UInt32z(v) => Some(*v as f64),
        fitparser::Value::UInt64z(v) => Some(*v as f64),
        fitparser::Value::Byte(v) => Some(*v as f64),
        fitparser::Value::UInt8(v) => Some(*v as f64),
        fitparser::Value::UInt8z(v) => Some(*v as f64),
        fitparser::Value::SInt8(v) => Some(*v as f64),
        fitparser::Value::Array(values) => values.iter().find_map(fit_value_to_f64),
        _ => None,
    }
}

fn parse_gpx_records(input: &[u8]) -> Result<Vec<ActivityRecord>, RunVizError> {
    use gpx::read;
    use std::io::Cursor;

    let mut cursor = Cursor::new(input);
    let gpx = read(&mut cursor).map_err(|e| RunVizError::GpxParse(e.to_string()))?;
    let mut out = Vec::new();
    let mut base: Option<DateTime<Utc>> = None;
    let mut cumulative_dist = 0.0;
    let mut last_lat_lon: Option<(f64, f64)> = None;

    for track in gpx.tracks {
        for segment in track.segments {
            for point in segment.points {
                let Some(time) = point.time.as_ref() else {
                    continue;
                };
                let iso = time
                    .format()
                    .map_err(|e| RunVizError::GpxParse(e.to_string()))?;
                let utc = DateTime::parse_from_rfc3339(&iso)
                    .map_err(|e| RunVizError::GpxParse(e.to_string()))?
                    .with_timezone(&Utc);
                let start = *base.get_or_insert(utc);
                let mut record =
                    ActivityRecord::new((utc - start).num_milliseconds() as f64 / 1000.0);
                record.alt = point.elevation;
                let point_geo = point.point();
                let lat = point_geo.y();
                let lon = point_geo.x();
                if let Some((last_lat, last_lon)) = last_lat_lon {
                    cumulative_dist += haversine_distance(last_lat, last_lon, lat, lon);
                }
                record.lat = Some(lat);
                record.lon = Some(lon);
                record.dist = Some(cumulative_dist);
                last_lat_lon = Some((lat, lon));
                out.push(record);
            }
        }
    }
    debug!("Parsed {} GPX points", out.len());
    Ok(out)
}

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Equirectangular projection of `current` in metres relative to `start`.
pub fn gcs_to_cartesian(start: (f64, f64), current: (f64, f64)) -> (f64, f64) {
    let (start_lat, start_lon) = (start.0.to_radians(), start.1.to_radians());
    let (cur_lat, cur_lon) = (current.0.to_radians(), current.1.to_radians());
    let x = EARTH_RADIUS_M * (cur_lon - start_lon) * ((start_lat + cur_lat) / 2.0).cos();
    let y = EARTH_RADIUS_M * (cur_lat - start_lat);
    (x, y)
}

#[derive(Clone, Debug)]
struct Track {
    times: Array1<f64>,
    distance: Array1<f64>,
    positions: Vec<(f64, f64)>,
    altitude: Vec<Option<f64>>,
    hr: Vec<Option<f64>>,
}

impl Track {
    fn len(&self) -> usize {
        self.times.len()
    }
}

fn build_track(records: &[ActivityRecord]) -> Track {
    let mut rows: Vec<(&ActivityRecord, (f64, f64))> = records
        .iter()
        .filter_map(|r| r.position().map(|pos| (r, pos)))
        .collect();
    rows.sort_by_key(|(r, _)| OrderedFloat(r.t));

    let mut times = Vec::with_capacity(rows.len());
    let mut distance = Vec::with_capacity(rows.len());
    let mut positions = Vec::with_capacity(rows.len());
    let mut altitude = Vec::with_capacity(rows.len());
    let mut hr = Vec::with_capacity(rows.len());
    let mut total = 0.0_f64;
    let mut last_pos: Option<(f64, f64)> = None;
    // One distance source per file: recorded distance when any record has it.
    let recorded = rows.iter().any(|(r, _)| r.dist.is_some());

    for (record, pos) in rows {
        total = if recorded {
            record.dist.map_or(total, |d| d.max(total))
        } else if let Some((lat, lon)) = last_pos {
            total + haversine_distance(lat, lon, pos.0, pos.1)
        } else {
            total
        };
        last_pos = Some(pos);
        times.push(record.t);
        distance.push(total);
        positions.push(pos);
        altitude.push(record.alt);
        hr.push(record.hr);
    }

    Track {
        times: Array1::from_vec(times),
        distance: Array1::from_vec(distance),
        positions,
        altitude,
        hr,
    }
}

/// Split an activity into consecutive `interval_s` bins. Each bin takes the
/// position of its first record, the mean heart rate of its records, and the
/// distance covered since the previous bin. Bins without movement are dropped,
/// except the first one, which anchors the start and takes the pace of the
/// first moving bin.
pub fn bin_activity(
    records: &[ActivityRecord],
    interval_s: f64,
) -> Result<Vec<ActivityBin>, RunVizError> {
    if !(interval_s > 0.0) {
        return Err(RunVizError::InvalidParameter(format!(
            "bin interval must be positive, got {interval_s}"
        )));
    }
    let track = build_track(records);
    if track.len() == 0 {
        return Err(RunVizError::EmptyInput("positioned activity records"));
    }
    let skipped = records.len() - track.len();
    if skipped > 0 {
        warn!("Skipped {} records without a position", skipped);
    }

    let start = track.times[0];
    let minutes = interval_s / 60.0;
    let mut bins = Vec::new();
    let mut last_alt = track.altitude.iter().flatten().next().copied().unwrap_or(0.0);
    let mut prev_distance = track.distance[0];
    let mut i = 0;

    while i < track.len() {
        let bin_index = ((track.times[i] - start) / interval_s).floor();
        let bin_end = start + (bin_index + 1.0) * interval_s;
        let mut j = i;
        while j + 1 < track.len() && track.times[j + 1] < bin_end {
            j += 1;
        }

        if let Some(alt) = track.altitude[i..=j].iter().flatten().next() {
            last_alt = *alt;
        }
        let hr_values: Vec<f64> = track.hr[i..=j].iter().flatten().copied().collect();
        let hr = if hr_values.is_empty() {
            None
        } else {
            Some(hr_values.iter().sum::<f64>() / hr_values.len() as f64)
        };
        let distance_km = (track.distance[j] - prev_distance).max(0.0) / 1000.0;
        prev_distance = track.distance[j];
        let pace = if distance_km > 0.0 {
            distance_km / minutes
        } else {
            0.0
        };
        let (lat, lon) = track.positions[i];
        bins.push(ActivityBin {
            lat,
            lon,
            altitude: last_alt,
            hr,
            distance_km,
            pace,
        });
        i = j + 1;
    }

    let moving_pace = bins
        .iter()
        .find(|b| b.distance_km > 0.0)
        .map(|b| b.pace)
        .ok_or(RunVizError::EmptyInput("moving activity bins"))?;
    let total_bins = bins.len();
    let bins: Vec<ActivityBin> = bins
        .into_iter()
        .enumerate()
        .filter_map(|(k, mut bin)| {
            if bin.distance_km > 0.0 {
                Some(bin)
            } else if k == 0 {
                bin.pace = moving_pace;
                Some(bin)
            } else {
                None
            }
        })
        .collect();
    if bins.len() < total_bins {
        debug!("Dropped {} bins without movement", total_bins - bins.len());
    }

    debug!("Binned {} records into {} bins", track.len(), bins.len());
    Ok(bins)
}

/// Build a run record from binned activity data.
pub fn normalize_activity(
    bins: &[ActivityBin],
    params: &NormalizeParams,
) -> Result<RunRecord, RunVizError> {
    let first = bins.first().ok_or(RunVizError::EmptyInput("activity bins"))?;
    if !(params.hr_ceiling > params.hr_floor) {
        return Err(RunVizError::InvalidParameter(format!(
            "heart-rate range [{}, {}] is empty",
            params.hr_floor, params.hr_ceiling
        )));
    }
    let zero_altitude = bins
        .iter()
        .map(|b| OrderedFloat(b.altitude))
        .min()
        .map(|a| a.into_inner().trunc() as i64)
        .unwrap_or(0);
    let start = (first.lat, first.lon);
    let hr_span = params.hr_ceiling - params.hr_floor;

    let norm_points = bins
        .iter()
        .map(|bin| {
            let hr = bin
                .hr
                .unwrap_or(params.hr_floor)
                .clamp(params.hr_floor, params.hr_ceiling);
            let width = ((hr - params.hr_floor) / hr_span * params.width_max).trunc();
            let (x, y) = gcs_to_cartesian(start, (bin.lat, bin.lon));
            Sample {
                coordinates: Coordinates { x, y },
                altitude_from_zero: (bin.altitude.trunc() as i64 - zero_altitude) as f64,
                hr: width,
                pace: bin.pace,
                real_distance: bin.distance_km,
            }
        })
        .collect::<Vec<_>>();

    let mut record = RunRecord {
        starting_coordinates: GeoCoordinates {
            latitude: first.lat,
            longitude: first.lon,
        },
        ttl_distance: bins.iter().map(|b| b.distance_km).sum(),
        zero_altitude: Some(zero_altitude),
        norm_points,
    };
    if let Some(spacing) = params.min_point_spacing {
        record.remove_close_points(spacing);
    }
    Ok(record)
}
