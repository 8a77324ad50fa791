//! Scene construction boundary. A `SceneBuilder` turns the derived run values
//! into whatever the rendering host consumes; `ManifestBuilder` emits a plain
//! serializable description of the sculpture.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::derive::{light_brightness, point_radii, PointRadius, RunSummary};
use super::resize::resize_extent;
use super::{Params, PathPoint, RunVizError};

const CURVE_ROTATION: [f64; 3] = [1.57, 0.0, 0.0];
const OBJECT_LIFT: f64 = 3.0;
const LIGHT_DROP: f64 = 0.1;
const PLATFORM_SIZE: [f64; 3] = [100.0, 100.0, 5.0];
const CUT_BOX_SIZE: [f64; 3] = [100.0, 100.0, 100.0];
const CUT_BOX_CENTER: [f64; 3] = [0.0, 0.0, -47.5];
const TEXT_LOCATION: [f64; 3] = [-45.9648, 43.706, 2.5];
const TEXT_SCALE: [f64; 3] = [4.0, 4.0, 4.0];
const TEXT_EXTRUDE: f64 = 0.2;

pub trait SceneBuilder {
    type Artifact;

    fn build_scene(
        &self,
        points: &[PathPoint],
        widths: &[f64],
        summary: &RunSummary,
    ) -> Result<Self::Artifact, RunVizError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurveSpec {
    pub points: Vec<PathPoint>,
    pub radii: Vec<PointRadius>,
    pub extrude: f64,
    pub fill_caps: bool,
    pub rotation_euler: [f64; 3],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BodySpec {
    pub extrusion_distance: f64,
    pub lift: f64,
    pub footprint: (f64, f64),
    pub resize_factors: (f64, f64),
    pub resized_footprint: (f64, f64),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BoxSpec {
    pub size: [f64; 3],
    pub center: [f64; 3],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextSpec {
    pub body: String,
    pub location: [f64; 3],
    pub scale: [f64; 3],
    pub extrude: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LightSpec {
    pub location: PathPoint,
    pub brightness: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shader", rename_all = "snake_case")]
pub enum MaterialSpec {
    Glass { ior: f64, roughness: f64 },
    Principled { roughness: f64, emission_strength: Option<f64> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Materials {
    pub tube: MaterialSpec,
    pub text: MaterialSpec,
    pub platform: MaterialSpec,
}

impl Default for Materials {
    fn default() -> Self {
        Self {
            tube: MaterialSpec::Glass {
                ior: 1.45,
                roughness: 0.01,
            },
            text: MaterialSpec::Principled {
                roughness: 0.5,
                emission_strength: Some(0.4),
            },
            platform: MaterialSpec::Principled {
                roughness: 0.5,
                emission_strength: None,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneManifest {
    pub summary: RunSummary,
    pub curve: CurveSpec,
    pub body: BodySpec,
    pub cut_box: BoxSpec,
    pub platform: BoxSpec,
    pub text: TextSpec,
    pub lights: Vec<LightSpec>,
    pub materials: Materials,
}

/// Builds a `SceneManifest`. Lights need the pace series, which the scene
/// boundary does not otherwise carry.
pub struct ManifestBuilder<'a> {
    params: &'a Params,
    paces: &'a [f64],
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(params: &'a Params, paces: &'a [f64]) -> Self {
        Self { params, paces }
    }
}

impl SceneBuilder for ManifestBuilder<'_> {
    type Artifact = SceneManifest;

    fn build_scene(
        &self,
        points: &[PathPoint],
        widths: &[f64],
        summary: &RunSummary,
    ) -> Result<SceneManifest, RunVizError> {
        let params = self.params;
        params.validate()?;
        if self.paces.len() != points.len() {
            return Err(RunVizError::DimensionMismatch {
                what: "paces",
                expected: points.len(),
                actual: self.paces.len(),
            });
        }

        let radii = point_radii(points, widths, params.base_radius)?;
        let footprint = footprint(points, &radii, params.tube_extrude)?;
        let resize_factors = resize_extent(
            footprint,
            &params.resize_policy,
            params.obj_max,
            params.scale_max,
        );
        let resized_footprint = (
            footprint.0 * resize_factors.0,
            footprint.1 * resize_factors.1,
        );
        debug!(
            "Footprint {:.3} x {:.3} resized to {:.3} x {:.3}",
            footprint.0, footprint.1, resized_footprint.0, resized_footprint.1
        );

        let (min_b, max_b) = params.light_brightness;
        let lights = points
            .iter()
            .zip(light_brightness(self.paces, min_b, max_b)?)
            .map(|(point, brightness)| LightSpec {
                location: PathPoint::new(point.x, point.y - LIGHT_DROP, point.z),
                brightness,
            })
            .collect::<Vec<_>>();

        info!(
            "Scene manifest: {} curve points, {} lights",
            points.len(),
            lights.len()
        );

        Ok(SceneManifest {
            summary: summary.clone(),
            curve: CurveSpec {
                points: points.to_vec(),
                radii,
                extrude: params.tube_extrude,
                fill_caps: true,
                rotation_euler: CURVE_ROTATION,
            },
            body: BodySpec {
                extrusion_distance: summary.extrusion_distance,
                lift: OBJECT_LIFT,
                footprint,
                resize_factors,
                resized_footprint,
            },
            cut_box: BoxSpec {
                size: CUT_BOX_SIZE,
                center: CUT_BOX_CENTER,
            },
            platform: BoxSpec {
                size: PLATFORM_SIZE,
                center: [0.0; 3],
            },
            text: TextSpec {
                body: summary.engraving(&params.label),
                location: TEXT_LOCATION,
                scale: TEXT_SCALE,
                extrude: TEXT_EXTRUDE,
            },
            lights,
            materials: Materials::default(),
        })
    }
}

/// Horizontal bounding span of the tube, padded by its widest cross-section.
fn footprint(
    points: &[PathPoint],
    radii: &[PointRadius],
    tube_extrude: f64,
) -> Result<(f64, f64), RunVizError> {
    let span = |axis: fn(&PathPoint) -> f64| -> Result<f64, RunVizError> {
        let lo = points
            .iter()
            .map(|p| OrderedFloat(axis(p)))
            .min()
            .ok_or(RunVizError::EmptyInput("points"))?;
        let hi = points
            .iter()
            .map(|p| OrderedFloat(axis(p)))
            .max()
            .ok_or(RunVizError::EmptyInput("points"))?;
        Ok(hi.into_inner() - lo.into_inner())
    };
    let widest = radii
        .iter()
        .map(|r| OrderedFloat(r.radius))
        .max()
        .map(|r| r.into_inner())
        .unwrap_or(0.0);
    let pad = 2.0 * tube_extrude * widest;
    Ok((span(|p| p.x)? + pad, span(|p| p.z)? + pad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{derive::summarize, process_run, record::parse_run_record, ResizePolicy};

    fn fixture_manifest(params: &Params) -> SceneManifest {
        let record =
            parse_run_record(include_str!("../tests/data/sample_run.json").as_bytes()).unwrap();
        let run = process_run(&record, params).unwrap();
        let summary = summarize(&run).unwrap();
        ManifestBuilder::new(params, &run.paces)
            .build_scene(&run.points, &run.widths, &summary)
            .unwrap()
    }

    #[test]
    fn manifest_has_one_light_and_radius_per_point() {
        let manifest = fixture_manifest(&Params::default());
        assert_eq!(manifest.curve.points.len(), 8);
        assert_eq!(manifest.curve.radii.len(), 8);
        assert_eq!(manifest.lights.len(), 8);
        assert!((manifest.curve.radii[5].radius - 11.0).abs() < 1e-9);
        let first = manifest.lights[0];
        assert!((first.location.y - (0.0 - LIGHT_DROP)).abs() < 1e-12);
    }

    #[test]
    fn manifest_body_uses_extrusion_and_linear_resize() {
        let manifest = fixture_manifest(&Params::default());
        assert!((manifest.body.extrusion_distance + 0.8).abs() < 1e-12);
        // x span 22.039 plus 2 * 0.5 * 11 padding.
        assert!((manifest.body.footprint.0 - 33.039).abs() < 1e-9);
        let expected = 1.0 + (33.039 - 1.0) / 299.0 * 99.0;
        assert!((manifest.body.resized_footprint.0 - expected).abs() < 1e-9);
        assert!(manifest.text.body.starts_with("myRun!\n"));
    }

    #[test]
    fn manifest_respects_policy_choice() {
        let params = Params {
            resize_policy: ResizePolicy::Logarithmic { max_size: 100.0 },
            ..Params::default()
        };
        let manifest = fixture_manifest(&params);
        let (x, z) = manifest.body.resized_footprint;
        assert!((x.max(z) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn pace_count_must_match_points() {
        let params = Params::default();
        let points = [PathPoint::new(0.0, 0.0, 0.0), PathPoint::new(1.0, 0.0, 0.0)];
        let summary = RunSummary {
            start_coords: (0.0, 0.0),
            total_distance: 1.0,
            total_gain: 0.0,
            average_pace: 5.0,
            highest_point: 0.0,
            extrusion_distance: 0.0,
        };
        let paces = [0.2];
        let err = ManifestBuilder::new(&params, &paces)
            .build_scene(&points, &[1.0, 1.0], &summary)
            .unwrap_err();
        assert!(matches!(
            err,
            RunVizError::DimensionMismatch { what: "paces", .. }
        ));
    }

    #[test]
    fn manifest_serializes() {
        let manifest = fixture_manifest(&Params::default());
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"shader\":\"glass\""));
        assert!(json.contains("\"extrusion_distance\""));
    }
}
