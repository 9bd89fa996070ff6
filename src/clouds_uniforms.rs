//! Parameter tables for the cloud programs.
//!
//! Every cloud pass builds its [`UniformSet`] from these tables at
//! construction. The direct and low-res integrators declare the full cloud
//! table, so a [`SharedUniforms`] view over the live passes edits both with
//! one write.

use glam::{Vec2, Vec3};

use crate::camera::{Camera, Clock};
use crate::error::UniformError;
use crate::quality::undersampled_size;
use crate::shared_uniforms::SharedUniforms;
use crate::uniforms::{UniformSet, UniformValue};

pub const WORLD_CAMERA_POSITION: &str = "worldCameraPosition";
pub const VIEWPORT_SIZE_INVERSE: &str = "viewportSizeInverse";
pub const FULL_VIEWPORT_SIZE_INVERSE: &str = "fullViewportSizeInverse";
pub const WORLD_CAMERA_UNPROJECTION: &str = "worldCameraUnprojectionMatrix";
pub const VIEW_PROJECTION: &str = "viewProjectionMatrix";
pub const TIME_SECONDS: &str = "timeSeconds";
pub const DETAILS_OFFSET: &str = "detailsOffset";
pub const SUN_DIRECTION: &str = "sunDirection";
pub const UNDERSAMPLING: &str = "undersampling";
pub const DEPTH_BIAS: &str = "depthBias";
pub const NOISE_TEXTURE: &str = "noiseTexture";
pub const NOISE_VOLUME: &str = "noiseVolume";

/// Default sun direction before normalization.
const SUN_DIRECTION_DEFAULT: Vec3 = Vec3::ONE;

fn scalar(
    set: &mut UniformSet,
    key: &str,
    default: f32,
    range: (f32, f32),
    description: &str,
) -> Result<(), UniformError> {
    set.declare(key, UniformValue::Float(default))?
        .with_range(range.0, range.1)
        .with_description(description);
    Ok(())
}

fn color(set: &mut UniformSet, key: &str, rgb: [f32; 3], description: &str) -> Result<(), UniformError> {
    set.declare(key, UniformValue::Color(rgb))?.with_description(description);
    Ok(())
}

/// Inputs the pass refreshes from the camera, the clock and the display size.
fn declare_frame_inputs(set: &mut UniformSet) -> Result<(), UniformError> {
    set.declare(WORLD_CAMERA_POSITION, Vec3::ZERO.into())?;
    set.declare(VIEWPORT_SIZE_INVERSE, Vec2::ONE.into())?
        .with_description("Inverse size of the integrator's own target");
    set.declare(WORLD_CAMERA_UNPROJECTION, glam::Mat4::IDENTITY.into())?;
    set.declare(VIEW_PROJECTION, glam::Mat4::IDENTITY.into())?;
    set.declare(TIME_SECONDS, UniformValue::Float(0.0))?;
    set.declare(FULL_VIEWPORT_SIZE_INVERSE, Vec2::ONE.into())?
        .with_description("Inverse size of the full-resolution display");
    set.declare(UNDERSAMPLING, UniformValue::Int(1))?
        .with_description("Full-resolution pixels per integrator texel");
    Ok(())
}

/// Tunable cloud parameters shared by both integrator variants.
fn declare_cloud_parameters(set: &mut UniformSet) -> Result<(), UniformError> {
    set.declare(NOISE_TEXTURE, UniformValue::Texture(None))?
        .with_description("2D RG noise for the detail layer");
    set.declare(NOISE_VOLUME, UniformValue::Texture(None))?
        .with_description("3D spiral noise for the base shape");

    // Quality
    scalar(set, "ditherDepth", 1.0, (0.0, 1.0), "Ray start jitter, in minimum steps")?;
    scalar(set, "maxRMDistance", 10_000.0, (10_000.0, 50_000.0), "Maximum ray march distance")?;
    scalar(set, "minRMStep", 10.0, (0.04, 20.0), "Minimum ray march step")?;
    scalar(set, "rmStepScale", 1.0, (0.2, 4.0), "Step size multiplier")?;

    // Shape
    scalar(set, "densityThreshold", 4.0, (0.0, 10.0), "Raw density mapped to full opacity")?;
    scalar(set, "cloudsScale", 120.0, (1.0, 200.0), "Horizontal scale of the base shape")?;
    scalar(set, "cloudsAltitude", -110.0, (-1000.0, 1000.0), "Altitude of the densest layer (negated)")?;
    scalar(set, "cloudsAltitudeShift", -180.0, (-500.0, 500.0), "Additional altitude shift (negated)")?;
    scalar(set, "cloudsFloorAltitude", 40.0, (0.0, 500.0), "Lowest altitude with clouds")?;
    scalar(set, "cloudsCeilAltitude", 1000.0, (0.0, 1000.0), "Highest altitude with clouds")?;
    scalar(set, "cloudsFloorSmoothingRange", 100.0, (0.0, 500.0), "Fade-in distance above the floor")?;
    scalar(set, "cloudsCeilSmoothingRange", 100.0, (0.0, 500.0), "Fade-out distance below the ceiling")?;
    scalar(set, "cloudsTransitionalLayerScale", 1.95, (0.1, 2.5), "Vertical falloff around the dense layer")?;
    scalar(set, "transparencyThreshold", 0.3, (0.00001, 0.5), "Opacity at which the cloud depth is recorded")?;

    // Details
    scalar(set, "detailsScale", 36.0, (10.0, 70.0), "Scale of the detail noise")?;
    scalar(set, "detailsIntensity", 1.39, (1.0, 10.0), "Weight of the detail noise")?;
    set.declare(DETAILS_OFFSET, Vec3::ZERO.into())?
        .with_description("Wind offset applied to the detail noise");

    // Coloring
    color(set, "colorLowDensity", [0.874_509_8, 0.874_509_8, 0.796_078_43], "Color at the cloud edge")?;
    color(set, "colorHighDensity", [1.0, 1.0, 0.870_588_24], "Color deep inside the cloud")?;
    color(set, "colorSun", [0.19, 0.16, 0.0], "Sun light added on lit edges")?;
    scalar(set, "alpha1", 0.99, (0.9, 0.999), "Transmittance per unit near the edge")?;
    scalar(set, "alpha2", 0.95, (0.9, 0.999), "Transmittance per unit deep inside")?;
    scalar(set, "densityColorGradientLength", 100.0, (0.5, 150.0), "Depth over which the color blends")?;
    scalar(set, "densityAlphaGradientLength", 100.0, (0.5, 150.0), "Depth over which transmittance blends")?;

    // Sun
    set.declare(SUN_DIRECTION, SUN_DIRECTION_DEFAULT.normalize().into())?
        .with_description("Direction towards the sun, kept normalized");
    scalar(set, "sunCastDistance", 20.0, (10.0, 100.0), "Distance of the self-shadowing ray")?;

    // Fog
    color(set, "fogColor", [0.5, 0.0, 0.0], "Fog color")?;
    scalar(set, "fogTransparency", 0.99, (0.99, 0.9999), "Fog transmittance per unit distance")?;
    set.declare("fogEnabled", UniformValue::Bool(false))?
        .with_description("Blend fog into the clouds");
    Ok(())
}

/// Parameters of the full-resolution direct integrator.
pub fn direct_uniforms() -> Result<UniformSet, UniformError> {
    let mut set = UniformSet::new("clouds");
    declare_frame_inputs(&mut set)?;
    declare_cloud_parameters(&mut set)?;
    Ok(set)
}

/// Parameters of the low-res integrator and its depth downsample. Same
/// schema as [`direct_uniforms`].
pub fn low_res_uniforms() -> Result<UniformSet, UniformError> {
    let mut set = UniformSet::new("clouds_low_res");
    declare_frame_inputs(&mut set)?;
    declare_cloud_parameters(&mut set)?;
    Ok(set)
}

/// Parameters of the full-resolution merge.
pub fn merge_uniforms() -> Result<UniformSet, UniformError> {
    let mut set = UniformSet::new("clouds_merge");
    set.declare(UNDERSAMPLING, UniformValue::Int(1))?;
    set.declare(VIEWPORT_SIZE_INVERSE, Vec2::ONE.into())?;
    set.declare(DEPTH_BIAS, UniformValue::Float(0.0))?
        .with_range(0.0, 0.01)
        .with_description("Tolerance before clouds are hidden behind geometry");
    Ok(set)
}

/// Parameters of the edge antialiasing pass.
pub fn antialias_uniforms() -> Result<UniformSet, UniformError> {
    let mut set = UniformSet::new("antialias");
    set.declare(VIEWPORT_SIZE_INVERSE, Vec2::ONE.into())?;
    set.declare("edgeThreshold", UniformValue::Float(0.125))?
        .with_range(0.063, 0.333)
        .with_description("Relative luma contrast needed to smooth an edge");
    set.declare("edgeThresholdMin", UniformValue::Float(0.0312))?
        .with_range(0.0, 0.0833)
        .with_description("Absolute luma contrast below which edges are skipped");
    set.declare("subpixelBlend", UniformValue::Float(0.75))?
        .with_range(0.0, 1.0)
        .with_description("Strength of subpixel smoothing");
    Ok(set)
}

/// Refresh camera and time inputs. Keys the set does not declare are skipped.
pub fn update_frame_uniforms(set: &mut UniformSet, camera: &Camera, clock: &Clock) -> Result<(), UniformError> {
    let updates = [
        (WORLD_CAMERA_POSITION, UniformValue::from(camera.position)),
        (WORLD_CAMERA_UNPROJECTION, camera.unprojection_matrix().into()),
        (VIEW_PROJECTION, camera.view_projection().into()),
        (TIME_SECONDS, UniformValue::Float(clock.elapsed_seconds())),
    ];
    for (key, value) in updates {
        if set.contains(key) {
            set.set(key, value)?;
        }
    }
    Ok(())
}

fn inverse_size(width: u32, height: u32) -> Vec2 {
    Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32)
}

/// `viewportSizeInverse = (1/w, 1/h)`.
pub fn set_viewport(set: &mut UniformSet, width: u32, height: u32) -> Result<(), UniformError> {
    set.set(VIEWPORT_SIZE_INVERSE, inverse_size(width, height).into())
}

/// Size an integrator rendering a `full_width x full_height` display at
/// `1/factor` resolution. `viewportSizeInverse` covers its own
/// `ceil(full / factor)` target, `fullViewportSizeInverse` the display, so
/// every texel can cast its ray through the full-resolution pixel its depth
/// window is centred on.
pub fn set_integrator_viewport(
    set: &mut UniformSet,
    full_width: u32,
    full_height: u32,
    factor: u32,
) -> Result<(), UniformError> {
    let factor = factor.max(1);
    let (width, height) = undersampled_size(full_width, full_height, factor);
    set_viewport(set, width, height)?;
    set.set(FULL_VIEWPORT_SIZE_INVERSE, inverse_size(full_width, full_height).into())?;
    set.set(UNDERSAMPLING, UniformValue::Int(factor as i32))
}

/// Apply a configuration object and renormalize the sun direction if it was
/// written. A zero vector falls back to the default direction.
pub fn apply_overrides(
    shared: &mut SharedUniforms<'_>,
    overrides: &serde_json::Map<String, serde_json::Value>,
) -> Result<usize, UniformError> {
    let applied = shared.apply_json(overrides)?;
    if overrides.contains_key(SUN_DIRECTION) {
        normalize_sun_direction(shared)?;
    }
    Ok(applied)
}

pub fn normalize_sun_direction(shared: &mut SharedUniforms<'_>) -> Result<(), UniformError> {
    let Some(dir) = shared.get(SUN_DIRECTION).and_then(UniformValue::as_vec3) else {
        return Ok(());
    };
    let normalized = dir.try_normalize().unwrap_or_else(|| {
        log::warn!("sunDirection cannot be zero, using the default");
        SUN_DIRECTION_DEFAULT.normalize()
    });
    shared.set(SUN_DIRECTION, normalized.into())?;
    Ok(())
}
