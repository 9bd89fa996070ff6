//! Linking WGSL programs against uniform sets.
//!
//! Group 0 of every cloud program is its parameter group: one uniform struct
//! whose members are named after uniform keys, plus textures named after
//! texture cells. Linking reflects the WGSL with naga, checks every member
//! against the owning [`UniformSet`], and resolves names to cell indices
//! once. Packing a frame's uniform buffer afterwards touches no strings.
//!
//! Groups 1 and up belong to the pass (render target attachments) and are
//! not linked.

use naga::{AddressSpace, ImageDimension, ScalarKind, TypeInner, VectorSize};

use crate::error::{PipelineError, Result};
use crate::uniforms::{UniformKind, UniformSet};

/// Bind group index of the linked parameter group.
pub const PARAMETER_GROUP: u32 = 0;

/// Uniform buffers are sized in multiples of this.
const UNIFORM_SIZE_ALIGNMENT: u64 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureDimension {
    D2,
    D3,
}

impl TextureDimension {
    pub fn view_dimension(&self) -> wgpu::TextureViewDimension {
        match self {
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::D3 => wgpu::TextureViewDimension::D3,
        }
    }
}

/// A texture in the parameter group, bound from a texture cell.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureSlot {
    pub key: String,
    pub cell: usize,
    pub binding: u32,
    pub dimension: TextureDimension,
}

#[derive(Clone, Copy, Debug)]
struct MemberSlot {
    cell: usize,
    offset: usize,
}

/// A program whose parameter group has been resolved against a uniform set.
#[derive(Clone, Debug)]
pub struct LinkedProgram {
    name: String,
    uniform_binding: Option<u32>,
    buffer_size: u64,
    members: Vec<MemberSlot>,
    textures: Vec<TextureSlot>,
    samplers: Vec<u32>,
    cell_count: usize,
}

fn compatible_kinds(inner: &TypeInner) -> Option<&'static [UniformKind]> {
    match *inner {
        TypeInner::Scalar(s) if s.width == 4 => match s.kind {
            ScalarKind::Float => Some(&[UniformKind::Float]),
            ScalarKind::Sint => Some(&[UniformKind::Int]),
            // Uniform buffers cannot hold `bool`; flags travel as u32.
            ScalarKind::Uint => Some(&[UniformKind::Bool]),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float && scalar.width == 4 => {
            match size {
                VectorSize::Bi => Some(&[UniformKind::Vec2]),
                VectorSize::Tri => Some(&[UniformKind::Vec3, UniformKind::Color]),
                VectorSize::Quad => Some(&[UniformKind::Vec4]),
            }
        }
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar.kind == ScalarKind::Float && scalar.width == 4 => Some(&[UniformKind::Mat4]),
        _ => None,
    }
}

impl LinkedProgram {
    /// Parse `source` and link its parameter group against `set`.
    pub fn link(program: &str, source: &str, set: &UniformSet) -> Result<Self> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| PipelineError::ShaderParse {
            program: program.to_string(),
            message: e.emit_to_string(source),
        })?;

        let link_error = |key: &str, reason: String| PipelineError::ProgramLink {
            program: program.to_string(),
            key: key.to_string(),
            reason,
        };

        let mut linked = LinkedProgram {
            name: program.to_string(),
            uniform_binding: None,
            buffer_size: 0,
            members: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
            cell_count: set.len(),
        };

        for (_, global) in module.global_variables.iter() {
            let Some(binding) = &global.binding else { continue };
            if binding.group != PARAMETER_GROUP {
                continue;
            }
            let var_name = global.name.clone().unwrap_or_default();
            let ty = &module.types[global.ty];

            match (global.space, &ty.inner) {
                (AddressSpace::Uniform, TypeInner::Struct { members, span }) => {
                    if linked.uniform_binding.is_some() {
                        return Err(link_error(&var_name, "more than one uniform block in the parameter group".into()));
                    }
                    linked.uniform_binding = Some(binding.binding);
                    linked.buffer_size = u64::from(*span).div_ceil(UNIFORM_SIZE_ALIGNMENT) * UNIFORM_SIZE_ALIGNMENT;

                    for member in members {
                        let key = member.name.as_deref().unwrap_or_default();
                        let Some(cell) = set.index_of(key) else {
                            return Err(link_error(key, format!("not declared in uniform set '{}'", set.name())));
                        };
                        let declared = set.value_at(cell).kind();
                        let inner = &module.types[member.ty].inner;
                        let Some(accepted) = compatible_kinds(inner) else {
                            return Err(link_error(key, format!("unsupported member type {:?}", inner)));
                        };
                        if !accepted.contains(&declared) {
                            return Err(link_error(
                                key,
                                format!("declared as {:?}, program expects one of {:?}", declared, accepted),
                            ));
                        }
                        linked.members.push(MemberSlot {
                            cell,
                            offset: member.offset as usize,
                        });
                    }
                }
                (AddressSpace::Uniform, other) => {
                    return Err(link_error(&var_name, format!("uniform block must be a struct, found {:?}", other)));
                }
                (AddressSpace::Handle, TypeInner::Image { dim, arrayed: false, .. }) => {
                    let dimension = match dim {
                        ImageDimension::D2 => TextureDimension::D2,
                        ImageDimension::D3 => TextureDimension::D3,
                        other => {
                            return Err(link_error(&var_name, format!("unsupported texture dimension {:?}", other)));
                        }
                    };
                    let Some(cell) = set.index_of(&var_name) else {
                        return Err(link_error(&var_name, format!("not declared in uniform set '{}'", set.name())));
                    };
                    let declared = set.value_at(cell).kind();
                    if declared != UniformKind::Texture {
                        return Err(link_error(&var_name, format!("declared as {:?}, program expects a texture", declared)));
                    }
                    linked.textures.push(TextureSlot {
                        key: var_name,
                        cell,
                        binding: binding.binding,
                        dimension,
                    });
                }
                (AddressSpace::Handle, TypeInner::Sampler { comparison: false }) => {
                    linked.samplers.push(binding.binding);
                }
                (_, other) => {
                    return Err(link_error(&var_name, format!("unsupported parameter binding {:?}", other)));
                }
            }
        }

        log::debug!(
            "Linked program '{}': {} uniform members ({} bytes), {} textures",
            linked.name,
            linked.members.len(),
            linked.buffer_size,
            linked.textures.len()
        );
        Ok(linked)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binding of the uniform block in the parameter group, if the program has one.
    pub fn uniform_binding(&self) -> Option<u32> {
        self.uniform_binding
    }

    /// Size of the uniform buffer in bytes. Zero without a uniform block.
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    pub fn textures(&self) -> &[TextureSlot] {
        &self.textures
    }

    pub fn sampler_bindings(&self) -> &[u32] {
        &self.samplers
    }

    /// Pack the uniform block from `set` into `out`, replacing its contents.
    ///
    /// `set` must be the set the program was linked against (or a set with
    /// the same schema).
    pub fn pack(&self, set: &UniformSet, out: &mut Vec<u8>) {
        debug_assert_eq!(set.len(), self.cell_count, "program '{}' packed from a different set", self.name);
        out.clear();
        out.resize(self.buffer_size as usize, 0);
        for slot in &self.members {
            let value = set.value_at(slot.cell);
            value.write_bytes(&mut out[slot.offset..slot.offset + value.byte_size()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::UniformValue;

    const SOURCE: &str = r#"
struct Params {
    tint: vec3<f32>,
    scale: f32,
    transform: mat4x4<f32>,
    steps: i32,
    enabled: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var noise: texture_2d<f32>;
@group(0) @binding(2) var noise_sampler: sampler;
@group(1) @binding(0) var scene_depth: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let d = textureLoad(scene_depth, vec2<i32>(pos.xy), 0).r;
    let n = textureSampleLevel(noise, noise_sampler, pos.xy, 0.0).r;
    let on = f32(params.enabled) * f32(params.steps);
    return params.transform * vec4<f32>(params.tint * params.scale * n * on, d);
}
"#;

    fn matching_set() -> UniformSet {
        let mut set = UniformSet::new("test");
        set.declare("unused", UniformValue::Float(0.0)).unwrap();
        set.declare("scale", UniformValue::Float(2.0)).unwrap();
        set.declare("tint", UniformValue::color(0.25, 0.5, 0.75)).unwrap();
        set.declare("transform", glam::Mat4::from_scale(glam::Vec3::splat(3.0)).into()).unwrap();
        set.declare("steps", UniformValue::Int(-4)).unwrap();
        set.declare("enabled", UniformValue::Bool(true)).unwrap();
        set.declare("noise", UniformValue::Texture(None)).unwrap();
        set
    }

    fn f32_at(bytes: &[u8], offset: usize) -> f32 {
        f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_link_and_pack() {
        let set = matching_set();
        let program = LinkedProgram::link("test", SOURCE, &set).unwrap();
        assert_eq!(program.uniform_binding(), Some(0));
        assert_eq!(program.sampler_bindings(), &[2]);
        assert_eq!(program.textures().len(), 1);
        assert_eq!(program.textures()[0].key, "noise");
        assert_eq!(program.textures()[0].dimension, TextureDimension::D2);
        // vec3 + f32 share the first 16 bytes, mat4 at 16, then two scalars.
        assert_eq!(program.buffer_size(), 96);

        let mut bytes = Vec::new();
        program.pack(&set, &mut bytes);
        assert_eq!(bytes.len(), 96);
        assert_eq!(f32_at(&bytes, 0), 0.25);
        assert_eq!(f32_at(&bytes, 8), 0.75);
        assert_eq!(f32_at(&bytes, 12), 2.0);
        assert_eq!(f32_at(&bytes, 16), 3.0);
        assert_eq!(i32::from_ne_bytes(bytes[80..84].try_into().unwrap()), -4);
        assert_eq!(u32::from_ne_bytes(bytes[84..88].try_into().unwrap()), 1);
    }

    #[test]
    fn test_pack_tracks_set_changes() {
        let mut set = matching_set();
        let program = LinkedProgram::link("test", SOURCE, &set).unwrap();
        set.set("scale", UniformValue::Float(9.0)).unwrap();
        let mut bytes = Vec::new();
        program.pack(&set, &mut bytes);
        assert_eq!(f32_at(&bytes, 12), 9.0);
    }

    #[test]
    fn test_missing_key_fails_link() {
        let mut set = UniformSet::new("partial");
        set.declare("scale", UniformValue::Float(1.0)).unwrap();
        let err = LinkedProgram::link("test", SOURCE, &set).unwrap_err();
        match err {
            PipelineError::ProgramLink { program, key, .. } => {
                assert_eq!(program, "test");
                assert_eq!(key, "tint");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_kind_mismatch_fails_link() {
        let mut set = UniformSet::new("wrong");
        set.declare("tint", UniformValue::Vec2([0.0; 2])).unwrap();
        let err = LinkedProgram::link("test", SOURCE, &set).unwrap_err();
        assert!(matches!(err, PipelineError::ProgramLink { ref key, .. } if key == "tint"));
    }

    #[test]
    fn test_texture_must_be_texture_cell() {
        let set = matching_set();
        let mut wrong = UniformSet::new("wrong");
        for (key, cell) in set.entries() {
            let value = if key == "noise" { UniformValue::Float(0.0) } else { cell.value.clone() };
            wrong.declare(key, value).unwrap();
        }
        let err = LinkedProgram::link("test", SOURCE, &wrong).unwrap_err();
        assert!(matches!(err, PipelineError::ProgramLink { ref key, .. } if key == "noise"));
    }

    #[test]
    fn test_parse_error() {
        let set = matching_set();
        let err = LinkedProgram::link("broken", "fn main( {", &set).unwrap_err();
        assert!(matches!(err, PipelineError::ShaderParse { .. }));
    }
}
