use cloudlayer::clouds_uniforms::{
    antialias_uniforms, direct_uniforms, low_res_uniforms, merge_uniforms, NOISE_TEXTURE, NOISE_VOLUME,
};
use cloudlayer::gpu::{antialias_pass, lowres_pass, merge_pass, scene_pass, volumetric_pass};
use cloudlayer::program::{LinkedProgram, TextureDimension};
use cloudlayer::PipelineError;

/// Parse a WGSL program and run it through naga's validator.
fn compile_and_validate(name: &str, source: &str) -> Result<(), String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("WGSL parse error in {}: {}", name, e.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("Validation error in {}: {:?}", name, e))?;
    Ok(())
}

#[test]
fn test_all_programs_validate() {
    let programs = [
        ("clouds_direct", volumetric_pass::SOURCE),
        ("clouds_low_res", lowres_pass::SOURCE),
        ("depth_downsample", lowres_pass::DOWNSAMPLE_SOURCE),
        ("clouds_merge", merge_pass::SOURCE),
        ("antialias", antialias_pass::SOURCE),
        ("blit", antialias_pass::BLIT_SOURCE),
        ("scene", scene_pass::SOURCE),
    ];

    let errors: Vec<String> = programs
        .iter()
        .filter_map(|(name, source)| compile_and_validate(name, source).err())
        .collect();
    if !errors.is_empty() {
        panic!("{} programs failed:\n{}", errors.len(), errors.join("\n"));
    }
}

#[test]
fn test_programs_link_against_default_sets() {
    let direct = direct_uniforms().unwrap();
    let low_res = low_res_uniforms().unwrap();

    LinkedProgram::link("clouds_direct", volumetric_pass::SOURCE, &direct).unwrap();
    LinkedProgram::link("clouds_low_res", lowres_pass::SOURCE, &low_res).unwrap();
    LinkedProgram::link("depth_downsample", lowres_pass::DOWNSAMPLE_SOURCE, &low_res).unwrap();
    LinkedProgram::link("clouds_merge", merge_pass::SOURCE, &merge_uniforms().unwrap()).unwrap();
    LinkedProgram::link("antialias", antialias_pass::SOURCE, &antialias_uniforms().unwrap()).unwrap();
}

#[test]
fn test_cloud_program_parameter_group() {
    let set = direct_uniforms().unwrap();
    let program = LinkedProgram::link("clouds_direct", volumetric_pass::SOURCE, &set).unwrap();

    assert_eq!(program.uniform_binding(), Some(0));
    assert_eq!(program.buffer_size() % 16, 0);
    assert_eq!(program.sampler_bindings().len(), 1);

    let textures: Vec<(&str, TextureDimension)> = program
        .textures()
        .iter()
        .map(|slot| (slot.key.as_str(), slot.dimension))
        .collect();
    assert_eq!(
        textures,
        vec![(NOISE_TEXTURE, TextureDimension::D2), (NOISE_VOLUME, TextureDimension::D3)]
    );

    let mut bytes = Vec::new();
    program.pack(&set, &mut bytes);
    assert_eq!(bytes.len() as u64, program.buffer_size());
}

#[test]
fn test_direct_and_low_res_share_layout() {
    let direct = LinkedProgram::link("clouds_direct", volumetric_pass::SOURCE, &direct_uniforms().unwrap()).unwrap();
    let low_res = LinkedProgram::link("clouds_low_res", lowres_pass::SOURCE, &low_res_uniforms().unwrap()).unwrap();
    assert_eq!(direct.buffer_size(), low_res.buffer_size());
    assert_eq!(direct.textures().len(), low_res.textures().len());
}

#[test]
fn test_integrators_read_depth_as_float() {
    // Depth textures become shadow samplers on GL, where `textureLoad` on
    // them is rejected. Every pass reads depth through `texture_2d<f32>`.
    for (name, source) in [
        ("clouds_direct", volumetric_pass::SOURCE),
        ("clouds_low_res", lowres_pass::SOURCE),
        ("depth_downsample", lowres_pass::DOWNSAMPLE_SOURCE),
        ("clouds_merge", merge_pass::SOURCE),
    ] {
        assert!(!source.contains("texture_depth_2d"), "{name} declares a depth texture");
    }
}

#[test]
fn test_downsample_links_against_either_integrator_set() {
    LinkedProgram::link(
        "depth_downsample",
        lowres_pass::DOWNSAMPLE_SOURCE,
        &direct_uniforms().unwrap(),
    )
    .unwrap();
}

#[test]
fn test_merge_needs_depth_bias_key() {
    // The integrator sets have no `depthBias` cell.
    let err = LinkedProgram::link("clouds_merge", merge_pass::SOURCE, &direct_uniforms().unwrap())
        .unwrap_err();
    match err {
        PipelineError::ProgramLink { key, .. } => assert_eq!(key, "depthBias"),
        other => panic!("expected link error, got {other:?}"),
    }
}
