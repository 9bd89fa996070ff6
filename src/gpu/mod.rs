pub mod antialias_pass;
pub mod context;
pub mod fullscreen;
pub mod lowres_pass;
pub mod merge_pass;
pub mod mesh;
pub mod parameter_block;
pub mod pipeline_driver;
pub mod render_target;
pub mod scene_pass;
pub mod textures;
pub mod volumetric_pass;
