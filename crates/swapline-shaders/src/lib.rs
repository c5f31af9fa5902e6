//! Shaders for Swapline.
//!
//! The bundled GLSL shaders are compiled to SPIR-V at build time using
//! shaderc. [`compile_shader`] compiles other sources at runtime.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static TRIANGLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle_vert.spv"));
    pub static TRIANGLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle_frag.spv"));
    pub static FILL_COMP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/fill_comp.spv"));
}

/// Workgroup size of the fill compute shader in x and y.
pub const FILL_WORKGROUP_SIZE: u32 = 16;

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader compilation errors.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// shaderc could not be initialized.
    #[error("Shader compiler unavailable")]
    CompilerUnavailable,

    /// The source failed to compile.
    #[error("Failed to compile {name}: {message}")]
    Compilation { name: String, message: String },

    /// Bytecode is not a multiple of four bytes.
    #[error("SPIR-V length {0} is not a multiple of 4")]
    Misaligned(usize),

    /// Bytecode does not start with the SPIR-V magic number.
    #[error("{0} is not a SPIR-V module")]
    InvalidSpirv(String),
}

/// Pipeline stage a shader is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    fn kind(self) -> shaderc::ShaderKind {
        match self {
            Self::Vertex => shaderc::ShaderKind::Vertex,
            Self::Fragment => shaderc::ShaderKind::Fragment,
            Self::Compute => shaderc::ShaderKind::Compute,
        }
    }
}

/// Convert little-endian SPIR-V bytes to words.
pub fn bytes_to_spirv(bytes: &[u8]) -> Result<Vec<u32>, ShaderError> {
    if bytes.len() % 4 != 0 {
        return Err(ShaderError::Misaligned(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Compile GLSL `source` to SPIR-V for `stage`. `name` is used in error messages.
pub fn compile_shader(source: &str, stage: ShaderStage, name: &str) -> Result<Vec<u32>, ShaderError> {
    let compiler = shaderc::Compiler::new().ok_or(ShaderError::CompilerUnavailable)?;
    let mut options = shaderc::CompileOptions::new().ok_or(ShaderError::CompilerUnavailable)?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_2 as u32,
    );
    options.set_target_spirv(shaderc::SpirvVersion::V1_5);

    let artifact = compiler
        .compile_into_spirv(source, stage.kind(), name, "main", Some(&options))
        .map_err(|e| ShaderError::Compilation {
            name: name.to_string(),
            message: e.to_string(),
        })?;

    if artifact.get_num_warnings() > 0 {
        tracing::warn!("{}: {}", name, artifact.get_warning_messages());
    }

    Ok(artifact.as_binary().to_vec())
}

/// Words of an embedded module, converted and checked on first use.
fn load(
    cell: &'static OnceLock<Vec<u32>>,
    bytes: &[u8],
    name: &str,
) -> Result<&'static [u32], ShaderError> {
    if let Some(words) = cell.get() {
        return Ok(words);
    }
    let words = bytes_to_spirv(bytes)?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(ShaderError::InvalidSpirv(name.to_string()));
    }
    Ok(cell.get_or_init(|| words))
}

static TRIANGLE_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static TRIANGLE_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static FILL_COMP_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Vertex shader taking a `vec2` position and `vec4` color.
pub fn triangle_vertex_shader() -> Result<&'static [u32], ShaderError> {
    load(&TRIANGLE_VERT_SPIRV, spirv_bytes::TRIANGLE_VERT, "triangle.vert")
}

/// Fragment shader writing the interpolated vertex color.
pub fn triangle_fragment_shader() -> Result<&'static [u32], ShaderError> {
    load(&TRIANGLE_FRAG_SPIRV, spirv_bytes::TRIANGLE_FRAG, "triangle.frag")
}

/// Compute shader filling a packed `0xRRGGBBAA` buffer at set 0, binding 0.
///
/// Push constants: `width`, `height`, `iteration`, all `u32`.
pub fn fill_compute_shader() -> Result<&'static [u32], ShaderError> {
    load(&FILL_COMP_SPIRV, spirv_bytes::FILL_COMP, "fill.comp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_shaders_load() {
        for shader in [
            triangle_vertex_shader().unwrap(),
            triangle_fragment_shader().unwrap(),
            fill_compute_shader().unwrap(),
        ] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20, "Shader too small");
        }
    }

    #[test]
    fn compiles_at_runtime() {
        let source = "#version 450\nlayout(local_size_x = 1) in;\nvoid main() {}\n";
        let spirv = compile_shader(source, ShaderStage::Compute, "noop.comp").unwrap();
        assert_eq!(spirv[0], SPIRV_MAGIC);
    }

    #[test]
    fn reports_compile_errors() {
        let err = compile_shader("#version 450\nvoid main() { oops }\n", ShaderStage::Fragment, "bad.frag")
            .unwrap_err();
        match err {
            ShaderError::Compilation { name, message } => {
                assert_eq!(name, "bad.frag");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_misaligned_bytes() {
        assert!(matches!(
            bytes_to_spirv(&[1, 2, 3]),
            Err(ShaderError::Misaligned(3))
        ));
        assert_eq!(bytes_to_spirv(&[3, 2, 35, 7]).unwrap(), vec![SPIRV_MAGIC]);
    }

    #[test]
    fn broken_artifacts_are_reported() {
        static MISALIGNED: OnceLock<Vec<u32>> = OnceLock::new();
        static NOT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

        assert!(matches!(
            load(&MISALIGNED, &[3, 2, 35], "short.spv"),
            Err(ShaderError::Misaligned(3))
        ));
        assert!(MISALIGNED.get().is_none());

        match load(&NOT_SPIRV, &[0, 0, 0, 0], "zero.spv") {
            Err(ShaderError::InvalidSpirv(name)) => assert_eq!(name, "zero.spv"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(NOT_SPIRV.get().is_none());
    }
}
