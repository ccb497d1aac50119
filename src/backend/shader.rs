// SPIR-V loading
//
// Shaders are compiled by build.rs into `<shader_dir>/<name>.spv` and read at
// pipeline creation.

use super::VulkanDevice;
use crate::error::{GpuError, GpuResult};
use ash::vk;
use std::fs::File;
use std::path::{Path, PathBuf};

pub(super) fn shader_path(shader_dir: &Path, name: &str) -> PathBuf {
    shader_dir.join(format!("{name}.spv"))
}

pub(super) fn load_shader_module(dev: &VulkanDevice, name: &str) -> GpuResult<vk::ShaderModule> {
    let path = shader_path(&dev.shader_dir, name);
    let mut file = File::open(&path)
        .map_err(|e| GpuError::Shader(format!("{}: {e}", path.display())))?;
    // read_spv checks the length and fixes alignment for us
    let code = ash::util::read_spv(&mut file)
        .map_err(|e| GpuError::Shader(format!("{}: {e}", path.display())))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    let module = unsafe { dev.device.create_shader_module(&create_info, None) }?;
    log::debug!("loaded shader {}", path.display());
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_names_map_to_spv_files() {
        let path = shader_path(Path::new("shaders"), "renderer2d_line.vert");
        assert_eq!(path, Path::new("shaders").join("renderer2d_line.vert.spv"));
    }
}
