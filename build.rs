// Compiles the GLSL sources in shaders/ to SPIR-V next to them.
// Without glslc the build continues with a warning; the shaders then have to
// be compiled by hand before the demo can create its pipelines.

use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: &[&str] = &[
    "renderer2d_triangle.vert",
    "renderer2d_triangle.frag",
    "renderer2d_line.vert",
    "renderer2d_line.frag",
    "renderer2d_ellipse.vert",
    "renderer2d_ellipse.frag",
    "framebuffer_present.vert",
    "framebuffer_present.frag",
];

fn main() {
    let dir = PathBuf::from("shaders");
    println!("cargo:rerun-if-changed={}", dir.display());
    for name in SHADERS {
        let source = dir.join(name);
        let spirv = dir.join(format!("{name}.spv"));
        if !glslc(&source, &spirv) {
            break;
        }
    }
}

/// Returns false when glslc is not installed.
fn glslc(source: &Path, spirv: &Path) -> bool {
    let status = Command::new("glslc")
        .arg("--target-env=vulkan1.3")
        .arg(source)
        .arg("-o")
        .arg(spirv)
        .status();

    match status {
        Ok(status) if status.success() => true,
        Ok(status) => panic!("glslc failed on {} ({status})", source.display()),
        Err(e) => {
            println!("cargo:warning=glslc unavailable ({e}); shaders/*.spv were not rebuilt");
            println!(
                "cargo:warning=run: glslc --target-env=vulkan1.3 {} -o {}",
                source.display(),
                spirv.display()
            );
            false
        }
    }
}
