//! Compiles `shaders/*.{vert,frag}` to SPIR-V with `glslc` from the Vulkan SDK.
//!
//! The output directory is exported as `RENDERER_SHADER_DIR`. Without `glslc`
//! the build still succeeds and the viewer needs prebuilt `.spv` files at the
//! paths in its config.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: [(&str, &str); 2] = [("mesh.vert", "vertex"), ("mesh.frag", "fragment")];

fn main() {
    let shader_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders");
    for (name, _) in SHADERS {
        println!("cargo:rerun-if-changed={}", shader_dir.join(name).display());
    }
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };
    let Some(glslc) = find_glslc() else {
        println!(
            "cargo:warning=glslc not found; install the Vulkan SDK or provide shaders/mesh.{{vert,frag}}.spv"
        );
        return;
    };

    let spirv_dir = out_dir.join("spirv");
    if let Err(e) = fs::create_dir_all(&spirv_dir) {
        println!("cargo:warning=cannot create {}: {}", spirv_dir.display(), e);
        return;
    }

    let mut compiled = true;
    for (name, stage) in SHADERS {
        compiled &= compile_shader(
            &glslc,
            &shader_dir.join(name),
            &spirv_dir.join(format!("{name}.spv")),
            stage,
        );
    }
    if compiled {
        println!("cargo:rustc-env=RENDERER_SHADER_DIR={}", spirv_dir.display());
    }
}

fn compile_shader(glslc: &Path, src: &Path, dst: &Path, stage: &str) -> bool {
    let output = Command::new(glslc)
        .arg(format!("-fshader-stage={stage}"))
        .args(["--target-env=vulkan1.3", "-O", "-o"])
        .arg(dst)
        .arg(src)
        .output();

    match output {
        Ok(result) if result.status.success() => true,
        Ok(result) => {
            println!(
                "cargo:warning=glslc failed on {}: {}",
                src.display(),
                String::from_utf8_lossy(&result.stderr)
            );
            false
        }
        Err(e) => {
            println!("cargo:warning=failed to run glslc: {e}");
            false
        }
    }
}

/// `glslc` on PATH, else under `VULKAN_SDK`.
fn find_glslc() -> Option<PathBuf> {
    if Command::new("glslc")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
    {
        return Some(PathBuf::from("glslc"));
    }
    let sdk = PathBuf::from(env::var_os("VULKAN_SDK")?);
    ["bin/glslc", "Bin/glslc.exe"]
        .iter()
        .map(|rel| sdk.join(rel))
        .find(|path| path.exists())
}
