use std::path::PathBuf;
use std::process::Command;
use std::{env, fs};

// (glsl source, spir-v output) relative to the workspace shaders/ dir.
const SHADERS: &[(&str, &str)] = &[("triangle.vert", "vert.spv"), ("triangle.frag", "frag.spv")];

fn main() {
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let dir = manifest.join("../../shaders");

    for (src, out) in SHADERS {
        let src_path = dir.join(src);
        println!("cargo:rerun-if-changed={}", src_path.display());

        let out_path = dir.join(out);
        match Command::new("glslc")
            .arg("--target-env=vulkan1.0")
            .arg("-O")
            .arg(&src_path)
            .arg("-o")
            .arg(&out_path)
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => panic!("glslc failed on {}: {status}", src_path.display()),
            // Prebuilt binaries in shaders/ are still usable at runtime.
            Err(err) => {
                let have = fs::metadata(&out_path).is_ok();
                println!(
                    "cargo:warning=glslc not runnable ({err}); {} {}",
                    out_path.display(),
                    if have { "kept as is" } else { "missing" }
                );
            }
        }
    }
}
