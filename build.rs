use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=LIBFPRINT_DIR");

    // Early return if nbis feature is not enabled
    if env::var("CARGO_FEATURE_NBIS").is_err() {
        return;
    }

    let lib_paths: Vec<PathBuf> = match env::var("LIBFPRINT_DIR") {
        Ok(dir) => {
            let dir = PathBuf::from(dir);
            if !dir.exists() {
                panic!(
                    "LIBFPRINT_DIR points to non-existent directory: {}",
                    dir.display()
                );
            }
            vec![dir.join("lib"), dir.join("lib64"), dir.clone(), dir.join("libfprint")]
        }
        Err(_) => {
            println!("cargo:warning=LIBFPRINT_DIR not set, searching system library paths");
            vec![
                PathBuf::from("/usr/local/lib"),
                PathBuf::from("/usr/lib"),
                PathBuf::from("/usr/lib/x86_64-linux-gnu"),
                PathBuf::from("/usr/lib/aarch64-linux-gnu"),
                PathBuf::from("/opt/homebrew/lib"),
            ]
        }
    };

    let lib_path = lib_paths.iter().find(|p| {
        p.join("libfprint-2.so").exists()
            || p.join("libfprint-2.so.2").exists()
            || p.join("libfprint-2.dylib").exists()
            || p.join("libfprint-2.2.dylib").exists()
    });

    match lib_path {
        Some(lib_path) => {
            println!("cargo:warning=Found libfprint in: {}", lib_path.display());
            println!("cargo:rustc-link-search=native={}", lib_path.display());

            // Set rpath for runtime linking (Unix-like systems)
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            println!("cargo:rustc-link-arg=-Wl,-rpath,{}", lib_path.display());
        }
        None => {
            eprintln!("Could not find libfprint-2 in any of:");
            for p in &lib_paths {
                eprintln!("  - {}", p.display());
            }
            eprintln!("Relying on the default linker search path");
        }
    }

    // bozorth_probe_init / bozorth_to_gallery are exported by libfprint-2
    println!("cargo:rustc-link-lib=dylib=fprint-2");
}
