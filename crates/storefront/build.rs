//! Build script for storefront crate.
//!
//! Copies the stylesheet and the HTMX glue script to `static/derived/` with
//! a content hash in the file name, so both can be cached as immutable.

use std::env;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

/// (source under `static/`, env var, derived file stem, extension)
const ASSETS: [(&str, &str, &str, &str); 2] = [
    ("css/main.css", "CSS_HASH", "main", "css"),
    ("js/app.js", "JS_HASH", "app", "js"),
];

fn main() {
    let manifest_dir =
        env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set by Cargo");
    let static_dir = Path::new(&manifest_dir).join("static");
    let derived_dir = static_dir.join("derived");
    fs::create_dir_all(&derived_dir).expect("Failed to create derived asset directory");

    for (source, var, stem, ext) in ASSETS {
        hash_asset(&static_dir.join(source), &derived_dir, var, stem, ext);
    }
}

/// Hash one asset, copy it as `{stem}.{hash}.{ext}`, and expose the hash as
/// `env!(var)`.
fn hash_asset(path: &Path, derived_dir: &Path, var: &str, stem: &str, ext: &str) {
    println!("cargo:rerun-if-changed={}", path.display());

    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            println!("cargo:warning=Could not read {}: {e}", path.display());
            println!("cargo:rustc-env={var}=");
            return;
        }
    };

    let hash = format!("{:x}", Sha256::digest(&content));
    let short_hash = &hash[..8];
    println!("cargo:rustc-env={var}={short_hash}");

    let derived_path = derived_dir.join(format!("{stem}.{short_hash}.{ext}"));
    fs::copy(path, &derived_path).expect("Failed to copy asset to derived directory");
}
