use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Create config template if it doesn't exist
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../vdkmux.template.toml");

    let template = r#"# VDKMUX Configuration Template
# Copy this file to 'vdkmux.toml' next to the binary using the crate

base_media_decode_time = 0
keep_original_timestamps = false
remux = true
align_gops_at_end = false
first_sequence_number = 0
"#;

    let _ = fs::write(template_path, template);
    println!("cargo:rerun-if-changed=build.rs");
}
