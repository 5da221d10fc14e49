//! Build script for texel-harness
//!
//! Parses and validates the embedded identity kernel for every supported
//! storage format, so a broken kernel fails the build instead of the first
//! pipeline creation.

const IDENTITY_KERNEL: &str = "shaders/identity.wgsl";
const STORAGE_FORMATS: &[&str] = &["r8uint", "r32uint"];

/// Parses and validates one WGSL kernel, panicking with naga's diagnostics
fn validate_wgsl(label: &str, source: &str) {
    let module = match naga::front::wgsl::parse_str(source) {
        Ok(module) => module,
        Err(e) => panic!("Failed to parse {label}:\n{}", e.emit_to_string(source)),
    };

    let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    if let Err(e) = validator.validate(&module) {
        panic!("Failed to validate {label}:\n{}", e.emit_to_string(source));
    }
}

fn main() {
    println!("cargo:rerun-if-changed={IDENTITY_KERNEL}");

    let template = std::fs::read_to_string(IDENTITY_KERNEL).unwrap_or_else(|e| panic!("Failed to read {IDENTITY_KERNEL}: {e}"));
    for format in STORAGE_FORMATS {
        let source = template.replace("STORAGE_FORMAT", format);
        validate_wgsl(&format!("{IDENTITY_KERNEL} ({format})"), &source);
    }
}
