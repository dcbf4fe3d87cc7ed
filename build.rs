use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Detect enabled recognition backends
    let mut enabled_backends = Vec::new();

    if env::var("CARGO_FEATURE_ONNX").is_ok() {
        enabled_backends.push("onnx");
    }

    let summary = if enabled_backends.is_empty() {
        "none".to_string()
    } else {
        enabled_backends.join(",")
    };

    // Exposed to the startup banner through env!()
    println!("cargo:rustc-env=OCR_WORKFLOW_BACKEND_FEATURES={}", summary);

    if enabled_backends.is_empty() {
        println!("cargo:warning=Building without the neural backend (tesseract + contour fallback only)");
        println!("cargo:warning=To enable it: cargo build --features onnx");
    }
}
