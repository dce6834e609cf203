fn main() {
    // TFLite C API is only required when the FFI backend is compiled in.
    // The default build must work on machines without the library installed.
    if std::env::var_os("CARGO_FEATURE_VISION_TFLITE").is_some() {
        println!("cargo:rustc-link-lib=tensorflowlite_c");
    }
}
