//! Build script for the flagwire SDK.
//!
//! Compiles the Protocol Buffer definition of the evaluation service into
//! Rust code using tonic-build. The generated code provides the gRPC client
//! stubs and message types the transport layer wraps.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        // This crate is a client; no service skeletons needed.
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/flagwire.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/flagwire.proto");

    Ok(())
}
