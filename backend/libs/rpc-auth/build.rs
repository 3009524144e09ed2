fn main() {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/rpc/v1/auth.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("Failed to compile auth.proto: {}", e));

    println!("cargo:rerun-if-changed=proto/rpc/v1/auth.proto");
}
