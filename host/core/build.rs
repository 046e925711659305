// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Build Script for exthost-core
//!
//! Compiles the extension host wire contract (`proto/extension_host.proto`)
//! into tonic server and client stubs. Generated code lands in `OUT_DIR` and is
//! included via `tonic::include_proto!` in `src/infrastructure/proto.rs`.
//!
//! `protoc` is vendored through `protoc-bin-vendored` so the build does not
//! depend on a system installation.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    std::env::set_var("PROTOC", protoc);

    let protos = ["../../proto/extension_host.proto"];

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&protos, &["../../proto"])?;

    println!("cargo:rerun-if-changed=../../proto/extension_host.proto");

    Ok(())
}
