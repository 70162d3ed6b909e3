use std::env;
use std::path::PathBuf;

use anyhow::Context as _;

const PROTO_DIR: &str = "proto";
const WORKLOAD_PROTO: &str = "proto/workload.proto";

fn main() -> anyhow::Result<()> {
    println!("cargo:rerun-if-changed={WORKLOAD_PROTO}");

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").context("OUT_DIR is not set")?);

    let mut proto_config = prost_build::Config::new();
    proto_config.bytes(["."]);

    let fds = protox::compile([WORKLOAD_PROTO], [PROTO_DIR])
        .context("failed to compile spiffe workload proto")?;

    // The server half is only used by the crate's tests.
    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .out_dir(&out_dir)
        .compile_fds_with_config(fds, proto_config)
        .context("failed to generate spiffe workload bindings")?;

    Ok(())
}
