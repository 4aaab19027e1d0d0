// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/images.proto");

    let fds = protox::compile(["images.proto"], ["proto"])?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(fds)?;

    Ok(())
}
