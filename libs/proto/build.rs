use std::io::Result;
use std::path::PathBuf;

fn main() -> Result<()> {
    if std::env::var_os("PROTOC").is_none() {
        unsafe {
            std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
        }
    }

    let schema_dir = PathBuf::from("src/proto");

    let mut schemas: Vec<PathBuf> = std::fs::read_dir(&schema_dir)?
        .flatten()
        .map(|schema| schema.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "proto"))
        .collect();
    // Deterministic compile order regardless of directory iteration.
    schemas.sort();

    // Cargo watches directories recursively, so one line covers edits and
    // newly added schemas alike.
    println!("cargo:rerun-if-changed={}", schema_dir.display());

    // Both sides are generated: the user directory is consumed as a client,
    // the notification query service is served by notification-service.
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&schemas, &[schema_dir])?;

    Ok(())
}
