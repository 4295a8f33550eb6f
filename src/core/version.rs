//! Build metadata generated by the build script

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Version string shown by `--version`
pub fn long_version() -> String {
    format!(
        "{} (schema {}, built {}, commit {})",
        env!("CARGO_PKG_VERSION"),
        ATTRIBUTE_SCHEMA_VERSION,
        BUILD_TIME,
        GIT_HASH
    )
}

/// Build time string from the build script (UTC)
pub fn build_time() -> &'static str {
    BUILD_TIME
}

/// Short git hash captured by the build script
pub fn git_hash() -> &'static str {
    GIT_HASH
}
