//! Build-time metadata embedded by the build script.
//!
//! Used for the CLI version banner and the HTTP `User-Agent` header.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("THREADLINE_GIT_HASH");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("THREADLINE_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// The `User-Agent` sent with every remote call.
pub fn user_agent() -> String {
    format!("threadline/{VERSION} ({GIT_HASH})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_contains_version() {
        let v = version_string();
        assert!(v.starts_with(VERSION));
        assert!(v.contains(BUILD_PROFILE));
    }

    #[test]
    fn test_user_agent_format() {
        let ua = user_agent();
        assert!(ua.starts_with("threadline/"));
        assert!(ua.contains(GIT_HASH));
    }
}
