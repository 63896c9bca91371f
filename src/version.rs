//! Version constants.

/// The human-readable version string.
const VERSION: &str = concat!("MagickCache ", env!("CARGO_PKG_VERSION"));

/// Returns the human-readable version of the cache library.
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

/// Returns the library version as an integer, one byte per component.
#[must_use]
pub fn lib_version() -> u32 {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|part| part.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    (major << 16) | (minor << 8) | patch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_carries_package_name() {
        assert!(version().starts_with("MagickCache "));
    }

    #[test]
    fn test_lib_version_is_packed() {
        assert_eq!(lib_version(), 0x0000_0100);
    }
}
