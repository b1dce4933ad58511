//! Version and platform naming for releases

/// Set at build time through `MAC2MQTT_VERSION`, `dev` otherwise
pub const VERSION: &str = match option_env!("MAC2MQTT_VERSION") {
    Some(version) => version,
    None => "dev",
};

pub const DEV_VERSION: &str = "dev";

/// Strips one leading `v`
pub fn normalize(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Whether `candidate` should replace `current`.
///
/// A `dev` build always updates. Otherwise the normalized tags are compared
/// as plain strings, so `1.10.0` sorts before `1.9.0`; release tags are
/// expected to be zero padded where that matters.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    let current = normalize(current);
    if current == DEV_VERSION {
        return true;
    }
    normalize(candidate) > current
}

/// Release asset for the platform this binary was built for
pub fn platform_asset_name() -> String {
    asset_name(std::env::consts::OS, std::env::consts::ARCH)
}

/// `mac2mqtt-<os>-<arch>` in the naming used by the release pipeline
/// (`darwin`, `amd64`, ...)
pub fn asset_name(os: &str, arch: &str) -> String {
    format!("mac2mqtt-{}-{}", release_os(os), release_arch(arch))
}

pub fn platform() -> String {
    format!(
        "{}/{}",
        release_os(std::env::consts::OS),
        release_arch(std::env::consts::ARCH)
    )
}

fn release_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn release_arch(arch: &str) -> &str {
    match arch {
        "aarch64" => "arm64",
        "x86_64" => "amd64",
        "x86" => "386",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_always_updates() {
        assert!(is_newer("dev", "v0.0.1"));
        assert!(is_newer("vdev", "0.1.0"));
    }

    #[test]
    fn compares_without_prefix() {
        assert!(is_newer("v1.2.0", "v1.3.0"));
        assert!(is_newer("1.2.0", "v1.2.1"));
        assert!(!is_newer("v1.3.0", "1.3.0"));
        assert!(!is_newer("v1.3.0", "v1.2.9"));
    }

    #[test]
    fn comparison_is_lexicographic() {
        assert!(!is_newer("v1.9.0", "v1.10.0"));
        assert!(is_newer("v9", "v91"));
    }

    #[test]
    fn asset_names_follow_release_pipeline() {
        assert_eq!(asset_name("macos", "aarch64"), "mac2mqtt-darwin-arm64");
        assert_eq!(asset_name("macos", "x86_64"), "mac2mqtt-darwin-amd64");
        assert_eq!(asset_name("linux", "x86"), "mac2mqtt-linux-386");
        assert_eq!(asset_name("linux", "arm"), "mac2mqtt-linux-arm");
        assert!(platform_asset_name().starts_with("mac2mqtt-"));
    }
}
