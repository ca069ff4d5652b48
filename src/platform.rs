//! Platform detection for selecting the correct bottle.

/// Bottle tags to try for the host platform, in order of preference.
///
/// The universal `all` tag is always the last candidate.
pub fn bottle_candidates() -> Vec<&'static str> {
    let mut candidates: Vec<&'static str> = Vec::new();

    #[cfg(target_os = "macos")]
    {
        #[cfg(target_arch = "aarch64")]
        candidates.extend([
            "arm64_sequoia",
            "arm64_sonoma",
            "arm64_ventura",
            "arm64_monterey",
        ]);
        #[cfg(not(target_arch = "aarch64"))]
        candidates.extend(["sequoia", "sonoma", "ventura", "monterey"]);
    }

    #[cfg(target_os = "linux")]
    {
        #[cfg(target_arch = "x86_64")]
        candidates.push("x86_64_linux");
        #[cfg(target_arch = "aarch64")]
        candidates.push("aarch64_linux");
    }

    candidates.push("all");
    candidates
}
