//! Self-update check: a narrow, leaf collaborator consulted by the supervisor's main
//! loop. This only detects a newer release; downloading and replacing the running
//! binary is left to the operator or their process supervisor.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    max_version: String,
}

/// Probability, per stats tick, that the supervisor consults the package index at all.
pub const CHECK_PROBABILITY: f64 = 0.01;

/// Query the package index for the newest published version of this client, returning
/// `Some(version)` if it is newer than `current`. Best-effort: any transport or parse
/// failure is folded into `Ok(None)` rather than surfaced as an error, since a failed
/// version check must never interrupt a worker's job loop.
pub async fn check_for_newer_version(client: &reqwest::Client, current: &str) -> Option<String> {
    let response = client
        .get("https://crates.io/api/v1/crates/fishnet")
        .header("User-Agent", "fishnet-update-check")
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body: CrateResponse = response.json().await.ok()?;
    if is_newer(&body.krate.max_version, current) {
        Some(body.krate.max_version)
    } else {
        None
    }
}

/// Compare two `MAJOR.MINOR.PATCH` version strings; non-numeric or missing components
/// sort as `0`, so a malformed version on either side never panics this comparison.
fn is_newer(candidate: &str, current: &str) -> bool {
    parse_version(candidate) > parse_version(current)
}

fn parse_version(v: &str) -> (u64, u64, u64) {
    let mut parts = v.trim().split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_patch_version_is_detected() {
        assert!(is_newer("1.1.1", "1.1.0"));
        assert!(!is_newer("1.1.0", "1.1.0"));
        assert!(!is_newer("1.0.9", "1.1.0"));
    }

    #[test]
    fn malformed_version_never_panics() {
        assert!(!is_newer("not-a-version", "1.1.0"));
    }
}
