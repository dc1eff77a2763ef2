//! Shared User-Agent string for every outbound request.
//!
//! Catalog, identity-provider and credential traffic all go through one
//! [`Session`](crate::auth::Session), so a single format is enough.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/sarfetch";

/// Default User-Agent for session requests (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("sarfetch/{version} (sar-product-downloader; +{PROJECT_UA_URL})")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_crate_version() {
        let ua = default_user_agent();
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("sarfetch/")
                .and_then(|s| s.split(' ').next())
                .unwrap(),
        );
    }

    #[test]
    fn test_user_agent_contains_project_url() {
        let ua = default_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL: {ua}");
        assert!(ua.contains("sar-product-downloader"));
    }
}
