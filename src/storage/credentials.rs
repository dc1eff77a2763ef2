//! Temporary storage credentials and the object addressing scheme.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer};
use url::Url;

use super::error::StorageError;

/// Region used for object storage unless overridden.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Endpoint that exchanges a bearer token for temporary credentials.
pub const DEFAULT_CREDENTIALS_URL: &str = "https://sentinel1.asf.alaska.edu/s3credentials";

/// Layouts accepted for the `expiration` field besides RFC 3339.
const EXPIRATION_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"];

/// Short-lived object-storage access grant.
///
/// Held only in memory; replaced as a whole on refresh, never mutated.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Instant the grant stops working.
    #[serde(deserialize_with = "deserialize_expiration")]
    pub expiration: DateTime<Utc>,
}

impl TemporaryCredentials {
    /// Returns true while the grant stays valid for at least `margin` past `now`.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        now + margin < self.expiration
    }

    /// Returns true while the grant stays valid for at least `margin` from now.
    #[must_use]
    pub fn is_fresh(&self, margin: TimeDelta) -> bool {
        self.is_fresh_at(Utc::now(), margin)
    }
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Parses an expiration timestamp in RFC 3339 or `YYYY-MM-DD HH:MM:SS±HH:MM` form.
///
/// # Errors
///
/// Returns the chrono parse error of the last layout tried.
pub fn parse_expiration(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    let mut last = match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => return Ok(parsed.with_timezone(&Utc)),
        Err(error) => error,
    };
    for format in EXPIRATION_FORMATS {
        match DateTime::parse_from_str(raw, format) {
            Ok(parsed) => return Ok(parsed.with_timezone(&Utc)),
            Err(error) => last = error,
        }
    }
    Err(last)
}

fn deserialize_expiration<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_expiration(&raw).map_err(serde::de::Error::custom)
}

/// Storage settings a downloader is built from.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Region the bucket lives in.
    pub region: String,
    /// Credentials to sign requests with.
    pub credentials: TemporaryCredentials,
}

/// Bucket and key addressed by an object URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Bucket name (the URL host).
    pub bucket: String,
    /// Object key (the URL path without its leading slash).
    pub key: String,
}

impl ObjectLocation {
    /// Parses `s3://bucket/path/to/key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidLocation`] when the URL has no host or
    /// an empty key.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidLocation {
            url: raw.to_string(),
        };
        let url = Url::parse(raw).map_err(|_| invalid())?;
        let bucket = url.host_str().filter(|host| !host.is_empty()).ok_or_else(invalid)?;
        let key = urlencoding::decode(url.path().trim_start_matches('/'))
            .map_err(|_| invalid())?
            .into_owned();
        if key.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key,
        })
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Returns true if `url` addresses object storage rather than HTTP.
#[must_use]
pub fn is_object_url(url: &str) -> bool {
    url.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("s3://"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_deserialize_credentials_with_offset_layout() {
        let json = r#"{
            "accessKeyId": "AKIA",
            "secretAccessKey": "SECRET",
            "sessionToken": "TOKEN",
            "expiration": "2030-01-02 15:04:05+00:00"
        }"#;
        let credentials: TemporaryCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(credentials.access_key_id, "AKIA");
        assert_eq!(credentials.session_token, "TOKEN");
        assert_eq!(
            credentials.expiration,
            Utc.with_ymd_and_hms(2030, 1, 2, 15, 4, 5).unwrap()
        );
    }

    #[test]
    fn test_parse_expiration_rfc3339_and_offsets() {
        let expected = Utc.with_ymd_and_hms(2030, 1, 2, 22, 4, 5).unwrap();
        assert_eq!(parse_expiration("2030-01-02T22:04:05Z").unwrap(), expected);
        assert_eq!(
            parse_expiration("2030-01-02 15:04:05-07:00").unwrap(),
            expected
        );
        assert!(parse_expiration("next tuesday").is_err());
    }

    #[test]
    fn test_freshness_respects_margin() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let credentials = TemporaryCredentials {
            access_key_id: "a".into(),
            secret_access_key: "s".into(),
            session_token: "t".into(),
            expiration: now + TimeDelta::minutes(10),
        };
        assert!(credentials.is_fresh_at(now, TimeDelta::minutes(5)));
        assert!(!credentials.is_fresh_at(now, TimeDelta::minutes(10)));
        assert!(!credentials.is_fresh_at(now + TimeDelta::minutes(6), TimeDelta::minutes(5)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = TemporaryCredentials {
            access_key_id: "AKIA".into(),
            secret_access_key: "very-secret".into(),
            session_token: "session-tok".into(),
            expiration: Utc::now(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("session-tok"));
    }

    #[test]
    fn test_object_location_parse() {
        let location = ObjectLocation::parse("s3://asf-bucket/S1A/granule%201.zip").unwrap();
        assert_eq!(location.bucket, "asf-bucket");
        assert_eq!(location.key, "S1A/granule 1.zip");
    }

    #[test]
    fn test_object_location_requires_key() {
        assert!(ObjectLocation::parse("s3://bucket").is_err());
        assert!(ObjectLocation::parse("s3://bucket/").is_err());
        assert!(ObjectLocation::parse("not a url").is_err());
    }

    #[test]
    fn test_is_object_url() {
        assert!(is_object_url("s3://bucket/key"));
        assert!(is_object_url("S3://bucket/key"));
        assert!(!is_object_url("https://bucket/key"));
        assert!(!is_object_url("s3"));
    }
}
