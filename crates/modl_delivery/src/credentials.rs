//! Queue credentials read from the environment

use std::fmt;

use url::Url;

use crate::{DeliveryError, DeliveryResult};

/// Queue URL, e.g. `https://sqs.eu-west-1.amazonaws.com/123456789012/observations`
pub const OBS_URL_ENV: &str = "OBS_URL";
/// Session id stamped on every message
pub const OBS_SESSION_ENV: &str = "OBS_SESSION";
pub const REGION_ENV: &str = "AWS_DEFAULT_REGION";
pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// Everything needed to sign requests against the queue
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub scheme: String,
    pub host: String,
    pub region: String,
    /// Queue path without its leading slash
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_id: String,
}

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env() -> DeliveryResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through a custom variable lookup
    pub fn from_lookup<F>(lookup: F) -> DeliveryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_url = get(OBS_URL_ENV).ok_or_else(|| DeliveryError::MissingCredentials(OBS_URL_ENV.to_string()))?;
        let url = Url::parse(&raw_url).map_err(|e| DeliveryError::InvalidEndpoint(format!("{}: {}", raw_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| DeliveryError::InvalidEndpoint(format!("{} has no host", raw_url)))?
            .to_string();

        let missing: Vec<&str> = [REGION_ENV, ACCESS_KEY_ENV, SECRET_KEY_ENV, OBS_SESSION_ENV]
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(DeliveryError::MissingCredentials(missing.join(", ")));
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            region: get(REGION_ENV).unwrap_or_default(),
            endpoint: url.path().trim_start_matches('/').to_string(),
            access_key: get(ACCESS_KEY_ENV).unwrap_or_default(),
            secret_key: get(SECRET_KEY_ENV).unwrap_or_default(),
            session_id: get(OBS_SESSION_ENV).unwrap_or_default(),
        })
    }

    /// True when every field needed for signing is set
    pub fn is_valid(&self) -> bool {
        [
            &self.region,
            &self.endpoint,
            &self.access_key,
            &self.secret_key,
            &self.session_id,
        ]
        .iter()
        .all(|v| !v.is_empty())
    }

    /// Queue URL carried in batch request bodies
    pub fn queue_url(&self, service: &str) -> String {
        format!("https://{}.{}.amazonaws.com/{}", service, self.region, self.endpoint)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(key: &str) -> Option<String> {
        match key {
            OBS_URL_ENV => Some("https://sqs.eu-west-1.amazonaws.com/123456789012/observations".into()),
            REGION_ENV => Some("eu-west-1".into()),
            ACCESS_KEY_ENV => Some("AKIDEXAMPLE".into()),
            SECRET_KEY_ENV => Some("secret".into()),
            OBS_SESSION_ENV => Some("session-1".into()),
            _ => None,
        }
    }

    #[test]
    fn test_parse_endpoint() {
        let credentials = Credentials::from_lookup(full).unwrap();
        assert_eq!(credentials.scheme, "https");
        assert_eq!(credentials.host, "sqs.eu-west-1.amazonaws.com");
        assert_eq!(credentials.endpoint, "123456789012/observations");
        assert!(credentials.is_valid());
        assert_eq!(
            credentials.queue_url("sqs"),
            "https://sqs.eu-west-1.amazonaws.com/123456789012/observations"
        );
    }

    #[test]
    fn test_missing_keys_are_listed() {
        let err = Credentials::from_lookup(|key| match key {
            ACCESS_KEY_ENV | SECRET_KEY_ENV => None,
            other => full(other),
        })
        .unwrap_err();
        assert_eq!(
            err,
            DeliveryError::MissingCredentials("AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY".into())
        );
    }

    #[test]
    fn test_bad_url() {
        let err = Credentials::from_lookup(|key| match key {
            OBS_URL_ENV => Some("not a url".into()),
            other => full(other),
        })
        .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let credentials = Credentials::from_lookup(full).unwrap();
        assert!(!format!("{:?}", credentials).contains("\"secret\""));
        assert!(!Credentials::default().is_valid());
    }
}
