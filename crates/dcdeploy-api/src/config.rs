use std::time::Duration;

use url::Url;

pub const DATA_CONNECT_ORIGIN: &str = "https://firebasedataconnect.googleapis.com/";
pub const CLOUD_SQL_ORIGIN: &str = "https://sqladmin.googleapis.com/";
pub const CLOUD_BILLING_ORIGIN: &str = "https://cloudbilling.googleapis.com/";
pub const SERVICE_USAGE_ORIGIN: &str = "https://serviceusage.googleapis.com/";
pub const RESOURCE_MANAGER_ORIGIN: &str = "https://cloudresourcemanager.googleapis.com/";

/// Instance updates regularly take several minutes.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoints and credentials for every Google API the deploy talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub access_token: String,
    pub data_connect_origin: Url,
    pub cloud_sql_origin: Url,
    pub cloud_billing_origin: Url,
    pub service_usage_origin: Url,
    pub resource_manager_origin: Url,
    pub request_timeout: Duration,
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
}

impl ApiConfig {
    /// Production endpoints with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error when a built-in origin does not parse.
    pub fn new(access_token: String) -> Result<Self, url::ParseError> {
        Ok(Self {
            access_token,
            data_connect_origin: origin(DATA_CONNECT_ORIGIN)?,
            cloud_sql_origin: origin(CLOUD_SQL_ORIGIN)?,
            cloud_billing_origin: origin(CLOUD_BILLING_ORIGIN)?,
            service_usage_origin: origin(SERVICE_USAGE_ORIGIN)?,
            resource_manager_origin: origin(RESOURCE_MANAGER_ORIGIN)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}

/// Parse an API origin. A trailing slash is added so relative paths join below it.
///
/// # Errors
///
/// Returns an error when `raw` is not an absolute URL.
pub fn origin(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{raw}/"))
    }
}
