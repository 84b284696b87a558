mod cloudsql;
mod config;
mod dataconnect;
mod decode;
mod http;
mod operation;
mod platform;

pub use cloudsql::CloudSqlClient;
pub use config::{
    ApiConfig, CLOUD_BILLING_ORIGIN, CLOUD_SQL_ORIGIN, DATA_CONNECT_ORIGIN,
    DEFAULT_OPERATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
    RESOURCE_MANAGER_ORIGIN, SERVICE_USAGE_ORIGIN, origin,
};
pub use dataconnect::DataConnectClient;
pub use decode::{RpcStatus, decode_error, decode_operation_error};
pub use http::HttpClient;
pub use operation::Poller;
pub use platform::PlatformClient;

use dcdeploy_engine::ApiResult;

/// Every remote surface of a deploy, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct GoogleApis {
    pub control_plane: DataConnectClient,
    pub cloud_sql: CloudSqlClient,
    pub platform: PlatformClient,
}

impl GoogleApis {
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn connect(config: &ApiConfig) -> ApiResult<Self> {
        let http = HttpClient::new(config.access_token.clone(), config.request_timeout)?;
        let poller = Poller {
            timeout: config.operation_timeout,
            interval: config.poll_interval,
        };
        Ok(Self {
            control_plane: DataConnectClient::new(
                http.clone(),
                config.data_connect_origin.clone(),
                poller,
            ),
            cloud_sql: CloudSqlClient::new(http.clone(), config.cloud_sql_origin.clone(), poller),
            platform: PlatformClient::new(
                http,
                config.cloud_billing_origin.clone(),
                config.service_usage_origin.clone(),
                config.resource_manager_origin.clone(),
                poller,
            ),
        })
    }
}
