use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize {what} as JSON")]
    JsonSerialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
