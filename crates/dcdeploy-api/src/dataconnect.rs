use dcdeploy_domain::{Connector, RemoteService, Schema, ServiceName};
use dcdeploy_engine::{ApiError, ApiResult, ControlPlane};
use serde_json::json;
use url::Url;

use crate::http::{HttpClient, collect_pages, endpoint, page_query};
use crate::operation::{Operation, Poller};

const API_VERSION: &str = "v1";

/// Data Connect control plane over REST.
#[derive(Debug, Clone)]
pub struct DataConnectClient {
    http: HttpClient,
    origin: Url,
    poller: Poller,
}

impl DataConnectClient {
    #[must_use]
    pub const fn new(http: HttpClient, origin: Url, poller: Poller) -> Self {
        Self {
            http,
            origin,
            poller,
        }
    }

    fn url(&self, resource: &str, query: &[(&str, &str)]) -> ApiResult<Url> {
        endpoint(&self.origin, &format!("{API_VERSION}/{resource}"), query)
    }

    fn wait(&self, operation: &Operation) -> ApiResult<()> {
        if operation.finished()? {
            return Ok(());
        }
        let url = self.url(&operation.name, &[])?;
        self.poller.wait(&operation.name, || {
            self.http.get::<Operation>(&url)?.finished()
        })
    }
}

impl ControlPlane for DataConnectClient {
    fn list_services(&self, project: &str) -> ApiResult<Vec<RemoteService>> {
        let resource = format!("projects/{project}/locations/-/services");
        collect_pages(|token| self.http.get(&self.url(&resource, &page_query(token))?))
    }

    fn create_service(&self, name: &ServiceName) -> ApiResult<()> {
        let parent = format!("projects/{}/locations/{}/services", name.project, name.location);
        let url = self.url(&parent, &[("service_id", name.service_id.as_str())])?;
        tracing::info!(service = %name, "creating service");
        match self
            .http
            .post::<_, Operation>(&url, &json!({ "name": name.to_string() }))
        {
            Ok(operation) => self.wait(&operation),
            Err(ApiError::AlreadyExists { .. }) => {
                tracing::debug!(service = %name, "service already exists");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    fn delete_service(&self, name: &ServiceName) -> ApiResult<()> {
        let url = self.url(&name.to_string(), &[("force", "true")])?;
        tracing::info!(service = %name, "deleting service");
        let operation: Operation = self.http.delete(&url)?;
        self.wait(&operation)
    }

    fn upsert_schema(&self, schema: &Schema, validate_only: bool, wait: bool) -> ApiResult<()> {
        let validate = if validate_only { "true" } else { "false" };
        let url = self.url(
            &schema.name,
            &[("allowMissing", "true"), ("validateOnly", validate)],
        )?;
        tracing::debug!(schema = %schema.name, validate_only, wait, "upserting schema");
        let operation: Operation = self.http.patch(&url, schema)?;
        if validate_only || !wait {
            return Ok(());
        }
        self.wait(&operation)
    }

    fn list_connectors(&self, service: &ServiceName) -> ApiResult<Vec<Connector>> {
        let resource = format!("{service}/connectors");
        collect_pages(|token| self.http.get(&self.url(&resource, &page_query(token))?))
    }

    fn upsert_connector(&self, connector: &Connector) -> ApiResult<()> {
        let url = self.url(&connector.name, &[("allow_missing", "true")])?;
        tracing::info!(connector = %connector.name, "deploying connector");
        let operation: Operation = self.http.patch(&url, connector)?;
        self.wait(&operation)
    }

    fn delete_connector(&self, name: &str) -> ApiResult<()> {
        let url = self.url(name, &[])?;
        tracing::info!(connector = name, "deleting connector");
        let operation: Operation = self.http.delete(&url)?;
        self.wait(&operation)
    }
}
