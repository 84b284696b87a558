use dcdeploy_domain::{Instance, SqlDatabase};
use dcdeploy_engine::{ApiError, ApiResult, CloudSqlAdmin};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::decode::RpcStatus;
use crate::http::{HttpClient, endpoint};
use crate::operation::{Poller, SqlOperation};

const API_VERSION: &str = "v1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteSqlRequest<'a> {
    database: &'a str,
    sql_statement: String,
    auto_iam_authn: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteSqlResponse {
    #[serde(default)]
    status: Option<RpcStatus>,
}

/// Statements are sent as one script so they share a session.
fn sql_script(statements: &[String]) -> String {
    statements.join(";\n")
}

/// Cloud SQL admin API over REST.
#[derive(Debug, Clone)]
pub struct CloudSqlClient {
    http: HttpClient,
    origin: Url,
    poller: Poller,
}

impl CloudSqlClient {
    #[must_use]
    pub const fn new(http: HttpClient, origin: Url, poller: Poller) -> Self {
        Self {
            http,
            origin,
            poller,
        }
    }

    fn url(&self, resource: &str) -> ApiResult<Url> {
        endpoint(&self.origin, &format!("{API_VERSION}/{resource}"), &[])
    }

    fn wait(&self, project: &str, operation: &SqlOperation) -> ApiResult<()> {
        if operation.finished()? {
            return Ok(());
        }
        let url = self.url(&format!("projects/{project}/operations/{}", operation.name))?;
        self.poller.wait(&operation.name, || {
            self.http.get::<SqlOperation>(&url)?.finished()
        })
    }
}

impl CloudSqlAdmin for CloudSqlClient {
    fn get_instance(&self, project: &str, instance_id: &str) -> ApiResult<Instance> {
        self.http
            .get(&self.url(&format!("projects/{project}/instances/{instance_id}"))?)
    }

    fn create_instance(&self, project: &str, instance: &Instance) -> ApiResult<()> {
        let url = self.url(&format!("projects/{project}/instances"))?;
        tracing::info!(instance = %instance.name, "creating Cloud SQL instance");
        let operation: SqlOperation = self.http.post(&url, instance)?;
        tracing::debug!(operation = %operation.name, "instance creation started");
        Ok(())
    }

    fn update_instance(&self, project: &str, instance: &Instance) -> ApiResult<()> {
        let url = self.url(&format!("projects/{project}/instances/{}", instance.name))?;
        tracing::info!(instance = %instance.name, "updating Cloud SQL instance");
        let operation: SqlOperation = self.http.patch(&url, instance)?;
        self.wait(project, &operation)
    }

    fn get_database(
        &self,
        project: &str,
        instance_id: &str,
        database_id: &str,
    ) -> ApiResult<SqlDatabase> {
        self.http.get(&self.url(&format!(
            "projects/{project}/instances/{instance_id}/databases/{database_id}"
        ))?)
    }

    fn create_database(
        &self,
        project: &str,
        instance_id: &str,
        database_id: &str,
    ) -> ApiResult<()> {
        let url = self.url(&format!("projects/{project}/instances/{instance_id}/databases"))?;
        tracing::info!(instance = instance_id, database = database_id, "creating database");
        let body = serde_json::json!({
            "project": project,
            "instance": instance_id,
            "name": database_id,
        });
        let operation: SqlOperation = self.http.post(&url, &body)?;
        self.wait(project, &operation)
    }

    fn execute_sql(
        &self,
        project: &str,
        instance_id: &str,
        database_id: &str,
        statements: &[String],
    ) -> ApiResult<()> {
        let url = self.url(&format!("projects/{project}/instances/{instance_id}:executeSql"))?;
        tracing::debug!(
            instance = instance_id,
            database = database_id,
            statements = statements.len(),
            "executing SQL"
        );
        let request = ExecuteSqlRequest {
            database: database_id,
            sql_statement: sql_script(statements),
            auto_iam_authn: true,
        };
        let response: ExecuteSqlResponse = self.http.post(&url, &request)?;
        match response.status {
            Some(status) if status.code != 0 => Err(ApiError::OperationFailed {
                operation: format!("executeSql on {instance_id}/{database_id}"),
                message: status.message,
            }),
            _ => Ok(()),
        }
    }
}
