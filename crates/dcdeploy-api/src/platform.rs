use dcdeploy_engine::{ApiResult, Platform};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::{HttpClient, endpoint};
use crate::operation::{Operation, Poller};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillingInfo {
    #[serde(default)]
    billing_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct ServiceState {
    #[serde(default)]
    state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Only the fields we edit; `etag` guards against concurrent writers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IamPolicy {
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl IamPolicy {
    /// Add `member` to `role`. Returns `false` when it already holds it.
    pub fn grant(&mut self, role: &str, member: &str) -> bool {
        match self.bindings.iter_mut().find(|binding| binding.role == role) {
            Some(binding) if binding.members.iter().any(|existing| existing == member) => false,
            Some(binding) => {
                binding.members.push(member.to_string());
                true
            }
            None => {
                self.bindings.push(Binding {
                    role: role.to_string(),
                    members: vec![member.to_string()],
                });
                true
            }
        }
    }
}

/// Billing, service usage and IAM checks.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: HttpClient,
    billing_origin: Url,
    service_usage_origin: Url,
    resource_manager_origin: Url,
    poller: Poller,
}

impl PlatformClient {
    #[must_use]
    pub const fn new(
        http: HttpClient,
        billing_origin: Url,
        service_usage_origin: Url,
        resource_manager_origin: Url,
        poller: Poller,
    ) -> Self {
        Self {
            http,
            billing_origin,
            service_usage_origin,
            resource_manager_origin,
            poller,
        }
    }
}

impl Platform for PlatformClient {
    fn check_billing_enabled(&self, project: &str) -> ApiResult<bool> {
        let url = endpoint(
            &self.billing_origin,
            &format!("v1/projects/{project}/billingInfo"),
            &[],
        )?;
        let info: BillingInfo = self.http.get(&url)?;
        Ok(info.billing_enabled)
    }

    fn ensure_api_enabled(&self, project: &str, api: &str) -> ApiResult<()> {
        let resource = format!("v1/projects/{project}/services/{api}");
        let current: ServiceState = self
            .http
            .get(&endpoint(&self.service_usage_origin, &resource, &[])?)?;
        if current.state == "ENABLED" {
            tracing::debug!(api, "API already enabled");
            return Ok(());
        }

        tracing::info!(api, project, "enabling API");
        let url = endpoint(&self.service_usage_origin, &format!("{resource}:enable"), &[])?;
        let operation: Operation = self.http.post(&url, &serde_json::json!({}))?;
        if operation.finished()? {
            return Ok(());
        }
        let poll = endpoint(&self.service_usage_origin, &format!("v1/{}", operation.name), &[])?;
        self.poller.wait(&operation.name, || {
            self.http.get::<Operation>(&poll)?.finished()
        })
    }

    fn ensure_role_granted(
        &self,
        project: &str,
        service_account: &str,
        role: &str,
    ) -> ApiResult<()> {
        let get = endpoint(
            &self.resource_manager_origin,
            &format!("v1/projects/{project}:getIamPolicy"),
            &[],
        )?;
        let mut policy: IamPolicy = self.http.post(&get, &serde_json::json!({}))?;
        let member = format!("serviceAccount:{service_account}");
        if !policy.grant(role, &member) {
            tracing::debug!(role, member = %member, "role already granted");
            return Ok(());
        }

        tracing::info!(role, member = %member, "granting role");
        let set = endpoint(
            &self.resource_manager_origin,
            &format!("v1/projects/{project}:setIamPolicy"),
            &[],
        )?;
        let _updated: IamPolicy = self
            .http
            .post(&set, &serde_json::json!({ "policy": policy }))?;
        Ok(())
    }
}
