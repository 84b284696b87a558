use serde::{Deserialize, Serialize};

use crate::{DeployStatsSnapshot, GraphqlError, SchemaDiff, Selection, ServiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    ServiceCreate,
    ServiceDelete,
    InstanceCreate,
    InstanceUpdate,
    InstanceNoop,
    DatabaseCreate,
    DatabaseNoop,
    DatabaseInaccessible,
    SchemaMigrate,
    SchemaNoop,
    ConnectorDeploy,
}

impl PlanAction {
    #[must_use]
    pub const fn would_change(self) -> bool {
        !matches!(
            self,
            Self::InstanceNoop | Self::DatabaseNoop | Self::DatabaseInaccessible | Self::SchemaNoop
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub resource: String,
    pub action: PlanAction,
    pub summary: String,
    pub destructive: bool,
    pub hint: Option<String>,
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPlan {
    pub schema: String,
    pub diffs: Vec<SchemaDiff>,
}

/// What a dry run would do. Nothing in it has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployPlan {
    pub project: String,
    pub services: Vec<ServiceId>,
    pub selection: Selection,
    pub changes: Vec<PlannedChange>,
    pub schemas: Vec<SchemaPlan>,
    pub warnings: Vec<GraphqlError>,
    pub stats: DeployStatsSnapshot,
}

impl DeployPlan {
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|change| change.action.would_change())
            || self.schemas.iter().any(|schema| !schema.diffs.is_empty())
    }

    #[must_use]
    pub fn has_destructive_changes(&self) -> bool {
        self.changes.iter().any(|change| change.destructive)
            || self
                .schemas
                .iter()
                .flat_map(|schema| &schema.diffs)
                .any(|diff| diff.destructive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorPhase {
    BeforeSchema,
    AfterSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedConnector {
    pub name: String,
    pub phase: ConnectorPhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratedSchema {
    pub schema: String,
    pub diffs: Vec<SchemaDiff>,
}

/// Outcome of a completed deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReport {
    pub project: String,
    pub services_created: Vec<String>,
    pub services_deleted: Vec<String>,
    pub schemas_migrated: Vec<MigratedSchema>,
    pub connectors: Vec<DeployedConnector>,
    pub connectors_deleted: Vec<String>,
    pub warnings: Vec<GraphqlError>,
    pub console_url: String,
    pub stats: DeployStatsSnapshot,
}

impl DeployReport {
    #[must_use]
    pub fn connectors_in_phase(&self, phase: ConnectorPhase) -> usize {
        self.connectors
            .iter()
            .filter(|connector| connector.phase == phase)
            .count()
    }
}
