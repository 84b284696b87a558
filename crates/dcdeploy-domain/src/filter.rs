use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ConnectorId, ServiceId};

/// Product prefix that marks a `--only` segment as belonging to this deploy target.
pub const FILTER_PREFIX: &str = "dataconnect:";

const SCHEMA_SELECTOR: &str = "schema";

/// What part of a service a filter selects. Exactly one scope per filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "connector_id", rename_all = "snake_case")]
pub enum FilterScope {
    FullService,
    SchemaOnly,
    Connector(ConnectorId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub service_id: ServiceId,
    pub scope: FilterScope,
}

impl ResourceFilter {
    #[must_use]
    pub const fn full_service(service_id: ServiceId) -> Self {
        Self {
            service_id,
            scope: FilterScope::FullService,
        }
    }

    #[must_use]
    pub const fn schema_only(service_id: ServiceId) -> Self {
        Self {
            service_id,
            scope: FilterScope::SchemaOnly,
        }
    }

    #[must_use]
    pub const fn connector(service_id: ServiceId, connector_id: ConnectorId) -> Self {
        Self {
            service_id,
            scope: FilterScope::Connector(connector_id),
        }
    }

    #[must_use]
    pub const fn connector_id(&self) -> Option<&ConnectorId> {
        match &self.scope {
            FilterScope::Connector(id) => Some(id),
            FilterScope::FullService | FilterScope::SchemaOnly => None,
        }
    }

    #[must_use]
    pub fn selects_service(&self, service_id: &ServiceId) -> bool {
        &self.service_id == service_id
    }

    #[must_use]
    pub fn selects_schema(&self, service_id: &ServiceId) -> bool {
        self.selects_service(service_id)
            && matches!(self.scope, FilterScope::FullService | FilterScope::SchemaOnly)
    }

    #[must_use]
    pub fn selects_connector(&self, service_id: &ServiceId, connector_id: &ConnectorId) -> bool {
        self.selects_service(service_id)
            && match &self.scope {
                FilterScope::FullService => true,
                FilterScope::SchemaOnly => false,
                FilterScope::Connector(id) => id == connector_id,
            }
    }
}

impl fmt::Display for ResourceFilter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{FILTER_PREFIX}{}", self.service_id)?;
        match &self.scope {
            FilterScope::FullService => Ok(()),
            FilterScope::SchemaOnly => write!(formatter, ":{SCHEMA_SELECTOR}"),
            FilterScope::Connector(id) => write!(formatter, ":{id}"),
        }
    }
}

/// The resolved scope of one deploy invocation.
///
/// `Everything` is what an absent (or non-qualifying) `--only` flag means and
/// matches every resource. `Only` always holds at least one filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "selection", content = "filters", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Everything,
    Only(Vec<ResourceFilter>),
}

impl Selection {
    #[must_use]
    pub fn from_filters(filters: Vec<ResourceFilter>) -> Self {
        if filters.is_empty() {
            Self::Everything
        } else {
            Self::Only(filters)
        }
    }

    #[must_use]
    pub const fn is_filtered(&self) -> bool {
        matches!(self, Self::Only(_))
    }

    #[must_use]
    pub fn filters(&self) -> &[ResourceFilter] {
        match self {
            Self::Everything => &[],
            Self::Only(filters) => filters,
        }
    }

    #[must_use]
    pub fn selects_service(&self, service_id: &ServiceId) -> bool {
        match self {
            Self::Everything => true,
            Self::Only(filters) => filters.iter().any(|f| f.selects_service(service_id)),
        }
    }

    #[must_use]
    pub fn selects_schema(&self, service_id: &ServiceId) -> bool {
        match self {
            Self::Everything => true,
            Self::Only(filters) => filters.iter().any(|f| f.selects_schema(service_id)),
        }
    }

    #[must_use]
    pub fn selects_connector(&self, service_id: &ServiceId, connector_id: &ConnectorId) -> bool {
        match self {
            Self::Everything => true,
            Self::Only(filters) => filters
                .iter()
                .any(|f| f.selects_connector(service_id, connector_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::{ResourceFilter, Selection};
    use crate::{ConnectorId, ServiceId};

    fn service(id: &str) -> ServiceId {
        ServiceId::try_from(id).expect("service id")
    }

    fn connector(id: &str) -> ConnectorId {
        ConnectorId::try_from(id).expect("connector id")
    }

    #[test]
    fn everything_selects_all_resources() {
        let selection = Selection::Everything;
        assert!(selection.selects_service(&service("a")));
        assert!(selection.selects_schema(&service("a")));
        assert!(selection.selects_connector(&service("a"), &connector("c")));
        assert!(!selection.is_filtered());
    }

    #[test]
    fn empty_filter_list_collapses_to_everything() {
        assert_eq!(Selection::from_filters(Vec::new()), Selection::Everything);
    }

    #[test]
    fn schema_only_filter_skips_connectors() {
        let selection = Selection::Only(vec![ResourceFilter::schema_only(service("a"))]);
        assert!(selection.selects_schema(&service("a")));
        assert!(!selection.selects_connector(&service("a"), &connector("c")));
        assert!(!selection.selects_schema(&service("b")));
    }

    #[test]
    fn connector_filter_selects_one_connector_and_no_schema() {
        let selection = Selection::Only(vec![ResourceFilter::connector(
            service("a"),
            connector("c"),
        )]);
        assert!(selection.selects_service(&service("a")));
        assert!(!selection.selects_schema(&service("a")));
        assert!(selection.selects_connector(&service("a"), &connector("c")));
        assert!(!selection.selects_connector(&service("a"), &connector("d")));
    }

    #[test]
    fn filters_render_in_flag_syntax() {
        assert_eq!(
            ResourceFilter::full_service(service("a")).to_string(),
            "dataconnect:a"
        );
        assert_eq!(
            ResourceFilter::schema_only(service("a")).to_string(),
            "dataconnect:a:schema"
        );
        assert_eq!(
            ResourceFilter::connector(service("a"), connector("c")).to_string(),
            "dataconnect:a:c"
        );
    }
}
