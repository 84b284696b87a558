use dcdeploy_domain::{
    ConnectorId, FILTER_PREFIX, FilterScope, ResourceFilter, Selection, ServiceId, ServiceInfo,
};

use crate::error::FilterError;

const SCHEMA_SELECTOR: &str = "schema";

/// Parse a comma-separated `--only` value into a selection.
///
/// Segments for other products are ignored. When no segment targets this
/// product the result is [`Selection::Everything`].
///
/// # Errors
///
/// Returns an error for segments with more than two parts after the prefix
/// or with ids that are not valid resource ids.
pub fn parse_resource_filters(only: Option<&str>) -> Result<Selection, FilterError> {
    let Some(only) = only else {
        return Ok(Selection::Everything);
    };

    let mut filters = Vec::new();
    for segment in only.split(',').map(str::trim) {
        let Some(rest) = segment.strip_prefix(FILTER_PREFIX) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let parts: Vec<&str> = rest.split(':').collect();
        let invalid_id = |source| FilterError::InvalidIdentifier {
            segment: segment.to_string(),
            source,
        };
        let filter = match parts.as_slice() {
            [service] => {
                ResourceFilter::full_service(ServiceId::try_from(*service).map_err(invalid_id)?)
            }
            [service, selector] if *selector == SCHEMA_SELECTOR => {
                ResourceFilter::schema_only(ServiceId::try_from(*service).map_err(invalid_id)?)
            }
            [service, connector] => ResourceFilter::connector(
                ServiceId::try_from(*service).map_err(invalid_id)?,
                ConnectorId::try_from(*connector).map_err(invalid_id)?,
            ),
            _ => {
                return Err(FilterError::InvalidFilter {
                    segment: segment.to_string(),
                });
            }
        };
        filters.push(filter);
    }

    Ok(Selection::from_filters(filters))
}

/// Render filters back to their `--only` form, comma separated.
#[must_use]
pub fn filter_to_string(filters: &[ResourceFilter]) -> String {
    filters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn filter_matches(filter: &ResourceFilter, service_infos: &[ServiceInfo]) -> bool {
    service_infos
        .iter()
        .filter(|info| info.service_id() == &filter.service_id)
        .any(|info| match &filter.scope {
            FilterScope::FullService | FilterScope::SchemaOnly => true,
            FilterScope::Connector(connector_id) => info.find_connector(connector_id).is_some(),
        })
}

/// Fail when any filter names a service or connector that is not declared.
///
/// # Errors
///
/// Returns [`FilterError::Unmatched`] listing every filter that matched nothing.
pub fn ensure_filters_match(
    selection: &Selection,
    service_infos: &[ServiceInfo],
) -> Result<(), FilterError> {
    let unmatched: Vec<ResourceFilter> = selection
        .filters()
        .iter()
        .filter(|filter| !filter_matches(filter, service_infos))
        .cloned()
        .collect();
    if unmatched.is_empty() {
        Ok(())
    } else {
        Err(FilterError::Unmatched {
            filters: filter_to_string(&unmatched),
        })
    }
}
