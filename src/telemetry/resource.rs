use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{HOST_NAME, SERVICE_NAME, SERVICE_VERSION};

use crate::telemetry::config::ResolvedConfig;

/// Index the collector files this service's telemetry under
pub const SEARCH_INDEX: &str = "telemetry.search_index";

/// Category tag on the meter provider's resource
pub const METRIC_CATEGORY: &str = "metric.category";

/// Get base attributes for any resource
pub fn base_attributes(config: &ResolvedConfig) -> Vec<KeyValue> {
    vec![
        KeyValue::new(SERVICE_NAME, config.service_name().to_string()),
        KeyValue::new(SERVICE_VERSION, config.service_version().to_string()),
        KeyValue::new(HOST_NAME, config.hostname().to_string()),
    ]
}

/// Build the resource shared by every SDK provider of one facade
pub fn build_resource(config: &ResolvedConfig) -> Resource {
    let mut attrs = base_attributes(config);
    attrs.push(KeyValue::new(SEARCH_INDEX, config.search_index().to_string()));
    Resource::builder().with_attributes(attrs).build()
}

/// Resource for the meter provider: the shared resource plus `metric.category=system`
pub fn build_metric_resource(config: &ResolvedConfig) -> Resource {
    let mut attrs = base_attributes(config);
    attrs.push(KeyValue::new(SEARCH_INDEX, config.search_index().to_string()));
    attrs.push(KeyValue::new(METRIC_CATEGORY, "system"));
    Resource::builder().with_attributes(attrs).build()
}
