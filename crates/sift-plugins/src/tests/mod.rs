//! Crate-level integration and BDD tests.

use std::sync::Arc;

use crate::assembler::ExecuteResult;
use crate::feature::Feature;
use crate::job::{Job, JobRequest, relationship};
use crate::plugin::{Plugin, PluginDescriptor, execute_request};
use crate::registry::PluginRegistry;
use crate::state::StateLabel;


struct Extractor {
    descriptor: PluginDescriptor,
}

impl Plugin for Extractor {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn execute(&self, job: &mut Job) -> ExecuteResult {
        let input = job.request().entity_id.clone();
        let mut child = job.add_child_with_data(relationship([("action", "extracted")]), "child bytes")?;
        child.add_feature_values("origin", [input])?;
        child.add_text("hello", Some("en"))?;
        Ok(None)
    }
}

#[test]
fn end_to_end_registry_and_execution() {
    let mut registry = PluginRegistry::new();
    registry
        .register(Arc::new(Extractor {
            descriptor: PluginDescriptor::new("extractor", "1.0")
                .with_features(vec![Feature::unspecified("origin", "source entity")]),
        }))
        .expect("register");

    let plugin = registry.require("extractor").expect("lookup");
    let result = execute_request(plugin.as_ref(), None, JobRequest::new("job-9", "root"));
    assert_eq!(result.state.label(), StateLabel::Completed);
    assert_eq!(result.events.len(), 1);
    let event = &result.events[0];
    assert_eq!(event.data.len(), 2);
    assert_eq!(result.data.len(), 2);
    assert_eq!(
        event.parent.as_ref().map(|parent| parent.id.as_str()),
        Some("root")
    );
}
