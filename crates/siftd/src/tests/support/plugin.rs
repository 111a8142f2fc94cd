//! A plugin that optionally sleeps and then records one feature per
//! execution.

use std::thread;
use std::time::Duration;

use sift_plugins::{ExecuteResult, Feature, Job, Plugin, PluginDescriptor, SubExecution};

/// Records `example_unspec` with the execution name.
#[derive(Debug)]
pub struct EchoPlugin {
    pub descriptor: PluginDescriptor,
    pub ready: bool,
    pub delay: Duration,
    pub subs: Vec<SubExecution>,
}

impl EchoPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: PluginDescriptor::new(name, "1.0")
                .with_features(vec![Feature::unspecified("example_unspec", "anything")]),
            ready: true,
            delay: Duration::ZERO,
            subs: Vec::new(),
        }
    }
}

impl Plugin for EchoPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn execute(&self, job: &mut Job) -> ExecuteResult {
        thread::sleep(self.delay);
        job.add_feature_values("example_unspec", ["main"])?;
        Ok(None)
    }

    fn sub_executions(&self) -> &[SubExecution] {
        &self.subs
    }

    fn execute_sub(&self, name: &str, job: &mut Job) -> ExecuteResult {
        thread::sleep(self.delay);
        job.add_feature_values("example_unspec", [name])?;
        Ok(None)
    }
}
