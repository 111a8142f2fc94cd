//! Unit tests for the event tree assembler.

use rstest::{fixture, rstest};

use super::*;
use crate::content::content_id;
use crate::feature::{Feature, FeatureSchema};
use crate::job::{JobRequest, relationship};
use crate::plugin::ResolvedSettings;

#[fixture]
fn job() -> Job {
    let schema = FeatureSchema::with_base(vec![Feature::unspecified("example_unspec", "anything")]);
    Job::new(
        JobRequest::new("job-1", "test_entity"),
        schema,
        ResolvedSettings::default(),
    )
}

fn rel(key: &str, value: &str) -> Relationship {
    relationship([(key, value)])
}

#[rstest]
fn untouched_job_is_completed_empty(job: Job) {
    let result = assemble(job);
    assert_eq!(result.state.label(), StateLabel::CompletedEmpty);
    assert!(result.events.is_empty());
    assert!(result.data.is_empty());
}

#[rstest]
fn root_features_emit_a_root_event(mut job: Job) {
    job.add_feature_values("example_unspec", ["b", "a", "b"])
        .expect("valid");
    let result = assemble(job);
    assert_eq!(result.state.label(), StateLabel::Completed);
    assert_eq!(result.events.len(), 1);
    let root = &result.events[0];
    assert_eq!(root.id, "test_entity");
    assert!(root.parent.is_none());
    assert_eq!(
        root.features["example_unspec"],
        vec![FeatureValue::from("a"), FeatureValue::from("b")]
    );
}

#[rstest]
fn child_without_features_is_still_emitted(mut job: Job) {
    job.add_child("foo", rel("rt", "rv"));
    let result = assemble(job);
    assert_eq!(result.state.label(), StateLabel::Completed);
    assert_eq!(result.events.len(), 1, "root stays hidden");
    let child = &result.events[0];
    assert_eq!(child.id, "foo");
    assert_eq!(child.relationship, rel("rt", "rv"));
    assert_eq!(
        child.parent.as_ref().map(|p| p.id.as_str()),
        Some("test_entity")
    );
}

#[rstest]
fn events_are_emitted_in_pre_order(mut job: Job) {
    {
        let mut first = job.add_child("first", rel("n", "1"));
        first.add_child("first-child", rel("n", "1.1"));
    }
    job.add_child("second", rel("n", "2"));
    let result = assemble(job);
    let ids: Vec<&str> = result.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["first", "first-child", "second"]);
}

#[rstest]
fn grandchild_chain_carries_minimum_filename(mut job: Job) {
    {
        let mut child = job.add_child("child", rel("action", "extracted"));
        child
            .add_feature_values(FILENAME_FEATURE, ["zeta.bin", "alpha.bin"])
            .expect("filename");
        child.add_child("grandchild", rel("action", "decoded"));
    }
    let result = assemble(job);
    let grandchild = result
        .events
        .iter()
        .find(|event| event.id == "grandchild")
        .expect("grandchild emitted");
    let parent = grandchild.parent.as_ref().expect("parent chain");
    assert_eq!(parent.id, "child");
    assert_eq!(parent.filename.as_deref(), Some("alpha.bin"));
    assert_eq!(parent.relationship, rel("action", "extracted"));
    let ids: Vec<&str> = parent.ancestors().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["child", "test_entity"]);
}

#[rstest]
fn deep_descendant_chains_are_assembled(mut job: Job) {
    const DEPTH: usize = 400;
    let mut parent = EntityId::ROOT;
    for level in 0..DEPTH {
        parent = job
            .entity(parent)
            .expect("declared entity")
            .add_child(format!("level-{level}"), rel("depth", &level.to_string()))
            .id();
    }
    job.add_child("sibling", rel("n", "2"));

    let result = assemble(job);

    assert_eq!(result.events.len(), DEPTH + 1);
    assert_eq!(result.events[0].id, "level-0");
    assert_eq!(result.events[DEPTH - 1].id, format!("level-{}", DEPTH - 1));
    assert_eq!(result.events[DEPTH].id, "sibling", "siblings follow the whole subtree");
    let deepest = result.events[DEPTH - 1].parent.as_ref().expect("parent chain");
    let ids: Vec<&str> = deepest.ancestors().map(|p| p.id.as_str()).collect();
    assert_eq!(ids.len(), DEPTH);
    assert_eq!(ids[0], format!("level-{}", DEPTH - 2));
    assert_eq!(ids[DEPTH - 1], "test_entity");
}

#[rstest]
fn same_key_children_are_not_merged(mut job: Job) {
    job.add_child("dup", rel("n", "1"))
        .add_feature_values("example_unspec", ["one"])
        .expect("valid");
    job.add_child("dup", rel("n", "2"))
        .add_feature_values("example_unspec", ["two"])
        .expect("valid");
    let result = assemble(job);
    assert_eq!(result.events.len(), 2);
    assert_eq!(result.events[0].relationship, rel("n", "1"));
    assert_eq!(result.events[1].relationship, rel("n", "2"));
}

#[rstest]
fn child_data_is_deduplicated_in_the_content_map(mut job: Job) {
    job.add_child_with_data(rel("n", "1"), "same bytes")
        .expect("data");
    job.add_child_with_data(rel("n", "2"), "same bytes")
        .expect("data");
    let result = assemble(job);
    let hash = content_id(b"same bytes");
    assert_eq!(result.events.len(), 2);
    assert_eq!(result.data.len(), 1);
    assert_eq!(result.data.get(&hash).map(Vec::as_slice), Some(b"same bytes".as_slice()));
    assert_eq!(result.events[0].data[0].hash, hash);
    assert_eq!(result.events[0].data[0].label, DataLabel::Content);
}

#[rstest]
fn poisoned_job_reports_invalid_output(mut job: Job) {
    job.add_child("foo", rel("rt", "rv"));
    let _ = job.add_feature_values("undeclared", ["x"]);
    let result = finish(job, Ok(None));
    assert_eq!(result.state.label(), StateLabel::ErrorOutput);
    assert_eq!(result.state.failure_name(), Some(crate::error::INVALID_OUTPUT));
    assert!(result.events.is_empty());
}

#[rstest]
fn explicit_error_state_discards_output(mut job: Job) {
    job.add_feature_values("example_unspec", ["x"])
        .expect("valid");
    let state = State::with_failure(StateLabel::ErrorInput, "Bad Input", "not a zip");
    let result = finish(job, Ok(Some(state.clone())));
    assert_eq!(result.state, state);
    assert!(result.events.is_empty());
}

#[rstest]
fn explicit_completed_state_assembles(mut job: Job) {
    job.add_feature_values("example_unspec", ["x"])
        .expect("valid");
    let result = finish(job, Ok(Some(State::completed())));
    assert_eq!(result.state.label(), StateLabel::Completed);
    assert_eq!(result.events.len(), 1);
}

#[rstest]
#[case::empty_content(JobError::EmptyContent, "ValueError")]
#[case::fault(JobError::fault("RuntimeError", "boom"), "RuntimeError")]
fn job_errors_become_exceptions(job: Job, #[case] err: JobError, #[case] name: &str) {
    let result = finish(job, Err(err));
    assert_eq!(result.state.label(), StateLabel::ErrorException);
    assert_eq!(result.state.failure_name(), Some(name));
}
