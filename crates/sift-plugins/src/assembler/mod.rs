//! Conversion of a finished [`Job`] into a [`JobResult`].
//!
//! Entities are emitted in pre-order: each parent is followed immediately by
//! its subtree, children in creation order. Every event carries its full
//! ancestor chain so consumers never need to look up another event.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::{DataLabel, DataMetadata};
use crate::error::JobError;
use crate::feature::{FILENAME_FEATURE, FeatureValue, Value};
use crate::job::{EntityId, Job, Node, Relationship};
use crate::state::{State, StateLabel};

/// Outcome of plugin code: an optional explicit state or a job error.
pub type ExecuteResult = Result<Option<State>, JobError>;

/// Content attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    /// Content identifier.
    pub hash: String,
    /// What the content holds.
    pub label: DataLabel,
    /// Language of textual content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// One ancestor in an event's parent chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventParent {
    /// Ancestor identifier.
    pub id: String,
    /// Relationship of the ancestor to its own parent.
    #[serde(default)]
    pub relationship: Relationship,
    /// Smallest `filename` value of the ancestor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Cross-link id of the ancestor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Next ancestor up; `None` for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<EventParent>>,
}

impl EventParent {
    /// A chain entry with no further ancestors.
    #[must_use]
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            relationship: Relationship::new(),
            filename: None,
            link: None,
            parent: None,
        }
    }

    /// Iterates from this entry up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |entry| entry.parent.as_deref())
    }
}

/// One entity of the result tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Entity identifier.
    pub id: String,
    /// Ancestor chain; `None` for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EventParent>,
    /// Cross-link parent id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Relationship to the parent.
    #[serde(default)]
    pub relationship: Relationship,
    /// Attached content.
    #[serde(default)]
    pub data: Vec<EventData>,
    /// Deduplicated, sorted feature values by name.
    #[serde(default)]
    pub features: BTreeMap<String, Vec<FeatureValue>>,
}

/// Everything a plugin execution produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Terminal state.
    pub state: State,
    /// Events in pre-order.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Content referenced by the events, by identifier.
    #[serde(skip)]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl JobResult {
    /// A result carrying only a state.
    #[must_use]
    pub const fn empty(state: State) -> Self {
        Self {
            state,
            events: Vec::new(),
            data: BTreeMap::new(),
        }
    }
}

/// Builds the result of a job that returned normally.
///
/// A poisoned job yields its validation state and no events. A job that
/// produced nothing yields `COMPLETED_EMPTY`.
#[must_use]
pub fn assemble(job: Job) -> JobResult {
    let parts = job.into_parts();
    if let Some(poison) = parts.poison {
        return JobResult::empty(poison.to_state());
    }

    let events = visit(&parts.nodes);
    if events.is_empty() {
        return JobResult::empty(State::new(StateLabel::CompletedEmpty));
    }
    JobResult {
        state: State::completed(),
        events,
        data: parts.store.into_map(),
    }
}

/// Maps the plugin's outcome and the job it mutated onto a result.
///
/// Validation errors recorded on the job win over whatever the plugin
/// returned. An explicit state other than `COMPLETED` discards the output.
#[must_use]
pub fn finish(job: Job, outcome: ExecuteResult) -> JobResult {
    if let Some(poison) = job.validation_error() {
        return JobResult::empty(poison.to_state());
    }
    match outcome {
        Ok(None) => assemble(job),
        Ok(Some(state)) if state.label() == StateLabel::Completed => assemble(job),
        Ok(Some(state)) => JobResult::empty(state),
        Err(err) => JobResult::empty(err.to_state()),
    }
}

/// Events of every entity in pre-order. The root only appears when it
/// carries features or data.
fn visit(nodes: &[Node]) -> Vec<Event> {
    let mut events = Vec::new();
    let mut pending = vec![EntityId::ROOT];
    while let Some(id) = pending.pop() {
        let node = &nodes[id.index()];
        let is_root = node.parent.is_none();
        if !is_root || !node.features.is_empty() || !node.data.is_empty() {
            events.push(event_for(nodes, node));
        }
        pending.extend(node.children.iter().rev());
    }
    events
}

fn event_for(nodes: &[Node], node: &Node) -> Event {
    Event {
        id: node.key.clone(),
        parent: node.parent.map(|parent| chain(nodes, parent)),
        link: node.link.clone(),
        relationship: node.relationship.clone(),
        data: node
            .data
            .iter()
            .map(|attachment| {
                let DataMetadata { language, mime } = attachment.metadata.clone();
                EventData {
                    hash: attachment.hash.clone(),
                    label: attachment.label,
                    language,
                    mime,
                }
            })
            .collect(),
        features: node
            .features
            .iter()
            .map(|(name, values)| {
                let mut values = values.clone();
                values.sort();
                values.dedup();
                (name.clone(), values)
            })
            .collect(),
    }
}

/// The ancestor chain starting at `id`, built from the root down.
fn chain(nodes: &[Node], id: EntityId) -> EventParent {
    let node = &nodes[id.index()];
    let ancestors: Vec<&Node> =
        std::iter::successors(node.parent, |ancestor| nodes[ancestor.index()].parent)
            .map(|ancestor| &nodes[ancestor.index()])
            .collect();
    let parent = ancestors.into_iter().rev().fold(None, |parent, ancestor| {
        Some(Box::new(chain_entry(ancestor, parent)))
    });
    chain_entry(node, parent)
}

fn chain_entry(node: &Node, parent: Option<Box<EventParent>>) -> EventParent {
    EventParent {
        id: node.key.clone(),
        relationship: node.relationship.clone(),
        filename: min_filename(node),
        link: node.link.clone(),
        parent,
    }
}

fn min_filename(node: &Node) -> Option<String> {
    node.features
        .get(FILENAME_FEATURE)?
        .iter()
        .filter_map(|value| match value.value() {
            Value::String(name) => Some(name.as_str()),
            _ => None,
        })
        .min()
        .map(str::to_owned)
}

#[cfg(test)]
mod tests;
