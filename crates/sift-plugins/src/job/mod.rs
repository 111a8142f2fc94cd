//! Execution context handed to plugin code.
//!
//! A [`Job`] wraps the request being processed and records everything the
//! plugin produces: feature values, descendant entities and attached content.
//! Entities live in an arena owned by the job; [`Entity`] is a short-lived
//! mutable handle and [`EntityId`] a copyable reference that can be turned
//! back into a handle with [`Job::entity`].
//!
//! Every mutation is validated before it is applied. A schema violation
//! poisons the job: the error is returned to the caller and is also recorded,
//! so the assembled result is `ERROR_OUTPUT` even when the plugin carries on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::content::{Content, ContentStore, DataLabel, DataMetadata};
use crate::error::JobError;
use crate::feature::{FeatureSchema, FeatureValue};
use crate::plugin::ResolvedSettings;

/// Arbitrary key/value description of how a child relates to its parent.
pub type Relationship = BTreeMap<String, String>;

/// Builds a [`Relationship`] from pairs.
///
/// ```
/// let rel = sift_plugins::relationship([("action", "extracted")]);
/// assert_eq!(rel.get("action").map(String::as_str), Some("extracted"));
/// ```
pub fn relationship<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Relationship
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// One input stream of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    /// What the stream holds.
    pub label: DataLabel,
    /// Raw bytes.
    pub content: Vec<u8>,
}

/// Work item supplied by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job identifier.
    pub id: String,
    /// Identifier of the root entity.
    pub entity_id: String,
    /// Input data streams.
    #[serde(default)]
    pub data: Vec<InputData>,
    /// Plugin setting overrides.
    #[serde(default)]
    pub settings: Map<String, JsonValue>,
}

impl JobRequest {
    /// A request with no input data and no overrides.
    #[must_use]
    pub fn new(id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            data: Vec::new(),
            settings: Map::new(),
        }
    }

    /// Adds an input stream.
    #[must_use]
    pub fn with_data(mut self, label: DataLabel, content: impl Into<Vec<u8>>) -> Self {
        self.data.push(InputData {
            label,
            content: content.into(),
        });
        self
    }

    /// Adds a setting override.
    #[must_use]
    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }
}

/// Copyable reference to an entity within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(usize);

impl EntityId {
    /// The job's root entity.
    pub const ROOT: Self = Self(0);

    pub(crate) const fn index(self) -> usize {
        self.0
    }
}

/// Content attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attachment {
    pub(crate) hash: String,
    pub(crate) label: DataLabel,
    pub(crate) metadata: DataMetadata,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) key: String,
    pub(crate) parent: Option<EntityId>,
    pub(crate) link: Option<String>,
    pub(crate) relationship: Relationship,
    pub(crate) features: BTreeMap<String, Vec<FeatureValue>>,
    pub(crate) data: Vec<Attachment>,
    pub(crate) children: Vec<EntityId>,
}

impl Node {
    fn new(key: String, parent: Option<EntityId>, relationship: Relationship) -> Self {
        Self {
            key,
            parent,
            link: None,
            relationship,
            features: BTreeMap::new(),
            data: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Everything the assembler needs once the plugin is done.
pub(crate) struct JobParts {
    pub(crate) nodes: Vec<Node>,
    pub(crate) store: ContentStore,
    pub(crate) poison: Option<JobError>,
}

/// Mutable record of one plugin execution.
#[derive(Debug)]
pub struct Job {
    request: JobRequest,
    schema: FeatureSchema,
    settings: ResolvedSettings,
    nodes: Vec<Node>,
    store: ContentStore,
    poison: Option<JobError>,
}

impl Job {
    /// Starts a job whose root entity is `request.entity_id`.
    #[must_use]
    pub fn new(request: JobRequest, schema: FeatureSchema, settings: ResolvedSettings) -> Self {
        let root = Node::new(request.entity_id.clone(), None, Relationship::new());
        Self {
            request,
            schema,
            settings,
            nodes: vec![root],
            store: ContentStore::new(),
            poison: None,
        }
    }

    /// The request being processed.
    #[must_use]
    pub const fn request(&self) -> &JobRequest {
        &self.request
    }

    /// Effective plugin settings.
    #[must_use]
    pub const fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    /// Schema values are validated against.
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// First input stream carrying `label`.
    #[must_use]
    pub fn data(&self, label: DataLabel) -> Option<&[u8]> {
        self.request
            .data
            .iter()
            .find(|input| input.label == label)
            .map(|input| input.content.as_slice())
    }

    /// The validation error that poisoned this job, if any.
    #[must_use]
    pub const fn validation_error(&self) -> Option<&JobError> {
        self.poison.as_ref()
    }

    /// Handle to the root entity.
    pub fn root(&mut self) -> Entity<'_> {
        Entity {
            job: self,
            id: EntityId::ROOT,
        }
    }

    /// Handle to a previously created entity.
    ///
    /// # Errors
    ///
    /// [`JobError::UnknownEntity`] when `id` came from another job.
    pub fn entity(&mut self, id: EntityId) -> Result<Entity<'_>, JobError> {
        if id.index() >= self.nodes.len() {
            return Err(JobError::UnknownEntity { index: id.index() });
        }
        Ok(Entity { job: self, id })
    }

    /// Records feature values on the root entity.
    ///
    /// # Errors
    ///
    /// See [`Entity::add_feature_values`].
    pub fn add_feature_values<V: Into<FeatureValue>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<(), JobError> {
        self.record_features(EntityId::ROOT, name, values.into_iter().map(Into::into).collect())
    }

    /// Records feature values on the root entity, dropping `None`s.
    ///
    /// # Errors
    ///
    /// See [`Entity::add_feature_values`].
    pub fn add_optional_feature_values<V: Into<FeatureValue>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = Option<V>>,
    ) -> Result<(), JobError> {
        self.record_features(
            EntityId::ROOT,
            name,
            values.into_iter().flatten().map(Into::into).collect(),
        )
    }

    /// Declares a child of the root entity.
    pub fn add_child(&mut self, key: impl Into<String>, relationship: Relationship) -> Entity<'_> {
        let id = self.push_child(EntityId::ROOT, key.into(), relationship, None);
        Entity { job: self, id }
    }

    /// Declares a child of the root entity that cross-links to another
    /// entity id.
    pub fn add_linked_child(
        &mut self,
        key: impl Into<String>,
        relationship: Relationship,
        parent_override: impl Into<String>,
    ) -> Entity<'_> {
        let id = self.push_child(
            EntityId::ROOT,
            key.into(),
            relationship,
            Some(parent_override.into()),
        );
        Entity { job: self, id }
    }

    /// Declares a child of the root identified by its content.
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyContent`] or [`JobError::ContentRead`].
    pub fn add_child_with_data(
        &mut self,
        relationship: Relationship,
        content: impl Into<Content>,
    ) -> Result<Entity<'_>, JobError> {
        let id = self.push_child_with_data(EntityId::ROOT, relationship, content.into())?;
        Ok(Entity { job: self, id })
    }

    /// Attaches content to the root entity and returns its identifier.
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyContent`] or [`JobError::ContentRead`].
    pub fn add_data(
        &mut self,
        label: DataLabel,
        metadata: DataMetadata,
        content: impl Into<Content>,
    ) -> Result<String, JobError> {
        self.attach(EntityId::ROOT, label, metadata, content.into())
    }

    /// Attaches text to the root entity.
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyContent`] for an empty string.
    pub fn add_text(&mut self, text: &str, language: Option<&str>) -> Result<String, JobError> {
        self.attach(EntityId::ROOT, DataLabel::Text, text_metadata(language), text.into())
    }

    pub(crate) fn into_parts(self) -> JobParts {
        JobParts {
            nodes: self.nodes,
            store: self.store,
            poison: self.poison,
        }
    }

    fn poisoned<T>(&mut self, err: JobError) -> Result<T, JobError> {
        if self.poison.is_none() {
            self.poison = Some(err.clone());
        }
        Err(err)
    }

    fn record_features(
        &mut self,
        id: EntityId,
        name: &str,
        mut values: Vec<FeatureValue>,
    ) -> Result<(), JobError> {
        values.retain(|value| !value.value().is_empty());
        let accepted = match self.schema.validate_all(name, values) {
            Ok(accepted) => accepted,
            Err(err) => return self.poisoned(err),
        };
        self.nodes[id.index()]
            .features
            .entry(name.to_owned())
            .or_default()
            .extend(accepted);
        Ok(())
    }

    fn push_child(
        &mut self,
        parent: EntityId,
        key: String,
        relationship: Relationship,
        link: Option<String>,
    ) -> EntityId {
        let id = EntityId(self.nodes.len());
        let mut node = Node::new(key, Some(parent), relationship);
        node.link = link;
        self.nodes.push(node);
        self.nodes[parent.index()].children.push(id);
        id
    }

    fn push_child_with_data(
        &mut self,
        parent: EntityId,
        relationship: Relationship,
        content: Content,
    ) -> Result<EntityId, JobError> {
        let (hash, bytes) = ContentStore::prepare(content)?;
        self.store.commit(hash.clone(), bytes);
        let id = self.push_child(parent, hash.clone(), relationship, None);
        self.nodes[id.index()].data.push(Attachment {
            hash,
            label: DataLabel::Content,
            metadata: DataMetadata::default(),
        });
        Ok(id)
    }

    fn attach(
        &mut self,
        id: EntityId,
        label: DataLabel,
        metadata: DataMetadata,
        content: Content,
    ) -> Result<String, JobError> {
        let (hash, bytes) = ContentStore::prepare(content)?;
        self.store.commit(hash.clone(), bytes);
        self.nodes[id.index()].data.push(Attachment {
            hash: hash.clone(),
            label,
            metadata,
        });
        Ok(hash)
    }
}

fn text_metadata(language: Option<&str>) -> DataMetadata {
    DataMetadata {
        language: language.map(str::to_owned),
        mime: None,
    }
}

/// Mutable handle to one entity of a [`Job`].
#[derive(Debug)]
pub struct Entity<'a> {
    job: &'a mut Job,
    id: EntityId,
}

impl Entity<'_> {
    /// Reusable reference to this entity.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Content identifier or caller-chosen key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.job.nodes[self.id.index()].key
    }

    /// Appends values to a feature of this entity.
    ///
    /// The whole batch is validated first; nothing is recorded when any value
    /// is rejected. An empty batch still records the feature name.
    ///
    /// # Errors
    ///
    /// [`JobError::UndeclaredFeature`] or [`JobError::TypeMismatch`]; either
    /// poisons the job.
    pub fn add_feature_values<V: Into<FeatureValue>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<(), JobError> {
        self.job
            .record_features(self.id, name, values.into_iter().map(Into::into).collect())
    }

    /// As [`Entity::add_feature_values`], silently dropping `None`s.
    /// Empty text and bytes are dropped by both variants.
    ///
    /// # Errors
    ///
    /// See [`Entity::add_feature_values`].
    pub fn add_optional_feature_values<V: Into<FeatureValue>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = Option<V>>,
    ) -> Result<(), JobError> {
        self.job.record_features(
            self.id,
            name,
            values.into_iter().flatten().map(Into::into).collect(),
        )
    }

    /// Declares a child of this entity.
    pub fn add_child(&mut self, key: impl Into<String>, relationship: Relationship) -> Entity<'_> {
        let id = self.job.push_child(self.id, key.into(), relationship, None);
        Entity {
            job: &mut *self.job,
            id,
        }
    }

    /// Declares a child of this entity that cross-links to another entity id.
    pub fn add_linked_child(
        &mut self,
        key: impl Into<String>,
        relationship: Relationship,
        parent_override: impl Into<String>,
    ) -> Entity<'_> {
        let id = self.job.push_child(
            self.id,
            key.into(),
            relationship,
            Some(parent_override.into()),
        );
        Entity {
            job: &mut *self.job,
            id,
        }
    }

    /// Declares a child of this entity identified by its content.
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyContent`] or [`JobError::ContentRead`].
    pub fn add_child_with_data(
        &mut self,
        relationship: Relationship,
        content: impl Into<Content>,
    ) -> Result<Entity<'_>, JobError> {
        let id = self
            .job
            .push_child_with_data(self.id, relationship, content.into())?;
        Ok(Entity {
            job: &mut *self.job,
            id,
        })
    }

    /// Attaches content to this entity and returns its identifier.
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyContent`] or [`JobError::ContentRead`].
    pub fn add_data(
        &mut self,
        label: DataLabel,
        metadata: DataMetadata,
        content: impl Into<Content>,
    ) -> Result<String, JobError> {
        self.job.attach(self.id, label, metadata, content.into())
    }

    /// Attaches text to this entity.
    ///
    /// # Errors
    ///
    /// [`JobError::EmptyContent`] for an empty string.
    pub fn add_text(&mut self, text: &str, language: Option<&str>) -> Result<String, JobError> {
        self.job
            .attach(self.id, DataLabel::Text, text_metadata(language), text.into())
    }
}
