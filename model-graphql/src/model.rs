//! Model declarations and the catalog of known models.
//!
//! A model is described by a [`ModelDefinition`]: its name, the namespace it is declared in, the
//! table backing it, a block of `@property` annotations describing its fields and relations, and
//! optional overrides of the default relation mapping. Definitions are usually produced by
//! `#[derive(Model)]`, which collects the doc comments of a struct as its annotation block.
//!
//! The [`Catalog`] owns the definitions of every model in a schema. It parses each model's
//! annotations into [`PropertyDescriptor`]s on first access and caches the result for its whole
//! lifetime.

use crate::error::{Error, Result};
use convert_case::{Case, Casing};
use derive_more::{Display, From};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub mod entity;
pub mod metadata;

pub use entity::{Entity, Loaded};
pub use metadata::{PropertyDescriptor, PropertyType, ScalarKind, Visibility};

/// The name of the identity column and field of every model.
pub const ID: &str = "id";

/// A fully qualified model identifier, such as `library::Book`.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub struct ModelId(String);

impl ModelId {
    /// The identifier of the model `name` declared in `namespace`.
    pub fn new(namespace: &str, name: &str) -> Self {
        if namespace.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{namespace}::{name}"))
        }
    }

    /// The unqualified name of the model.
    pub fn name(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or(&self.0)
    }

    /// The namespace the model is declared in.
    pub fn namespace(&self) -> &str {
        self.0
            .rsplit_once("::")
            .map(|(namespace, _)| namespace)
            .unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reads a computed or overridden property of an entity.
///
/// Returning [`None`] falls back to the entity's stored attribute.
pub type Accessor = fn(&Entity, &str) -> Option<crate::sql::db::Value>;

/// A declared relation mapping, overriding the default for one property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationOverride {
    pub property: Cow<'static, str>,
    pub kind: RelationKind,
}

/// The shape of a relation between an owner model and a target model.
///
/// Keys left as [`None`] take their conventional names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// The owner holds a foreign key to the target. Default key: `<property>_id`.
    BelongsTo {
        foreign_key: Option<Cow<'static, str>>,
    },
    /// The target holds a foreign key to the owner, at most one target per owner. Default key:
    /// `<owner>_id`.
    HasOne {
        foreign_key: Option<Cow<'static, str>>,
    },
    /// The target holds a foreign key to the owner. Default key: `<owner>_id`.
    HasMany {
        foreign_key: Option<Cow<'static, str>>,
    },
    /// Owner and target are linked through a pivot table. Defaults: pivot `<a>_<b>` (the singular
    /// snake case names in alphabetical order), keys `<owner>_id` and `<target>_id`.
    BelongsToMany {
        pivot: Option<Cow<'static, str>>,
        owner_key: Option<Cow<'static, str>>,
        related_key: Option<Cow<'static, str>>,
    },
}

/// Static description of a model.
#[derive(Clone, Debug)]
pub struct ModelDefinition {
    /// The unqualified name, which is also the name of the GraphQL object type.
    pub name: Cow<'static, str>,
    pub namespace: Cow<'static, str>,
    /// The backing table. Defaults to the snake case plural of the name.
    pub table: Option<Cow<'static, str>>,
    /// The `@property` annotation block.
    pub annotations: Cow<'static, str>,
    pub relations: Vec<RelationOverride>,
    pub accessor: Option<Accessor>,
}

impl ModelDefinition {
    pub fn id(&self) -> ModelId {
        ModelId::new(&self.namespace, &self.name)
    }

    /// The table backing this model.
    pub fn table(&self) -> String {
        match &self.table {
            Some(table) => table.to_string(),
            None => to_snake_case(&crate::graphql::vocabulary::english_plural(&self.name)),
        }
    }
}

/// A type which can be exposed through the generated schema.
pub trait Model: 'static {
    fn definition() -> ModelDefinition;
}

/// A relation with every key resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// The property on the owner model.
    pub property: String,
    pub owner_table: String,
    pub target: ModelId,
    pub target_table: String,
    pub link: Link,
}

/// How the rows of a [`Relation`] are linked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Link {
    BelongsTo {
        foreign_key: String,
    },
    HasOne {
        foreign_key: String,
    },
    HasMany {
        foreign_key: String,
    },
    BelongsToMany {
        pivot: String,
        owner_key: String,
        related_key: String,
    },
}

impl Link {
    /// Whether the relation yields at most one target per owner.
    pub fn is_to_one(&self) -> bool {
        matches!(self, Self::BelongsTo { .. } | Self::HasOne { .. })
    }
}

#[derive(Debug)]
struct ModelEntry {
    definition: ModelDefinition,
    properties: OnceLock<Arc<[PropertyDescriptor]>>,
}

/// The registry of models known to a schema.
#[derive(Debug, Default)]
pub struct Catalog {
    models: HashMap<ModelId, ModelEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the model `M`, returning its identifier.
    pub fn register<M: Model>(&mut self) -> ModelId {
        self.register_definition(M::definition())
    }

    /// Register a model from its definition, returning its identifier.
    ///
    /// Registering a second definition under the same identifier replaces the first.
    pub fn register_definition(&mut self, definition: ModelDefinition) -> ModelId {
        let id = definition.id();
        tracing::debug!("registering model {id}");
        self.models.insert(
            id.clone(),
            ModelEntry {
                definition,
                properties: OnceLock::new(),
            },
        );
        id
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<M: Model>(mut self) -> Self {
        self.register::<M>();
        self
    }

    pub fn contains(&self, model: &ModelId) -> bool {
        self.models.contains_key(model)
    }

    /// Identifiers of every registered model, in a stable order.
    pub fn models(&self) -> Vec<ModelId> {
        let mut models = self.models.keys().cloned().collect::<Vec<_>>();
        models.sort();
        models
    }

    fn entry(&self, model: &ModelId) -> Result<&ModelEntry> {
        self.models.get(model).ok_or_else(|| Error::UnknownModel {
            model: model.to_string(),
        })
    }

    pub fn definition(&self, model: &ModelId) -> Result<&ModelDefinition> {
        Ok(&self.entry(model)?.definition)
    }

    pub fn table(&self, model: &ModelId) -> Result<String> {
        Ok(self.definition(model)?.table())
    }

    /// The property descriptors of `model`, in declaration order.
    ///
    /// The annotations are parsed on the first call for each model and the result is cached.
    pub fn describe(&self, model: &ModelId) -> Result<Arc<[PropertyDescriptor]>> {
        let entry = self.entry(model)?;
        if let Some(properties) = entry.properties.get() {
            return Ok(properties.clone());
        }
        let parsed: Arc<[PropertyDescriptor]> =
            metadata::parse(model, &entry.definition.annotations, |id| self.contains(id))?.into();
        Ok(entry.properties.get_or_init(|| parsed).clone())
    }

    /// The descriptor of a single property.
    pub fn property(&self, model: &ModelId, property: &str) -> Result<PropertyDescriptor> {
        self.describe(model)?
            .iter()
            .find(|p| p.name == property)
            .cloned()
            .ok_or_else(|| Error::UnknownProperty {
                model: model.to_string(),
                property: property.to_string(),
            })
    }

    /// Resolve the relation behind a relation property.
    pub fn relation(&self, model: &ModelId, property: &str) -> Result<Relation> {
        let descriptor = self.property(model, property)?;
        let PropertyType::Model(target) = &descriptor.ty else {
            return Err(Error::InvalidInput {
                reason: format!("{model}.{property} is not a relation"),
            });
        };
        let definition = self.definition(model)?;
        let owner_key = format!("{}_id", to_snake_case(&definition.name));
        let target_definition = self.definition(target)?;
        let declared = definition
            .relations
            .iter()
            .find(|r| r.property == property)
            .map(|r| r.kind.clone());
        let kind = declared.unwrap_or(if descriptor.is_list {
            RelationKind::HasMany { foreign_key: None }
        } else {
            RelationKind::BelongsTo { foreign_key: None }
        });
        let link = match kind {
            RelationKind::BelongsTo { foreign_key } => Link::BelongsTo {
                foreign_key: foreign_key
                    .map(Cow::into_owned)
                    .unwrap_or_else(|| format!("{}_id", to_snake_case(property))),
            },
            RelationKind::HasOne { foreign_key } => Link::HasOne {
                foreign_key: foreign_key
                    .map(Cow::into_owned)
                    .unwrap_or_else(|| owner_key.clone()),
            },
            RelationKind::HasMany { foreign_key } => Link::HasMany {
                foreign_key: foreign_key
                    .map(Cow::into_owned)
                    .unwrap_or_else(|| owner_key.clone()),
            },
            RelationKind::BelongsToMany {
                pivot,
                owner_key: declared_owner_key,
                related_key,
            } => {
                let owner = to_snake_case(&definition.name);
                let related = to_snake_case(&target_definition.name);
                let default_pivot = if owner <= related {
                    format!("{owner}_{related}")
                } else {
                    format!("{related}_{owner}")
                };
                Link::BelongsToMany {
                    pivot: pivot.map(Cow::into_owned).unwrap_or(default_pivot),
                    owner_key: declared_owner_key
                        .map(Cow::into_owned)
                        .unwrap_or_else(|| owner_key.clone()),
                    related_key: related_key
                        .map(Cow::into_owned)
                        .unwrap_or_else(|| format!("{related}_id")),
                }
            }
        };
        if descriptor.is_list == link.is_to_one() {
            return Err(Error::MetadataParse {
                model: model.to_string(),
                line: property.to_string(),
                reason: "relation cardinality does not match the property type".into(),
            });
        }
        Ok(Relation {
            property: property.to_string(),
            owner_table: definition.table(),
            target: target.clone(),
            target_table: target_definition.table(),
            link,
        })
    }
}

/// Convert a string to snake case.
pub(crate) fn to_snake_case(s: &str) -> String {
    use convert_case::Boundary::*;
    s.with_boundaries(&[Hyphen, Underscore, Space, LowerUpper])
        .to_case(Case::Snake)
}
