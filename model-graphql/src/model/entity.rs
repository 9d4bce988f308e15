//! Loaded model instances.

use super::{metadata::ScalarKind, ModelId, ID};
use crate::error::{Error, Result};
use crate::sql::db::{parse_date_time, Record, Value, DATE_TIME_FORMAT};
use crate::sql::ops::relation::RelationArgs;
use async_graphql::{Number, Value as GqlValue};
use std::collections::BTreeMap;

/// A row of a model's table, together with any relations loaded alongside it.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub model: ModelId,
    pub attributes: Record,
    pub relations: BTreeMap<String, Loaded>,
    /// The arguments each loaded relation was restricted by. Absent means unrestricted.
    pub restrictions: BTreeMap<String, RelationArgs>,
}

/// A preloaded relation.
#[derive(Clone, Debug, PartialEq)]
pub enum Loaded {
    One(Option<Box<Entity>>),
    Many(Vec<Entity>),
}

impl Entity {
    pub fn new(model: ModelId, attributes: Record) -> Self {
        Self {
            model,
            attributes,
            relations: Default::default(),
            restrictions: Default::default(),
        }
    }

    /// The primary key, if the entity has been persisted.
    pub fn id(&self) -> Option<i64> {
        self.attributes.get(ID).and_then(Value::as_int)
    }

    /// The stored value of a column, or null if the column is absent.
    pub fn get(&self, column: &str) -> Value {
        self.attributes.get(column).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.attributes.insert(column.into(), value);
    }

    pub fn relation(&self, property: &str) -> Option<&Loaded> {
        self.relations.get(property)
    }

    /// The relation `property`, if it was loaded with exactly the restrictions `args`.
    pub fn relation_with(&self, property: &str, args: &RelationArgs) -> Option<&Loaded> {
        let loaded = self.relations.get(property)?;
        let matches = match self.restrictions.get(property) {
            Some(restrictions) => restrictions == args,
            None => *args == RelationArgs::default(),
        };
        matches.then_some(loaded)
    }

    /// Store every target of the relation `property`.
    pub fn set_relation(&mut self, property: impl Into<String>, loaded: Loaded) {
        let property = property.into();
        self.restrictions.remove(&property);
        self.relations.insert(property, loaded);
    }

    /// Store the targets of the relation `property` which satisfy `args`.
    pub fn set_restricted_relation(
        &mut self,
        property: impl Into<String>,
        loaded: Loaded,
        args: RelationArgs,
    ) {
        let property = property.into();
        self.relations.insert(property.clone(), loaded);
        if args == RelationArgs::default() {
            self.restrictions.remove(&property);
        } else {
            self.restrictions.insert(property, args);
        }
    }

    /// Mutable access to the entities of a loaded relation, whatever its cardinality.
    pub(crate) fn loaded_mut(&mut self, property: &str) -> Vec<&mut Entity> {
        match self.relations.get_mut(property) {
            Some(Loaded::One(Some(entity))) => vec![entity.as_mut()],
            Some(Loaded::Many(entities)) => entities.iter_mut().collect(),
            _ => vec![],
        }
    }
}

/// Convert a database value to a GraphQL value.
pub fn to_graphql(value: &Value) -> GqlValue {
    match value {
        Value::Null => GqlValue::Null,
        Value::Bool(b) => GqlValue::Boolean(*b),
        Value::Int(i) => GqlValue::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(GqlValue::Number)
            .unwrap_or(GqlValue::Null),
        Value::Text(s) => GqlValue::String(s.clone()),
        Value::DateTime(dt) => GqlValue::String(dt.format(DATE_TIME_FORMAT).to_string()),
        Value::List(values) => GqlValue::List(values.iter().map(to_graphql).collect()),
    }
}

/// Convert a GraphQL argument value to a database value of the given kind.
///
/// Lists are converted element-wise.
pub fn from_graphql(value: &GqlValue, kind: ScalarKind) -> Result<Value> {
    let mismatch = || Error::input(format!("expected {kind}, found {value}"));
    Ok(match (value, kind) {
        (GqlValue::Null, _) => Value::Null,
        (GqlValue::List(values), _) => Value::List(
            values
                .iter()
                .map(|value| from_graphql(value, kind))
                .collect::<Result<_>>()?,
        ),
        (GqlValue::Number(n), ScalarKind::Int) => Value::Int(n.as_i64().ok_or_else(mismatch)?),
        (GqlValue::Number(n), ScalarKind::Float) => {
            Value::Float(n.as_f64().ok_or_else(mismatch)?)
        }
        (GqlValue::Boolean(b), ScalarKind::Boolean) => Value::Bool(*b),
        (GqlValue::String(s), ScalarKind::String) => Value::Text(s.clone()),
        (GqlValue::Enum(e), ScalarKind::String) => Value::Text(e.to_string()),
        (GqlValue::String(s), ScalarKind::DateTime) => {
            Value::DateTime(parse_date_time(s).ok_or_else(mismatch)?)
        }
        _ => return Err(mismatch()),
    })
}
