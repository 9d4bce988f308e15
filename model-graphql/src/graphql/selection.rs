//! Snapshots of the fields a request selects.
//!
//! The execution engine exposes the selection set of a field only while the field is being
//! resolved. The eager-load planner needs the nested field names and arguments of the whole
//! subtree, so resolvers capture it into a [`Selection`] tree, down to a bounded depth.

use crate::error::{Error, Result};
use async_graphql::{Name, SelectionField, Value as GqlValue};
use indexmap::IndexMap;

/// A selected field, its arguments and its own selections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// The name of the field (not its alias).
    pub name: String,
    pub args: IndexMap<Name, GqlValue>,
    pub children: Vec<Selection>,
}

impl Selection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an argument.
    pub fn arg(mut self, name: &str, value: GqlValue) -> Self {
        self.args.insert(Name::new(name), value);
        self
    }

    /// Add a child selection.
    pub fn with(mut self, child: Selection) -> Self {
        self.children.push(child);
        self
    }

    /// Capture the selection of an engine field, at most `depth` levels below it.
    ///
    /// Fragments are flattened into their enclosing selection, and variables in arguments are
    /// replaced by their values.
    pub fn capture(field: &SelectionField<'_>, depth: usize) -> Result<Self> {
        let args = field
            .arguments()
            .map_err(|err| Error::input(err.message))?
            .into_iter()
            .collect();
        let children = if depth == 0 {
            vec![]
        } else {
            field
                .selection_set()
                .map(|child| Self::capture(&child, depth - 1))
                .collect::<Result<_>>()?
        };
        Ok(Self {
            name: field.name().to_string(),
            args,
            children,
        })
    }

    /// Every child selecting the field `name`, under any alias.
    pub fn children_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Selection> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// The selections found by following `path` down the tree, through every alias.
    pub fn descend<'s>(&'s self, path: &[&'s str]) -> Vec<&'s Selection> {
        let mut current = vec![self];
        for &name in path {
            current = current
                .into_iter()
                .flat_map(|selection| selection.children_named(name))
                .collect();
        }
        current
    }
}
