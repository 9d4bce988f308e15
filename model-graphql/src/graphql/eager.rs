//! Planning which relations to load ahead of resolution.
//!
//! Resolving a relation field on each entity of a list separately costs one query per entity. The
//! [`EagerLoadPlanner`] walks the selection of a request alongside the object type it selects
//! from, and collects the relation paths the request will traverse, so that they can be batch
//! loaded up front with [`Loader::load_paths`](crate::sql::ops::relation::Loader::load_paths).

use super::selection::Selection;
use super::type_graph::{FieldShape, TypeGraph, TypeNode};
use crate::error::Result;
use crate::model::Catalog;
use crate::sql::ops::relation::RelationArgs;

/// Dotted relation paths to load, each with the arguments restricting its targets.
///
/// Parents always precede their children. Each path is planned once, with the arguments of the first
/// selection which reaches it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EagerLoadPlan {
    paths: Vec<(String, RelationArgs)>,
}

impl EagerLoadPlan {
    /// The planned paths, in order.
    pub fn paths(&self) -> Vec<&str> {
        self.paths.iter().map(|(path, _)| path.as_str()).collect()
    }

    /// The paths with their arguments.
    pub fn entries(&self) -> &[(String, RelationArgs)] {
        &self.paths
    }

    pub fn args(&self, path: &str) -> Option<&RelationArgs> {
        self.paths
            .iter()
            .find_map(|(planned, args)| (planned == path).then_some(args))
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|(planned, _)| planned == path)
    }
}

/// Computes [`EagerLoadPlan`]s.
#[derive(Clone, Copy, Debug)]
pub struct EagerLoadPlanner<'a> {
    catalog: &'a Catalog,
    graph: &'a TypeGraph,
}

impl<'a> EagerLoadPlanner<'a> {
    pub fn new(catalog: &'a Catalog, graph: &'a TypeGraph) -> Self {
        Self { catalog, graph }
    }

    /// Plan the relations to load for entities of the object type `root`, whose fields are selected
    /// by the children of `selection`.
    pub fn plan(&self, selection: &Selection, root: &TypeNode) -> Result<EagerLoadPlan> {
        self.plan_all([selection], root)
    }

    /// Plan for several selections of the same entities, such as the `node` selections under
    /// differently aliased `edges`.
    pub fn plan_all<'s>(
        &self,
        selections: impl IntoIterator<Item = &'s Selection>,
        root: &TypeNode,
    ) -> Result<EagerLoadPlan> {
        let mut plan = EagerLoadPlan::default();
        for selection in selections {
            self.collect(selection, root, None, &mut plan)?;
        }
        if !plan.is_empty() {
            tracing::debug!("eager loading {:?} for {}", plan.paths(), root.name);
        }
        Ok(plan)
    }

    fn collect(
        &self,
        selection: &Selection,
        node: &TypeNode,
        prefix: Option<&str>,
        plan: &mut EagerLoadPlan,
    ) -> Result<()> {
        for child in &selection.children {
            let Some(field) = node.field(&child.name) else {
                continue;
            };
            if field
                .property
                .as_ref()
                .map_or(true, |property| property.eager_load_disabled)
            {
                continue;
            }
            let (target, nested) = match &field.shape {
                FieldShape::ToOne(target) | FieldShape::ToMany(target) => (target, vec![child]),
                FieldShape::Connection(target) => {
                    // Without a selection on the nodes there is nothing to load.
                    let nodes = child.descend(&["edges", "node"]);
                    if nodes.is_empty() {
                        continue;
                    }
                    (target, nodes)
                }
                _ => continue,
            };
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{}", child.name),
                None => child.name.clone(),
            };
            let args = RelationArgs::parse(self.catalog, target, &child.args)?;
            match plan.args(&path) {
                None => plan.paths.push((path.clone(), args)),
                // An alias restricted differently resolves with its own query.
                Some(planned) if *planned != args => continue,
                Some(_) => {}
            }
            let target = self.graph.object(target)?;
            for nested in nested {
                self.collect(nested, target, Some(&path), plan)?;
            }
        }
        Ok(())
    }
}
