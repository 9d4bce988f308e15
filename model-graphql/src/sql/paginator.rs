//! Deferred, paginated result sets.
//!
//! A [`Paginator`] stands for the result of a list or connection field before it is run. Filters
//! and orders are applied to it first; only `count` and `get`, called by the resolvers of
//! `totalCount` and `edges`, touch the database.

use super::db::{Connection, Query};
use super::ops::{
    filter::{FilterCompiler, FilterExpression},
    order::{OrderCompiler, OrderExpression},
    relation::{entities, RelationArgs},
};
use crate::error::{Error, Result};
use crate::model::{Catalog, Entity, ModelId};
use crate::security::{Caller, SecurityGuard};
use std::sync::Arc;

/// Where the rows of a paginator come from.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationSource {
    /// A query which has not been run yet.
    Query(Query),
    /// A collection which is already in memory.
    Materialized(Vec<Entity>),
}

/// A filtered, ordered and paginated result set of one model.
#[derive(Clone, Debug)]
pub struct Paginator {
    catalog: Arc<Catalog>,
    max_depth: usize,
    model: ModelId,
    source: RelationSource,
    limit: Option<usize>,
    offset: Option<usize>,
    entries: Option<Vec<Entity>>,
    filter: Option<FilterExpression>,
    order: Option<OrderExpression>,
}

impl Paginator {
    /// A paginator over `source`, whose rows are entities of `model`.
    ///
    /// `max_depth` bounds the relation nesting of filters and orders applied later.
    pub fn new(
        catalog: Arc<Catalog>,
        max_depth: usize,
        model: ModelId,
        source: RelationSource,
    ) -> Self {
        Self {
            catalog,
            max_depth,
            model,
            source,
            limit: None,
            offset: None,
            entries: None,
            filter: None,
            order: None,
        }
    }

    /// Return at most `limit` rows. A limit of zero does not restrict the result.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Skip the first `offset` rows.
    pub fn offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    /// Use rows loaded ahead of time as the result of [`get`](Self::get).
    pub fn with_entries(mut self, entries: Vec<Entity>) -> Self {
        self.entries = Some(entries);
        self
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    pub fn source(&self) -> &RelationSource {
        &self.source
    }

    /// Whether the rows were loaded ahead of time.
    pub fn is_preloaded(&self) -> bool {
        self.entries.is_some()
    }

    /// The restrictions applied so far, to be replayed when loading the same rows in a batch.
    pub fn args(&self) -> RelationArgs {
        RelationArgs {
            filter: self.filter.clone(),
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Restrict the rows to those matching `expr`.
    ///
    /// The guard must allow `caller` to filter the model and every property `expr` references.
    /// An empty filter is not checked.
    pub fn filter(
        mut self,
        guard: &SecurityGuard,
        caller: &Caller,
        expr: FilterExpression,
    ) -> Result<Self> {
        if expr.is_empty() {
            return Ok(self);
        }
        guard.assert_can_filter(caller, &self.model, &expr)?;
        self.source = match self.source {
            RelationSource::Query(query) => RelationSource::Query(
                FilterCompiler::new(&self.catalog, self.max_depth).apply(
                    query,
                    &self.model,
                    &expr,
                )?,
            ),
            RelationSource::Materialized(_) => return Err(Error::FilteringUnsupported),
        };
        self.filter = Some(expr);
        Ok(self)
    }

    /// Sort the rows by `expr`.
    pub fn order(mut self, expr: Option<OrderExpression>) -> Result<Self> {
        let Some(expr) = expr else {
            return Ok(self);
        };
        self.source = match self.source {
            RelationSource::Query(query) => RelationSource::Query(
                OrderCompiler::new(&self.catalog, self.max_depth).apply(
                    query,
                    &self.model,
                    &expr,
                )?,
            ),
            RelationSource::Materialized(_) => return Err(Error::OrderingUnsupported),
        };
        self.order = Some(expr);
        Ok(self)
    }

    /// The number of matching rows, disregarding limit and offset.
    pub async fn count<C: Connection>(&self, conn: &C) -> Result<usize> {
        match &self.source {
            RelationSource::Query(query) => query
                .without_limit_offset()
                .count(conn)
                .await
                .map_err(Error::sql),
            RelationSource::Materialized(entities) => Ok(entities.len()),
        }
    }

    /// The requested page of rows.
    pub async fn get<C: Connection>(&self, conn: &C) -> Result<Vec<Entity>> {
        if let Some(entries) = &self.entries {
            return Ok(entries.clone());
        }
        let limit = self.limit.filter(|n| *n > 0);
        let offset = self.offset.filter(|n| *n > 0);
        match &self.source {
            RelationSource::Query(query) => {
                let records = query
                    .clone()
                    .limit(limit)
                    .offset(offset)
                    .many(conn)
                    .await
                    .map_err(Error::sql)?;
                Ok(entities(&self.model, records))
            }
            RelationSource::Materialized(entities) => Ok(entities
                .iter()
                .skip(offset.unwrap_or(0))
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()),
        }
    }
}
