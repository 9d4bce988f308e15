//! Filter expressions and their compilation into `WHERE` clauses.
//!
//! A filter argument has the shape
//!
//! ```text
//! { and: [F], or: [F], not: F, <scalar>: { <op>: value }, <relation>: F }
//! ```
//!
//! Every entry at one level must hold, so the entries are conjoined. The `or` entries are grouped
//! together, so `{ name: {...}, or: [a, b] }` means `name AND (a OR b)`. Relation entries become
//! correlated `EXISTS` subqueries against the relation's target table, and may be nested at most
//! `max_depth` levels deep.

use super::{id_column, property_column, scalar_kind};
use crate::error::{Error, Result};
use crate::model::{entity::from_graphql, Catalog, Link, ModelId};
use crate::sql::db::{Boolean, Column, Exists, JoinClause, Query, Value, WhereClause};
use async_graphql::Value as GqlValue;
use derive_more::Display;

/// A comparison operator in a field predicate.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Operator {
    #[display(fmt = "eq")]
    Eq,
    #[display(fmt = "ne")]
    Ne,
    #[display(fmt = "lt")]
    Lt,
    #[display(fmt = "gt")]
    Gt,
    #[display(fmt = "lte")]
    Lte,
    #[display(fmt = "gte")]
    Gte,
    #[display(fmt = "like")]
    Like,
    #[display(fmt = "nlike")]
    NLike,
    #[display(fmt = "in")]
    In,
    #[display(fmt = "nin")]
    NIn,
    #[display(fmt = "date")]
    Date,
    #[display(fmt = "ndate")]
    NDate,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Self::Eq,
        Self::Ne,
        Self::Lt,
        Self::Gt,
        Self::Lte,
        Self::Gte,
        Self::Like,
        Self::NLike,
        Self::In,
        Self::NIn,
        Self::Date,
        Self::NDate,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.to_string() == name)
    }

    /// Whether the operand is a list of values.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::NIn)
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Eq | Self::Date => "=",
            Self::Ne | Self::NDate => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NLike => "NOT LIKE",
            Self::In => "IN",
            Self::NIn => "NOT IN",
        }
    }
}

/// A single-operator comparison on a scalar property.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub op: Operator,
    pub value: GqlValue,
}

/// The filter on one property.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldFilter {
    Predicate(Predicate),
    /// A filter on the targets of a relation.
    Relation {
        target: ModelId,
        filter: FilterExpression,
    },
}

/// A parsed filter argument.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterExpression {
    pub and: Vec<FilterExpression>,
    pub or: Vec<FilterExpression>,
    pub not: Option<Box<FilterExpression>>,
    /// Property filters, in argument order.
    pub fields: Vec<(String, FieldFilter)>,
}

impl FilterExpression {
    /// Parse a filter argument on `model`.
    ///
    /// A `null` argument is the empty filter.
    pub fn parse(catalog: &Catalog, model: &ModelId, value: &GqlValue) -> Result<Self> {
        let mut expr = Self::default();
        let entries = match value {
            GqlValue::Null => return Ok(expr),
            GqlValue::Object(entries) => entries,
            _ => return Err(invalid("filter must be an object")),
        };
        for (key, value) in entries {
            match key.as_str() {
                "and" => expr.and = Self::parse_list(catalog, model, value)?,
                "or" => expr.or = Self::parse_list(catalog, model, value)?,
                "not" => {
                    if !matches!(value, GqlValue::Null) {
                        expr.not = Some(Box::new(Self::parse(catalog, model, value)?));
                    }
                }
                property => {
                    if matches!(value, GqlValue::Null) {
                        continue;
                    }
                    let filter = FieldFilter::parse(catalog, model, property, value)?;
                    expr.fields.push((property.to_string(), filter));
                }
            }
        }
        Ok(expr)
    }

    fn parse_list(catalog: &Catalog, model: &ModelId, value: &GqlValue) -> Result<Vec<Self>> {
        match value {
            GqlValue::Null => Ok(vec![]),
            GqlValue::List(values) => values
                .iter()
                .map(|value| Self::parse(catalog, model, value))
                .collect(),
            value => Ok(vec![Self::parse(catalog, model, value)?]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.and.iter().all(Self::is_empty)
            && self.or.is_empty()
            && self.not.is_none()
            && self.fields.is_empty()
    }

    /// Every property filtered on, paired with its model, including properties of relation
    /// targets and of nested combinators.
    pub fn references(&self, model: &ModelId) -> Vec<(ModelId, String)> {
        let mut refs = vec![];
        self.collect_references(model, &mut refs);
        refs
    }

    fn collect_references(&self, model: &ModelId, refs: &mut Vec<(ModelId, String)>) {
        for (property, filter) in &self.fields {
            let reference = (model.clone(), property.clone());
            if !refs.contains(&reference) {
                refs.push(reference);
            }
            if let FieldFilter::Relation { target, filter } = filter {
                filter.collect_references(target, refs);
            }
        }
        for expr in self.and.iter().chain(&self.or).chain(self.not.as_deref()) {
            expr.collect_references(model, refs);
        }
    }
}

impl FieldFilter {
    fn parse(catalog: &Catalog, model: &ModelId, property: &str, value: &GqlValue) -> Result<Self> {
        let descriptor = catalog.property(model, property)?;
        if !descriptor.is_queryable() {
            return Err(invalid(format!("property {property} cannot be filtered")));
        }
        if let Some(target) = descriptor.target() {
            return Ok(Self::Relation {
                target: target.clone(),
                filter: FilterExpression::parse(catalog, target, value)?,
            });
        }
        let GqlValue::Object(operators) = value else {
            return Err(invalid(format!("filter on {property} must be an object")));
        };
        let mut operators = operators.iter();
        let (Some((op, value)), None) = (operators.next(), operators.next()) else {
            return Err(invalid("Filter must have exactly one operator."));
        };
        let op = Operator::parse(op.as_str())
            .ok_or_else(|| invalid(format!("unknown filter operator {op}")))?;
        Ok(Self::Predicate(Predicate {
            op,
            value: value.clone(),
        }))
    }
}

/// Compiles [`FilterExpression`]s into `WHERE` clauses.
#[derive(Clone, Copy, Debug)]
pub struct FilterCompiler<'a> {
    catalog: &'a Catalog,
    max_depth: usize,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(catalog: &'a Catalog, max_depth: usize) -> Self {
        Self { catalog, max_depth }
    }

    /// Restrict `query`, which selects from the table of `model`, to rows matching `expr`.
    pub fn apply(&self, query: Query, model: &ModelId, expr: &FilterExpression) -> Result<Query> {
        let clause = self.compile(model, expr)?;
        tracing::debug!("compiled filter on {model}: {clause}");
        Ok(query.filter(clause))
    }

    /// Compile a filter on `model` into a clause over its table.
    pub fn compile(&self, model: &ModelId, expr: &FilterExpression) -> Result<WhereClause<'static>> {
        let table = self.catalog.table(model)?;
        self.compile_at(model, &table, expr, 0)
    }

    fn compile_at(
        &self,
        model: &ModelId,
        table: &str,
        expr: &FilterExpression,
        depth: usize,
    ) -> Result<WhereClause<'static>> {
        let mut clauses = vec![];
        for (property, filter) in &expr.fields {
            clauses.push(match filter {
                FieldFilter::Predicate(predicate) => {
                    self.compile_predicate(model, table, property, predicate)?
                }
                FieldFilter::Relation { filter, .. } => {
                    self.compile_relation(model, property, filter, depth + 1)?
                }
            });
        }
        for child in dedup(&expr.and) {
            clauses.push(self.compile_at(model, table, child, depth)?);
        }
        let any = dedup(&expr.or)
            .into_iter()
            .map(|child| self.compile_at(model, table, child, depth))
            .collect::<Result<Vec<_>>>()?;
        if !any.is_empty() {
            clauses.push(WhereClause::any(any));
        }
        if let Some(not) = &expr.not {
            clauses.push(WhereClause::not(self.compile_at(model, table, not, depth)?));
        }
        Ok(WhereClause::all(clauses))
    }

    fn compile_predicate(
        &self,
        model: &ModelId,
        table: &str,
        property: &str,
        predicate: &Predicate,
    ) -> Result<WhereClause<'static>> {
        let descriptor = self.catalog.property(model, property)?;
        let kind = scalar_kind(&descriptor)
            .ok_or_else(|| invalid(format!("property {property} is not a scalar")))?;
        let column = property_column(table, property);
        let op = predicate.op;
        let boolean = match (op, from_graphql(&predicate.value, kind)?) {
            (Operator::Eq, Value::Null) => Boolean::IsNull { column },
            (Operator::Ne, Value::Null) => Boolean::IsNotNull { column },
            (_, Value::Null) => return Err(invalid(format!("operator {op} requires a value"))),
            (Operator::In, Value::List(params)) => Boolean::OneOf { column, params },
            (Operator::NIn, Value::List(params)) => Boolean::NoneOf { column, params },
            (Operator::Like | Operator::NLike, Value::Text(pattern)) => Boolean::Like {
                column,
                pattern,
                negated: op == Operator::NLike,
            },
            (Operator::Date | Operator::NDate, param @ Value::DateTime(_)) => Boolean::Date {
                column,
                op: op.sql().into(),
                param,
            },
            (_, Value::List(_)) => {
                return Err(invalid(format!("operator {op} does not accept a list")))
            }
            (Operator::In | Operator::NIn, _) => {
                return Err(invalid(format!("operator {op} requires a list")))
            }
            (Operator::Like | Operator::NLike, _) => {
                return Err(invalid(format!("operator {op} requires a string")))
            }
            (Operator::Date | Operator::NDate, _) => {
                return Err(invalid(format!("operator {op} requires a date")))
            }
            (_, param) => Boolean::Cmp {
                column,
                op: op.sql().into(),
                param,
            },
        };
        Ok(boolean.into())
    }

    fn compile_relation(
        &self,
        model: &ModelId,
        property: &str,
        filter: &FilterExpression,
        depth: usize,
    ) -> Result<WhereClause<'static>> {
        if depth > self.max_depth {
            return Err(Error::NestedFilterDepthExceeded { depth });
        }
        let relation = self.catalog.relation(model, property)?;
        let target_table = relation.target_table.as_str();
        let inner = self.compile_at(&relation.target, target_table, filter, depth)?;
        let owner_id = id_column(&relation.owner_table);
        let exists = match &relation.link {
            Link::BelongsTo { foreign_key } => Exists {
                table: target_table.to_string().into(),
                joins: vec![],
                inner: id_column(target_table),
                outer: Column::qualified(relation.owner_table.clone(), foreign_key.clone()),
                filter: inner,
            },
            Link::HasOne { foreign_key } | Link::HasMany { foreign_key } => Exists {
                table: target_table.to_string().into(),
                joins: vec![],
                inner: Column::qualified(target_table.to_string(), foreign_key.clone()),
                outer: owner_id,
                filter: inner,
            },
            Link::BelongsToMany {
                pivot,
                owner_key,
                related_key,
            } => Exists {
                table: target_table.to_string().into(),
                joins: vec![JoinClause {
                    table: pivot.clone().into(),
                    lhs: Column::qualified(pivot.clone(), related_key.clone()),
                    op: "=".into(),
                    rhs: id_column(target_table),
                }],
                inner: Column::qualified(pivot.clone(), owner_key.clone()),
                outer: owner_id,
                filter: inner,
            },
        };
        Ok(Boolean::Exists(Box::new(exists)).into())
    }
}

/// Remove structurally equal duplicates, keeping the first occurrence of each.
fn dedup(exprs: &[FilterExpression]) -> Vec<&FilterExpression> {
    let mut unique: Vec<&FilterExpression> = vec![];
    for expr in exprs {
        if !unique.contains(&expr) {
            unique.push(expr);
        }
    }
    unique
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidFilter {
        reason: reason.into(),
    }
}
