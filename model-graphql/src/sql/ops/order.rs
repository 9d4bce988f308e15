//! Order expressions and their compilation into `ORDER BY` terms.
//!
//! An order argument names exactly one property, either a scalar with a direction
//! (`{ name: { order: "desc" } }`) or a to-one relation with a nested order expression
//! (`{ author: { name: { order: "asc" } } }`). Ordering by a relation joins the relation's table
//! into the query.

use super::{id_column, property_column};
use crate::error::{Error, Result};
use crate::model::{Catalog, Link, ModelId};
use crate::sql::db::{Column, Direction, JoinClause, Query};
use async_graphql::Value as GqlValue;

/// A parsed order argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderExpression {
    Field {
        property: String,
        direction: Direction,
    },
    Relation {
        property: String,
        target: ModelId,
        order: Box<OrderExpression>,
    },
}

impl OrderExpression {
    /// Parse an order argument on `model`.
    ///
    /// A `null` argument parses to [`None`].
    pub fn parse(catalog: &Catalog, model: &ModelId, value: &GqlValue) -> Result<Option<Self>> {
        let entries = match value {
            GqlValue::Null => return Ok(None),
            GqlValue::Object(entries) => entries,
            _ => {
                return Err(Error::input("order must be an object"));
            }
        };
        let present = entries
            .iter()
            .filter(|(_, value)| !matches!(value, GqlValue::Null))
            .collect::<Vec<_>>();
        let [(property, value)] = present.as_slice() else {
            return Err(Error::OrderFieldCount {
                count: present.len(),
            });
        };
        let property = property.as_str();
        let descriptor = catalog.property(model, property)?;
        if !descriptor.is_queryable() {
            return Err(Error::input(format!("property {property} cannot be ordered")));
        }
        if let Some(target) = descriptor.target() {
            if descriptor.is_list {
                return Err(Error::input(format!(
                    "cannot order by the to-many relation {property}"
                )));
            }
            let order = Self::parse(catalog, target, value)?.ok_or(Error::OrderFieldCount {
                count: 0,
            })?;
            return Ok(Some(Self::Relation {
                property: property.to_string(),
                target: target.clone(),
                order: Box::new(order),
            }));
        }
        let direction = match value {
            GqlValue::Object(fields) => fields.get("order"),
            _ => None,
        }
        .ok_or_else(|| Error::input(format!("order on {property} must give a direction")))?;
        Ok(Some(Self::Field {
            property: property.to_string(),
            direction: parse_direction(direction)?,
        }))
    }

    /// Every property referenced, paired with its model.
    pub fn references(&self, model: &ModelId) -> Vec<(ModelId, String)> {
        match self {
            Self::Field { property, .. } => vec![(model.clone(), property.clone())],
            Self::Relation {
                property,
                target,
                order,
            } => {
                let mut refs = vec![(model.clone(), property.clone())];
                refs.extend(order.references(target));
                refs
            }
        }
    }
}

/// Parse a direction token, ignoring case.
pub fn parse_direction(value: &GqlValue) -> Result<Direction> {
    let token = match value {
        GqlValue::String(s) => s.as_str(),
        GqlValue::Enum(e) => e.as_str(),
        value => {
            return Err(Error::InvalidOrderDirection {
                direction: value.to_string(),
            })
        }
    };
    match token.to_ascii_lowercase().as_str() {
        "asc" => Ok(Direction::Asc),
        "desc" => Ok(Direction::Desc),
        _ => Err(Error::InvalidOrderDirection {
            direction: token.to_string(),
        }),
    }
}

/// Compiles [`OrderExpression`]s into `ORDER BY` terms and joins.
#[derive(Clone, Copy, Debug)]
pub struct OrderCompiler<'a> {
    catalog: &'a Catalog,
    max_depth: usize,
}

impl<'a> OrderCompiler<'a> {
    pub fn new(catalog: &'a Catalog, max_depth: usize) -> Self {
        Self { catalog, max_depth }
    }

    /// Order `query`, which selects from the table of `model`, by `expr`.
    pub fn apply(&self, query: Query, model: &ModelId, expr: &OrderExpression) -> Result<Query> {
        let table = self.catalog.table(model)?;
        self.apply_at(query, model, &table, expr, 0)
    }

    fn apply_at(
        &self,
        query: Query,
        model: &ModelId,
        table: &str,
        expr: &OrderExpression,
        depth: usize,
    ) -> Result<Query> {
        match expr {
            OrderExpression::Field {
                property,
                direction,
            } => {
                let column = property_column(table, property);
                tracing::debug!("ordering {model} by {column} {direction}");
                Ok(query.order_by(column, *direction))
            }
            OrderExpression::Relation {
                property,
                target,
                order,
            } => {
                let depth = depth + 1;
                if depth > self.max_depth {
                    return Err(Error::NestedOrderDepthExceeded { depth });
                }
                let relation = self.catalog.relation(model, property)?;
                let target_table = relation.target_table.as_str();
                let join = match &relation.link {
                    Link::BelongsTo { foreign_key } => JoinClause {
                        table: target_table.to_string().into(),
                        lhs: id_column(target_table),
                        op: "=".into(),
                        rhs: Column::qualified(table.to_string(), foreign_key.clone()),
                    },
                    Link::HasOne { foreign_key } => JoinClause {
                        table: target_table.to_string().into(),
                        lhs: Column::qualified(target_table.to_string(), foreign_key.clone()),
                        op: "=".into(),
                        rhs: id_column(table),
                    },
                    _ => {
                        return Err(Error::input(format!(
                            "cannot order by the to-many relation {property}"
                        )))
                    }
                };
                self.apply_at(query.join(join), target, target_table, order, depth)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use crate::model::test::library;
    use crate::sql::ops::test::{library_db, names};
    use async_graphql::value;

    fn book() -> ModelId {
        "library::Book".into()
    }

    fn parse(model: &ModelId, order: GqlValue) -> Result<Option<OrderExpression>> {
        OrderExpression::parse(&library(), model, &order)
    }

    async fn run(model: &ModelId, order: GqlValue) -> Vec<String> {
        let catalog = library();
        let db = library_db().await;
        let expr = OrderExpression::parse(&catalog, model, &order)
            .unwrap()
            .unwrap();
        let query = OrderCompiler::new(&catalog, 1)
            .apply(Query::from(catalog.table(model).unwrap()), model, &expr)
            .unwrap();
        names(&query.many(&db).await.unwrap())
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            parse(&book(), value!({ "name": { "order": "DESC" } })).unwrap(),
            Some(OrderExpression::Field {
                property: "name".into(),
                direction: Direction::Desc,
            })
        );
        assert_eq!(
            parse(&book(), value!({ "author": { "name": { "order": "asc" } } })).unwrap(),
            Some(OrderExpression::Relation {
                property: "author".into(),
                target: "library::Author".into(),
                order: Box::new(OrderExpression::Field {
                    property: "name".into(),
                    direction: Direction::Asc,
                }),
            })
        );
        assert_eq!(parse(&book(), GqlValue::Null).unwrap(), None);
        assert_eq!(
            parse(&book(), value!({ "name": null, "id": { "order": "asc" } })).unwrap(),
            Some(OrderExpression::Field {
                property: "id".into(),
                direction: Direction::Asc,
            })
        );
    }

    #[test]
    fn test_field_count() {
        assert!(matches!(
            parse(
                &book(),
                value!({ "name": { "order": "asc" }, "id": { "order": "asc" } })
            ),
            Err(Error::OrderFieldCount { count: 2 })
        ));
        assert!(matches!(
            parse(&book(), value!({})),
            Err(Error::OrderFieldCount { count: 0 })
        ));
        assert!(matches!(
            parse(&book(), value!({ "author": {} })),
            Err(Error::OrderFieldCount { count: 0 })
        ));
    }

    #[test]
    fn test_direction() {
        for token in ["asc", "ASC", "Asc"] {
            assert_eq!(parse_direction(&value!(token)).unwrap(), Direction::Asc);
        }
        assert!(matches!(
            parse(&book(), value!({ "name": { "order": "up" } })),
            Err(Error::InvalidOrderDirection { direction }) if direction == "up"
        ));
    }

    #[test]
    fn test_to_many_rejected() {
        assert!(parse(&book(), value!({ "readers": { "name": { "order": "asc" } } })).is_err());
    }

    #[test]
    fn test_depth() {
        let catalog = library();
        let expr = parse(
            &"library::Pencil".into(),
            value!({ "author": { "pencil": { "name": { "order": "asc" } } } }),
        )
        .unwrap()
        .unwrap();
        assert!(matches!(
            OrderCompiler::new(&catalog, 1).apply(
                Query::from("pencils"),
                &"library::Pencil".into(),
                &expr
            ),
            Err(Error::NestedOrderDepthExceeded { depth: 2 })
        ));
    }

    #[async_std::test]
    async fn test_order_rows() {
        init_logging();
        assert_eq!(
            run(&book(), value!({ "published": { "order": "desc" } })).await,
            [
                "The Silmarillion",
                "Children of Dune",
                "Earthsea",
                "Dune",
                "The Hobbit"
            ]
        );
        assert_eq!(
            run(&book(), value!({ "author": { "name": { "order": "desc" } } })).await,
            [
                "The Hobbit",
                "The Silmarillion",
                "Earthsea",
                "Dune",
                "Children of Dune"
            ]
        );
        assert_eq!(
            run(
                &"library::Author".into(),
                value!({ "pencil": { "name": { "order": "asc" } } })
            )
            .await,
            ["Herbert"]
        );
    }
}
