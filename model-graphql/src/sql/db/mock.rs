//! Mock instantiation of the abstract [`db`](super) interface.
//!
//! This instantiation is built on a simple in-memory database. It is useful for testing in
//! isolation from an actual database.
#![cfg(any(test, feature = "mocks"))]

use super::{
    Boolean, Clause, Column, Direction, Exists, JoinClause, OrderBy, Record, SchemaColumn,
    SelectColumn, Type, Value, WhereClause,
};
use async_std::sync::{Arc, RwLock};
use async_trait::async_trait;
use derive_more::From;
use futures::{
    stream::{self, BoxStream},
    StreamExt, TryFutureExt,
};
use itertools::Itertools;
use snafu::Snafu;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt::Display;

/// Errors returned by the in-memory database.
#[derive(Debug, Snafu, From)]
#[snafu(display("mock DB error: {}", message))]
pub struct Error {
    message: String,
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl super::Error for Error {
    fn custom(msg: impl Display) -> Self {
        Self {
            message: msg.to_string(),
        }
    }
}

/// The in-memory database.
#[derive(Debug, Default)]
struct Db {
    tables: HashMap<String, Table>,
}

impl Db {
    fn table(&self, name: &str) -> Result<&Table, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::from(format!("no such table {name}")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, Error> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::from(format!("no such table {name}")))
    }

    /// The rows of `table` joined with `joins`, along with the qualified schema of the result.
    fn joined(
        &self,
        table: &str,
        joins: &[JoinClause],
    ) -> Result<(Vec<Column<'static>>, Vec<Row>), Error> {
        let base = self.table(table)?;
        let mut rows = base.rows.clone();
        let mut schema = base.qualified_schema();
        for JoinClause {
            table,
            lhs,
            op,
            rhs,
        } in joins
        {
            tracing::trace!("JOIN {table} ON {lhs} {op} {rhs}");
            let join_table = self.table(table)?;
            schema.extend(join_table.qualified_schema());
            rows = rows
                .into_iter()
                .cartesian_product(join_table.rows.clone())
                .filter_map(|(l, r)| l.join(r, &schema, lhs, op, rhs).transpose())
                .try_collect()?;
        }
        Ok((schema, rows))
    }

    /// Test whether `row` satisfies `clause`.
    fn test(&self, row: &Row, schema: &[Column], clause: &WhereClause) -> Result<bool, Error> {
        match clause {
            WhereClause::All(clauses) => {
                for clause in clauses.iter() {
                    if !self.test(row, schema, clause)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            WhereClause::Any(clauses) => {
                for clause in clauses.iter() {
                    if self.test(row, schema, clause)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            WhereClause::Not(clause) => Ok(!self.test(row, schema, clause)?),
            WhereClause::Predicate(predicate) => self.test_predicate(row, schema, predicate),
        }
    }

    fn test_predicate(
        &self,
        row: &Row,
        schema: &[Column],
        predicate: &Boolean,
    ) -> Result<bool, Error> {
        Ok(match predicate {
            Boolean::Cmp { column, op, param } => Row::cmp(row.get(schema, column)?, op, param)?,
            Boolean::OneOf { column, params } => {
                let value = row.get(schema, column)?;
                params.iter().any(|p| Row::cmp(value, "=", p).unwrap_or(false))
            }
            Boolean::NoneOf { column, params } => {
                let value = row.get(schema, column)?;
                !value.is_null() && !params.iter().any(|p| Row::cmp(value, "=", p).unwrap_or(false))
            }
            Boolean::IsNull { column } => row.get(schema, column)?.is_null(),
            Boolean::IsNotNull { column } => !row.get(schema, column)?.is_null(),
            Boolean::Like {
                column,
                pattern,
                negated,
            } => match row.get(schema, column)? {
                Value::Text(s) => like(s, pattern) != *negated,
                _ => false,
            },
            Boolean::Date { column, op, param } => {
                match (row.get(schema, column)?, param) {
                    (Value::DateTime(l), Value::DateTime(r)) => {
                        test_ordering(Some(l.date().cmp(&r.date())), op)?
                    }
                    _ => false,
                }
            }
            Boolean::Exists(exists) => self.exists(row, schema, exists)?,
        })
    }

    fn exists(&self, outer: &Row, outer_schema: &[Column], exists: &Exists) -> Result<bool, Error> {
        let Exists {
            table,
            joins,
            inner,
            outer: outer_col,
            filter,
        } = exists;
        let key = outer.get(outer_schema, outer_col)?;
        let (schema, rows) = self.joined(table, joins)?;
        for row in &rows {
            if Row::cmp(row.get(&schema, inner)?, "=", key)? && self.test(row, &schema, filter)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run a query, producing the projected rows.
    fn query(&self, query: &SelectParts) -> Result<Vec<Record>, Error> {
        let (schema, rows) = self.joined(&query.table, &query.joins)?;
        let mut rows = rows
            .into_iter()
            .filter_map(|row| match query.filters.iter().try_fold(true, |ok, filter| {
                Ok::<_, Error>(ok && self.test(&row, &schema, filter)?)
            }) {
                Ok(true) => Some(Ok(row)),
                Ok(false) => None,
                Err(err) => Some(Err(err)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Resolve sort keys up front so sorting cannot fail halfway through.
        let mut keyed = rows
            .drain(..)
            .map(|row| {
                let keys = query
                    .order
                    .iter()
                    .map(|o| row.get(&schema, &o.column).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((keys, row))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        keyed.sort_by(|(l, _), (r, _)| {
            for ((l, r), o) in l.iter().zip(r).zip(&query.order) {
                let ord = sort_cmp(l, r);
                let ord = match o.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        keyed
            .into_iter()
            .map(|(_, row)| row)
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| row.select(&schema, &query.columns))
            .collect()
    }
}

/// Total order used for sorting, with `NULL`s first.
fn sort_cmp(l: &Value, r: &Value) -> Ordering {
    match (l.is_null(), r.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => l.compare(r).unwrap_or(Ordering::Equal),
    }
}

/// Whether the comparison operator `op` holds given the ordering of its operands.
fn test_ordering(ord: Option<Ordering>, op: &str) -> Result<bool, Error> {
    Ok(match op {
        "=" => ord == Some(Ordering::Equal),
        "!=" => ord != Some(Ordering::Equal),
        "<" => ord == Some(Ordering::Less),
        "<=" => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        ">" => ord == Some(Ordering::Greater),
        ">=" => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        op => return Err(Error::from(format!("unsupported op {op}"))),
    })
}

/// SQL `LIKE` matching: `%` matches any run of characters, `_` any single character.
fn like(s: &str, pattern: &str) -> bool {
    fn go(s: &[char], p: &[char]) -> bool {
        match p.split_first() {
            None => s.is_empty(),
            Some(('%', rest)) => (0..=s.len()).any(|i| go(&s[i..], rest)),
            Some(('_', rest)) => !s.is_empty() && go(&s[1..], rest),
            Some((c, rest)) => s.first() == Some(c) && go(&s[1..], rest),
        }
    }
    go(
        &s.chars().collect::<Vec<_>>(),
        &pattern.chars().collect::<Vec<_>>(),
    )
}

/// An in-memory table.
#[derive(Debug)]
struct Table {
    name: String,
    schema: Vec<SchemaColumn<'static>>,
    rows: Vec<Row>,
    next_serial: i64,
}

impl Table {
    fn new(name: String, schema: Vec<SchemaColumn<'static>>) -> Self {
        Self {
            name,
            schema,
            rows: vec![],
            next_serial: 1,
        }
    }

    /// Append a row given values for some of the columns, returning the generated key, if any.
    fn append(&mut self, columns: &[String], values: Vec<Value>) -> Result<Option<Value>, Error> {
        if columns.len() != values.len() {
            return Err(Error::from(format!(
                "incorrect width for table {} (found {}, expected {})",
                self.name,
                values.len(),
                columns.len()
            )));
        }
        for name in columns {
            if !self.schema.iter().any(|col| col.name() == name.as_str()) {
                return Err(Error::from(format!(
                    "table {} has no column {name}",
                    self.name
                )));
            }
        }

        let mut key = None;
        let mut row = vec![];
        for col in &self.schema {
            let explicit = columns
                .iter()
                .position(|name| col.name() == name.as_str())
                .map(|i| values[i].clone());
            let value = match (col.ty(), explicit) {
                (Type::Serial, Some(Value::Int(id))) => {
                    self.next_serial = self.next_serial.max(id + 1);
                    key = Some(Value::Int(id));
                    Value::Int(id)
                }
                (Type::Serial, _) => {
                    let id = self.next_serial;
                    self.next_serial += 1;
                    key = Some(Value::Int(id));
                    Value::Int(id)
                }
                (_, Some(value)) => value,
                (_, None) => col.default_value().clone(),
            };
            row.push(value);
        }
        self.rows.push(Row::new(row));
        Ok(key)
    }

    fn qualified_schema(&self) -> Vec<Column<'static>> {
        self.schema
            .iter()
            .map(|col| Column::qualified(self.name.clone(), col.name().into_owned()))
            .collect()
    }
}

/// A connection to the in-memory database.
#[derive(Clone, Debug)]
pub struct Connection(Arc<RwLock<Db>>);

impl Connection {
    /// Create a new database and connect to it.
    ///
    /// This will create a connection to a fresh, empty database. It will not be connected or
    /// related to any previous connection or database. Once the database is created, this
    /// connection can be [cloned](Clone) in order to create multiple simultaneous connections to
    /// the same database.
    pub fn create() -> Self {
        Self(Default::default())
    }

    /// Create a table with the given columns.
    pub async fn create_table(
        &self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = SchemaColumn<'static>>,
    ) -> Result<(), Error> {
        let mut db = self.0.write().await;
        let table = table.into();
        if let Entry::Vacant(e) = db.tables.entry(table.clone()) {
            e.insert(Table::new(table, columns.into_iter().collect()));
        }
        Ok(())
    }

    /// Create a table with the given columns and row values.
    ///
    /// Each row lists values for the non-serial columns, in schema order; serial columns are
    /// numbered automatically.
    pub async fn create_table_with_rows(
        &self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = SchemaColumn<'static>>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<(), Error> {
        let table = table.into();
        let columns = columns.into_iter().collect::<Vec<_>>();
        let explicit = columns
            .iter()
            .filter(|col| col.ty() != Type::Serial)
            .map(|col| col.name().into_owned())
            .collect::<Vec<_>>();
        self.create_table(&table, columns).await?;

        let mut db = self.0.write().await;
        let table = db.table_mut(&table)?;
        for row in rows {
            table.append(&explicit, row)?;
        }
        Ok(())
    }

    /// All rows of a table, keyed by column name, in insertion order.
    pub async fn dump(&self, table: &str) -> Result<Vec<Record>, Error> {
        let db = self.0.read().await;
        let table = db.table(table)?;
        Ok(table
            .rows
            .iter()
            .map(|row| {
                table
                    .schema
                    .iter()
                    .map(|col| col.name().into_owned())
                    .zip(row.columns.iter().cloned())
                    .collect()
            })
            .collect())
    }

    /// The schema of this database.
    ///
    /// The schema maps table names to the schema for each table. Each table schema consists of a
    /// list of column schemas.
    pub async fn schema(&self) -> HashMap<String, Vec<SchemaColumn<'static>>> {
        self.0
            .read()
            .await
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.schema.clone()))
            .collect()
    }
}

#[async_trait]
impl super::Connection for Connection {
    type Error = Error;
    type Select<'a> = Select<'a>;
    type Insert<'a> = Insert<'a>;
    type Update<'a> = Update<'a>;
    type Delete<'a> = Delete<'a>;

    fn select<'a>(
        &'a self,
        select: &'a [SelectColumn<'a>],
        table: impl Into<Cow<'a, str>> + Send,
    ) -> Self::Select<'a> {
        Select {
            db: &self.0,
            parts: SelectParts {
                table: table.into(),
                columns: select,
                joins: vec![],
                filters: vec![],
                order: vec![],
                limit: None,
                offset: None,
            },
        }
    }

    fn insert<'a, C>(
        &'a self,
        table: impl Into<Cow<'a, str>> + Send,
        columns: impl IntoIterator<Item = C>,
    ) -> Self::Insert<'a>
    where
        C: Into<String>,
    {
        Insert {
            db: &self.0,
            table: table.into(),
            columns: columns.into_iter().map(|c| c.into()).collect(),
            rows: vec![],
        }
    }

    fn update<'a>(&'a self, table: impl Into<Cow<'a, str>> + Send) -> Self::Update<'a> {
        Update {
            db: &self.0,
            table: table.into(),
            set: vec![],
            filters: vec![],
        }
    }

    fn delete<'a>(&'a self, table: impl Into<Cow<'a, str>> + Send) -> Self::Delete<'a> {
        Delete {
            db: &self.0,
            table: table.into(),
            filters: vec![],
        }
    }
}

/// The parts of a query against an in-memory database.
struct SelectParts<'a> {
    table: Cow<'a, str>,
    columns: &'a [SelectColumn<'a>],
    joins: Vec<JoinClause<'a>>,
    filters: Vec<WhereClause<'a>>,
    order: Vec<OrderBy<'a>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// A query against an in-memory database.
pub struct Select<'a> {
    db: &'a RwLock<Db>,
    parts: SelectParts<'a>,
}

#[async_trait]
impl<'a> super::Select<'a> for Select<'a> {
    type Error = Error;
    type Row = Selected;
    type Stream = BoxStream<'a, Result<Self::Row, Self::Error>>;

    fn clause(mut self, clause: Clause<'a>) -> Self {
        match clause {
            Clause::Join(join) => self.parts.joins.push(join),
            Clause::Where(filter) => self.parts.filters.push(filter),
            Clause::OrderBy(order) => self.parts.order.push(order),
            Clause::Limit(limit) => self.parts.limit = Some(limit),
            Clause::Offset(offset) => self.parts.offset = Some(offset),
        }
        self
    }

    fn stream(self) -> Self::Stream {
        async move {
            let db = self.db.read().await;
            let rows = db.query(&self.parts)?;
            Ok(stream::iter(rows.into_iter().map(Selected)).map(Ok))
        }
        .try_flatten_stream()
        .boxed()
    }

    async fn count(self) -> Result<usize, Self::Error> {
        let db = self.db.read().await;
        Ok(db.query(&self.parts)?.len())
    }
}

/// An insert statement for an in-memory database.
pub struct Insert<'a> {
    db: &'a RwLock<Db>,
    table: Cow<'a, str>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl<'a> super::Insert for Insert<'a> {
    type Error = Error;

    fn rows<R>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<Value>>,
    {
        self.rows.extend(rows);
        self
    }

    async fn execute(self) -> Result<Vec<Value>, Error> {
        let mut db = self.db.write().await;
        let table = db.table_mut(&self.table)?;
        let mut keys = vec![];
        for row in self.rows {
            tracing::trace!("INSERT INTO {} {:?}", self.table, row);
            keys.extend(table.append(&self.columns, row)?);
        }
        Ok(keys)
    }
}

/// An update statement for an in-memory database.
pub struct Update<'a> {
    db: &'a RwLock<Db>,
    table: Cow<'a, str>,
    set: Vec<(Cow<'a, str>, Value)>,
    filters: Vec<WhereClause<'a>>,
}

#[async_trait]
impl<'a> super::Update<'a> for Update<'a> {
    type Error = Error;

    fn set(mut self, column: impl Into<Cow<'a, str>>, value: Value) -> Self {
        self.set.push((column.into(), value));
        self
    }

    fn filter(mut self, clause: impl Into<WhereClause<'a>>) -> Self {
        self.filters.push(clause.into());
        self
    }

    async fn execute(self) -> Result<usize, Error> {
        if self.set.is_empty() {
            return Ok(0);
        }
        let mut db = self.db.write().await;
        let matching = matching_rows(&db, &self.table, &self.filters)?;
        let table = db.table_mut(&self.table)?;
        let indices = self
            .set
            .iter()
            .map(|(name, _)| {
                table
                    .schema
                    .iter()
                    .position(|col| col.name() == *name)
                    .ok_or_else(|| Error::from(format!("table {} has no column {name}", table.name)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for &i in &matching {
            for (col, (_, value)) in indices.iter().zip(&self.set) {
                table.rows[i].columns[*col] = value.clone();
            }
        }
        Ok(matching.len())
    }
}

/// A delete statement for an in-memory database.
pub struct Delete<'a> {
    db: &'a RwLock<Db>,
    table: Cow<'a, str>,
    filters: Vec<WhereClause<'a>>,
}

#[async_trait]
impl<'a> super::Delete<'a> for Delete<'a> {
    type Error = Error;

    fn filter(mut self, clause: impl Into<WhereClause<'a>>) -> Self {
        self.filters.push(clause.into());
        self
    }

    async fn execute(self) -> Result<usize, Error> {
        let mut db = self.db.write().await;
        let matching = matching_rows(&db, &self.table, &self.filters)?;
        let table = db.table_mut(&self.table)?;
        let mut index = 0;
        table.rows.retain(|_| {
            let keep = !matching.contains(&index);
            index += 1;
            keep
        });
        Ok(matching.len())
    }
}

/// Indices of the rows of `table` satisfying every filter.
fn matching_rows(db: &Db, table: &str, filters: &[WhereClause]) -> Result<Vec<usize>, Error> {
    let (schema, rows) = db.joined(table, &[])?;
    let mut matching = vec![];
    for (i, row) in rows.iter().enumerate() {
        let mut ok = true;
        for filter in filters {
            if !db.test(row, &schema, filter)? {
                ok = false;
                break;
            }
        }
        if ok {
            matching.push(i);
        }
    }
    Ok(matching)
}

/// A row in an in-memory table.
#[derive(Clone, Debug, Default)]
struct Row {
    columns: Vec<Value>,
}

impl Row {
    /// Create a row with the given entries.
    fn new(columns: Vec<Value>) -> Self {
        Self { columns }
    }

    /// Join this row with another row if the joined pair matches a condition.
    ///
    /// `schema` should be the concatenated schemas of `self` and `other`.
    ///
    /// If the joined pair matches, a new row will be returned which consists of all of the columns
    /// of this row, in order, followed by all of the columns of the other row, in order.
    fn join(
        mut self,
        other: Row,
        schema: &[Column],
        lhs: &Column,
        op: &str,
        rhs: &Column,
    ) -> Result<Option<Self>, Error> {
        self.columns.extend(other.columns);
        Ok(
            if Self::cmp(self.get(schema, lhs)?, op, self.get(schema, rhs)?)? {
                Some(self)
            } else {
                None
            },
        )
    }

    /// Create a record with just the specified columns, in the specified order.
    fn select(self, schema: &[Column], columns: &[SelectColumn]) -> Result<Record, Error> {
        let mut selected = Record::new();
        for col in columns {
            match col {
                SelectColumn::All => {
                    for (schema_col, value) in schema.iter().zip(&self.columns) {
                        selected
                            .entry(schema_col.name().to_string())
                            .or_insert_with(|| value.clone());
                    }
                }
                SelectColumn::AllFrom(table) => {
                    for (schema_col, value) in schema.iter().zip(&self.columns) {
                        if schema_col.table() == Some(&**table) {
                            selected.insert(schema_col.name().to_string(), value.clone());
                        }
                    }
                }
                SelectColumn::Column(col) => {
                    selected.insert(col.name().to_string(), self.get(schema, col)?.clone());
                }
            }
        }
        Ok(selected)
    }

    /// Compare two values.
    ///
    /// Comparisons involving `NULL` never hold.
    fn cmp(lhs: &Value, op: &str, rhs: &Value) -> Result<bool, Error> {
        if lhs.is_null() || rhs.is_null() {
            return Ok(false);
        }
        test_ordering(lhs.compare(rhs), op)
    }

    /// Get the value of the named column.
    fn get(&self, schema: &[Column], col: &Column) -> Result<&Value, Error> {
        let index = schema
            .iter()
            .position(|schema_col| {
                if col.table().is_some() {
                    // Every column in the schema is qualified, so if `col` is also qualified, we
                    // want an exact match.
                    col == schema_col
                } else {
                    // Otherwise find the first column whose name matches `col`.
                    col.name() == schema_col.name()
                }
            })
            .ok_or_else(|| Error::from(format!("no such column {col}")))?;
        Ok(&self.columns[index])
    }
}

/// A row produced by a query against the in-memory database.
#[derive(Clone, Debug, Default)]
pub struct Selected(Record);

impl super::Row for Selected {
    type Error = Error;

    fn column(&self, column: usize) -> Result<Value, Self::Error> {
        self.0
            .values()
            .nth(column)
            .cloned()
            .ok_or_else(|| format!("column index {column} out of range").into())
    }

    fn into_record(self) -> Record {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        init_logging,
        sql::db::{Connection as _, Delete as _, Insert as _, Query, Update as _},
    };

    async fn books() -> Connection {
        let db = Connection::create();
        db.create_table_with_rows(
            "authors",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("name", Type::Text),
            ],
            [vec!["Herbert".into()], vec!["Le Guin".into()]],
        )
        .await
        .unwrap();
        db.create_table_with_rows(
            "books",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("name", Type::Text),
                SchemaColumn::new("author_id", Type::Int),
                SchemaColumn::new("pages", Type::Int).with_default(100),
            ],
            [
                vec!["Dune".into(), 1.into(), 412.into()],
                vec!["Earthsea".into(), 2.into(), 183.into()],
                vec!["Lathe of Heaven".into(), 2.into(), Value::Null],
            ],
        )
        .await
        .unwrap();
        db
    }

    fn names(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| String::try_from(r["name"].clone()).unwrap())
            .collect()
    }

    #[async_std::test]
    async fn test_filter_order_paginate() {
        init_logging();
        let db = books().await;

        let query = Query::from("books")
            .filter(Boolean::cmp(Column::qualified("books", "author_id"), "=", 2))
            .order_by(Column::qualified("books", "name"), Direction::Desc);
        assert_eq!(
            names(&query.many(&db).await.unwrap()),
            ["Lathe of Heaven", "Earthsea"]
        );
        assert_eq!(
            names(&query.clone().limit(Some(1)).offset(Some(1)).many(&db).await.unwrap()),
            ["Earthsea"]
        );
        assert_eq!(query.limit(Some(1)).without_limit_offset().count(&db).await.unwrap(), 2);
    }

    #[async_std::test]
    async fn test_null_comparisons() {
        init_logging();
        let db = books().await;

        let query = Query::from("books").filter(Boolean::IsNull {
            column: Column::qualified("books", "pages"),
        });
        assert_eq!(names(&query.many(&db).await.unwrap()), ["Lathe of Heaven"]);

        let query =
            Query::from("books").filter(Boolean::cmp(Column::qualified("books", "pages"), "<", 300));
        assert_eq!(names(&query.many(&db).await.unwrap()), ["Earthsea"]);
    }

    #[async_std::test]
    async fn test_join_does_not_leak_columns() {
        init_logging();
        let db = books().await;

        let query = Query::from("books")
            .join(JoinClause {
                table: "authors".into(),
                lhs: Column::qualified("authors", "id"),
                op: "=".into(),
                rhs: Column::qualified("books", "author_id"),
            })
            .order_by(Column::qualified("authors", "name"), Direction::Asc)
            .order_by(Column::qualified("books", "name"), Direction::Asc);
        let rows = query.many(&db).await.unwrap();
        assert_eq!(names(&rows), ["Dune", "Earthsea", "Lathe of Heaven"]);
        assert_eq!(
            rows[0].keys().cloned().collect::<Vec<_>>(),
            ["author_id", "id", "name", "pages"]
        );
    }

    #[async_std::test]
    async fn test_exists() {
        init_logging();
        let db = books().await;

        let query = Query::from("authors").filter(Boolean::Exists(Box::new(Exists {
            table: "books".into(),
            joins: vec![],
            inner: Column::qualified("books", "author_id"),
            outer: Column::qualified("authors", "id"),
            filter: Boolean::Like {
                column: Column::qualified("books", "name"),
                pattern: "%Heaven".into(),
                negated: false,
            }
            .into(),
        })));
        assert_eq!(names(&query.many(&db).await.unwrap()), ["Le Guin"]);
    }

    #[async_std::test]
    async fn test_insert_update_delete() {
        init_logging();
        let db = books().await;

        let keys = db
            .insert("books", ["name"])
            .rows([vec!["Children of Dune".into()]])
            .execute()
            .await
            .unwrap();
        assert_eq!(keys, [Value::Int(4)]);
        let row = Query::from("books")
            .filter(Boolean::cmp(Column::qualified("books", "id"), "=", 4))
            .opt(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["pages"], Value::Int(100));
        assert_eq!(row["author_id"], Value::Null);

        let updated = db
            .update("books")
            .set("author_id", 1.into())
            .filter(Boolean::cmp(Column::named("id"), "=", 4))
            .execute()
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = db
            .delete("books")
            .filter(Boolean::cmp(Column::named("author_id"), "=", 1))
            .execute()
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(names(&db.dump("books").await.unwrap()), ["Earthsea", "Lathe of Heaven"]);
    }

    #[async_std::test]
    async fn test_query_opt() {
        init_logging();
        let db = books().await;
        let row = Query::from("books")
            .filter(Boolean::cmp(Column::qualified("books", "id"), "=", 1))
            .opt(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], Value::from("Dune"));
        assert_eq!(
            Query::from("books")
                .filter(Boolean::cmp(Column::qualified("books", "id"), "=", 9))
                .opt(&db)
                .await
                .unwrap(),
            None
        );
        assert!(Query::from("books").opt(&db).await.is_err());
    }

    #[test]
    fn test_like() {
        assert!(like("Dune", "D%"));
        assert!(like("Dune", "_une"));
        assert!(!like("Dune", "d%"));
        assert!(like("Dune", "%"));
        assert!(!like("Dune", "Dun"));
    }
}
