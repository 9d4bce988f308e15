//! Abstract interface to a SQL database.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use derive_more::{Display, From};
use futures::{Stream, StreamExt, TryStreamExt};
use itertools::Itertools;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

pub mod mock;

/// Errors returned by the database.
pub trait Error: Sized + Send + Sync + std::error::Error + 'static {
    /// Wrap a custom message into this error type.
    fn custom(msg: impl Display) -> Self;

    /// An error indicating that a query returned more than the `expected` number of rows.
    fn too_many_rows(expected: usize) -> Self {
        Self::custom(format!(
            "query result has more rows than the expected {expected}"
        ))
    }
}

/// A column in a list of columns selected from a query.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SelectColumn<'a> {
    /// A single named column.
    #[display(fmt = "{}", _0)]
    Column(Column<'a>),
    /// All columns of one table in the query.
    #[display(fmt = "{}.*", _0)]
    AllFrom(Cow<'a, str>),
    /// Select all columns.
    #[display(fmt = "*")]
    All,
}

/// A column in a schema.
///
/// This describes the structure and format of each entry in the column, along with column-level
/// metadata like the name and the value used when an insert does not mention the column.
#[derive(Clone, Debug, Display, PartialEq)]
#[display(fmt = "{name} {ty}")]
pub struct SchemaColumn<'a> {
    name: Cow<'a, str>,
    ty: Type,
    default: Value,
}

impl<'a> SchemaColumn<'a> {
    /// Create a column given a name and type.
    pub fn new(name: impl Into<Cow<'a, str>>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Value::Null,
        }
    }

    /// Set the value this column takes when an insert does not mention it.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// The name of this column
    pub fn name(&self) -> Cow<'a, str> {
        self.name.clone()
    }

    /// The type of this column
    pub fn ty(&self) -> Type {
        self.ty
    }

    /// The default value of this column.
    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

/// A connection to the database.
#[async_trait]
pub trait Connection: Clone + Send + Sync + 'static {
    /// Errors returned from queries.
    type Error: Error;

    /// A `SELECT` query which can be executed against the database.
    type Select<'a>: Select<'a, Error = Self::Error>
    where
        Self: 'a;

    /// An `INSERT` statement which can be executed against the database.
    type Insert<'a>: Insert<Error = Self::Error>
    where
        Self: 'a;

    /// An `UPDATE` statement which can be executed against the database.
    type Update<'a>: Update<'a, Error = Self::Error>
    where
        Self: 'a;

    /// A `DELETE` statement which can be executed against the database.
    type Delete<'a>: Delete<'a, Error = Self::Error>
    where
        Self: 'a;

    /// Start a `SELECT` query.
    ///
    /// `columns` indicates the columns to include in the query results. The resulting [`Select`]
    /// represents a statement of the form `SELECT columns FROM table`. The query can be refined,
    /// for example by adding a `WHERE` clause, using the approriate methods on the [`Select`]
    /// object before running it.
    fn select<'a>(
        &'a self,
        columns: &'a [SelectColumn<'a>],
        table: impl Into<Cow<'a, str>> + Send,
    ) -> Self::Select<'a>;

    /// Start an `INSERT` query.
    ///
    /// `table` indicates the table to insert into and `columns` the names of the columns in that
    /// table into which values should be inserted. Columns which are not named take their default
    /// value.
    fn insert<'a, C>(
        &'a self,
        table: impl Into<Cow<'a, str>> + Send,
        columns: impl IntoIterator<Item = C>,
    ) -> Self::Insert<'a>
    where
        C: Into<String>;

    /// Start an `UPDATE` statement.
    ///
    /// `table` indicates the table to update. You can set the values of columns and restrict the
    /// statement with a `WHERE` clause using the methods on the [`Update`] object.
    fn update<'a>(&'a self, table: impl Into<Cow<'a, str>> + Send) -> Self::Update<'a>;

    /// Start a `DELETE` statement.
    fn delete<'a>(&'a self, table: impl Into<Cow<'a, str>> + Send) -> Self::Delete<'a>;
}

/// A SQL primitive data type.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    #[display(fmt = "text")]
    Text,
    #[display(fmt = "int8")]
    Int,
    #[display(fmt = "float8")]
    Float,
    #[display(fmt = "bool")]
    Bool,
    #[display(fmt = "timestamp")]
    DateTime,
    #[display(fmt = "serial")]
    Serial,
}

/// A primitive value supported by a SQL database.
#[derive(Clone, Debug, Default, PartialEq, From)]
pub enum Value {
    /// The absence of a value.
    #[default]
    #[from(ignore)]
    Null,
    /// A boolean.
    Bool(bool),
    /// An 8-byte signed integer.
    Int(i64),
    /// An 8-byte float.
    Float(f64),
    /// A text string.
    Text(String),
    /// A timestamp without time zone.
    DateTime(NaiveDateTime),
    /// An array of values.
    List(Vec<Value>),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::DateTime(t) => write!(f, "'{}'", t.format(DATE_TIME_FORMAT)),
            Self::List(vs) => write!(f, "({})", vs.iter().join(", ")),
        }
    }
}

/// The textual format of timestamps.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp, accepting either a full timestamp or a bare date.
pub fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl TryFrom<Value> for String {
    type Error = String;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Text(s) => Ok(s),
            v => Err(format!("type mismatch (expected string, got {})", v.type_name())),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = String;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Bool(b) => Ok(b),
            v => Err(format!("type mismatch (expected bool, got {})", v.type_name())),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl Value {
    /// A short name for the kind of this value, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::DateTime(_) => "timestamp",
            Self::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as an integer key, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Compare two values the way a SQL database would.
    ///
    /// Integers and floats compare numerically. `NULL` and values of unrelated types are
    /// incomparable.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(l), Self::Int(r)) => Some(l.cmp(r)),
            (Self::Int(l), Self::Float(r)) => (*l as f64).partial_cmp(r),
            (Self::Float(l), Self::Int(r)) => l.partial_cmp(&(*r as f64)),
            (Self::Float(l), Self::Float(r)) => l.partial_cmp(r),
            (Self::Text(l), Self::Text(r)) => Some(l.cmp(r)),
            (Self::Bool(l), Self::Bool(r)) => Some(l.cmp(r)),
            (Self::DateTime(l), Self::DateTime(r)) => Some(l.cmp(r)),
            _ => None,
        }
    }
}

/// An identifier of a column in a SQL query.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Column<'a> {
    table: Option<Cow<'a, str>>,
    name: Cow<'a, str>,
}

impl<'a> Column<'a> {
    /// A named column.
    pub fn named(name: impl Into<Cow<'a, str>>) -> Self {
        Self {
            name: name.into(),
            table: None,
        }
    }

    /// A named column, qualified by a table name.
    pub fn qualified(table: impl Into<Cow<'a, str>>, name: impl Into<Cow<'a, str>>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// The table qualifying this column, if any.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// The unqualified name of this column.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<'a> Display for Column<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{table}.")?;
        }
        write!(f, "{}", self.name)
    }
}

impl<'a> From<Cow<'a, str>> for Column<'a> {
    fn from(name: Cow<'a, str>) -> Self {
        Self::named(name)
    }
}

impl<'a> From<&'a str> for Column<'a> {
    fn from(name: &'a str) -> Self {
        Self::named(name)
    }
}

impl<'a> From<String> for Column<'a> {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

/// A clause modifying a SQL statement.
#[derive(Clone, Debug, PartialEq, From)]
pub enum Clause<'a> {
    /// A `WHERE` clause.
    Where(WhereClause<'a>),
    /// A `JOIN` clause.
    Join(JoinClause<'a>),
    /// An `ORDER BY` term. Terms apply in the order they are added.
    OrderBy(OrderBy<'a>),
    /// A `LIMIT`.
    #[from(ignore)]
    Limit(usize),
    /// An `OFFSET`.
    #[from(ignore)]
    Offset(usize),
}

/// A `WHERE` clause.
#[derive(Clone, Debug, PartialEq)]
pub enum WhereClause<'a> {
    /// A `WHERE` clause which holds on any row where all of the sub-clauses hold.
    ///
    /// An empty list holds on every row.
    All(Box<Vec<WhereClause<'a>>>),
    /// A `WHERE` clause which holds on any row where any of the sub-clauses hold.
    ///
    /// An empty list holds on no row.
    Any(Box<Vec<WhereClause<'a>>>),
    /// A `WHERE` clause which holds on any row where the sub-clause does not.
    Not(Box<WhereClause<'a>>),
    /// A `WHERE` clause which holds on any row where a boolean expression is true.
    Predicate(Boolean<'a>),
}

impl<'a> From<Boolean<'a>> for WhereClause<'a> {
    fn from(b: Boolean<'a>) -> Self {
        Self::Predicate(b)
    }
}

impl<'a> WhereClause<'a> {
    /// A `WHERE` clause which holds on any row where all of the sub-clauses hold.
    pub fn all<I>(clauses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<WhereClause<'a>>,
    {
        let mut clauses = clauses
            .into_iter()
            .map(|clause| clause.into())
            .collect::<Vec<_>>();
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Self::All(Box::new(clauses))
        }
    }

    /// A `WHERE` clause which holds on any row where any of the sub-clauses hold.
    pub fn any<I>(clauses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<WhereClause<'a>>,
    {
        let mut clauses = clauses
            .into_iter()
            .map(|clause| clause.into())
            .collect::<Vec<_>>();
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Self::Any(Box::new(clauses))
        }
    }

    /// A `WHERE` clause which holds on any row where `clause` does not.
    pub fn not(clause: impl Into<WhereClause<'a>>) -> Self {
        Self::Not(Box::new(clause.into()))
    }

    /// Whether this clause trivially holds on every row.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::All(clauses) if clauses.is_empty())
    }
}

impl<'a> Display for WhereClause<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::All(clauses) if clauses.is_empty() => write!(f, "TRUE"),
            Self::Any(clauses) if clauses.is_empty() => write!(f, "FALSE"),
            Self::All(clauses) => write!(f, "({})", clauses.iter().join(" AND ")),
            Self::Any(clauses) => write!(f, "({})", clauses.iter().join(" OR ")),
            Self::Not(clause) => write!(f, "NOT {clause}"),
            Self::Predicate(b) => write!(f, "{b}"),
        }
    }
}

/// A boolean expression in a `WHERE` clause.
#[derive(Clone, Debug, PartialEq)]
pub enum Boolean<'a> {
    Cmp {
        /// The column to filter.
        column: Column<'a>,
        /// The operation used to filter values of `column`.
        op: Cow<'a, str>,
        /// Parameter to `op`.
        param: Value,
    },
    OneOf {
        /// The column to filter.
        column: Column<'a>,
        /// Values to match `column` against.
        params: Vec<Value>,
    },
    NoneOf {
        /// The column to filter.
        column: Column<'a>,
        /// Values `column` must not take.
        params: Vec<Value>,
    },
    IsNull {
        column: Column<'a>,
    },
    IsNotNull {
        column: Column<'a>,
    },
    /// A `LIKE` pattern match, with `%` and `_` wildcards.
    Like {
        column: Column<'a>,
        pattern: String,
        negated: bool,
    },
    /// A comparison of the date part of a timestamp column.
    Date {
        column: Column<'a>,
        op: Cow<'a, str>,
        param: Value,
    },
    /// A correlated `EXISTS` subquery.
    Exists(Box<Exists<'a>>),
}

impl<'a> Boolean<'a> {
    /// A boolean expression which compares the value of a column to a constant.
    pub fn cmp(
        column: impl Into<Column<'a>>,
        op: impl Into<Cow<'a, str>>,
        param: impl Into<Value>,
    ) -> Self {
        Self::Cmp {
            column: column.into(),
            op: op.into(),
            param: param.into(),
        }
    }

    /// A boolean expression which checks if the value of a column is one of a list of constants.
    pub fn one_of<I>(column: impl Into<Column<'a>>, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::OneOf {
            column: column.into(),
            params: params.into_iter().map(|p| p.into()).collect(),
        }
    }

    /// A boolean expression which checks that the value of a column is none of a list of constants.
    pub fn none_of<I>(column: impl Into<Column<'a>>, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::NoneOf {
            column: column.into(),
            params: params.into_iter().map(|p| p.into()).collect(),
        }
    }
}

impl<'a> Display for Boolean<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Cmp { column, op, param } => write!(f, "{column} {op} {param}"),
            Self::OneOf { column, params } => write!(f, "{column} IN ({})", params.iter().join(", ")),
            Self::NoneOf { column, params } => {
                write!(f, "{column} NOT IN ({})", params.iter().join(", "))
            }
            Self::IsNull { column } => write!(f, "{column} IS NULL"),
            Self::IsNotNull { column } => write!(f, "{column} IS NOT NULL"),
            Self::Like {
                column,
                pattern,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{column} {not}LIKE {}", Value::Text(pattern.clone()))
            }
            Self::Date { column, op, param } => write!(f, "DATE({column}) {op} DATE({param})"),
            Self::Exists(exists) => write!(f, "{exists}"),
        }
    }
}

/// A correlated `EXISTS` subquery.
///
/// The subquery selects from `table` (plus any `joins`) and holds for an outer row if some inner
/// row has `inner` equal to the outer row's `outer` and satisfies `filter`.
#[derive(Clone, Debug, PartialEq)]
pub struct Exists<'a> {
    pub table: Cow<'a, str>,
    pub joins: Vec<JoinClause<'a>>,
    pub inner: Column<'a>,
    pub outer: Column<'a>,
    pub filter: WhereClause<'a>,
}

impl<'a> Display for Exists<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "EXISTS (SELECT 1 FROM {}", self.table)?;
        for join in &self.joins {
            write!(f, " {join}")?;
        }
        write!(f, " WHERE {} = {}", self.inner, self.outer)?;
        if !self.filter.is_trivial() {
            write!(f, " AND {}", self.filter)?;
        }
        write!(f, ")")
    }
}

/// A `JOIN` clause.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "JOIN {table} ON {lhs} {op} {rhs}")]
pub struct JoinClause<'a> {
    /// The table to join with.
    pub table: Cow<'a, str>,
    /// The LHS in the join condition.
    pub lhs: Column<'a>,
    /// The operation in the join condition.
    pub op: Cow<'a, str>,
    /// The RHS in the join condition.
    pub rhs: Column<'a>,
}

/// A sort direction.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    #[display(fmt = "ASC")]
    Asc,
    #[display(fmt = "DESC")]
    Desc,
}

/// An `ORDER BY` term.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{column} {direction}")]
pub struct OrderBy<'a> {
    pub column: Column<'a>,
    pub direction: Direction,
}

/// A `SELECT` query which can be executed against the database.
#[async_trait]
pub trait Select<'a>: Send {
    /// Errors returned by this query.
    type Error: Error;
    /// Rows returned by this query.
    type Row: Row<Error = Self::Error>;
    /// An asynchronous stream of rows.
    type Stream: Stream<Item = Result<Self::Row, Self::Error>> + Unpin + Send;

    /// Add a clause to the query.
    fn clause(self, clause: Clause<'a>) -> Self;

    /// Run the query and get a stream of results.
    fn stream(self) -> Self::Stream;

    /// Count the rows the query would produce.
    async fn count(self) -> Result<usize, Self::Error>;
}

/// An extension trait for [`Select`] that provides some higher-level functions.
#[async_trait]
pub trait SelectExt<'a>: Select<'a> {
    /// Run a query and collect the results.
    async fn many(self) -> Result<Vec<Self::Row>, Self::Error>;

    /// Run a query which is expected to return either 0 or 1 rows.
    ///
    /// # Errors
    ///
    /// This method will fail if the query does not return exactly 0 or 1 rows.
    async fn opt(self) -> Result<Option<Self::Row>, Self::Error>;
}

#[async_trait]
impl<'a, T: Select<'a>> SelectExt<'a> for T {
    async fn opt(self) -> Result<Option<Self::Row>, Self::Error> {
        let mut rows = self.stream();
        let Some(row) = rows.next().await else { return Ok(None); };
        if rows.next().await.is_some() {
            return Err(Self::Error::too_many_rows(1));
        }
        row.map(Some)
    }

    async fn many(self) -> Result<Vec<Self::Row>, Self::Error> {
        self.stream().try_collect().await
    }
}

/// An `INSERT` statement which can be executed against the database.
#[async_trait]
pub trait Insert: Send {
    /// Errors returned by this statement.
    type Error: Error;

    /// Add rows to insert. Each row lists a value for each column named in the statement.
    fn rows<R>(self, rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<Value>>;

    /// Do the insertion.
    ///
    /// This will execute a statement of the form
    /// `INSERT INTO table (columns) VALUES (rows) RETURNING id`, producing the generated keys of
    /// the inserted rows in order. Tables without a generated key produce no keys.
    async fn execute(self) -> Result<Vec<Value>, Self::Error>;
}

/// An `UPDATE` statement which can be executed against the database.
#[async_trait]
pub trait Update<'a>: Send {
    /// Errors returned by this statement.
    type Error: Error;

    /// Set a column of every affected row to a constant.
    fn set(self, column: impl Into<Cow<'a, str>>, value: Value) -> Self;

    /// Restrict the statement to rows satisfying `clause`.
    fn filter(self, clause: impl Into<WhereClause<'a>>) -> Self;

    /// Do the update, returning the number of affected rows.
    ///
    /// An update with no `SET` terms affects nothing.
    async fn execute(self) -> Result<usize, Self::Error>;
}

/// A `DELETE` statement which can be executed against the database.
#[async_trait]
pub trait Delete<'a>: Send {
    /// Errors returned by this statement.
    type Error: Error;

    /// Restrict the statement to rows satisfying `clause`.
    fn filter(self, clause: impl Into<WhereClause<'a>>) -> Self;

    /// Do the deletion, returning the number of deleted rows.
    async fn execute(self) -> Result<usize, Self::Error>;
}

/// A row in a database table.
pub trait Row: Sized + Send {
    /// Errors returned by row operations.
    type Error: Error;

    /// Get the value of `column` in this row.
    ///
    /// `column` is an index corresponding to the order in which columns were requested in the
    /// `SELECT` statement.
    ///
    /// # Errors
    ///
    /// This method will fail if the specified column does not exist.
    fn column(&self, column: usize) -> Result<Value, Self::Error>;

    /// Consume the row, producing each column name with its value.
    fn into_record(self) -> Record;
}

/// A row detached from the database, keyed by unqualified column name.
pub type Record = BTreeMap<String, Value>;

/// A `SELECT` statement which owns its parts.
///
/// Unlike a [`Select`], which borrows its connection, a [`Query`] can be stored, cloned and
/// refined before it is run. Queries select every column of their base table, so that joins
/// added for ordering never leak columns into the result.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    table: String,
    columns: Vec<SelectColumn<'static>>,
    clauses: Vec<Clause<'static>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    /// `SELECT table.* FROM table`.
    pub fn from(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            columns: vec![SelectColumn::AllFrom(table.clone().into())],
            table,
            clauses: vec![],
            limit: None,
            offset: None,
        }
    }

    /// The base table of the query.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The `WHERE`, `JOIN` and `ORDER BY` clauses of the query, in the order they were added.
    pub fn clauses(&self) -> &[Clause<'static>] {
        &self.clauses
    }

    /// Add a `WHERE` clause to the query.
    pub fn filter(mut self, clause: impl Into<WhereClause<'static>>) -> Self {
        let clause = clause.into();
        if !clause.is_trivial() {
            self.clauses.push(Clause::Where(clause));
        }
        self
    }

    /// Add a `JOIN` clause to the query, unless an identical join is already present.
    pub fn join(mut self, join: JoinClause<'static>) -> Self {
        let join = Clause::Join(join);
        if !self.clauses.contains(&join) {
            self.clauses.push(join);
        }
        self
    }

    /// Add an `ORDER BY` term to the query.
    pub fn order_by(mut self, column: Column<'static>, direction: Direction) -> Self {
        self.clauses
            .push(Clause::OrderBy(OrderBy { column, direction }));
        self
    }

    /// Limit the number of rows returned.
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Skip rows at the start of the result.
    pub fn offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    /// A copy of this query with no limit or offset.
    pub fn without_limit_offset(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }

    fn select<'a, C: Connection>(&'a self, conn: &'a C) -> C::Select<'a> {
        let mut select = conn.select(self.columns.as_slice(), self.table.as_str());
        for clause in &self.clauses {
            select = select.clause(clause.clone());
        }
        if let Some(limit) = self.limit {
            select = select.clause(Clause::Limit(limit));
        }
        if let Some(offset) = self.offset {
            select = select.clause(Clause::Offset(offset));
        }
        select
    }

    /// Run the query and collect the results.
    pub async fn many<C: Connection>(&self, conn: &C) -> Result<Vec<Record>, C::Error> {
        tracing::debug!("{self}");
        let rows = self.select(conn).many().await?;
        Ok(rows.into_iter().map(Row::into_record).collect())
    }

    /// Run a query which is expected to return either 0 or 1 rows.
    pub async fn opt<C: Connection>(&self, conn: &C) -> Result<Option<Record>, C::Error> {
        tracing::debug!("{self}");
        Ok(self.select(conn).opt().await?.map(Row::into_record))
    }

    /// Count the rows the query would produce.
    pub async fn count<C: Connection>(&self, conn: &C) -> Result<usize, C::Error> {
        tracing::debug!("COUNT {self}");
        self.select(conn).count().await
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "SELECT {} FROM {}",
            self.columns.iter().join(", "),
            self.table
        )?;
        for clause in &self.clauses {
            if let Clause::Join(join) = clause {
                write!(f, " {join}")?;
            }
        }
        let filters = self
            .clauses
            .iter()
            .filter_map(|clause| match clause {
                Clause::Where(filter) => Some(filter),
                _ => None,
            })
            .collect::<Vec<_>>();
        if !filters.is_empty() {
            write!(f, " WHERE {}", filters.iter().join(" AND "))?;
        }
        let order = self
            .clauses
            .iter()
            .filter_map(|clause| match clause {
                Clause::OrderBy(order) => Some(order),
                _ => None,
            })
            .collect::<Vec<_>>();
        if !order.is_empty() {
            write!(f, " ORDER BY {}", order.iter().join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {offset}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_query_display() {
        let query = Query::from("books")
            .filter(Boolean::cmp(Column::qualified("books", "name"), "=", "Dune"))
            .join(JoinClause {
                table: "authors".into(),
                lhs: Column::qualified("authors", "id"),
                op: "=".into(),
                rhs: Column::qualified("books", "author_id"),
            })
            .order_by(Column::qualified("authors", "name"), Direction::Desc)
            .limit(Some(10))
            .offset(Some(5));
        assert_eq!(
            query.to_string(),
            "SELECT books.* FROM books JOIN authors ON authors.id = books.author_id \
             WHERE books.name = 'Dune' ORDER BY authors.name DESC LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            query.without_limit_offset().to_string(),
            "SELECT books.* FROM books JOIN authors ON authors.id = books.author_id \
             WHERE books.name = 'Dune' ORDER BY authors.name DESC"
        );
    }

    #[test]
    fn test_membership_display() {
        assert_eq!(
            Boolean::one_of(Column::named("id"), [1, 2]).to_string(),
            "id IN (1, 2)"
        );
        assert_eq!(
            Boolean::none_of(Column::qualified("books", "id"), [3]).to_string(),
            "books.id NOT IN (3)"
        );
    }

    #[test]
    fn test_trivial_filters_are_dropped() {
        let query = Query::from("books").filter(WhereClause::all(Vec::<WhereClause>::new()));
        assert!(query.clauses().is_empty());
    }

    #[test]
    fn test_duplicate_joins_are_dropped() {
        let join = JoinClause {
            table: "authors".into(),
            lhs: Column::qualified("authors", "id"),
            op: "=".into(),
            rhs: Column::qualified("books", "author_id"),
        };
        let query = Query::from("books").join(join.clone()).join(join);
        assert_eq!(query.clauses().len(), 1);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(
            Value::from("a").compare(&Value::from("b")),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_parse_date_time() {
        let full = parse_date_time("2023-04-05 06:07:08").unwrap();
        assert_eq!(full.format(DATE_TIME_FORMAT).to_string(), "2023-04-05 06:07:08");
        let date = parse_date_time("2023-04-05").unwrap();
        assert_eq!(date.format(DATE_TIME_FORMAT).to_string(), "2023-04-05 00:00:00");
        assert!(parse_date_time("yesterday").is_none());
    }
}
