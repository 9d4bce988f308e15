//! The graph of GraphQL types generated for a set of models.
//!
//! Every model yields up to six types: its object type, the input type of its mutations, the input
//! types of its filter and order arguments, and the connection and edge types wrapping paginated
//! lists of it. Types refer to each other by name, and models may refer to each other in cycles
//! (an author has books, a book has an author). The [`TypeGraphBuilder`] therefore registers each
//! node in the graph *before* building its fields, so that a cycle finds the node under
//! construction instead of recursing forever. Once built, the graph is frozen behind an [`Arc`] and
//! shared read-only by every resolver.

use crate::error::{Error, Result};
use crate::model::{Catalog, ModelId, PropertyDescriptor, PropertyType, ScalarKind, ID};
use crate::sql::ops::filter::Operator;
use derive_more::Display;
use indexmap::IndexMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, OnceLock};

/// The custom scalar holding dates and times.
pub const DATE_TIME: &str = "DateTime";

/// The shared input type holding a sort direction.
pub const ORDER: &str = "Order";

/// The role a type plays for its model.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKind {
    Object,
    Input,
    Filter,
    Order,
    Connection,
    Edge,
}

impl TypeKind {
    /// The name of the type of this kind for a model named `model`.
    pub fn type_name(&self, model: &str) -> String {
        match self {
            Self::Object => model.to_string(),
            Self::Input => format!("{model}Input"),
            Self::Filter => format!("{model}FilterInput"),
            Self::Order => format!("{model}OrderInput"),
            Self::Connection => format!("{model}Connection"),
            Self::Edge => format!("{model}Edge"),
        }
    }

    /// Whether types of this kind are input types.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input | Self::Filter | Self::Order)
    }
}

/// Identifies a node of the graph.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{model} {kind}")]
pub struct TypeKey {
    pub model: ModelId,
    pub kind: TypeKind,
}

/// A reference to a type, possibly wrapped in lists and non-null markers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Named(String),
    NonNull(Box<FieldType>),
    List(Box<FieldType>),
}

impl FieldType {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn non_null(self) -> Self {
        match self {
            Self::NonNull(_) => self,
            ty => Self::NonNull(Box::new(ty)),
        }
    }

    /// Wrap in a non-null marker unless `nullable`.
    pub fn nullable(self, nullable: bool) -> Self {
        if nullable {
            self
        } else {
            self.non_null()
        }
    }

    pub fn list(self) -> Self {
        Self::List(Box::new(self))
    }

    /// The name of the innermost type.
    pub fn base(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(ty) | Self::List(ty) => ty.base(),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::NonNull(ty) => write!(f, "{ty}!"),
            Self::List(ty) => write!(f, "[{ty}]"),
        }
    }
}

/// An argument of an output field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgumentNode {
    pub name: String,
    pub ty: FieldType,
}

impl ArgumentNode {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// What a field resolves to, which determines its resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldShape {
    /// A stored or computed scalar, or a list of them.
    Scalar(ScalarKind),
    /// The single target of a relation.
    ToOne(ModelId),
    /// Every (viewable) target of a relation, as a plain list.
    ToMany(ModelId),
    /// The targets of a relation, as a connection.
    Connection(ModelId),
    /// The number of rows of a connection.
    TotalCount,
    /// The edges of a connection.
    Edges(ModelId),
    /// The entity of an edge.
    Node(ModelId),
    /// A field of an input type.
    Input,
}

/// A field of a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldNode {
    pub name: String,
    pub ty: FieldType,
    pub args: Vec<ArgumentNode>,
    pub shape: FieldShape,
    /// The model property the field exposes, if any.
    pub property: Option<PropertyDescriptor>,
}

impl FieldNode {
    fn new(name: impl Into<String>, ty: FieldType, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            ty,
            args: vec![],
            shape,
            property: None,
        }
    }

    fn input(name: impl Into<String>, ty: FieldType) -> Self {
        Self::new(name, ty, FieldShape::Input)
    }

    fn with_property(mut self, property: &PropertyDescriptor) -> Self {
        self.property = Some(property.clone());
        self
    }

    fn with_args(mut self, args: Vec<ArgumentNode>) -> Self {
        self.args = args;
        self
    }

    /// The relation target, for fields which resolve to entities.
    pub fn target(&self) -> Option<&ModelId> {
        match &self.shape {
            FieldShape::ToOne(target)
            | FieldShape::ToMany(target)
            | FieldShape::Connection(target)
            | FieldShape::Edges(target)
            | FieldShape::Node(target) => Some(target),
            _ => None,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&ArgumentNode> {
        self.args.iter().find(|arg| arg.name == name)
    }
}

/// A generated type.
#[derive(Debug)]
pub struct TypeNode {
    pub name: String,
    pub key: TypeKey,
    fields: OnceLock<IndexMap<String, FieldNode>>,
}

impl TypeNode {
    fn new(key: TypeKey) -> Self {
        Self {
            name: key.kind.type_name(key.model.name()),
            key,
            fields: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.key.kind
    }

    pub fn model(&self) -> &ModelId {
        &self.key.model
    }

    /// The fields of the type, in declaration order.
    ///
    /// Empty only while the node is under construction.
    pub fn fields(&self) -> impl Iterator<Item = &FieldNode> {
        self.fields.get().into_iter().flat_map(|fields| fields.values())
    }

    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.get()?.get(name)
    }
}

/// The frozen graph of generated types.
#[derive(Debug, Default)]
pub struct TypeGraph {
    nodes: IndexMap<TypeKey, Arc<TypeNode>>,
}

impl TypeGraph {
    pub fn get(&self, model: &ModelId, kind: TypeKind) -> Option<&Arc<TypeNode>> {
        self.nodes.get(&TypeKey {
            model: model.clone(),
            kind,
        })
    }

    /// The object type of a model.
    pub fn object(&self, model: &ModelId) -> Result<&Arc<TypeNode>> {
        self.get(model, TypeKind::Object)
            .ok_or_else(|| Error::UnknownModel {
                model: model.to_string(),
            })
    }

    /// Every node, in the order it was registered.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<TypeNode>> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Which arguments a list field takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListOptions {
    pub paginate: bool,
    pub filterable: bool,
    pub orderable: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            paginate: true,
            filterable: true,
            orderable: true,
        }
    }
}

impl ListOptions {
    /// The options a relation property declares with its flags.
    pub fn of(property: &PropertyDescriptor) -> Self {
        Self {
            paginate: property.paginated,
            filterable: property.filterable,
            orderable: property.orderable,
        }
    }
}

/// The GraphQL type of a scalar kind.
pub fn scalar_type_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Int => "Int",
        ScalarKind::Float => "Float",
        ScalarKind::Boolean => "Boolean",
        ScalarKind::String => "String",
        ScalarKind::DateTime => DATE_TIME,
    }
}

/// The shared filter input type of a scalar kind.
pub fn scalar_filter_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Int => "FilterInteger",
        ScalarKind::Float => "FilterFloat",
        ScalarKind::Boolean => "FilterBoolean",
        ScalarKind::String => "FilterString",
        ScalarKind::DateTime => "FilterDateTime",
    }
}

/// The operators the filter input of a scalar kind accepts.
pub fn scalar_filter_operators(kind: ScalarKind) -> Vec<Operator> {
    Operator::ALL
        .into_iter()
        .filter(|op| match kind {
            ScalarKind::String => !matches!(
                op,
                Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte | Operator::Date | Operator::NDate
            ),
            ScalarKind::Int | ScalarKind::Float => !matches!(
                op,
                Operator::Like | Operator::NLike | Operator::Date | Operator::NDate
            ),
            ScalarKind::Boolean => matches!(op, Operator::Eq | Operator::Ne),
            ScalarKind::DateTime => !matches!(
                op,
                Operator::Like | Operator::NLike | Operator::In | Operator::NIn
            ),
        })
        .collect()
}

/// Builds a [`TypeGraph`].
///
/// Every `build_*` method is idempotent: asking twice for the same type of the same model returns
/// the same node.
#[derive(Debug)]
pub struct TypeGraphBuilder<'a> {
    catalog: &'a Catalog,
    graph: TypeGraph,
}

impl<'a> TypeGraphBuilder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            graph: Default::default(),
        }
    }

    /// Freeze the graph.
    pub fn finish(self) -> Arc<TypeGraph> {
        Arc::new(self.graph)
    }

    /// Register the node for `key`, or return the existing one.
    ///
    /// The second component is true if the node is new and its fields must be built.
    fn register(&mut self, model: &ModelId, kind: TypeKind) -> Result<(Arc<TypeNode>, bool)> {
        if !self.catalog.contains(model) {
            return Err(Error::UnknownModel {
                model: model.to_string(),
            });
        }
        let key = TypeKey {
            model: model.clone(),
            kind,
        };
        if let Some(node) = self.graph.nodes.get(&key) {
            return Ok((node.clone(), false));
        }
        let node = Arc::new(TypeNode::new(key.clone()));
        self.graph.nodes.insert(key, node.clone());
        Ok((node, true))
    }

    fn complete(
        node: Arc<TypeNode>,
        fields: impl IntoIterator<Item = FieldNode>,
    ) -> Result<Arc<TypeNode>> {
        let fields = fields
            .into_iter()
            .map(|field| (field.name.clone(), field))
            .collect();
        node.fields.set(fields).map_err(|_| Error::Schema {
            error: format!("fields of {} built twice", node.name),
        })?;
        tracing::debug!("built type {}", node.name);
        Ok(node)
    }

    /// The object type of `model`: one field per readable property.
    pub fn build_object_type(&mut self, model: &ModelId) -> Result<Arc<TypeNode>> {
        let (node, new) = self.register(model, TypeKind::Object)?;
        if !new {
            return Ok(node);
        }
        let mut fields = vec![];
        for property in self.catalog.describe(model)?.iter() {
            if !property.is_readable() {
                continue;
            }
            fields.push(self.object_field(model, property)?);
        }
        Self::complete(node, fields)
    }

    fn object_field(&mut self, model: &ModelId, property: &PropertyDescriptor) -> Result<FieldNode> {
        let field = match &property.ty {
            PropertyType::Scalar(kind) => {
                let mut ty = FieldType::named(scalar_type_name(*kind));
                if property.is_list {
                    ty = ty.non_null().list();
                }
                FieldNode::new(
                    &property.name,
                    ty.nullable(property.nullable),
                    FieldShape::Scalar(*kind),
                )
            }
            PropertyType::Model(target) if !property.is_list => {
                let target_type = self.build_object_type(target)?;
                FieldNode::new(
                    &property.name,
                    FieldType::named(&target_type.name).nullable(property.nullable),
                    FieldShape::ToOne(target.clone()),
                )
            }
            PropertyType::Model(target) => {
                let options = ListOptions::of(property);
                let args = self.list_args(target, options)?;
                if options.paginate {
                    let connection = self.build_connection_type(target)?;
                    FieldNode::new(
                        &property.name,
                        FieldType::named(&connection.name).non_null(),
                        FieldShape::Connection(target.clone()),
                    )
                    .with_args(args)
                } else {
                    let target_type = self.build_object_type(target)?;
                    FieldNode::new(
                        &property.name,
                        FieldType::named(&target_type.name)
                            .non_null()
                            .list()
                            .non_null(),
                        FieldShape::ToMany(target.clone()),
                    )
                    .with_args(args)
                }
            }
            ty => return Err(unsupported(model, property, ty)),
        };
        Ok(field.with_property(property))
    }

    /// The arguments of a field listing entities of `target`.
    pub fn list_args(&mut self, target: &ModelId, options: ListOptions) -> Result<Vec<ArgumentNode>> {
        let mut args = vec![];
        if options.paginate {
            args.push(ArgumentNode::new("limit", FieldType::named("Int")));
            args.push(ArgumentNode::new("offset", FieldType::named("Int")));
        }
        if options.filterable {
            let filter = self.build_filter_type(target)?;
            args.push(ArgumentNode::new("filter", FieldType::named(&filter.name)));
        }
        if options.orderable {
            let order = self.build_order_type(target)?;
            args.push(ArgumentNode::new("order", FieldType::named(&order.name)));
        }
        Ok(args)
    }

    /// The input type of `model`: one field per writable property except the identity.
    ///
    /// Relations are set by identifier: a to-one relation takes an `Int`, a to-many relation a list
    /// of them.
    pub fn build_input_type(&mut self, model: &ModelId) -> Result<Arc<TypeNode>> {
        let (node, new) = self.register(model, TypeKind::Input)?;
        if !new {
            return Ok(node);
        }
        let mut fields = vec![];
        for property in self.catalog.describe(model)?.iter() {
            if !property.is_writable() || property.name == ID {
                continue;
            }
            let ty = match &property.ty {
                PropertyType::Scalar(kind) => {
                    let ty = FieldType::named(scalar_type_name(*kind));
                    if property.is_list {
                        ty.non_null().list().nullable(property.nullable)
                    } else {
                        ty.nullable(property.nullable)
                    }
                }
                PropertyType::Model(_) if property.is_list => FieldType::named("Int").non_null().list(),
                PropertyType::Model(_) => FieldType::named("Int").nullable(property.nullable),
                ty => return Err(unsupported(model, property, ty)),
            };
            fields.push(FieldNode::input(&property.name, ty).with_property(property));
        }
        Self::complete(node, fields)
    }

    /// The filter input type of `model`.
    ///
    /// Besides the `and`, `or` and `not` combinators it has a field for each queryable property:
    /// the shared operator input of a scalar, or the filter input of a relation's target.
    pub fn build_filter_type(&mut self, model: &ModelId) -> Result<Arc<TypeNode>> {
        let (node, new) = self.register(model, TypeKind::Filter)?;
        if !new {
            return Ok(node);
        }
        let own = FieldType::named(&node.name);
        let mut fields = vec![
            FieldNode::input("and", own.clone().non_null().list()),
            FieldNode::input("or", own.clone().non_null().list()),
            FieldNode::input("not", own),
        ];
        for property in self.catalog.describe(model)?.iter() {
            if !property.is_queryable() {
                continue;
            }
            let ty = match &property.ty {
                PropertyType::Scalar(kind) => FieldType::named(scalar_filter_name(*kind)),
                PropertyType::Model(target) => {
                    FieldType::named(&self.build_filter_type(target)?.name)
                }
                ty => return Err(unsupported(model, property, ty)),
            };
            fields.push(FieldNode::input(&property.name, ty).with_property(property));
        }
        Self::complete(node, fields)
    }

    /// The order input type of `model`: a direction for each queryable scalar, and a nested order
    /// for each to-one relation.
    pub fn build_order_type(&mut self, model: &ModelId) -> Result<Arc<TypeNode>> {
        let (node, new) = self.register(model, TypeKind::Order)?;
        if !new {
            return Ok(node);
        }
        let mut fields = vec![];
        for property in self.catalog.describe(model)?.iter() {
            if !property.is_queryable() || property.is_to_many() {
                continue;
            }
            let ty = match &property.ty {
                PropertyType::Scalar(_) => FieldType::named(ORDER),
                PropertyType::Model(target) => {
                    FieldType::named(&self.build_order_type(target)?.name)
                }
                ty => return Err(unsupported(model, property, ty)),
            };
            fields.push(FieldNode::input(&property.name, ty).with_property(property));
        }
        Self::complete(node, fields)
    }

    /// The connection type of `model`, exposing `totalCount` and `edges`.
    pub fn build_connection_type(&mut self, model: &ModelId) -> Result<Arc<TypeNode>> {
        let (node, new) = self.register(model, TypeKind::Connection)?;
        if !new {
            return Ok(node);
        }
        let edge = self.build_edge_type(model)?;
        Self::complete(
            node,
            [
                FieldNode::new(
                    "totalCount",
                    FieldType::named("Int").non_null(),
                    FieldShape::TotalCount,
                ),
                FieldNode::new(
                    "edges",
                    FieldType::named(&edge.name).non_null().list().non_null(),
                    FieldShape::Edges(model.clone()),
                ),
            ],
        )
    }

    /// The edge type of `model`, exposing `node`.
    pub fn build_edge_type(&mut self, model: &ModelId) -> Result<Arc<TypeNode>> {
        let (node, new) = self.register(model, TypeKind::Edge)?;
        if !new {
            return Ok(node);
        }
        let object = self.build_object_type(model)?;
        Self::complete(
            node,
            [FieldNode::new(
                "node",
                FieldType::named(&object.name).non_null(),
                FieldShape::Node(model.clone()),
            )],
        )
    }
}

fn unsupported(model: &ModelId, property: &PropertyDescriptor, ty: &PropertyType) -> Error {
    Error::UnsupportedType {
        model: model.to_string(),
        property: property.name.clone(),
        ty: ty.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::init_logging;
    use crate::model::{test::library, ModelDefinition};

    fn author() -> ModelId {
        "library::Author".into()
    }

    fn book() -> ModelId {
        "library::Book".into()
    }

    fn field_types(node: &TypeNode) -> Vec<(String, String)> {
        node.fields()
            .map(|field| (field.name.clone(), field.ty.to_string()))
            .collect()
    }

    fn arg_names(field: &FieldNode) -> Vec<&str> {
        field.args.iter().map(|arg| arg.name.as_str()).collect()
    }

    #[test]
    fn test_field_type_display() {
        let ty = FieldType::named("Book").non_null().list().non_null();
        assert_eq!(ty.to_string(), "[Book!]!");
        assert_eq!(ty.base(), "Book");
        assert_eq!(FieldType::named("Int").non_null().non_null().to_string(), "Int!");
    }

    #[test]
    fn test_scalar_filter_operators() {
        assert_eq!(
            scalar_filter_operators(ScalarKind::Boolean),
            [Operator::Eq, Operator::Ne]
        );
        let strings = scalar_filter_operators(ScalarKind::String);
        assert!(strings.contains(&Operator::Like) && strings.contains(&Operator::In));
        assert!(!strings.contains(&Operator::Lt));
        let dates = scalar_filter_operators(ScalarKind::DateTime);
        assert!(dates.contains(&Operator::Date) && !dates.contains(&Operator::In));
    }

    #[test]
    fn test_object_type() {
        init_logging();
        let catalog = library();
        let mut builder = TypeGraphBuilder::new(&catalog);
        let node = builder.build_object_type(&author()).unwrap();
        assert_eq!(node.name, "Author");
        assert_eq!(
            field_types(&node),
            [
                ("id", "Int!"),
                ("name", "String!"),
                ("email", "String"),
                ("books", "BookConnection!"),
                ("pencil", "Pencil"),
                ("bookCount", "Int!"),
            ]
            .map(|(name, ty)| (name.to_string(), ty.to_string()))
        );

        // Paginated and filterable but not orderable.
        let books = node.field("books").unwrap();
        assert_eq!(arg_names(books), ["limit", "offset", "filter"]);
        assert_eq!(books.shape, FieldShape::Connection(book()));

        let connection = builder
            .build_connection_type(&book())
            .unwrap();
        assert_eq!(
            field_types(&connection),
            [("totalCount", "Int!"), ("edges", "[BookEdge!]!")]
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
        );
        let edge = builder.build_edge_type(&book()).unwrap();
        assert_eq!(edge.field("node").unwrap().ty.to_string(), "Book!");
    }

    #[test]
    fn test_cycles_and_memoization() {
        init_logging();
        let catalog = library();
        let mut builder = TypeGraphBuilder::new(&catalog);
        let first = builder.build_object_type(&author()).unwrap();
        let second = builder.build_object_type(&author()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let graph = builder.finish();
        // Author -> Book -> Author closes the cycle without rebuilding Author.
        let book_type = graph.object(&book()).unwrap();
        assert_eq!(book_type.field("author").unwrap().ty.to_string(), "Author!");
        assert!(Arc::ptr_eq(graph.object(&author()).unwrap(), &first));
        assert!(graph.nodes().all(|node| node.fields().next().is_some()));
    }

    #[test]
    fn test_input_type() {
        init_logging();
        let catalog = library();
        let mut builder = TypeGraphBuilder::new(&catalog);
        let author_input = builder.build_input_type(&author()).unwrap();
        assert_eq!(author_input.name, "AuthorInput");
        assert_eq!(
            field_types(&author_input),
            [
                ("name", "String!"),
                ("email", "String"),
                ("books", "[Int!]"),
                ("pencil", "Int"),
            ]
            .map(|(name, ty)| (name.to_string(), ty.to_string()))
        );
        let book_input = builder.build_input_type(&book()).unwrap();
        assert_eq!(book_input.field("author").unwrap().ty.to_string(), "Int!");
    }

    #[test]
    fn test_filter_type() {
        init_logging();
        let catalog = library();
        let mut builder = TypeGraphBuilder::new(&catalog);
        let filter = builder.build_filter_type(&author()).unwrap();
        assert_eq!(
            field_types(&filter),
            [
                ("and", "[AuthorFilterInput!]"),
                ("or", "[AuthorFilterInput!]"),
                ("not", "AuthorFilterInput"),
                ("id", "FilterInteger"),
                ("name", "FilterString"),
                ("email", "FilterString"),
                ("books", "BookFilterInput"),
                ("pencil", "PencilFilterInput"),
            ]
            .map(|(name, ty)| (name.to_string(), ty.to_string()))
        );
        let book_filter = builder.build_filter_type(&book()).unwrap();
        assert_eq!(
            book_filter.field("published").unwrap().ty.to_string(),
            "FilterDateTime"
        );
    }

    #[test]
    fn test_order_type() {
        init_logging();
        let catalog = library();
        let mut builder = TypeGraphBuilder::new(&catalog);
        let order = builder.build_order_type(&book()).unwrap();
        assert_eq!(
            field_types(&order),
            [
                ("id", "Order"),
                ("name", "Order"),
                ("published", "Order"),
                ("author", "AuthorOrderInput"),
            ]
            .map(|(name, ty)| (name.to_string(), ty.to_string()))
        );
    }

    #[test]
    fn test_unsupported_types() {
        init_logging();
        for annotations in [
            "@property int $id\n@property array $tags",
            "@property int $id\n@property mixed $payload",
        ] {
            let mut catalog = Catalog::new();
            let model = catalog.register_definition(ModelDefinition {
                name: "Note".into(),
                namespace: "app".into(),
                table: None,
                annotations: annotations.into(),
                relations: vec![],
                accessor: None,
            });
            let mut builder = TypeGraphBuilder::new(&catalog);
            assert!(matches!(
                builder.build_object_type(&model),
                Err(Error::UnsupportedType { .. })
            ));
        }
    }

    #[test]
    fn test_list_scalars_skip_filter_and_order() {
        init_logging();
        let mut catalog = Catalog::new();
        let model = catalog.register_definition(ModelDefinition {
            name: "Note".into(),
            namespace: "app".into(),
            table: None,
            annotations: "@property int $id\n@property string[] $tags".into(),
            relations: vec![],
            accessor: None,
        });
        let mut builder = TypeGraphBuilder::new(&catalog);
        assert_eq!(
            builder
                .build_object_type(&model)
                .unwrap()
                .field("tags")
                .unwrap()
                .ty
                .to_string(),
            "[String!]!"
        );
        assert!(builder
            .build_filter_type(&model)
            .unwrap()
            .field("tags")
            .is_none());
        assert!(builder
            .build_order_type(&model)
            .unwrap()
            .field("tags")
            .is_none());
    }
}
