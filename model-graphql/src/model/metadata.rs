//! Parsing of `@property` annotation blocks into property descriptors.
//!
//! Each model carries a block of annotation lines of the form
//!
//! ```text
//! @property[-read|-write] [?]<type>[[]] $<name> [@paginate] [@filterable] [@orderable] [@computed] [@eager-load-disabled]
//! ```
//!
//! Lines which are not `@property` lines are ignored, as is free text following the name. A leading
//! `*` or `///` on a line is stripped, so the block can be copied verbatim from a doc comment.

use super::ModelId;
use crate::error::{Error, Result};
use derive_more::Display;
use std::collections::HashSet;

/// A primitive property type.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarKind {
    #[display(fmt = "int")]
    Int,
    #[display(fmt = "float")]
    Float,
    #[display(fmt = "bool")]
    Boolean,
    #[display(fmt = "string")]
    String,
    #[display(fmt = "datetime")]
    DateTime,
}

impl ScalarKind {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "int" | "integer" => Some(Self::Int),
            "float" | "double" => Some(Self::Float),
            "bool" | "boolean" => Some(Self::Boolean),
            "string" => Some(Self::String),
            "date" | "datetime" | "carbon" => Some(Self::DateTime),
            _ => None,
        }
    }
}

/// The resolved type of a property.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Scalar(ScalarKind),
    /// A relation to another model.
    Model(ModelId),
    /// The bare `array` token, with no element type.
    #[display(fmt = "array")]
    UntypedArray,
    /// A pseudo-type which has no GraphQL counterpart.
    Unsupported(String),
}

/// Whether a property appears on output types, input types or both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    #[default]
    Default,
    ReadOnly,
    WriteOnly,
}

/// Everything the schema generator knows about one property of a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: PropertyType,
    pub nullable: bool,
    pub is_list: bool,
    pub visibility: Visibility,
    /// Derived by an accessor; excluded from filters and orders.
    pub computed: bool,
    /// A to-many relation exposed as a connection.
    pub paginated: bool,
    pub filterable: bool,
    pub orderable: bool,
    pub eager_load_disabled: bool,
}

impl PropertyDescriptor {
    /// A non-null, non-list, default-visibility property with no flags.
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            is_list: false,
            visibility: Visibility::Default,
            computed: false,
            paginated: false,
            filterable: false,
            orderable: false,
            eager_load_disabled: false,
        }
    }

    /// The target model, if this property is a relation.
    pub fn target(&self) -> Option<&ModelId> {
        match &self.ty {
            PropertyType::Model(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        self.target().is_some()
    }

    pub fn is_to_many(&self) -> bool {
        self.is_relation() && self.is_list
    }

    pub fn is_readable(&self) -> bool {
        self.visibility != Visibility::WriteOnly
    }

    pub fn is_writable(&self) -> bool {
        self.visibility != Visibility::ReadOnly && !self.computed
    }

    /// Whether the property may appear in a filter or order expression.
    pub fn is_queryable(&self) -> bool {
        !self.computed && self.is_readable() && (self.is_relation() || !self.is_list)
    }
}

/// Parse the annotation block of `model`.
///
/// `known` reports whether a model identifier is registered; relation types which do not resolve
/// to a known model are rejected.
pub fn parse(
    model: &ModelId,
    annotations: &str,
    known: impl Fn(&ModelId) -> bool,
) -> Result<Vec<PropertyDescriptor>> {
    let mut properties = Vec::new();
    let mut names = HashSet::new();
    for line in annotations.lines() {
        let line = line
            .trim()
            .trim_start_matches("///")
            .trim_start_matches('*')
            .trim();
        if !line.starts_with("@property") {
            continue;
        }
        let property = parse_line(model, line, &known)?;
        if !names.insert(property.name.clone()) {
            return Err(parse_error(model, line, "duplicate property"));
        }
        properties.push(property);
    }
    tracing::debug!("parsed {} properties of {model}", properties.len());
    Ok(properties)
}

fn parse_line(
    model: &ModelId,
    line: &str,
    known: &impl Fn(&ModelId) -> bool,
) -> Result<PropertyDescriptor> {
    let mut tokens = line.split_whitespace();
    let visibility = match tokens.next() {
        Some("@property") => Visibility::Default,
        Some("@property-read") => Visibility::ReadOnly,
        Some("@property-write") => Visibility::WriteOnly,
        _ => return Err(parse_error(model, line, "unknown annotation")),
    };
    let ty = tokens
        .next()
        .ok_or_else(|| parse_error(model, line, "missing type"))?;
    let name = tokens
        .next()
        .and_then(|name| name.strip_prefix('$'))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| parse_error(model, line, "expected `$name` after the type"))?;

    let (ty, nullable, is_list) = parse_type(model, line, ty, known)?;
    let mut property = PropertyDescriptor {
        nullable,
        is_list,
        visibility,
        ..PropertyDescriptor::new(name, ty)
    };
    for flag in tokens.filter(|token| token.starts_with('@')) {
        match flag {
            "@paginate" => property.paginated = true,
            "@filterable" => property.filterable = true,
            "@orderable" => property.orderable = true,
            "@computed" => property.computed = true,
            "@eager-load-disabled" => property.eager_load_disabled = true,
            _ => tracing::warn!("ignoring unknown flag {flag} on {model}.{name}"),
        }
    }
    if property.paginated && !property.is_to_many() {
        return Err(parse_error(
            model,
            line,
            "@paginate requires a list of models",
        ));
    }
    Ok(property)
}

/// Parse a type token into its type, nullability and list-ness.
fn parse_type(
    model: &ModelId,
    line: &str,
    token: &str,
    known: &impl Fn(&ModelId) -> bool,
) -> Result<(PropertyType, bool, bool)> {
    let mut nullable = false;
    let mut token = token;
    if let Some(rest) = token.strip_prefix('?') {
        nullable = true;
        token = rest;
    }
    let parts = token.split('|').collect::<Vec<_>>();
    if parts.len() > 1 {
        let rest = parts
            .iter()
            .filter(|part| !part.eq_ignore_ascii_case("null"))
            .collect::<Vec<_>>();
        let [single] = rest.as_slice() else {
            return Err(parse_error(model, line, "union types are not supported"));
        };
        nullable = true;
        token = **single;
    }

    let (element, is_list) = if let Some(element) = token.strip_suffix("[]") {
        (element, true)
    } else if let Some(element) = ["list<", "array<"]
        .iter()
        .find_map(|prefix| token.strip_prefix(prefix))
    {
        let element = element
            .strip_suffix('>')
            .ok_or_else(|| parse_error(model, line, "unterminated list type"))?;
        (element, true)
    } else {
        (token, false)
    };
    if element.is_empty() {
        return Err(parse_error(model, line, "missing element type"));
    }

    if let Some(kind) = ScalarKind::parse(element) {
        return Ok((PropertyType::Scalar(kind), nullable, is_list));
    }
    match element.to_ascii_lowercase().as_str() {
        "array" if !is_list => return Ok((PropertyType::UntypedArray, nullable, false)),
        "array" | "mixed" | "object" | "iterable" | "callable" | "resource" => {
            return Ok((
                PropertyType::Unsupported(element.to_string()),
                nullable,
                is_list,
            ));
        }
        _ => {}
    }

    let target = resolve_model(model, element);
    if !known(&target) {
        return Err(parse_error(
            model,
            line,
            format!("type {element} is neither a scalar nor a known model"),
        ));
    }
    Ok((PropertyType::Model(target), nullable, is_list))
}

/// Resolve a model token, qualifying unqualified names with the namespace of the declaring model.
fn resolve_model(model: &ModelId, token: &str) -> ModelId {
    let token = token.trim_start_matches("::");
    if token.contains("::") {
        ModelId::from(token)
    } else {
        ModelId::new(model.namespace(), token)
    }
}

fn parse_error(model: &ModelId, line: &str, reason: impl Into<String>) -> Error {
    Error::MetadataParse {
        model: model.to_string(),
        line: line.to_string(),
        reason: reason.into(),
    }
}
