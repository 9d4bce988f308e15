//! Helper functions for implementing procedural macros.

use itertools::Itertools;
use proc_macro2::TokenStream;
use std::borrow::Borrow;
use syn::{
    parenthesized,
    parse::{Parse, Parser},
    Attribute, Expr, Ident, Lit, Meta,
};

/// Convenient parsing interface for helper attributes.
///
/// Parses attributes of the form `#[scope(name(arg))]`, one `name` per attribute.
pub struct AttrParser(String);

impl AttrParser {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// The argument of the first attribute called `name`, if there is one.
    ///
    /// # Panics
    ///
    /// Panics if an attribute in this scope is malformed, or if the argument does not parse as a
    /// `T`.
    pub fn get_arg<T: Parse, I>(&self, attrs: I, name: &str) -> Option<T>
    where
        I: IntoIterator,
        I::Item: Borrow<Attribute>,
    {
        self.get_args(attrs, name).into_iter().next()
    }

    /// The arguments of every attribute called `name`, in order.
    ///
    /// # Panics
    ///
    /// Panics if an attribute in this scope is malformed, or if an argument does not parse as a
    /// `T`.
    pub fn get_args<T: Parse, I>(&self, attrs: I, name: &str) -> Vec<T>
    where
        I: IntoIterator,
        I::Item: Borrow<Attribute>,
    {
        attrs
            .into_iter()
            .filter_map(|a| self.parse_arg_with(a.borrow(), name, T::parse))
            .collect()
    }

    fn parse_arg_with<P: Parser>(&self, a: &Attribute, name: &str, p: P) -> Option<P::Output> {
        let Some((attr_name, Some(param))) = self.parse_attr(a) else { return None };
        if attr_name != name {
            return None;
        }
        Some(p.parse2(param).unwrap_or_else(|err| {
            panic!(
                "malformed argument to {}({}): {err}",
                self.0, name
            )
        }))
    }

    /// Parse an attribute in this scope, returning its name and parameter.
    ///
    /// Parsing `#[scope(foo(bar))]` results in `Some("foo", Some("bar"))`. Attributes in other
    /// scopes result in [`None`].
    fn parse_attr(&self, a: &Attribute) -> Option<(Ident, Option<TokenStream>)> {
        let mut parsed = None;
        if a.path().is_ident(&self.0) {
            a.parse_nested_meta(|meta| {
                let name = meta.path.get_ident().unwrap_or_else(|| {
                    panic!("{} attribute must start with an identifier", self.0)
                });
                let content = if meta.input.is_empty() {
                    None
                } else {
                    let content;
                    parenthesized!(content in meta.input);
                    Some(content.parse()?)
                };
                parsed = Some((name.clone(), content));
                Ok(())
            })
            .unwrap_or_else(|err| panic!("malformed {} attribute: {err}", self.0));
        }
        parsed
    }
}

/// Extract documentation from the attributes on an item.
///
/// The documentation is constructed by taking all the `#[doc = "..."]` attributes and concatenating
/// their trimmed arguments, separated by newlines.
pub fn parse_docs(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter_map(|attr| {
            let Meta::NameValue(nv) = &attr.meta else { return None; };
            if !nv.path.is_ident("doc") {
                return None;
            }
            let Expr::Lit(lit) = &nv.value else { return None; };
            let Lit::Str(s) = &lit.lit else { return None; };
            Some(s.value().trim().to_string())
        })
        .join("\n")
}
