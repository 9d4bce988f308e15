//! Derive macro for the `Model` trait.

use crate::helpers::{parse_docs, AttrParser};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    DeriveInput, Ident, LitStr, Path, Token,
};

/// The argument of a relation attribute: the property, followed by explicit key names.
struct RelationArg {
    property: Ident,
    keys: Vec<LitStr>,
}

impl Parse for RelationArg {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let property = input.parse()?;
        let mut keys = vec![];
        while !input.is_empty() {
            input.parse::<Token![,]>()?;
            keys.push(input.parse()?);
        }
        Ok(Self { property, keys })
    }
}

/// The path of the `model_graphql::model` module in the scope invoking the macro.
fn model_path() -> TokenStream {
    quote!(::model_graphql::model)
}

fn cow(lit: &LitStr) -> TokenStream {
    quote!(::std::borrow::Cow::Borrowed(#lit))
}

fn optional_key(keys: &[LitStr], i: usize) -> TokenStream {
    match keys.get(i) {
        Some(key) => {
            let key = cow(key);
            quote!(::std::option::Option::Some(#key))
        }
        None => quote!(::std::option::Option::None),
    }
}

/// The relation overrides declared with `kind`, such as `#[model(has_one(pencil))]`.
fn relations(parser: &AttrParser, input: &DeriveInput, kind: &str) -> Vec<TokenStream> {
    let model = model_path();
    parser
        .get_args::<RelationArg, _>(&input.attrs, kind)
        .into_iter()
        .map(|arg| {
            let max_keys = if kind == "belongs_to_many" { 3 } else { 1 };
            if arg.keys.len() > max_keys {
                panic!(
                    "{kind}({}) takes at most {max_keys} key names",
                    arg.property
                );
            }
            let relation_kind = match kind {
                "belongs_to" => {
                    let foreign_key = optional_key(&arg.keys, 0);
                    quote!(#model::RelationKind::BelongsTo { foreign_key: #foreign_key })
                }
                "has_one" => {
                    let foreign_key = optional_key(&arg.keys, 0);
                    quote!(#model::RelationKind::HasOne { foreign_key: #foreign_key })
                }
                "has_many" => {
                    let foreign_key = optional_key(&arg.keys, 0);
                    quote!(#model::RelationKind::HasMany { foreign_key: #foreign_key })
                }
                _ => {
                    let pivot = optional_key(&arg.keys, 0);
                    let owner_key = optional_key(&arg.keys, 1);
                    let related_key = optional_key(&arg.keys, 2);
                    quote!(#model::RelationKind::BelongsToMany {
                        pivot: #pivot,
                        owner_key: #owner_key,
                        related_key: #related_key,
                    })
                }
            };
            let property = cow(&LitStr::new(&arg.property.to_string(), arg.property.span()));
            quote! {
                #model::RelationOverride {
                    property: #property,
                    kind: #relation_kind,
                }
            }
        })
        .collect()
}

pub fn derive(input: DeriveInput) -> TokenStream {
    let parser = AttrParser::new("model");
    let model = model_path();

    let name = &input.ident;
    let name_lit = cow(&LitStr::new(&name.to_string(), name.span()));
    let namespace = match parser.get_arg::<LitStr, _>(&input.attrs, "namespace") {
        Some(namespace) => cow(&namespace),
        None => quote!(::std::borrow::Cow::Borrowed(::std::module_path!())),
    };
    let table = match parser.get_arg::<LitStr, _>(&input.attrs, "table") {
        Some(table) => {
            let table = cow(&table);
            quote!(::std::option::Option::Some(#table))
        }
        None => quote!(::std::option::Option::None),
    };
    let accessor = match parser.get_arg::<Path, _>(&input.attrs, "accessor") {
        Some(accessor) => quote!(::std::option::Option::Some(#accessor as #model::Accessor)),
        None => quote!(::std::option::Option::None),
    };
    let docs = parse_docs(&input.attrs);
    let relations = ["belongs_to", "has_one", "has_many", "belongs_to_many"]
        .into_iter()
        .flat_map(|kind| relations(&parser, &input, kind))
        .collect::<Vec<_>>();

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    quote! {
        impl #impl_generics #model::Model for #name #ty_generics #where_clause {
            fn definition() -> #model::ModelDefinition {
                #model::ModelDefinition {
                    name: #name_lit,
                    namespace: #namespace,
                    table: #table,
                    annotations: ::std::borrow::Cow::Borrowed(#docs),
                    relations: ::std::vec![#(#relations),*],
                    accessor: #accessor,
                }
            }
        }
    }
}
