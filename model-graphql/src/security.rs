//! Authorization.
//!
//! Every resolver asks the [`SecurityGuard`] before it reveals or changes data. The guard holds no
//! state of its own: it forwards each question, together with the identity of the caller, to the
//! application's [`Policy`], and turns a denial into [`Error::Authorization`] worded by the
//! schema's [`Vocabulary`].

use crate::error::{Error, Result};
use crate::graphql::vocabulary::{English, Vocabulary};
use crate::model::{Entity, ModelId};
use crate::sql::ops::filter::FilterExpression;
use async_graphql::Value as GqlValue;
use derivative::Derivative;
use derive_more::Display;
use std::sync::Arc;

/// An action a caller may be allowed to take on a model.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Ability {
    #[display(fmt = "filter")]
    Filter,
    #[display(fmt = "filterProperty")]
    FilterProperty,
    #[display(fmt = "create")]
    Create,
    #[display(fmt = "delete")]
    Delete,
    #[display(fmt = "update")]
    Update,
    #[display(fmt = "viewProperty")]
    ViewProperty,
    #[display(fmt = "view")]
    View,
    #[display(fmt = "viewAny")]
    ViewAny,
}

/// Extra arguments of an authorization check.
#[derive(Clone, Copy, Debug)]
pub enum PolicyArgument<'a> {
    /// The entity acted on.
    Entity(&'a Entity),
    /// The raw input of a mutation.
    Input(&'a GqlValue),
    /// The name of the property viewed or filtered.
    Property(&'a str),
    /// The filter applied to a list.
    Filter(&'a FilterExpression),
}

/// The identity on whose behalf a request executes.
///
/// Attach it to each request with [`Request::data`](async_graphql::Request::data). Requests without
/// a caller are anonymous.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Caller {
    pub user: Option<Entity>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user: Entity) -> Self {
        Self { user: Some(user) }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }
}

/// An authorization backend.
pub trait Policy: Send + Sync + 'static {
    /// Whether `caller` may exercise `ability` on the model `subject`.
    fn check(
        &self,
        caller: &Caller,
        ability: Ability,
        subject: &ModelId,
        args: &[PolicyArgument],
    ) -> bool;
}

/// A policy which allows everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Policy for AllowAll {
    fn check(&self, _: &Caller, _: Ability, _: &ModelId, _: &[PolicyArgument]) -> bool {
        true
    }
}

impl<F> Policy for F
where
    F: Fn(&Caller, Ability, &ModelId, &[PolicyArgument]) -> bool + Send + Sync + 'static,
{
    fn check(
        &self,
        caller: &Caller,
        ability: Ability,
        subject: &ModelId,
        args: &[PolicyArgument],
    ) -> bool {
        self(caller, ability, subject, args)
    }
}

/// The authorization boundary of the generated schema.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct SecurityGuard {
    #[derivative(Debug = "ignore")]
    policy: Arc<dyn Policy>,
    vocabulary: Arc<dyn Vocabulary>,
}

impl SecurityGuard {
    pub fn new(policy: Arc<dyn Policy>) -> Self {
        Self {
            policy,
            vocabulary: Arc::new(English),
        }
    }

    /// Word denials in `vocabulary`.
    pub fn with_vocabulary(mut self, vocabulary: Arc<dyn Vocabulary>) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    fn assert(
        &self,
        caller: &Caller,
        ability: Ability,
        subject: &ModelId,
        args: &[PolicyArgument],
        property: Option<&str>,
    ) -> Result<()> {
        if self.policy.check(caller, ability, subject, args) {
            Ok(())
        } else {
            tracing::debug!("denied {ability} on {subject}");
            Err(Error::Authorization {
                message: self.vocabulary.denied(ability, property),
            })
        }
    }

    /// Assert that `caller` may filter `model` by `filter`, and by every property it references.
    pub fn assert_can_filter(
        &self,
        caller: &Caller,
        model: &ModelId,
        filter: &FilterExpression,
    ) -> Result<()> {
        self.assert(
            caller,
            Ability::Filter,
            model,
            &[PolicyArgument::Filter(filter)],
            None,
        )?;
        for (subject, property) in filter.references(model) {
            self.assert(
                caller,
                Ability::FilterProperty,
                &subject,
                &[PolicyArgument::Property(&property)],
                Some(&property),
            )?;
        }
        Ok(())
    }

    pub fn assert_can_create(&self, caller: &Caller, model: &ModelId, input: &GqlValue) -> Result<()> {
        self.assert(
            caller,
            Ability::Create,
            model,
            &[PolicyArgument::Input(input)],
            None,
        )
    }

    pub fn assert_can_update(
        &self,
        caller: &Caller,
        entity: &Entity,
        input: &GqlValue,
    ) -> Result<()> {
        self.assert(
            caller,
            Ability::Update,
            &entity.model,
            &[PolicyArgument::Entity(entity), PolicyArgument::Input(input)],
            None,
        )
    }

    pub fn assert_can_delete(&self, caller: &Caller, entity: &Entity) -> Result<()> {
        self.assert(
            caller,
            Ability::Delete,
            &entity.model,
            &[PolicyArgument::Entity(entity)],
            None,
        )
    }

    pub fn assert_can_view(&self, caller: &Caller, entity: &Entity) -> Result<()> {
        self.assert(
            caller,
            Ability::View,
            &entity.model,
            &[PolicyArgument::Entity(entity)],
            None,
        )
    }

    pub fn assert_can_view_property(
        &self,
        caller: &Caller,
        entity: &Entity,
        property: &str,
    ) -> Result<()> {
        self.assert(
            caller,
            Ability::ViewProperty,
            &entity.model,
            &[PolicyArgument::Entity(entity), PolicyArgument::Property(property)],
            Some(property),
        )
    }

    pub fn assert_can_view_any(&self, caller: &Caller, model: &ModelId) -> Result<()> {
        self.assert(caller, Ability::ViewAny, model, &[], None)
    }

    /// Whether `caller` may view `entity`, without raising an error.
    pub fn can_view(&self, caller: &Caller, entity: &Entity) -> bool {
        self.policy.check(
            caller,
            Ability::View,
            &entity.model,
            &[PolicyArgument::Entity(entity)],
        )
    }

    /// The entities `caller` may view, in their original order.
    pub fn filter_viewable(&self, caller: &Caller, entities: Vec<Entity>) -> Vec<Entity> {
        let total = entities.len();
        let viewable = entities
            .into_iter()
            .filter(|entity| self.can_view(caller, entity))
            .collect::<Vec<_>>();
        if viewable.len() < total {
            tracing::debug!("hid {} of {total} entities", total - viewable.len());
        }
        viewable
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::graphql::vocabulary::German;
    use crate::init_logging;
    use crate::model::test::library;
    use crate::sql::db::Record;
    use async_graphql::value;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// A policy which records every check and denies a configurable set of abilities.
    #[derive(Debug, Default)]
    pub struct RecordingPolicy {
        log: Mutex<Vec<(Ability, ModelId, Option<String>)>>,
        denied: Mutex<HashSet<(Ability, Option<String>)>>,
    }

    impl RecordingPolicy {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Deny `ability` on every model.
        pub fn deny(&self, ability: Ability) {
            self.denied.lock().unwrap().insert((ability, None));
        }

        /// Deny `ability` when checked for the named property.
        pub fn deny_property(&self, ability: Ability, property: &str) {
            self.denied
                .lock()
                .unwrap()
                .insert((ability, Some(property.to_string())));
        }

        /// Every check made so far.
        pub fn calls(&self) -> Vec<(Ability, ModelId, Option<String>)> {
            self.log.lock().unwrap().clone()
        }

        /// The abilities checked so far, in order.
        pub fn abilities(&self) -> Vec<Ability> {
            self.calls().into_iter().map(|(ability, _, _)| ability).collect()
        }

        pub fn clear(&self) {
            self.log.lock().unwrap().clear();
        }
    }

    impl Policy for RecordingPolicy {
        fn check(
            &self,
            _: &Caller,
            ability: Ability,
            subject: &ModelId,
            args: &[PolicyArgument],
        ) -> bool {
            let property = args.iter().find_map(|arg| match arg {
                PolicyArgument::Property(property) => Some(property.to_string()),
                _ => None,
            });
            self.log
                .lock()
                .unwrap()
                .push((ability, subject.clone(), property.clone()));
            let denied = self.denied.lock().unwrap();
            !denied.contains(&(ability, None)) && !denied.contains(&(ability, property))
        }
    }

    fn book(id: i64, name: &str) -> Entity {
        let mut attributes = Record::new();
        attributes.insert("id".into(), id.into());
        attributes.insert("name".into(), name.into());
        Entity::new("library::Book".into(), attributes)
    }

    #[test]
    fn test_abilities() {
        assert_eq!(Ability::FilterProperty.to_string(), "filterProperty");
        assert_eq!(Ability::ViewAny.to_string(), "viewAny");
    }

    #[test]
    fn test_filter_checks_every_property() {
        init_logging();
        let catalog = library();
        let model = ModelId::from("library::Book");
        let filter = FilterExpression::parse(
            &catalog,
            &model,
            &value!({
                "name": { "eq": "Dune" },
                "or": [{ "name": { "like": "%Dune%" } }],
                "author": { "email": { "eq": null } },
            }),
        )
        .unwrap();

        let policy = RecordingPolicy::new();
        let guard = SecurityGuard::new(policy.clone());
        guard
            .assert_can_filter(&Caller::anonymous(), &model, &filter)
            .unwrap();
        assert_eq!(
            policy.calls(),
            [
                (Ability::Filter, model.clone(), None),
                (Ability::FilterProperty, model.clone(), Some("name".into())),
                (Ability::FilterProperty, model.clone(), Some("author".into())),
                (
                    Ability::FilterProperty,
                    "library::Author".into(),
                    Some("email".into())
                ),
            ]
        );

        policy.deny_property(Ability::FilterProperty, "email");
        let err = guard
            .assert_can_filter(&Caller::anonymous(), &model, &filter)
            .unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(
            err.to_string(),
            "You are not authorized to filter the property [email]."
        );
    }

    #[test]
    fn test_denial_is_worded_by_vocabulary() {
        init_logging();
        let policy = RecordingPolicy::new();
        policy.deny(Ability::Delete);
        let guard = SecurityGuard::new(policy).with_vocabulary(Arc::new(German::default()));
        let err = guard
            .assert_can_delete(&Caller::anonymous(), &book(1, "Dune"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Sie sind nicht berechtigt, diesen Eintrag zu löschen."
        );
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_filter_viewable() {
        init_logging();
        fn hide_second(_: &Caller, _: Ability, _: &ModelId, args: &[PolicyArgument]) -> bool {
            !matches!(args, [PolicyArgument::Entity(entity)] if entity.id() == Some(2))
        }
        let guard = SecurityGuard::new(Arc::new(hide_second));
        let viewable = guard.filter_viewable(
            &Caller::anonymous(),
            vec![book(1, "Dune"), book(2, "Children of Dune"), book(3, "The Hobbit")],
        );
        assert_eq!(
            viewable.iter().map(|b| b.id().unwrap()).collect::<Vec<_>>(),
            [1, 3]
        );
    }

    #[test]
    fn test_caller_is_passed_to_policy() {
        init_logging();
        let admin = book(7, "admin");
        fn only_admin(caller: &Caller, _: Ability, _: &ModelId, _: &[PolicyArgument]) -> bool {
            caller.user.as_ref().and_then(Entity::id) == Some(7)
        }
        let guard = SecurityGuard::new(Arc::new(only_admin));
        let model = ModelId::from("library::Book");
        assert!(guard
            .assert_can_view_any(&Caller::anonymous(), &model)
            .is_err());
        guard
            .assert_can_view_any(&Caller::user(admin), &model)
            .unwrap();
    }
}
