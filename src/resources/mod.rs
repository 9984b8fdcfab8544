//! Entity-agnostic CRUD plumbing shared by users, tours and reviews.
//!
//! An entity describes itself through [`Resource`] (name, field allow-list,
//! input types). Persistence goes through [`ResourceStore`], whose
//! `after_write` stage runs after every successful insert, update or delete.

pub mod handlers;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::query::{Field, QuerySpec};
use crate::store::StoreError;

pub use handlers::AppJson;

pub trait Resource: Serialize + Send + Sync + 'static {
    type Create: Input;
    type Patch: Input;

    /// Singular name used in messages ("No tour found with that ID").
    const NAME: &'static str;
    const FIELDS: &'static [Field];

    fn id(&self) -> Uuid;
}

/// A request body that is normalized, then validated, before it reaches a store.
pub trait Input: DeserializeOwned + Send + Sync + 'static {
    fn normalize(&mut self) {}

    fn validate(&self, violations: &mut Violations);

    fn prepare(mut self) -> Result<Self, AppError>
    where
        Self: Sized,
    {
        self.normalize();
        let mut violations = Violations::default();
        self.validate(&mut violations);
        violations.into_result()?;
        Ok(self)
    }
}

/// Accumulated validation messages for one input.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn check(&mut self, ok: bool, message: &str) {
        if !ok {
            self.push(message);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The joined messages, or `None` when nothing was violated.
    pub fn into_message(self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.join(". "))
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self.into_message() {
            None => Ok(()),
            Some(msg) => Err(AppError::Validation(format!("Invalid input data. {msg}"))),
        }
    }
}

/// Input type of resources that are never created through the generic handlers.
#[derive(Debug, Deserialize)]
pub enum NotCreatable {}

impl Input for NotCreatable {
    fn validate(&self, _: &mut Violations) {
        match *self {}
    }
}

#[async_trait]
pub trait ResourceStore<E: Resource>: Send + Sync {
    async fn insert(&self, input: E::Create) -> Result<E, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<E>, StoreError>;

    async fn find_many(&self, spec: &QuerySpec) -> Result<Vec<E>, StoreError>;

    /// Applies a partial update; `None` when no visible entity has that id.
    async fn update(&self, id: Uuid, patch: E::Patch) -> Result<Option<E>, StoreError>;

    /// Returns the removed entity so follow-up stages know what was affected.
    async fn delete(&self, id: Uuid) -> Result<Option<E>, StoreError>;

    /// Adds eagerly loaded relations to a serialized single-entity read.
    async fn populate(&self, _entity: &E, _doc: &mut Value) -> Result<(), StoreError> {
        Ok(())
    }

    async fn after_write(&self, _entity: &E) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    impl Input for Named {
        fn normalize(&mut self) {
            self.name = self.name.trim().to_string();
        }

        fn validate(&self, v: &mut Violations) {
            v.check(!self.name.is_empty(), "A name is required");
            v.check(self.name.len() <= 5, "A name must have at most 5 characters");
        }
    }

    #[test]
    fn prepare_normalizes_before_validating() {
        let ok = Named { name: "  abc ".into() }.prepare().unwrap();
        assert_eq!(ok.name, "abc");

        let err = Named { name: "   ".into() }.prepare().unwrap_err();
        assert_eq!(err.to_string(), "Invalid input data. A name is required");
    }

    #[test]
    fn violations_are_joined() {
        let mut v = Violations::default();
        v.push("first");
        v.push("second");
        let err = v.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Invalid input data. first. second");
    }

    #[test]
    fn not_creatable_never_deserializes() {
        assert!(serde_json::from_str::<NotCreatable>(r#"{"name":"x"}"#).is_err());
    }
}
