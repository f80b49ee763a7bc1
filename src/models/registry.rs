//! Ordered collection of loaded models

use crate::models::predictor::{ModelKind, Predictor};

/// One registry entry
pub struct RegisteredModel {
    pub name: String,
    pub kind: ModelKind,
    pub predictor: Box<dyn Predictor>,
}

/// Models in registration order.
///
/// Built once at startup and shared read-only between connections.
#[derive(Default)]
pub struct ModelRegistry {
    entries: Vec<RegisteredModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a model; evaluation follows registration order
    pub fn register(&mut self, name: impl Into<String>, predictor: Box<dyn Predictor>) {
        self.entries.push(RegisteredModel {
            name: name.into(),
            kind: predictor.kind(),
            predictor,
        });
    }

    /// Builder-style `register`
    pub fn with_model(mut self, name: impl Into<String>, predictor: Box<dyn Predictor>) -> Self {
        self.register(name, predictor);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn get(&self, index: usize) -> Option<&RegisteredModel> {
        self.entries.get(index)
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.name, e.kind)))
            .finish()
    }
}
