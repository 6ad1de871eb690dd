use crate::catalog::Catalog;
use crate::embed::Embedding;
use crate::model::{FaceId, PersonId};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Person not found: {0}")]
    PersonNotFound(PersonId),
    #[error("Face not found: {0}")]
    FaceNotFound(FaceId),
    #[error("Person already exists: {0}")]
    DuplicatePerson(PersonId),
    #[error("Person {0} still owns faces")]
    PersonInUse(PersonId),
    #[error("Face {face} is not assigned to person {person}")]
    Unassigned { face: FaceId, person: PersonId },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::PersonNotFound(_) | StoreError::FaceNotFound(_))
    }
}

/// Per-person index of face embeddings consulted by the matcher.
///
/// A person exists in the store from `create_person` on, but is only
/// listed by `all_persons` once it owns at least one embedding.
pub trait EmbeddingStore {
    /// Register a new person with no embeddings
    fn create_person(&mut self) -> Result<PersonId, StoreError>;

    /// Embeddings recorded for a person, in append order
    fn embeddings_for(&self, person: PersonId) -> Result<&[Embedding], StoreError>;

    /// Record an embedding as belonging to a person
    fn append(&mut self, person: PersonId, embedding: Embedding) -> Result<(), StoreError>;

    /// Persons owning at least one embedding. Restartable: every call
    /// yields a fresh iterator over the current state.
    fn all_persons(&self) -> Result<Box<dyn Iterator<Item = PersonId> + '_>, StoreError>;

    /// Move every embedding of `source` to `target` and forget `source`
    fn absorb(&mut self, source: PersonId, target: PersonId) -> Result<(), StoreError>;

    /// Forget a person, returning the embeddings it owned
    fn remove_person(&mut self, person: PersonId) -> Result<Vec<Embedding>, StoreError>;

    /// Replace the whole index. Ids created afterwards are at least
    /// `next_id` and above every id in `persons`.
    fn rebuild(
        &mut self,
        persons: BTreeMap<PersonId, Vec<Embedding>>,
        next_id: PersonId,
    ) -> Result<(), StoreError>;
}

/// In-memory embedding index, ordered by person id
#[derive(Debug, Clone)]
pub struct MemoryEmbeddingStore {
    persons: BTreeMap<PersonId, Vec<Embedding>>,
    next_id: u64,
}

impl Default for MemoryEmbeddingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEmbeddingStore {
    pub fn new() -> Self {
        Self {
            persons: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Build the index from the system of record.
    ///
    /// Every catalog person is registered (even without faces) and new
    /// person ids continue after the catalog's highest allocated id.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut store = Self::new();
        store.replace(catalog.embeddings_by_person(), catalog.next_person_id());
        store
    }

    fn replace(&mut self, persons: BTreeMap<PersonId, Vec<Embedding>>, next_id: PersonId) {
        let highest = persons.keys().next_back().map_or(0, |id| id.0 + 1);
        self.next_id = self.next_id.max(next_id.0).max(highest);
        self.persons = persons;

        log::debug!(
            "Embedding index built: {} persons, next id {}",
            self.persons.len(),
            self.next_id
        );
    }

    pub fn contains(&self, person: PersonId) -> bool {
        self.persons.contains_key(&person)
    }

    /// Number of registered persons, including those without embeddings
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }
}

impl EmbeddingStore for MemoryEmbeddingStore {
    fn create_person(&mut self) -> Result<PersonId, StoreError> {
        let id = PersonId(self.next_id);
        self.next_id += 1;
        self.persons.insert(id, Vec::new());
        Ok(id)
    }

    fn embeddings_for(&self, person: PersonId) -> Result<&[Embedding], StoreError> {
        self.persons
            .get(&person)
            .map(Vec::as_slice)
            .ok_or(StoreError::PersonNotFound(person))
    }

    fn append(&mut self, person: PersonId, embedding: Embedding) -> Result<(), StoreError> {
        self.persons
            .get_mut(&person)
            .ok_or(StoreError::PersonNotFound(person))?
            .push(embedding);
        Ok(())
    }

    fn all_persons(&self) -> Result<Box<dyn Iterator<Item = PersonId> + '_>, StoreError> {
        Ok(Box::new(
            self.persons
                .iter()
                .filter(|(_, embeddings)| !embeddings.is_empty())
                .map(|(id, _)| *id),
        ))
    }

    fn absorb(&mut self, source: PersonId, target: PersonId) -> Result<(), StoreError> {
        if !self.persons.contains_key(&target) {
            return Err(StoreError::PersonNotFound(target));
        }
        let moved = self
            .persons
            .remove(&source)
            .ok_or(StoreError::PersonNotFound(source))?;
        if let Some(embeddings) = self.persons.get_mut(&target) {
            embeddings.extend(moved);
        }
        Ok(())
    }

    fn remove_person(&mut self, person: PersonId) -> Result<Vec<Embedding>, StoreError> {
        self.persons
            .remove(&person)
            .ok_or(StoreError::PersonNotFound(person))
    }

    fn rebuild(
        &mut self,
        persons: BTreeMap<PersonId, Vec<Embedding>>,
        next_id: PersonId,
    ) -> Result<(), StoreError> {
        self.replace(persons, next_id);
        Ok(())
    }
}
