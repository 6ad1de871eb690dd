use crate::compare::{self, MatchResult};
use crate::config::MatchingConfig;
use crate::embed::{EmbedError, Embedding};
use crate::model::PersonId;
use crate::store::{EmbeddingStore, StoreError};
use crate::Error;
use std::sync::Mutex;

/// Outcome of matching one face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub person: PersonId,
    /// True when no existing person was close enough
    pub created: bool,
    /// Similarity to the best existing person, if any existed
    pub similarity: Option<f32>,
}

/// Assigns incoming embeddings to existing persons or starts new ones
#[derive(Debug, Clone)]
pub struct Matcher {
    dimension: usize,
    threshold: f32,
}

impl Matcher {
    pub fn new(dimension: usize, threshold: f32) -> Self {
        Self { dimension, threshold }
    }

    pub fn from_config(dimension: usize, config: &MatchingConfig) -> Self {
        Self::new(dimension, config.threshold)
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<(), EmbedError> {
        if embedding.dim() != self.dimension {
            return Err(EmbedError::InvalidDimension {
                expected: self.dimension,
                got: embedding.dim(),
            });
        }
        Ok(())
    }

    /// Closest existing person, whether or not it clears the threshold
    pub fn best_match<S>(&self, store: &S, embedding: &Embedding) -> Result<Option<MatchResult>, Error>
    where
        S: EmbeddingStore + ?Sized,
    {
        self.check_dimension(embedding)?;

        let mut candidates = Vec::new();
        for person in store.all_persons()? {
            candidates.push((person, store.embeddings_for(person)?));
        }

        Ok(compare::find_best_match(embedding, candidates))
    }

    /// Match an embedding and record it under the resulting person.
    ///
    /// A new person is created when the best similarity does not strictly
    /// exceed the threshold.
    pub fn assign<S>(&self, store: &mut S, embedding: Embedding) -> Result<Assignment, Error>
    where
        S: EmbeddingStore + ?Sized,
    {
        let best = self.best_match(&*store, &embedding)?;
        let similarity = best.map(|m| m.similarity);

        let assignment = match best {
            Some(m) if m.similarity > self.threshold => {
                log::debug!("Matched person {} (similarity {:.3})", m.person, m.similarity);
                Assignment {
                    person: m.person,
                    created: false,
                    similarity,
                }
            }
            _ => {
                let person = store.create_person()?;
                log::debug!(
                    "Created person {} (best similarity {})",
                    person,
                    similarity.map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s))
                );
                Assignment {
                    person,
                    created: true,
                    similarity,
                }
            }
        };

        store.append(assignment.person, embedding)?;
        Ok(assignment)
    }
}

/// Matcher whose match-then-append runs under one lock, so concurrent
/// callers never both miss each other and split one identity in two.
#[derive(Debug)]
pub struct SharedMatcher<S> {
    matcher: Matcher,
    store: Mutex<S>,
}

impl<S: EmbeddingStore> SharedMatcher<S> {
    pub fn new(matcher: Matcher, store: S) -> Self {
        Self {
            matcher,
            store: Mutex::new(store),
        }
    }

    pub fn assign(&self, embedding: Embedding) -> Result<Assignment, Error> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {}", e)))?;
        self.matcher.assign(&mut *store, embedding)
    }

    /// Run a closure against the store while holding the lock
    pub fn with_store<T>(&self, f: impl FnOnce(&mut S) -> T) -> Result<T, Error> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {}", e)))?;
        Ok(f(&mut store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEmbeddingStore;
    use std::sync::Arc;
    use std::thread;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec(), values.len()).unwrap()
    }

    fn matcher() -> Matcher {
        Matcher::new(3, 0.6)
    }

    #[test]
    fn test_empty_store_creates_person() {
        let mut store = MemoryEmbeddingStore::new();

        let assignment = matcher().assign(&mut store, emb(&[1.0, 0.0, 0.0])).unwrap();

        assert!(assignment.created);
        assert_eq!(assignment.similarity, None);
        assert_eq!(
            store.embeddings_for(assignment.person).unwrap(),
            &[emb(&[1.0, 0.0, 0.0])]
        );
    }

    #[test]
    fn test_close_embedding_joins_person() {
        let mut store = MemoryEmbeddingStore::new();
        let p1 = matcher().assign(&mut store, emb(&[1.0, 0.0, 0.0])).unwrap().person;

        let assignment = matcher().assign(&mut store, emb(&[0.99, 0.01, 0.0])).unwrap();

        assert_eq!(assignment.person, p1);
        assert!(!assignment.created);
        assert_eq!(store.embeddings_for(p1).unwrap().len(), 2);
    }

    #[test]
    fn test_distant_embedding_creates_person() {
        let mut store = MemoryEmbeddingStore::new();
        let p1 = matcher().assign(&mut store, emb(&[1.0, 0.0, 0.0])).unwrap().person;

        let assignment = matcher().assign(&mut store, emb(&[0.0, 1.0, 0.0])).unwrap();

        assert!(assignment.created);
        assert_ne!(assignment.person, p1);
        assert_eq!(store.all_persons().unwrap().count(), 2);
    }

    #[test]
    fn test_large_magnitude_repeat_joins_person() {
        let mut store = MemoryEmbeddingStore::new();
        let face = emb(&[1e20, 1e20, 1e20]);

        let first = matcher().assign(&mut store, face.clone()).unwrap();
        let second = matcher().assign(&mut store, face).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.person, first.person);
        assert_eq!(second.similarity, Some(1.0));
    }

    #[test]
    fn test_threshold_is_strict() {
        let similarity = compare::cosine_similarity(&emb(&[1.0, 0.0]), &emb(&[1.0, 1.0]));
        let exact = Matcher::new(2, similarity);

        let mut store = MemoryEmbeddingStore::new();
        exact.assign(&mut store, emb(&[1.0, 0.0])).unwrap();

        assert!(exact.assign(&mut store, emb(&[1.0, 1.0])).unwrap().created);
    }

    #[test]
    fn test_tie_goes_to_smallest_person_id() {
        let mut store = MemoryEmbeddingStore::new();
        let loose = Matcher::new(2, 0.5);

        // Two persons equidistant from the query at 45 degrees each side
        let a = store.create_person().unwrap();
        let b = store.create_person().unwrap();
        store.append(b, emb(&[1.0, 1.0])).unwrap();
        store.append(a, emb(&[1.0, -1.0])).unwrap();

        let assignment = loose.assign(&mut store, emb(&[1.0, 0.0])).unwrap();
        assert_eq!(assignment.person, a);
    }

    #[test]
    fn test_match_is_deterministic() {
        let mut store = MemoryEmbeddingStore::new();
        for v in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            matcher().assign(&mut store, emb(&v)).unwrap();
        }

        let query = emb(&[0.2, 0.9, 0.1]);
        let first = matcher().best_match(&store, &query).unwrap().unwrap();
        for _ in 0..10 {
            assert_eq!(matcher().best_match(&store, &query).unwrap().unwrap(), first);
        }
    }

    #[test]
    fn test_person_without_faces_is_never_matched() {
        let mut store = MemoryEmbeddingStore::new();
        store.create_person().unwrap();

        assert!(matcher().best_match(&store, &emb(&[1.0, 0.0, 0.0])).unwrap().is_none());
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let mut store = MemoryEmbeddingStore::new();

        let err = matcher().assign(&mut store, emb(&[1.0, 0.0])).unwrap_err();

        assert!(err.is_invalid_embedding());
        assert!(store.is_empty());
    }

    #[test]
    fn test_shared_matcher_serializes_identical_faces() {
        let shared = Arc::new(SharedMatcher::new(matcher(), MemoryEmbeddingStore::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.assign(emb(&[0.3, 0.4, 0.5])).unwrap())
            })
            .collect();

        let assignments: Vec<Assignment> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(assignments.iter().filter(|a| a.created).count(), 1);
        let person = assignments[0].person;
        assert!(assignments.iter().all(|a| a.person == person));

        let count = shared
            .with_store(|store| store.embeddings_for(person).map(|e| e.len()))
            .unwrap()
            .unwrap();
        assert_eq!(count, 8);
    }
}
