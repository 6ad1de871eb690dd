//! Clustering passes over a catalog.
//!
//! [`Clusterer`] is the single writer for one catalog: it owns the records,
//! the embedding index built from them, and runs every face through the
//! matcher and the representative selector one at a time.

use crate::catalog::Catalog;
use crate::compare::cosine_similarity;
use crate::config::Config;
use crate::filter::FaceFilter;
use crate::matcher::{Assignment, Matcher};
use crate::model::{Detection, FaceId, PersonId};
use crate::representative;
use crate::store::{EmbeddingStore, MemoryEmbeddingStore};
use crate::Error;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub faces_processed: usize,
    pub matched_to_existing: usize,
    pub new_persons_created: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    /// Turned away by the face filter
    pub rejected: usize,
    /// Embedding failed validation
    pub invalid: usize,
    pub clustering: ClusterStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub faces_removed: usize,
    pub persons_removed: usize,
}

pub struct Clusterer<S = MemoryEmbeddingStore> {
    catalog: Catalog,
    index: S,
    matcher: Matcher,
    filter: FaceFilter,
    dimension: usize,
}

impl Clusterer<MemoryEmbeddingStore> {
    /// Cluster over an in-memory index built from the catalog
    pub fn new(config: &Config, catalog: Catalog) -> Self {
        let index = MemoryEmbeddingStore::from_catalog(&catalog);
        Self::assemble(config, catalog, index)
    }
}

impl<S: EmbeddingStore> Clusterer<S> {
    /// Cluster over a caller-supplied embedding store, reloaded from the
    /// catalog before use
    pub fn with_store(config: &Config, catalog: Catalog, mut store: S) -> Result<Self, Error> {
        store.rebuild(catalog.embeddings_by_person(), catalog.next_person_id())?;
        Ok(Self::assemble(config, catalog, store))
    }

    fn assemble(config: &Config, catalog: Catalog, index: S) -> Self {
        let dimension = config.embedding.dimension;
        Self {
            catalog,
            index,
            matcher: Matcher::from_config(dimension, &config.matching),
            filter: FaceFilter::new(&config.filter),
            dimension,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    pub fn index(&self) -> &S {
        &self.index
    }

    /// Record detections and cluster everything still pending.
    ///
    /// Filtered or malformed detections are counted and skipped.
    pub fn ingest<I>(&mut self, detections: I) -> Result<IngestStats, Error>
    where
        I: IntoIterator<Item = Detection>,
    {
        let mut stats = IngestStats::default();

        for detection in detections {
            if let Err(reason) = self.filter.check_detection(&detection) {
                log::debug!("Rejected face in {}: {}", detection.image_id, reason);
                stats.rejected += 1;
                continue;
            }

            let image_id = detection.image_id.clone();
            match self.catalog.add_face(detection, self.dimension) {
                Ok(face) => {
                    log::debug!("Recorded face {} from {}", face, image_id);
                    stats.accepted += 1;
                }
                Err(e) => {
                    log::warn!("Skipping face in {}: {}", image_id, e);
                    stats.invalid += 1;
                }
            }
        }

        stats.clustering = self.cluster_pending()?;
        log::info!(
            "Ingested {} faces ({} rejected, {} invalid)",
            stats.accepted,
            stats.rejected,
            stats.invalid
        );
        Ok(stats)
    }

    /// Assign every unassigned face, oldest first.
    ///
    /// A face that fails is logged and skipped; only an unavailable store
    /// aborts the pass.
    pub fn cluster_pending(&mut self) -> Result<ClusterStats, Error> {
        let mut stats = ClusterStats::default();

        for face in self.catalog.pending_faces() {
            stats.faces_processed += 1;
            match self.cluster_face(face) {
                Ok(assignment) if assignment.created => stats.new_persons_created += 1,
                Ok(_) => stats.matched_to_existing += 1,
                Err(e) if e.is_store_unavailable() => return Err(e),
                Err(e) => {
                    log::warn!("Skipping face {}: {}", face, e);
                    stats.skipped += 1;
                }
            }
        }

        log::info!(
            "Clustered {} faces: {} matched, {} new persons, {} skipped",
            stats.faces_processed,
            stats.matched_to_existing,
            stats.new_persons_created,
            stats.skipped
        );
        Ok(stats)
    }

    fn cluster_face(&mut self, face: FaceId) -> Result<Assignment, Error> {
        let record = self.catalog.face(face)?;
        let embedding = record.embedding.clone();
        let quality = record.quality;

        let assignment = self.matcher.assign(&mut self.index, embedding)?;
        if assignment.created {
            self.catalog.insert_person(assignment.person)?;
        }
        self.catalog.assign_face(face, assignment.person)?;
        representative::consider(&mut self.catalog, assignment.person, face, quality)?;

        Ok(assignment)
    }

    /// Throw away every person and cluster all faces from scratch
    pub fn recluster_all(&mut self) -> Result<ClusterStats, Error> {
        log::info!("Reclustering {} faces", self.catalog.face_count());
        self.catalog.reset_persons();
        self.rebuild_index()?;
        self.cluster_pending()
    }

    /// Fold `source` into `target` and delete `source`.
    ///
    /// The target keeps its name; an unnamed target adopts the source's.
    /// If a step fails after faces were moved, the empty source person is
    /// left behind and [`Clusterer::prune_empty_persons`] removes it.
    pub fn merge(&mut self, source: PersonId, target: PersonId) -> Result<(), Error> {
        if source == target {
            return Err(Error::SamePerson(source));
        }
        let source_name = self.catalog.person(source)?.name.clone();
        let target_named = self.catalog.person(target)?.is_labeled();

        let faces: Vec<FaceId> = self.catalog.faces_of(source).map(|f| f.id).collect();
        for face in &faces {
            self.catalog.assign_face(*face, target)?;
        }
        self.index.absorb(source, target)?;

        if !target_named && source_name.is_some() {
            self.catalog.rename_person(target, source_name)?;
        }
        representative::reelect(&mut self.catalog, target)?;
        self.catalog.remove_person(source)?;
        self.catalog.touch_person(target)?;

        log::info!("Merged person {} into {} ({} faces)", source, target, faces.len());
        Ok(())
    }

    /// Delete a person; its faces go back to pending. Returns how many.
    pub fn delete_person(&mut self, person: PersonId) -> Result<usize, Error> {
        self.catalog.person(person)?;

        let faces: Vec<FaceId> = self.catalog.faces_of(person).map(|f| f.id).collect();
        for face in &faces {
            self.catalog.unassign_face(*face)?;
        }
        self.catalog.remove_person(person)?;
        self.forget(person)?;

        log::info!("Deleted person {} ({} faces unassigned)", person, faces.len());
        Ok(faces.len())
    }

    pub fn rename(&mut self, person: PersonId, name: Option<String>) -> Result<(), Error> {
        self.catalog.rename_person(person, name)?;
        Ok(())
    }

    /// Destroy all faces detected in an image
    pub fn remove_image(&mut self, image_id: &str) -> Result<PruneStats, Error> {
        let faces = self.catalog.faces_of_image(image_id);
        if faces.is_empty() {
            log::debug!("No faces recorded for image {}", image_id);
        }
        self.remove_faces(&faces)
    }

    /// Remove stored faces that the current filter rejects
    pub fn prune(&mut self) -> Result<PruneStats, Error> {
        let faces: Vec<FaceId> = self
            .catalog
            .faces()
            .filter_map(|face| match self.filter.check_face(face) {
                Ok(()) => None,
                Err(reason) => {
                    log::debug!("Pruning face {}: {}", face.id, reason);
                    Some(face.id)
                }
            })
            .collect();

        let stats = self.remove_faces(&faces)?;
        log::info!(
            "Pruned {} faces, {} persons emptied",
            stats.faces_removed,
            stats.persons_removed
        );
        Ok(stats)
    }

    fn remove_faces(&mut self, faces: &[FaceId]) -> Result<PruneStats, Error> {
        let mut stats = PruneStats::default();
        let mut touched = BTreeSet::new();

        for face in faces {
            if let Some(person) = self.catalog.face(*face)?.person() {
                touched.insert(person);
            }
            self.catalog.remove_face(*face)?;
            stats.faces_removed += 1;
        }

        for person in touched {
            if self.catalog.faces_of(person).next().is_none() {
                self.catalog.remove_person(person)?;
                stats.persons_removed += 1;
            } else if self.catalog.person(person)?.representative.is_none() {
                representative::reelect(&mut self.catalog, person)?;
            }
        }

        // Embeddings are indexed per person, not per face
        self.rebuild_index()?;
        Ok(stats)
    }

    /// Delete persons left without faces. Returns how many.
    pub fn prune_empty_persons(&mut self) -> Result<usize, Error> {
        let empty = self.catalog.empty_persons();
        for person in &empty {
            self.catalog.remove_person(*person)?;
            self.forget(*person)?;
        }
        Ok(empty.len())
    }

    /// Merge persons whose representative faces are closer than `threshold`.
    ///
    /// Earlier persons absorb later ones, except that an unnamed person is
    /// always folded into a named one. Persons with different names are
    /// never merged. Returns the number of merges.
    pub fn merge_duplicates(&mut self, threshold: f32) -> Result<usize, Error> {
        let candidates: Vec<_> = self
            .catalog
            .persons()
            .filter_map(|person| {
                let face = person
                    .representative
                    .and_then(|id| self.catalog.face(id).ok())
                    .or_else(|| self.catalog.faces_of(person.id).next())?;
                Some((person.id, person.name.clone(), face.embedding.clone()))
            })
            .collect();

        let mut absorbed = HashSet::new();
        let mut merges = 0;

        for (i, (first, first_name, embedding)) in candidates.iter().enumerate() {
            if absorbed.contains(first) {
                continue;
            }
            let mut target = *first;
            let mut target_name = first_name.clone();

            for (other, other_name, other_embedding) in &candidates[i + 1..] {
                if absorbed.contains(other) {
                    continue;
                }
                let similarity = cosine_similarity(embedding, other_embedding);
                if similarity <= threshold {
                    continue;
                }
                if let (Some(a), Some(b)) = (&target_name, other_name) {
                    if a != b {
                        log::debug!("Not merging {} and {}: names differ", target, other);
                        continue;
                    }
                }

                let source = if target_name.is_none() && other_name.is_some() {
                    let source = target;
                    target = *other;
                    target_name = other_name.clone();
                    source
                } else {
                    *other
                };

                log::debug!("Duplicate persons {} -> {} (similarity {:.3})", source, target, similarity);
                self.merge(source, target)?;
                absorbed.insert(source);
                merges += 1;
            }
        }

        log::info!("Merged {} duplicate persons", merges);
        Ok(merges)
    }

    fn rebuild_index(&mut self) -> Result<(), Error> {
        self.index
            .rebuild(self.catalog.embeddings_by_person(), self.catalog.next_person_id())?;
        Ok(())
    }

    /// Drop a person from the index; one it never held is fine
    fn forget(&mut self, person: PersonId) -> Result<(), Error> {
        match self.index.remove_person(person) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::detection;
    use crate::embed::Embedding;
    use crate::store::StoreError;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Debug, Clone, Copy)]
    enum Fault {
        Unavailable,
        Missing,
    }

    /// In-memory index that fails chosen appends, counted from zero
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryEmbeddingStore,
        faults: HashMap<usize, Fault>,
        appends: usize,
    }

    impl FaultyStore {
        fn failing(call: usize, fault: Fault) -> Self {
            let mut store = Self::default();
            store.faults.insert(call, fault);
            store
        }
    }

    impl EmbeddingStore for FaultyStore {
        fn create_person(&mut self) -> Result<PersonId, StoreError> {
            self.inner.create_person()
        }

        fn embeddings_for(&self, person: PersonId) -> Result<&[Embedding], StoreError> {
            self.inner.embeddings_for(person)
        }

        fn append(&mut self, person: PersonId, embedding: Embedding) -> Result<(), StoreError> {
            let call = self.appends;
            self.appends += 1;
            match self.faults.get(&call) {
                Some(Fault::Unavailable) => Err(StoreError::Unavailable("disk offline".to_string())),
                Some(Fault::Missing) => Err(StoreError::PersonNotFound(person)),
                None => self.inner.append(person, embedding),
            }
        }

        fn all_persons(&self) -> Result<Box<dyn Iterator<Item = PersonId> + '_>, StoreError> {
            self.inner.all_persons()
        }

        fn absorb(&mut self, source: PersonId, target: PersonId) -> Result<(), StoreError> {
            self.inner.absorb(source, target)
        }

        fn remove_person(&mut self, person: PersonId) -> Result<Vec<Embedding>, StoreError> {
            self.inner.remove_person(person)
        }

        fn rebuild(
            &mut self,
            persons: BTreeMap<PersonId, Vec<Embedding>>,
            next_id: PersonId,
        ) -> Result<(), StoreError> {
            self.inner.rebuild(persons, next_id)
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.embedding.dimension = 3;
        config
    }

    fn clusterer() -> Clusterer {
        Clusterer::new(&config(), Catalog::new())
    }

    fn person_of<S: EmbeddingStore>(clusterer: &Clusterer<S>, face: FaceId) -> PersonId {
        clusterer.catalog().face(face).unwrap().person().unwrap()
    }

    #[test]
    fn test_first_face_starts_person() {
        let mut c = clusterer();

        let stats = c.ingest([detection("img1", &[1.0, 0.0, 0.0], 0.9)]).unwrap();

        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.clustering.new_persons_created, 1);
        let p1 = person_of(&c, FaceId(1));
        assert_eq!(c.index().embeddings_for(p1).unwrap().len(), 1);
        assert_eq!(c.catalog().person(p1).unwrap().representative, Some(FaceId(1)));
    }

    #[test]
    fn test_similar_face_joins_and_distant_face_splits() {
        let mut c = clusterer();

        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.9),
            detection("img2", &[0.99, 0.01, 0.0], 0.8),
            detection("img3", &[0.0, 1.0, 0.0], 0.9),
        ])
        .unwrap();

        let p1 = person_of(&c, FaceId(1));
        assert_eq!(person_of(&c, FaceId(2)), p1);
        assert_ne!(person_of(&c, FaceId(3)), p1);
        assert_eq!(c.index().embeddings_for(p1).unwrap().len(), 2);
        assert_eq!(c.catalog().person_count(), 2);
    }

    #[test]
    fn test_ingest_filters_and_validates() {
        let mut c = clusterer();

        let stats = c
            .ingest([
                detection("img1", &[1.0, 0.0, 0.0], 0.2),
                detection("img2", &[1.0, 0.0], 0.9),
                detection("img3", &[1.0, 0.0, 0.0], 0.9),
            ])
            .unwrap();

        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(c.catalog().face_count(), 1);
    }

    #[test]
    fn test_better_face_takes_over_thumbnail() {
        let mut c = clusterer();

        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.7),
            detection("img2", &[0.99, 0.01, 0.0], 0.9),
            detection("img3", &[0.98, 0.02, 0.0], 0.8),
        ])
        .unwrap();

        let p1 = person_of(&c, FaceId(1));
        assert_eq!(c.catalog().person(p1).unwrap().representative, Some(FaceId(2)));
    }

    #[test]
    fn test_merge_unions_embeddings_and_removes_source() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.7),
            detection("img2", &[0.0, 1.0, 0.0], 0.9),
        ])
        .unwrap();
        let p1 = person_of(&c, FaceId(1));
        let p2 = person_of(&c, FaceId(2));
        c.rename(p2, Some("Ada".to_string())).unwrap();

        c.merge(p2, p1).unwrap();

        assert_eq!(c.index().embeddings_for(p1).unwrap().len(), 2);
        assert!(!c.index().all_persons().unwrap().any(|p| p == p2));
        assert!(c.catalog().person(p2).is_err());
        assert_eq!(person_of(&c, FaceId(2)), p1);

        let target = c.catalog().person(p1).unwrap();
        assert_eq!(target.name.as_deref(), Some("Ada"));
        assert_eq!(target.representative, Some(FaceId(2)));
        assert!(c.catalog().check_integrity().is_empty());
    }

    #[test]
    fn test_merge_rejects_same_or_unknown_person() {
        let mut c = clusterer();
        c.ingest([detection("img1", &[1.0, 0.0, 0.0], 0.7)]).unwrap();
        let p1 = person_of(&c, FaceId(1));

        assert!(matches!(c.merge(p1, p1), Err(Error::SamePerson(_))));
        assert!(c.merge(PersonId(99), p1).unwrap_err().is_not_found());
        assert_eq!(c.catalog().person_count(), 1);
    }

    #[test]
    fn test_merged_person_attracts_both_kinds_of_faces() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.7),
            detection("img2", &[0.0, 1.0, 0.0], 0.9),
        ])
        .unwrap();
        let p1 = person_of(&c, FaceId(1));
        c.merge(person_of(&c, FaceId(2)), p1).unwrap();

        c.ingest([detection("img3", &[0.01, 0.99, 0.0], 0.8)]).unwrap();
        assert_eq!(person_of(&c, FaceId(3)), p1);
    }

    #[test]
    fn test_delete_person_releases_faces() {
        let mut c = clusterer();
        c.ingest([detection("img1", &[1.0, 0.0, 0.0], 0.7)]).unwrap();
        let p1 = person_of(&c, FaceId(1));

        assert_eq!(c.delete_person(p1).unwrap(), 1);

        assert!(c.catalog().person(p1).is_err());
        assert_eq!(c.catalog().pending_faces(), vec![FaceId(1)]);

        let stats = c.cluster_pending().unwrap();
        assert_eq!(stats.new_persons_created, 1);
        assert_ne!(person_of(&c, FaceId(1)), p1);
    }

    #[test]
    fn test_recluster_all_rebuilds_persons() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.7),
            detection("img2", &[0.0, 1.0, 0.0], 0.9),
        ])
        .unwrap();
        c.merge(person_of(&c, FaceId(2)), person_of(&c, FaceId(1))).unwrap();
        assert_eq!(c.catalog().person_count(), 1);

        let stats = c.recluster_all().unwrap();

        assert_eq!(stats.faces_processed, 2);
        assert_eq!(stats.new_persons_created, 2);
        assert_eq!(c.catalog().person_count(), 2);
        assert!(c.catalog().check_integrity().is_empty());
    }

    #[test]
    fn test_remove_image_cleans_up_persons() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.9),
            detection("img2", &[0.99, 0.01, 0.0], 0.7),
            detection("img1", &[0.0, 1.0, 0.0], 0.8),
        ])
        .unwrap();
        let p1 = person_of(&c, FaceId(1));
        let p2 = person_of(&c, FaceId(3));

        let stats = c.remove_image("img1").unwrap();

        assert_eq!(stats, PruneStats { faces_removed: 2, persons_removed: 1 });
        assert!(c.catalog().person(p2).is_err());
        assert_eq!(c.catalog().person(p1).unwrap().representative, Some(FaceId(2)));
        assert_eq!(c.index().embeddings_for(p1).unwrap().len(), 1);
        assert!(c.catalog().check_integrity().is_empty());
    }

    #[test]
    fn test_prune_removes_faces_now_rejected() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.7),
            detection("img2", &[0.0, 1.0, 0.0], 0.95),
        ])
        .unwrap();

        let mut strict = config();
        strict.filter.min_score = 0.9;
        let mut c = Clusterer::new(&strict, c.into_catalog());

        let stats = c.prune().unwrap();
        assert_eq!(stats, PruneStats { faces_removed: 1, persons_removed: 1 });
        assert_eq!(c.catalog().face_count(), 1);
    }

    #[test]
    fn test_merge_duplicates_respects_names() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.9),
            detection("img2", &[0.0, 1.0, 0.0], 0.9),
            detection("img3", &[0.0, 0.0, 1.0], 0.9),
        ])
        .unwrap();
        let (p1, p2, p3) = (
            person_of(&c, FaceId(1)),
            person_of(&c, FaceId(2)),
            person_of(&c, FaceId(3)),
        );
        c.rename(p2, Some("Ada".to_string())).unwrap();
        c.rename(p3, Some("Grace".to_string())).unwrap();

        // Every pair clears a threshold this low
        let merges = c.merge_duplicates(-0.5).unwrap();

        assert_eq!(merges, 1);
        assert!(c.catalog().person(p1).is_err());
        assert_eq!(person_of(&c, FaceId(1)), p2);
        assert_eq!(c.catalog().person(p3).unwrap().name.as_deref(), Some("Grace"));
    }

    #[test]
    fn test_merge_duplicates_leaves_distinct_persons() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.9),
            detection("img2", &[0.0, 1.0, 0.0], 0.9),
        ])
        .unwrap();

        assert_eq!(c.merge_duplicates(0.6).unwrap(), 0);
        assert_eq!(c.catalog().person_count(), 2);
    }

    #[test]
    fn test_prune_empty_persons() {
        let mut c = clusterer();
        c.ingest([detection("img1", &[1.0, 0.0, 0.0], 0.9)]).unwrap();
        let p1 = person_of(&c, FaceId(1));
        c.catalog.unassign_face(FaceId(1)).unwrap();

        assert_eq!(c.prune_empty_persons().unwrap(), 1);
        assert!(c.catalog().person(p1).is_err());
        assert!(!c.index().contains(p1));
    }

    #[test]
    fn test_unavailable_store_aborts_pass() {
        let store = FaultyStore::failing(1, Fault::Unavailable);
        let mut c = Clusterer::with_store(&config(), Catalog::new(), store).unwrap();

        let err = c
            .ingest([
                detection("img1", &[1.0, 0.0, 0.0], 0.9),
                detection("img2", &[0.0, 1.0, 0.0], 0.9),
                detection("img3", &[0.99, 0.01, 0.0], 0.9),
            ])
            .unwrap_err();

        assert!(err.is_store_unavailable());
        assert_eq!(c.catalog().face_count(), 3);
        assert_eq!(c.catalog().person_count(), 1);
        assert_eq!(c.catalog().pending_faces(), vec![FaceId(2), FaceId(3)]);
        let p1 = person_of(&c, FaceId(1));
        assert_eq!(c.catalog().person(p1).unwrap().representative, Some(FaceId(1)));
        assert!(c.catalog().check_integrity().is_empty());

        // The store is back; the next pass picks up where this one stopped
        let stats = c.cluster_pending().unwrap();
        assert_eq!(stats.faces_processed, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(person_of(&c, FaceId(3)), p1);
        assert!(c.catalog().pending_faces().is_empty());
    }

    #[test]
    fn test_missing_person_is_skipped() {
        let store = FaultyStore::failing(1, Fault::Missing);
        let mut c = Clusterer::with_store(&config(), Catalog::new(), store).unwrap();

        let stats = c
            .ingest([
                detection("img1", &[1.0, 0.0, 0.0], 0.9),
                detection("img2", &[0.0, 1.0, 0.0], 0.9),
                detection("img3", &[0.99, 0.01, 0.0], 0.9),
            ])
            .unwrap();

        assert_eq!(
            stats.clustering,
            ClusterStats {
                faces_processed: 3,
                matched_to_existing: 1,
                new_persons_created: 1,
                skipped: 1,
            }
        );
        assert_eq!(c.catalog().pending_faces(), vec![FaceId(2)]);
        assert_eq!(person_of(&c, FaceId(3)), person_of(&c, FaceId(1)));
        assert_eq!(c.catalog().person_count(), 1);
        assert!(c.catalog().check_integrity().is_empty());
    }

    #[test]
    fn test_with_store_loads_existing_catalog() {
        let mut c = clusterer();
        c.ingest([
            detection("img1", &[1.0, 0.0, 0.0], 0.9),
            detection("img2", &[0.0, 1.0, 0.0], 0.9),
        ])
        .unwrap();
        let p1 = person_of(&c, FaceId(1));

        let mut reopened =
            Clusterer::with_store(&config(), c.into_catalog(), FaultyStore::default()).unwrap();

        assert_eq!(reopened.index().embeddings_for(p1).unwrap().len(), 1);
        reopened.ingest([detection("img3", &[0.98, 0.02, 0.0], 0.9)]).unwrap();
        assert_eq!(person_of(&reopened, FaceId(3)), p1);
    }
}
