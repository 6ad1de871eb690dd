//! System of record for face and person records.
//!
//! The catalog enforces the record invariants: a face only ever references
//! an existing person, and a person's representative is always one of its
//! own faces.

use crate::embed::{EmbedError, Embedding};
use crate::model::{Detection, Face, FaceId, Person, PersonId};
use crate::store::StoreError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;

/// Invariant violation found by [`Catalog::check_integrity`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// Face references a person that does not exist
    DanglingPerson { face: FaceId, person: PersonId },
    /// Representative face does not exist
    MissingRepresentative { person: PersonId, face: FaceId },
    /// Representative face belongs to someone else
    ForeignRepresentative { person: PersonId, face: FaceId },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::DanglingPerson { face, person } => {
                write!(f, "face {} references missing person {}", face, person)
            }
            IntegrityIssue::MissingRepresentative { person, face } => {
                write!(f, "person {} has missing representative face {}", person, face)
            }
            IntegrityIssue::ForeignRepresentative { person, face } => {
                write!(f, "person {} has representative face {} owned by another person", person, face)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    faces: BTreeMap<FaceId, Face>,
    persons: BTreeMap<PersonId, Person>,
    next_face_id: u64,
    next_person_id: u64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            faces: BTreeMap::new(),
            persons: BTreeMap::new(),
            next_face_id: 1,
            next_person_id: 1,
        }
    }

    /// Id the next added face will receive
    pub fn next_face_id(&self) -> FaceId {
        FaceId(self.next_face_id)
    }

    /// Lowest person id not yet handed out
    pub fn next_person_id(&self) -> PersonId {
        PersonId(self.next_person_id)
    }

    pub(crate) fn set_counters(&mut self, next_face_id: u64, next_person_id: u64) {
        self.next_face_id = self.next_face_id.max(next_face_id);
        self.next_person_id = self.next_person_id.max(next_person_id);
    }

    /// Validate a detection and record it as a new, unassigned face
    pub fn add_face(&mut self, detection: Detection, dimension: usize) -> Result<FaceId, EmbedError> {
        let embedding = Embedding::new(detection.embedding, dimension)?;
        let id = FaceId(self.next_face_id);

        let image_size = match (detection.image_width, detection.image_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        };
        self.insert_face(Face {
            id,
            image_id: detection.image_id,
            bbox: detection.bbox,
            embedding,
            quality: detection.score,
            image_size,
            person: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    /// Insert a fully formed face record (used when loading)
    pub(crate) fn insert_face(&mut self, face: Face) {
        self.next_face_id = self.next_face_id.max(face.id.0 + 1);
        self.faces.insert(face.id, face);
    }

    pub fn face(&self, id: FaceId) -> Result<&Face, StoreError> {
        self.faces.get(&id).ok_or(StoreError::FaceNotFound(id))
    }

    pub fn person(&self, id: PersonId) -> Result<&Person, StoreError> {
        self.persons.get(&id).ok_or(StoreError::PersonNotFound(id))
    }


    /// All faces, ascending by id
    pub fn faces(&self) -> impl Iterator<Item = &Face> + '_ {
        self.faces.values()
    }

    /// All persons, ascending by id
    pub fn persons(&self) -> impl Iterator<Item = &Person> + '_ {
        self.persons.values()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn person_count(&self) -> usize {
        self.persons.len()
    }

    /// Faces assigned to a person, ascending by id
    pub fn faces_of(&self, person: PersonId) -> impl Iterator<Item = &Face> + '_ {
        self.faces
            .values()
            .filter(move |face| face.person == Some(person))
    }

    /// Faces not yet assigned to any person
    pub fn pending_faces(&self) -> Vec<FaceId> {
        self.faces
            .values()
            .filter(|face| face.person.is_none())
            .map(|face| face.id)
            .collect()
    }

    pub fn faces_of_image(&self, image_id: &str) -> Vec<FaceId> {
        self.faces
            .values()
            .filter(|face| face.image_id == image_id)
            .map(|face| face.id)
            .collect()
    }

    /// Embeddings of every person's faces, in face order. Persons without
    /// faces map to an empty list.
    pub fn embeddings_by_person(&self) -> BTreeMap<PersonId, Vec<Embedding>> {
        let mut index: BTreeMap<PersonId, Vec<Embedding>> =
            self.persons.keys().map(|id| (*id, Vec::new())).collect();
        for face in self.faces.values() {
            if let Some(person) = face.person {
                index.entry(person).or_default().push(face.embedding.clone());
            }
        }
        index
    }

    /// Persons that own no faces
    pub fn empty_persons(&self) -> Vec<PersonId> {
        self.persons
            .keys()
            .copied()
            .filter(|id| self.faces_of(*id).next().is_none())
            .collect()
    }

    /// Create an unlabeled person under an id allocated by the embedding store
    pub fn insert_person(&mut self, id: PersonId) -> Result<(), StoreError> {
        if self.persons.contains_key(&id) {
            return Err(StoreError::DuplicatePerson(id));
        }
        self.persons.insert(id, Person::new(id));
        self.next_person_id = self.next_person_id.max(id.0 + 1);
        Ok(())
    }

    /// Insert a fully formed person record (used when loading)
    pub(crate) fn restore_person(&mut self, person: Person) {
        self.next_person_id = self.next_person_id.max(person.id.0 + 1);
        self.persons.insert(person.id, person);
    }

    pub fn assign_face(&mut self, face: FaceId, person: PersonId) -> Result<(), StoreError> {
        let record = self
            .persons
            .get_mut(&person)
            .ok_or(StoreError::PersonNotFound(person))?;
        let target = self.faces.get_mut(&face).ok_or(StoreError::FaceNotFound(face))?;

        target.person = Some(person);
        record.touch();
        Ok(())
    }

    /// Detach a face from its person, clearing the representative if it was one
    pub fn unassign_face(&mut self, face: FaceId) -> Result<Option<PersonId>, StoreError> {
        let target = self.faces.get_mut(&face).ok_or(StoreError::FaceNotFound(face))?;
        let previous = target.person.take();

        if let Some(person) = previous.and_then(|id| self.persons.get_mut(&id)) {
            if person.representative == Some(face) {
                person.representative = None;
            }
            person.touch();
        }
        Ok(previous)
    }

    pub fn set_representative(
        &mut self,
        person: PersonId,
        face: Option<FaceId>,
    ) -> Result<(), StoreError> {
        if let Some(face) = face {
            let owner = self.face(face)?.person;
            if owner != Some(person) {
                return Err(StoreError::Unassigned { face, person });
            }
        }

        let record = self
            .persons
            .get_mut(&person)
            .ok_or(StoreError::PersonNotFound(person))?;
        if record.representative != face {
            record.representative = face;
            record.touch();
        }
        Ok(())
    }

    /// Set or clear a person's display name. Blank names clear it.
    pub fn rename_person(&mut self, person: PersonId, name: Option<String>) -> Result<(), StoreError> {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let record = self
            .persons
            .get_mut(&person)
            .ok_or(StoreError::PersonNotFound(person))?;
        record.name = name;
        record.touch();
        Ok(())
    }

    pub(crate) fn touch_person(&mut self, person: PersonId) -> Result<(), StoreError> {
        self.persons
            .get_mut(&person)
            .ok_or(StoreError::PersonNotFound(person))?
            .touch();
        Ok(())
    }

    /// Remove a person that no longer owns any face
    pub fn remove_person(&mut self, person: PersonId) -> Result<Person, StoreError> {
        if !self.persons.contains_key(&person) {
            return Err(StoreError::PersonNotFound(person));
        }
        if self.faces_of(person).next().is_some() {
            return Err(StoreError::PersonInUse(person));
        }
        self.persons
            .remove(&person)
            .ok_or(StoreError::PersonNotFound(person))
    }

    /// Destroy a face record, detaching it from its person first
    pub fn remove_face(&mut self, face: FaceId) -> Result<Face, StoreError> {
        self.unassign_face(face)?;
        self.faces.remove(&face).ok_or(StoreError::FaceNotFound(face))
    }

    /// Drop every person and every assignment; faces stay as pending
    pub fn reset_persons(&mut self) {
        for face in self.faces.values_mut() {
            face.person = None;
        }
        self.persons.clear();
    }

    /// Report every record invariant violation
    pub fn check_integrity(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        for face in self.faces.values() {
            if let Some(person) = face.person {
                if !self.persons.contains_key(&person) {
                    issues.push(IntegrityIssue::DanglingPerson { face: face.id, person });
                }
            }
        }

        for person in self.persons.values() {
            let Some(face) = person.representative else {
                continue;
            };
            match self.faces.get(&face) {
                None => issues.push(IntegrityIssue::MissingRepresentative {
                    person: person.id,
                    face,
                }),
                Some(record) if record.person != Some(person.id) => {
                    issues.push(IntegrityIssue::ForeignRepresentative {
                        person: person.id,
                        face,
                    })
                }
                Some(_) => {}
            }
        }

        issues
    }
}
