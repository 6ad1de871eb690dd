//! On-disk persistence of a catalog.
//!
//! Layout:
//! ```text
//! <library>/catalog.toml          persons, face metadata, id counters
//! <library>/embeddings/<id>.bin   bincode Vec<f32> per face
//! ```

use crate::catalog::Catalog;
use crate::embed::{EmbedError, Embedding};
use crate::model::{BoundingBox, Face, FaceId, Person, PersonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid embedding for face {face}: {source}")]
    Embedding {
        face: FaceId,
        #[source]
        source: EmbedError,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    next_face_id: u64,
    next_person_id: u64,
    #[serde(default)]
    persons: Vec<Person>,
    #[serde(default)]
    faces: Vec<FaceEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FaceEntry {
    id: FaceId,
    image_id: String,
    quality: f32,
    #[serde(default)]
    person: Option<PersonId>,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
    created_at: DateTime<Utc>,
    bbox: BoundingBox,
}

impl From<&Face> for FaceEntry {
    fn from(face: &Face) -> Self {
        Self {
            id: face.id,
            image_id: face.image_id.clone(),
            quality: face.quality,
            person: face.person(),
            image_width: face.image_size.map(|s| s.0),
            image_height: face.image_size.map(|s| s.1),
            created_at: face.created_at,
            bbox: face.bbox,
        }
    }
}

pub struct Library {
    base_path: PathBuf,
    dimension: usize,
}

impl Library {
    /// Open a library directory holding embeddings of the given dimension
    pub fn new<P: AsRef<Path>>(base_path: P, dimension: usize) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            dimension,
        }
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn catalog_path(&self) -> PathBuf {
        self.base_path.join("catalog.toml")
    }

    fn embeddings_dir(&self) -> PathBuf {
        self.base_path.join("embeddings")
    }

    fn embedding_path(&self, face: FaceId) -> PathBuf {
        self.embeddings_dir().join(format!("{}.bin", face))
    }

    /// Load the catalog; a library that was never saved is empty
    pub fn load(&self) -> Result<Catalog, LibraryError> {
        let catalog_path = self.catalog_path();
        if !catalog_path.exists() {
            log::debug!("No catalog at {}, starting empty", catalog_path.display());
            return Ok(Catalog::new());
        }

        let contents = fs::read_to_string(&catalog_path)?;
        let file: CatalogFile =
            toml::from_str(&contents).map_err(|e| LibraryError::Serialization(e.to_string()))?;

        let mut catalog = Catalog::new();
        for person in file.persons {
            catalog.restore_person(person);
        }
        for entry in file.faces {
            let embedding = self.load_embedding(entry.id)?;
            catalog.insert_face(Face {
                id: entry.id,
                image_id: entry.image_id,
                bbox: entry.bbox,
                embedding,
                quality: entry.quality,
                image_size: entry.image_width.zip(entry.image_height),
                person: entry.person,
                created_at: entry.created_at,
            });
        }
        catalog.set_counters(file.next_face_id, file.next_person_id);

        for issue in catalog.check_integrity() {
            log::warn!("Library {}: {}", self.base_path.display(), issue);
        }
        log::debug!(
            "Loaded {} faces and {} persons from {}",
            catalog.face_count(),
            catalog.person_count(),
            self.base_path.display()
        );
        Ok(catalog)
    }

    fn load_embedding(&self, face: FaceId) -> Result<Embedding, LibraryError> {
        let data = fs::read(self.embedding_path(face))?;
        let values: Vec<f32> =
            bincode::deserialize(&data).map_err(|e| LibraryError::Serialization(e.to_string()))?;
        Embedding::new(values, self.dimension).map_err(|source| LibraryError::Embedding { face, source })
    }

    /// Write the catalog back to disk.
    ///
    /// An embedding file is rewritten unless it already holds exactly the
    /// face's vector, so leftovers of an interrupted save under a reissued
    /// face id never survive. Files of faces no longer in the catalog are
    /// deleted.
    pub fn save(&self, catalog: &Catalog) -> Result<(), LibraryError> {
        create_private_dir(&self.base_path)?;
        create_private_dir(&self.embeddings_dir())?;

        let mut live = HashSet::new();
        for face in catalog.faces() {
            live.insert(format!("{}.bin", face.id));
            let data = bincode::serialize(&face.embedding.to_vec())
                .map_err(|e| LibraryError::Serialization(e.to_string()))?;
            let path = self.embedding_path(face.id);
            if fs::read(&path).map_or(false, |existing| existing == data) {
                continue;
            }
            replace_private(&path, &data)?;
        }

        let file = CatalogFile {
            next_face_id: catalog.next_face_id().0,
            next_person_id: catalog.next_person_id().0,
            persons: catalog.persons().cloned().collect(),
            faces: catalog.faces().map(FaceEntry::from).collect(),
        };
        let contents =
            toml::to_string_pretty(&file).map_err(|e| LibraryError::Serialization(e.to_string()))?;

        // Replace the catalog atomically so a crash never leaves half a file
        replace_private(&self.catalog_path(), contents.as_bytes())?;

        for entry in fs::read_dir(self.embeddings_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let stale = name.ends_with(".tmp") || (name.ends_with(".bin") && !live.contains(&name));
            if stale {
                log::debug!("Removing stale embedding {}", name);
                fs::remove_file(entry.path())?;
            }
        }

        log::debug!(
            "Saved {} faces and {} persons to {}",
            catalog.face_count(),
            catalog.person_count(),
            self.base_path.display()
        );
        Ok(())
    }
}

fn create_private_dir(path: &Path) -> Result<(), std::io::Error> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    // Set permissions to 700 (owner only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn write_private(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    fs::write(path, data)?;
    // Set permissions to 600 (owner read/write only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Write to a sibling temporary file, then rename over `path`
fn replace_private(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    write_private(&tmp, data)?;
    fs::rename(&tmp, path)
}
