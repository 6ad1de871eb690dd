//! Choice of each person's thumbnail face.

use crate::catalog::Catalog;
use crate::model::{FaceId, PersonId};
use crate::store::StoreError;

/// Offer a newly assigned face as the person's representative.
///
/// The face replaces the current representative only if the person has
/// none, or if `quality` strictly exceeds the stored quality of the current
/// one. Returns whether the representative changed; repeating a call with
/// the same arguments never changes anything the second time.
pub fn consider(
    catalog: &mut Catalog,
    person: PersonId,
    face: FaceId,
    quality: f32,
) -> Result<bool, StoreError> {
    let current = catalog.person(person)?.representative;
    if catalog.face(face)?.person() != Some(person) {
        return Err(StoreError::Unassigned { face, person });
    }

    let replace = match current {
        None => true,
        Some(current) if current == face => false,
        Some(current) => match catalog.face(current) {
            Ok(record) if record.person() == Some(person) => quality > record.quality,
            // Stale reference; the new face wins outright
            _ => true,
        },
    };

    if replace {
        log::debug!(
            "Person {} representative: {:?} -> {} (quality {:.3})",
            person,
            current,
            face,
            quality
        );
        catalog.set_representative(person, Some(face))?;
    }
    Ok(replace)
}

/// Pick the highest-quality face of a person from scratch.
///
/// Ties go to the oldest face. A person without faces ends up with no
/// representative.
pub fn reelect(catalog: &mut Catalog, person: PersonId) -> Result<Option<FaceId>, StoreError> {
    catalog.person(person)?;

    let best = catalog
        .faces_of(person)
        .fold(None, |best: Option<(FaceId, f32)>, face| match best {
            Some((_, q)) if q >= face.quality => best,
            _ => Some((face.id, face.quality)),
        })
        .map(|(id, _)| id);

    catalog.set_representative(person, best)?;
    Ok(best)
}
