//! Face and person records.

use crate::embed::Embedding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identifier of a detected face. Allocated in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceId(pub u64);

/// Identifier of a clustered person. Allocated in ascending order; the
/// numerically smallest id wins similarity ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub u64);

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FaceId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(FaceId)
    }
}

impl FromStr for PersonId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(PersonId)
    }
}

/// Face bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// True when any edge lies within `margin` pixels of the image border
    pub fn touches_border(&self, image_width: u32, image_height: u32, margin: u32) -> bool {
        let margin = i64::from(margin);
        i64::from(self.left) < margin
            || i64::from(self.top) < margin
            || i64::from(self.right) > i64::from(image_width) - margin
            || i64::from(self.bottom) > i64::from(image_height) - margin
    }
}

/// Raw detector output for one face, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub image_id: String,
    pub bbox: BoundingBox,
    pub embedding: Vec<f32>,
    pub score: f32,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
}

/// One detected face instance.
///
/// Immutable apart from its person assignment.
#[derive(Debug, Clone)]
pub struct Face {
    pub id: FaceId,
    pub image_id: String,
    pub bbox: BoundingBox,
    pub embedding: Embedding,
    pub quality: f32,
    pub image_size: Option<(u32, u32)>,
    pub(crate) person: Option<PersonId>,
    pub created_at: DateTime<Utc>,
}

impl Face {
    pub fn person(&self) -> Option<PersonId> {
        self.person
    }
}

/// A clustered identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: Option<String>,
    pub representative: Option<FaceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn new(id: PersonId) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: None,
            representative: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_labeled(&self) -> bool {
        self.name.is_some()
    }

    /// Name, or a placeholder for unlabeled persons
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Person {}", self.id),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!("42".parse::<PersonId>().unwrap(), PersonId(42));
        assert_eq!(" 7 ".parse::<FaceId>().unwrap(), FaceId(7));
        assert!("P1".parse::<PersonId>().is_err());
    }

    #[test]
    fn test_touches_border() {
        let bbox = BoundingBox { top: 20, right: 80, bottom: 90, left: 30 };
        assert!(!bbox.touches_border(100, 100, 10));
        assert!(bbox.touches_border(85, 100, 10));
        assert!(bbox.touches_border(100, 100, 25));
    }

    #[test]
    fn test_display_name() {
        let mut person = Person::new(PersonId(12));
        assert_eq!(person.display_name(), "Person 12");
        assert!(!person.is_labeled());

        person.name = Some("Ada".to_string());
        assert_eq!(person.display_name(), "Ada");
    }

    #[test]
    fn test_detection_from_json() {
        let line = r#"{"image_id":"img1","bbox":{"top":1,"right":5,"bottom":6,"left":2},"embedding":[0.5,0.5],"score":0.9}"#;
        let detection: Detection = serde_json::from_str(line).unwrap();

        assert_eq!(detection.image_id, "img1");
        assert_eq!(detection.bbox.width(), 3);
        assert_eq!(detection.bbox.height(), 5);
        assert_eq!(detection.image_width, None);
    }
}
