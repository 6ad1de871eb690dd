use crate::embed::Embedding;
use crate::model::PersonId;

/// Best matching person for a query embedding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub person: PersonId,
    pub similarity: f32,
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
/// Zero-length vectors are similar to nothing.
///
/// Accumulates in f64 so any finite f32 input yields a finite result.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.as_array().iter().zip(b.as_array().iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0) as f32
}

/// Score of a person: its closest face, not its average.
/// Non-finite similarities count as no score.
pub fn person_score(query: &Embedding, embeddings: &[Embedding]) -> Option<f32> {
    embeddings
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .filter(|sim| sim.is_finite())
        .fold(None, |best: Option<f32>, sim| match best {
            Some(b) if b >= sim => Some(b),
            _ => Some(sim),
        })
}

/// Find the highest-scoring person, regardless of threshold.
///
/// Equal scores resolve to the smallest person id, so the result does not
/// depend on the order candidates arrive in.
pub fn find_best_match<'a, I>(query: &Embedding, candidates: I) -> Option<MatchResult>
where
    I: IntoIterator<Item = (PersonId, &'a [Embedding])>,
{
    let mut best: Option<MatchResult> = None;

    for (person, embeddings) in candidates {
        let Some(similarity) = person_score(query, embeddings) else {
            continue;
        };

        let better = match best {
            None => true,
            Some(current) => {
                similarity > current.similarity
                    || (similarity == current.similarity && person < current.person)
            }
        };
        if better {
            best = Some(MatchResult { person, similarity });
        }
    }

    best
}
