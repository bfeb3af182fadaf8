use crate::document::{DocumentSnapshot, RankedDocument};

/// Cosine similarity in `[-1, 1]`.
///
/// Returns `None` when the vectors differ in length or either has zero norm, since the
/// measure is undefined there.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
	if a.len() != b.len() || a.is_empty() {
		return None;
	}

	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (*x as f64, *y as f64);

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return None;
	}

	let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());

	if !similarity.is_finite() {
		return None;
	}

	Some(similarity.clamp(-1.0, 1.0) as f32)
}

/// Ranks a snapshot against a query embedding.
///
/// Keeps documents with `similarity >= threshold`, orders them by descending similarity,
/// and truncates to `top_k`. The sort is stable, so equal scores keep snapshot order.
pub fn rank(
	query_embedding: &[f32],
	snapshot: &DocumentSnapshot,
	top_k: usize,
	threshold: f32,
) -> Vec<RankedDocument> {
	if top_k == 0 || snapshot.is_empty() {
		return Vec::new();
	}

	let mut scored: Vec<(usize, f32)> = Vec::new();

	for (position, document) in snapshot.documents().iter().enumerate() {
		if document.embedding.len() != query_embedding.len() {
			tracing::warn!(
				document_id = %document.id,
				expected = query_embedding.len(),
				actual = document.embedding.len(),
				"Skipping document with mismatched embedding dimension."
			);

			continue;
		}

		let Some(similarity) = cosine_similarity(query_embedding, &document.embedding) else {
			tracing::debug!(
				document_id = %document.id,
				"Skipping document with an undefined similarity."
			);

			continue;
		};

		if similarity >= threshold {
			scored.push((position, similarity));
		}
	}

	scored.sort_by(|left, right| right.1.total_cmp(&left.1));
	scored.truncate(top_k);

	scored
		.into_iter()
		.map(|(position, similarity)| {
			RankedDocument::from_cached(&snapshot.documents()[position], similarity)
		})
		.collect()
}
