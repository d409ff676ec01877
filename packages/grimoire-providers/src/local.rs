//! In-process character trigram embedder.
//!
//! Deterministic across processes, needs no model download, and lands near-duplicate filenames
//! close together under cosine similarity. Used for offline deployments and tests.

const BOUNDARY: char = '\u{2}';

#[derive(Debug, Clone, Copy)]
pub struct NgramEmbedder {
	dimensions: usize,
}
impl NgramEmbedder {
	pub fn new(dimensions: u32) -> Self {
		Self { dimensions: (dimensions as usize).max(1) }
	}

	pub fn dimensions(&self) -> usize {
		self.dimensions
	}

	/// Unit-length vector, or all zeros for blank input.
	pub fn embed(&self, text: &str) -> Vec<f32> {
		let mut vector = vec![0_f32; self.dimensions];
		let lowered = text.trim().to_lowercase();

		if lowered.is_empty() {
			return vector;
		}

		let mut chars = Vec::with_capacity(lowered.chars().count() + 2);

		chars.push(BOUNDARY);
		chars.extend(lowered.chars());
		chars.push(BOUNDARY);

		for window in chars.windows(3) {
			let token = window.iter().collect::<String>();
			let hash = blake3::hash(token.as_bytes());
			let bytes = hash.as_bytes();
			let bucket = u64::from_le_bytes([
				bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
			]) % self.dimensions as u64;
			let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

			vector[bucket as usize] += sign;
		}

		let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

		if magnitude > 0.0 {
			for value in &mut vector {
				*value /= magnitude;
			}
		}

		vector
	}

	pub fn embed_many(&self, texts: &[String]) -> Vec<Vec<f32>> {
		texts.iter().map(|text| self.embed(text)).collect()
	}
}
