//! Deterministic text splitting for embedding.
//!
//! Documents are reduced to overlapping chunks of a fixed target
//! length. Splitting descends through paragraph, line, and word
//! boundaries before falling back to hard character windows, so chunk
//! edges land on natural seams whenever the text allows it. The same
//! input and settings always produce the same ordered chunk sequence.

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Splits text into chunks of at most `chunk_size` characters (plus a
/// carried overlap tail), with consecutive chunks sharing
/// `chunk_overlap` characters of context.
#[derive(Clone, Debug)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Panics if `chunk_overlap >= chunk_size` or `chunk_size == 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        assert!(
            chunk_overlap < chunk_size,
            "chunk overlap must be smaller than chunk size"
        );
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into the ordered chunk sequence.
    pub fn split(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if char_len(trimmed) <= self.chunk_size {
            return vec![trimmed.to_string()];
        }
        let atoms = self.atomize(trimmed, &SEPARATORS);
        self.assemble(atoms)
    }

    /// Break text into pieces no longer than `chunk_size`, preferring
    /// coarse separators and only descending when a piece is too big.
    fn atomize(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        match separators.first() {
            Some(sep) => {
                let mut atoms = Vec::new();
                for piece in text.split_inclusive(sep) {
                    if char_len(piece) <= self.chunk_size {
                        atoms.push(piece.to_string());
                    } else {
                        atoms.extend(self.atomize(piece, &separators[1..]));
                    }
                }
                atoms
            }
            None => hard_split(text, self.chunk_size),
        }
    }

    /// Greedily pack atoms into chunks, seeding each new chunk with the
    /// overlap tail of the previous one.
    fn assemble(&self, atoms: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for atom in atoms {
            let atom_len = char_len(&atom);
            if current_len > 0 && current_len + atom_len > self.chunk_size {
                let tail = tail_chars(&current, self.chunk_overlap);
                push_chunk(&mut chunks, &current);
                current_len = char_len(&tail);
                current = tail;
            }
            current.push_str(&atom);
            current_len += atom_len;
        }
        push_chunk(&mut chunks, &current);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn tail_chars(text: &str, count: usize) -> String {
    let total = char_len(text);
    text.chars().skip(total.saturating_sub(count)).collect()
}

fn hard_split(text: &str, window: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window)
        .map(|piece| piece.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text() -> String {
        (0..40)
            .map(|i| format!("Paragraph {i} talks about topic {} in a few sentences.", i % 7))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = TextSplitter::new(500, 100);
        let chunks = splitter.split("just a short note");
        assert_eq!(chunks, vec!["just a short note".to_string()]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = TextSplitter::new(500, 100);
        assert!(splitter.split("   \n\n  ").is_empty());
    }

    #[test]
    fn splitting_is_deterministic() {
        let splitter = TextSplitter::new(200, 40);
        let text = sample_text();
        assert_eq!(splitter.split(&text), splitter.split(&text));
    }

    #[test]
    fn long_text_produces_bounded_overlapping_chunks() {
        let splitter = TextSplitter::new(200, 40);
        let chunks = splitter.split(&sample_text());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // target size plus the carried overlap tail
            assert!(chunk.chars().count() <= 200 + 40, "oversized chunk: {chunk}");
        }
        // consecutive chunks share context from the overlap window
        let tail: String = chunks[0]
            .chars()
            .skip(chunks[0].chars().count().saturating_sub(20))
            .collect();
        assert!(
            chunks[1].contains(tail.trim()),
            "second chunk should repeat the first chunk's tail"
        );
    }

    #[test]
    fn unbroken_runs_are_hard_split() {
        let splitter = TextSplitter::new(50, 10);
        let text = "x".repeat(400);
        let chunks = splitter.split(&text);
        assert!(chunks.len() >= 400 / 50);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 60));
    }

    #[test]
    #[should_panic(expected = "overlap must be smaller")]
    fn overlap_must_stay_below_size() {
        let _ = TextSplitter::new(100, 100);
    }
}
