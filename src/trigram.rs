use smallvec::SmallVec;

/// A 3-byte index key. A file can only contain a literal if its posting
/// list carries the file for every trigram of that literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Trigram(pub [u8; 3]);

impl Trigram {
    #[inline]
    pub fn bytes(self) -> [u8; 3] {
        self.0
    }
}

/// Distinct trigrams of a literal, in first-occurrence order. Literals
/// shorter than 3 bytes have none and cannot participate in prefiltering.
pub fn trigrams_of(literal: &[u8]) -> SmallVec<[Trigram; 8]> {
    let mut out: SmallVec<[Trigram; 8]> = SmallVec::new();
    for window in literal.windows(3) {
        let tri = Trigram([window[0], window[1], window[2]]);
        if !out.contains(&tri) {
            out.push(tri);
        }
    }
    out
}
