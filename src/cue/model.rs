/// One time-coded subtitle block.
///
/// `id` is the numeric form used for ordering and lookup; `id_text` preserves
/// the original printable id as it appeared in the source (they usually
/// coincide, but nothing requires the source file to zero-pad or order ids
/// contiguously once blocks have been filtered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub id: u64,
    pub id_text: String,
    pub timestamp: String,
    pub text: String,
}

impl Cue {
    pub fn new(id: u64, id_text: impl Into<String>, timestamp: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            id_text: id_text.into(),
            timestamp: timestamp.into(),
            text: text.into(),
        }
    }
}
