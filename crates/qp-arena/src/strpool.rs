use crate::arena::{Arena, ArenaError, ArenaSpan};
use crate::hash::{fnv1a64, HashTable};

/// Handle to an interned string. Two [`StrId`]s compare equal iff the
/// underlying bytes are equal; the pool guarantees this by deduplicating
/// on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrId(ArenaSpan<u8>);

/// Content-deduplicating string interner. Backed by a byte [`Arena`] for
/// storage and a [`HashTable`] keyed by content hash for dedup lookups;
/// the hash table does not store key bytes itself, it re-reads them from
/// the arena when probing, so each distinct string is stored exactly once.
pub struct StringPool {
    arena: Arena<u8>,
    index: HashTable<StrId>,
}

impl StringPool {
    pub fn new(cap_bytes: usize) -> Self {
        Self {
            arena: Arena::new(cap_bytes),
            index: HashTable::new(),
        }
    }

    /// Intern `s`, returning an existing id if this exact content was
    /// already interned.
    pub fn intern(&mut self, s: &str) -> Result<StrId, ArenaError> {
        let bytes = s.as_bytes();
        let hash = fnv1a64(bytes);
        if let Some(existing) = self.index.find(hash, |id| self.resolve_span(*id) == bytes) {
            return Ok(*existing);
        }
        let span = self.arena.alloc_span(bytes.iter().copied())?;
        let id = StrId(span);
        self.index.insert(hash, id);
        Ok(id)
    }

    pub fn resolve(&self, id: StrId) -> &str {
        // Safety of this unwrap: the only bytes ever written through
        // `intern` originate from a valid `&str`.
        std::str::from_utf8(self.resolve_span(id)).expect("pool invariant: only valid utf8 interned")
    }

    fn resolve_span(&self, id: StrId) -> &[u8] {
        self.arena.get_span(id.0)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
