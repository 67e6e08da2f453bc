//! Low-level containers shared by the IR and token store: a block-chained
//! arena, a content-deduplicating string pool built on top of it, a
//! swap-remove packed array, and an open-addressed hash table.

mod arena;
mod hash;
mod packed;
mod strpool;

pub use arena::{Arena, ArenaError, ArenaId};
pub use hash::{fnv1a64, HashTable};
pub use packed::PackedArray;
pub use strpool::{StrId, StringPool};
