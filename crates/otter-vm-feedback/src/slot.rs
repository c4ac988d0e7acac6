//! Feedback slot identities and kinds

use serde::{Deserialize, Serialize};

/// Index of a slot within a function's feedback vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedbackSlot(pub u32);

impl FeedbackSlot {
    /// Slot index as usize
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FeedbackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Strict/sloppy fork threaded through every store path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageMode {
    /// Failed stores are silently ignored
    #[default]
    Sloppy,
    /// Failed stores raise a TypeError
    Strict,
}

impl LanguageMode {
    /// Is this strict mode
    #[inline]
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// The access a feedback slot was allocated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackSlotKind {
    /// `o.name`
    LoadProperty,
    /// `o[key]`
    LoadKeyed,
    /// Free variable read resolved against the global object
    LoadGlobal,
    /// `o.name = v`
    StoreNamed(LanguageMode),
    /// `o[key] = v`
    StoreKeyed(LanguageMode),
}

impl FeedbackSlotKind {
    /// Is this a load slot
    pub fn is_load(self) -> bool {
        matches!(self, Self::LoadProperty | Self::LoadKeyed | Self::LoadGlobal)
    }

    /// Is this a store slot
    pub fn is_store(self) -> bool {
        matches!(self, Self::StoreNamed(_) | Self::StoreKeyed(_))
    }

    /// Is this a keyed slot
    pub fn is_keyed(self) -> bool {
        matches!(self, Self::LoadKeyed | Self::StoreKeyed(_))
    }

    /// Language mode of a store slot
    pub fn language_mode(self) -> Option<LanguageMode> {
        match self {
            Self::StoreNamed(mode) | Self::StoreKeyed(mode) => Some(mode),
            _ => None,
        }
    }
}
