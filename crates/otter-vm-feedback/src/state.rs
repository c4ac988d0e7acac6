//! Inline cache state machine
//!
//! A call site only ever moves towards less specialization:
//!
//! ```text
//! Uninitialized -> Premonomorphic -> Monomorphic -> Polymorphic -> Megamorphic
//!        \______________\_______________\______________\______________-> Generic
//! ```
//!
//! `Generic` is reached when a receiver has no shape at all. A `Generic`
//! handler cached for a shape is still a per-shape entry.
//!
//! Handler refreshes for an already cached shape keep the rank. The only way
//! back is [`InlineCacheState::reset`], the deoptimization hook.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::handler::{Handler, ShapeId};

/// Upper bound for the configurable polymorphic capacity
pub const MAX_POLYMORPHIC_CAPACITY: usize = 8;

/// Polymorphic entries, inline up to the default capacity
pub type PolymorphicEntries = SmallVec<[(ShapeId, Handler); 4]>;

/// State of an Inline Cache (IC) for property access
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InlineCacheState {
    /// Initial state: no information cached
    #[default]
    Uninitialized,
    /// The site missed once; the next cacheable miss installs a handler
    Premonomorphic,
    /// Monomorphic state: single shape and handler cached
    Monomorphic {
        /// The shape the handler applies to
        shape: ShapeId,
        /// The cached handler
        handler: Handler,
    },
    /// Polymorphic state: a bounded list of (shape, handler) pairs, MRU first
    Polymorphic {
        /// Cached entries
        entries: PolymorphicEntries,
    },
    /// Megamorphic state: too many shapes seen, no per-shape caching
    Megamorphic,
    /// The site saw a receiver without a shape
    Generic,
}

/// What a miss observed about the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissObservation {
    /// Receiver shape, `None` for receivers without a cacheable shape
    pub shape: Option<ShapeId>,
    /// Handler computed for the receiver
    pub handler: Handler,
}

impl MissObservation {
    /// A receiver with a shape and a handler for it
    pub fn new(shape: ShapeId, handler: Handler) -> Self {
        Self {
            shape: Some(shape),
            handler,
        }
    }

    /// A receiver without a cacheable shape (proxies, primitives, ...)
    pub fn uncacheable() -> Self {
        Self {
            shape: None,
            handler: Handler::Generic,
        }
    }

    fn cacheable(&self) -> Option<(ShapeId, Handler)> {
        self.shape.map(|shape| (shape, self.handler))
    }
}

/// Outcome of feeding a miss into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcTransition {
    /// State name before the miss
    pub from: &'static str,
    /// State name after the miss
    pub to: &'static str,
    /// Rank before the miss
    pub from_rank: u8,
    /// Rank after the miss
    pub to_rank: u8,
    /// Entry installed by this miss, if any
    pub installed: Option<(ShapeId, Handler)>,
}

impl IcTransition {
    /// Did the state name change
    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}

impl InlineCacheState {
    /// Specialization rank; higher means less specialized
    pub fn rank(&self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Premonomorphic => 1,
            Self::Monomorphic { .. } => 2,
            Self::Polymorphic { .. } => 3,
            Self::Megamorphic => 4,
            Self::Generic => 5,
        }
    }

    /// Human-readable state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Premonomorphic => "premonomorphic",
            Self::Monomorphic { .. } => "monomorphic",
            Self::Polymorphic { .. } => "polymorphic",
            Self::Megamorphic => "megamorphic",
            Self::Generic => "generic",
        }
    }

    /// Has the site stopped caching per shape
    pub fn is_saturated(&self) -> bool {
        matches!(self, Self::Megamorphic | Self::Generic)
    }

    /// Handler cached for `shape`, if any
    pub fn lookup(&self, shape: ShapeId) -> Option<Handler> {
        match self {
            Self::Monomorphic { shape: cached, handler } if *cached == shape => Some(*handler),
            Self::Polymorphic { entries } => entries
                .iter()
                .find(|(cached, _)| *cached == shape)
                .map(|(_, handler)| *handler),
            _ => None,
        }
    }

    /// Move the entry for `shape` to the front of a polymorphic list
    pub fn promote(&mut self, shape: ShapeId) {
        if let Self::Polymorphic { entries } = self
            && let Some(pos) = entries.iter().position(|(cached, _)| *cached == shape)
            && pos > 0
        {
            entries.swap(0, pos);
        }
    }

    /// Feed a miss into the state machine.
    ///
    /// `capacity` bounds the polymorphic list; it is clamped to
    /// `1..=MAX_POLYMORPHIC_CAPACITY`.
    pub fn on_miss(&mut self, observation: MissObservation, capacity: usize) -> IcTransition {
        let capacity = capacity.clamp(1, MAX_POLYMORPHIC_CAPACITY);
        let from = self.name();
        let from_rank = self.rank();

        let (next, installed) = match (std::mem::take(self), observation.cacheable()) {
            (Self::Generic, _) => (Self::Generic, None),
            (_, None) => (Self::Generic, None),
            (Self::Megamorphic, Some(_)) => (Self::Megamorphic, None),
            (Self::Uninitialized, Some(_)) => (Self::Premonomorphic, None),
            (Self::Premonomorphic, Some((shape, handler))) => (
                Self::Monomorphic { shape, handler },
                Some((shape, handler)),
            ),
            (Self::Monomorphic { shape: cached, handler: old }, Some((shape, handler))) => {
                if cached == shape {
                    (Self::Monomorphic { shape, handler }, Some((shape, handler)))
                } else if capacity < 2 {
                    (Self::Megamorphic, None)
                } else {
                    let mut entries = PolymorphicEntries::new();
                    entries.push((shape, handler));
                    entries.push((cached, old));
                    (Self::Polymorphic { entries }, Some((shape, handler)))
                }
            }
            (Self::Polymorphic { mut entries }, Some((shape, handler))) => {
                if let Some(pos) = entries.iter().position(|(cached, _)| *cached == shape) {
                    entries.remove(pos);
                    entries.insert(0, (shape, handler));
                    (Self::Polymorphic { entries }, Some((shape, handler)))
                } else if entries.len() < capacity {
                    entries.insert(0, (shape, handler));
                    (Self::Polymorphic { entries }, Some((shape, handler)))
                } else {
                    (Self::Megamorphic, None)
                }
            }
        };

        *self = next;
        IcTransition {
            from,
            to: self.name(),
            from_rank,
            to_rank: self.rank(),
            installed,
        }
    }

    /// Feed a miss whose cached entries were computed under an outdated
    /// prototype epoch.
    ///
    /// Stale entries are discarded but the variant is kept, so the rank does
    /// not drop.
    pub fn on_stale_miss(&mut self, observation: MissObservation, capacity: usize) -> IcTransition {
        let Some((shape, handler)) = observation.cacheable() else {
            return self.on_miss(observation, capacity);
        };
        let from = self.name();
        let from_rank = self.rank();
        match self {
            Self::Monomorphic { .. } => {
                *self = Self::Monomorphic { shape, handler };
            }
            Self::Polymorphic { entries } => {
                entries.clear();
                entries.push((shape, handler));
            }
            _ => return self.on_miss(observation, capacity),
        }
        IcTransition {
            from,
            to: self.name(),
            from_rank,
            to_rank: self.rank(),
            installed: Some((shape, handler)),
        }
    }

    /// Give up per-shape caching (e.g. a keyed site saw a second key)
    pub fn saturate(&mut self) -> IcTransition {
        let from = self.name();
        let from_rank = self.rank();
        if !matches!(self, Self::Generic) {
            *self = Self::Megamorphic;
        }
        IcTransition {
            from,
            to: self.name(),
            from_rank,
            to_rank: self.rank(),
            installed: None,
        }
    }

    /// Drop all cached information (deoptimization)
    pub fn reset(&mut self) {
        *self = Self::Uninitialized;
    }
}
