//! # Otter VM Inline Caches
//!
//! Property-access inline cache dispatch: the entry points a call site
//! enters when its cached handler misses, the dictionary-mode fast paths,
//! and the generic runtime that completes every access the caches cannot.
//!
//! ## Design Principles
//!
//! - **Fast path or escalate**: a fast path either finishes the access or
//!   hands it to the runtime fallback, never retries itself
//! - **Monotonic feedback**: call sites only move towards less specialization
//! - **No locks across user code**: getters, setters and proxy traps run after
//!   every object lock is released
//! - **Barriers on every store**: heap writes are reported to the collector

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod accessor;
pub mod config;
pub mod context;
pub mod dictionary;
pub mod error;
pub mod fast_path;
pub mod function;
pub mod gc;
pub mod handler;
pub mod ic;
pub mod keyed_store_generic;
pub mod object;
pub mod property;
pub mod runtime;
pub mod shape;
pub mod site;
pub mod string;
pub mod value;

pub use accessor::AccessorPair;
pub use config::{ConfigError, IcConfig};
pub use context::VmContext;
pub use dictionary::{DictionaryLookup, EntryIndex, PropertyDictionary};
pub use error::{VmError, VmResult};
pub use fast_path::{DictionaryLoad, DictionaryStore, load_from_dictionary, store_to_dictionary};
pub use function::JsFunction;
pub use gc::GcRef;
pub use ic::{IcDispatcher, LoadGlobalWithVector, LoadWithVector, StoreWithVector};
pub use keyed_store_generic::KeyedStoreGeneric;
pub use object::{JsObject, ProxyTraps, proto_epoch};
pub use property::{PropertyAttributes, PropertyDetails, PropertyKey, PropertyKind};
pub use runtime::{GenericRuntime, RuntimeFallback};
pub use shape::Shape;
pub use site::{GlobalLoadSite, KeyedLoadSite, KeyedStoreSite, LoadSite, StoreSite};
pub use string::JsString;
pub use value::Value;

pub use otter_vm_feedback::{
    FeedbackSlot, FeedbackSlotKind, FeedbackVector, Handler, InlineCacheState, LanguageMode, ShapeId,
};
