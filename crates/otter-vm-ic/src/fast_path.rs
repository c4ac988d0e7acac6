//! Inline dictionary-mode load and store
//!
//! These are the only paths that touch dictionary storage directly from a
//! dispatcher. Both report an explicit outcome; anything other than success
//! sends the caller to the generic runtime, never back into the fast path.

use crate::accessor::call_getter_if_accessor;
use crate::context::VmContext;
use crate::dictionary::DictionaryLookup;
use crate::error::VmResult;
use crate::object::JsObject;
use crate::property::{PropertyDetails, PropertyKey};
use crate::value::Value;

/// Outcome of [`load_from_dictionary`]
#[derive(Debug, Clone)]
pub enum DictionaryLoad {
    /// The property was found; accessors already resolved
    Found(Value),
    /// The dictionary has no such key
    NotFound,
    /// The holder is not in dictionary mode
    NotDictionary,
}

/// Outcome of [`store_to_dictionary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryStore {
    /// The value slot was overwritten
    Stored,
    /// Accessor or read-only; only the generic runtime may handle it
    Disqualified(PropertyDetails),
    /// The dictionary has no such key
    NotFound,
    /// The holder is not in dictionary mode
    NotDictionary,
}

/// Look `key` up in `holder`'s dictionary and produce the loaded value.
///
/// An accessor's getter runs with `receiver` as `this` after the dictionary
/// lock is released; nothing read from the dictionary is used after it.
pub fn load_from_dictionary(
    ctx: &mut VmContext,
    receiver: &Value,
    holder: &JsObject,
    key: &PropertyKey,
) -> VmResult<DictionaryLoad> {
    let located = holder.with_dictionary(|dict| -> VmResult<Option<(PropertyDetails, Value)>> {
        match dict.lookup(key) {
            DictionaryLookup::Found(index) => Ok(Some((dict.details_at(index)?, dict.value_at(index)?))),
            DictionaryLookup::NotFound => Ok(None),
        }
    });
    let Some(located) = located else {
        return Ok(DictionaryLoad::NotDictionary);
    };
    let Some((details, value)) = located? else {
        return Ok(DictionaryLoad::NotFound);
    };
    let value = call_getter_if_accessor(ctx, details, value, receiver)?;
    Ok(DictionaryLoad::Found(value))
}

/// Overwrite `key` in `holder`'s dictionary if it is a writable data property
pub fn store_to_dictionary(holder: &JsObject, key: &PropertyKey, value: Value) -> VmResult<DictionaryStore> {
    let outcome = holder.with_dictionary_mut(|dict, barrier| -> VmResult<DictionaryStore> {
        let DictionaryLookup::Found(index) = dict.lookup(key) else {
            return Ok(DictionaryStore::NotFound);
        };
        let details = dict.details_at(index)?;
        if !details.permits_fast_store() {
            return Ok(DictionaryStore::Disqualified(details));
        }
        dict.set_value_at(index, value, barrier)?;
        Ok(DictionaryStore::Stored)
    });
    outcome.unwrap_or(Ok(DictionaryStore::NotDictionary))
}
