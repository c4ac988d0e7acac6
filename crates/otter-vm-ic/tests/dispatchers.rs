//! IC dispatcher tests
//!
//! Dictionary-mode fast paths and the escalation rules of every dispatcher,
//! observed through a runtime fallback that counts what reaches it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use otter_vm_ic::{
    DictionaryStore, FeedbackSlot, FeedbackSlotKind, FeedbackVector, GcRef, GenericRuntime, IcDispatcher,
    InlineCacheState, JsFunction, JsObject, LanguageMode, LoadGlobalWithVector, LoadWithVector,
    PropertyAttributes, PropertyKey, RuntimeFallback, StoreWithVector, Value, VmContext, VmError, VmResult,
    load_from_dictionary, store_to_dictionary,
};

/// Forwards to [`GenericRuntime`], counting miss and plain entries
#[derive(Default)]
struct CountingRuntime {
    inner: GenericRuntime,
    misses: AtomicUsize,
    plain: AtomicUsize,
}

impl CountingRuntime {
    fn misses(&self) -> usize {
        self.misses.load(Ordering::SeqCst)
    }

    fn plain(&self) -> usize {
        self.plain.load(Ordering::SeqCst)
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn slow(&self) {
        self.plain.fetch_add(1, Ordering::SeqCst);
    }
}

impl RuntimeFallback for CountingRuntime {
    fn miss_load(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        name: &PropertyKey,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value> {
        self.miss();
        self.inner.miss_load(ctx, receiver, name, slot, vector)
    }

    fn miss_keyed_load(
        &self,
        ctx: &mut VmContext,
        receiver: &Value,
        key: &Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value> {
        self.miss();
        self.inner.miss_keyed_load(ctx, receiver, key, slot, vector)
    }

    fn miss_load_global(
        &self,
        ctx: &mut VmContext,
        name: &PropertyKey,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
    ) -> VmResult<Value> {
        self.miss();
        self.inner.miss_load_global(ctx, name, slot, vector)
    }

    fn slow_load_global(&self, ctx: &mut VmContext, name: &PropertyKey) -> VmResult<Value> {
        self.slow();
        self.inner.slow_load_global(ctx, name)
    }

    fn miss_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        name: &PropertyKey,
    ) -> VmResult<Value> {
        self.miss();
        self.inner.miss_store(ctx, value, slot, vector, receiver, name)
    }

    fn miss_keyed_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        key: &Value,
    ) -> VmResult<Value> {
        self.miss();
        self.inner.miss_keyed_store(ctx, value, slot, vector, receiver, key)
    }

    fn slow_keyed_store(
        &self,
        ctx: &mut VmContext,
        value: Value,
        slot: FeedbackSlot,
        vector: &FeedbackVector,
        receiver: &Value,
        key: &Value,
    ) -> VmResult<Value> {
        self.slow();
        self.inner.slow_keyed_store(ctx, value, slot, vector, receiver, key)
    }

    fn get_property(&self, ctx: &mut VmContext, receiver: &Value, name: &PropertyKey) -> VmResult<Value> {
        self.slow();
        self.inner.get_property(ctx, receiver, name)
    }

    fn keyed_get_property(&self, ctx: &mut VmContext, receiver: &Value, key: &Value) -> VmResult<Value> {
        self.slow();
        self.inner.keyed_get_property(ctx, receiver, key)
    }

    fn generic_keyed_store(
        &self,
        ctx: &mut VmContext,
        mode: LanguageMode,
        receiver: &Value,
        key: &Value,
        value: Value,
    ) -> VmResult<Value> {
        self.slow();
        self.inner.generic_keyed_store(ctx, mode, receiver, key, value)
    }
}

fn key(name: &str) -> PropertyKey {
    PropertyKey::string(name)
}

/// Getter returning 42 that counts calls and remembers its receiver
fn counting_getter(calls: Arc<AtomicUsize>, this_seen: Arc<Mutex<Option<Value>>>) -> GcRef<JsFunction> {
    JsFunction::native("get y", move |_, this, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        *this_seen.lock() = Some(this.clone());
        Ok(Value::int32(42))
    })
}

/// Setter recording every value it is called with
fn recording_setter(values: Arc<Mutex<Vec<Value>>>) -> GcRef<JsFunction> {
    JsFunction::native("set y", move |_, _, args| {
        values.lock().push(args.first().cloned().unwrap_or_default());
        Ok(Value::undefined())
    })
}

struct Scenario {
    obj: GcRef<JsObject>,
    receiver: Value,
    getter_calls: Arc<AtomicUsize>,
    getter_this: Arc<Mutex<Option<Value>>>,
    setter_values: Arc<Mutex<Vec<Value>>>,
}

/// `{ x: 10, get y() { return 42 }, set y(v) {}, z: 1 (read-only) }` in
/// dictionary mode
fn scenario(ctx: &VmContext) -> Scenario {
    let getter_calls = Arc::new(AtomicUsize::new(0));
    let getter_this = Arc::new(Mutex::new(None));
    let setter_values = Arc::new(Mutex::new(Vec::new()));

    let obj = ctx.new_object(None);
    obj.add_data_property(key("x"), Value::int32(10)).unwrap();
    obj.define_accessor(
        key("y"),
        Some(counting_getter(getter_calls.clone(), getter_this.clone())),
        Some(recording_setter(setter_values.clone())),
        PropertyAttributes::data(),
    )
    .unwrap();
    obj.define_property(key("z"), Value::int32(1), PropertyAttributes::read_only())
        .unwrap();
    obj.normalize().unwrap();
    assert!(obj.is_dictionary_mode());

    Scenario {
        receiver: Value::Object(obj.clone()),
        obj,
        getter_calls,
        getter_this,
        setter_values,
    }
}

fn own_value(obj: &JsObject, name: &str) -> Option<Value> {
    obj.get_own_property(&key(name)).map(|(value, _)| value)
}

// ============================================================================
// Dictionary fast paths
// ============================================================================

#[test]
fn test_fast_load_of_data_property_calls_nothing() {
    let mut ctx = VmContext::default();
    let s = scenario(&ctx);

    let loaded = load_from_dictionary(&mut ctx, &s.receiver, &s.obj, &key("x")).unwrap();
    assert!(matches!(loaded, otter_vm_ic::DictionaryLoad::Found(ref v) if *v == Value::int32(10)));
    assert_eq!(s.getter_calls.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.call_depth(), 0);
}

#[test]
fn test_fast_load_of_accessor_calls_getter_once_with_receiver() {
    let mut ctx = VmContext::default();
    let s = scenario(&ctx);

    let loaded = load_from_dictionary(&mut ctx, &s.receiver, &s.obj, &key("y")).unwrap();
    assert!(matches!(loaded, otter_vm_ic::DictionaryLoad::Found(ref v) if *v == Value::int32(42)));
    assert_eq!(s.getter_calls.load(Ordering::SeqCst), 1);
    assert!(s.setter_values.lock().is_empty());
    assert_eq!(s.getter_this.lock().clone(), Some(s.receiver.clone()));
}

#[test]
fn test_fast_paths_never_claim_absent_keys() {
    let mut ctx = VmContext::default();
    let s = scenario(&ctx);

    let loaded = load_from_dictionary(&mut ctx, &s.receiver, &s.obj, &key("absent")).unwrap();
    assert!(matches!(loaded, otter_vm_ic::DictionaryLoad::NotFound));
    assert_eq!(
        store_to_dictionary(&s.obj, &key("absent"), Value::int32(1)).unwrap(),
        DictionaryStore::NotFound
    );
    assert!(!s.obj.has_own(&key("absent")));
}

#[test]
fn test_fast_paths_reject_fast_mode_holders() {
    let mut ctx = VmContext::default();
    let obj = ctx.new_object(None);
    obj.add_data_property(key("x"), Value::int32(1)).unwrap();
    let receiver = Value::Object(obj.clone());

    let loaded = load_from_dictionary(&mut ctx, &receiver, &obj, &key("x")).unwrap();
    assert!(matches!(loaded, otter_vm_ic::DictionaryLoad::NotDictionary));
    assert_eq!(
        store_to_dictionary(&obj, &key("x"), Value::int32(2)).unwrap(),
        DictionaryStore::NotDictionary
    );
    assert_eq!(own_value(&obj, "x"), Some(Value::int32(1)));
}

#[test]
fn test_fast_store_touches_only_its_slot() {
    let ctx = VmContext::default();
    let obj = ctx.new_object(None);
    for i in 0..12 {
        obj.add_data_property(key(&format!("p{i}")), Value::int32(i)).unwrap();
    }
    obj.normalize().unwrap();

    let before = obj
        .with_dictionary(|dict| (dict.generation(), dict.capacity(), dict.lookup(&key("p5"))))
        .unwrap();
    assert_eq!(
        store_to_dictionary(&obj, &key("p5"), Value::int32(500)).unwrap(),
        DictionaryStore::Stored
    );
    let after = obj
        .with_dictionary(|dict| (dict.generation(), dict.capacity(), dict.lookup(&key("p5"))))
        .unwrap();

    assert_eq!(before, after);
    for i in 0..12 {
        let expected = if i == 5 { 500 } else { i };
        assert_eq!(own_value(&obj, &format!("p{i}")), Some(Value::int32(expected)));
    }
}

#[test]
fn test_fast_load_is_idempotent() {
    let mut ctx = VmContext::default();
    let s = scenario(&ctx);

    let first = load_from_dictionary(&mut ctx, &s.receiver, &s.obj, &key("x")).unwrap();
    let second = load_from_dictionary(&mut ctx, &s.receiver, &s.obj, &key("x")).unwrap();
    match (first, second) {
        (otter_vm_ic::DictionaryLoad::Found(a), otter_vm_ic::DictionaryLoad::Found(b)) => assert_eq!(a, b),
        other => panic!("unexpected loads: {other:?}"),
    }
}

#[test]
fn test_fast_store_reports_write_barrier() {
    let barrier = Arc::new(otter_vm_gc::WriteBarrierBuffer::new());
    let ctx = VmContext::with_barrier(otter_vm_ic::IcConfig::default(), barrier.clone());
    let obj = ctx.new_object(None);
    obj.add_data_property(key("x"), Value::null()).unwrap();
    obj.normalize().unwrap();
    barrier.drain();

    let target = ctx.new_object(None);
    store_to_dictionary(&obj, &key("x"), Value::Object(target.clone())).unwrap();

    let records = barrier.drain();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target, Some(target.header().id()));
}

// ============================================================================
// Dispatchers
// ============================================================================

#[test]
fn test_scenario_mixed_dictionary() {
    let mut ctx = VmContext::default();
    let s = scenario(&ctx);
    let ic = IcDispatcher::new(CountingRuntime::default());
    let vector = FeedbackVector::new([
        FeedbackSlotKind::LoadProperty,
        FeedbackSlotKind::StoreNamed(LanguageMode::Strict),
    ]);
    let load = |ctx: &mut VmContext, name: &PropertyKey| {
        ic.load_ic_normal(
            ctx,
            LoadWithVector {
                receiver: &s.receiver,
                key: name,
                slot: FeedbackSlot(0),
                vector: &vector,
            },
        )
    };

    assert_eq!(load(&mut ctx, &key("x")).unwrap(), Value::int32(10));
    assert_eq!(load(&mut ctx, &key("y")).unwrap(), Value::int32(42));
    assert_eq!(s.getter_calls.load(Ordering::SeqCst), 1);

    let stored = ic
        .store_ic_normal(
            &mut ctx,
            StoreWithVector {
                receiver: &s.receiver,
                key: &key("x"),
                value: Value::int32(99),
                slot: FeedbackSlot(1),
                vector: &vector,
            },
        )
        .unwrap();
    assert_eq!(stored, Value::int32(99));
    assert_eq!(load(&mut ctx, &key("x")).unwrap(), Value::int32(99));
    assert_eq!(ic.runtime().misses(), 0);

    // Accessor: not handled inline, the setter runs through the miss handler
    let stored = ic
        .store_ic_normal(
            &mut ctx,
            StoreWithVector {
                receiver: &s.receiver,
                key: &key("y"),
                value: Value::int32(5),
                slot: FeedbackSlot(1),
                vector: &vector,
            },
        )
        .unwrap();
    assert_eq!(stored, Value::int32(5));
    assert_eq!(ic.runtime().misses(), 1);
    assert_eq!(*s.setter_values.lock(), vec![Value::int32(5)]);
    assert_eq!(s.getter_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_read_only_store_forks_on_mode() {
    let mut ctx = VmContext::default();
    let s = scenario(&ctx);
    let ic = IcDispatcher::new(CountingRuntime::default());
    let vector = FeedbackVector::new([
        FeedbackSlotKind::StoreNamed(LanguageMode::Strict),
        FeedbackSlotKind::StoreNamed(LanguageMode::Sloppy),
    ]);
    let store = |ctx: &mut VmContext, slot: u32| {
        ic.store_ic_normal(
            ctx,
            StoreWithVector {
                receiver: &s.receiver,
                key: &key("z"),
                value: Value::int32(2),
                slot: FeedbackSlot(slot),
                vector: &vector,
            },
        )
    };

    let err = store(&mut ctx, 0).unwrap_err();
    assert!(err.is_type_error());
    assert_eq!(own_value(&s.obj, "z"), Some(Value::int32(1)));

    assert_eq!(store(&mut ctx, 1).unwrap(), Value::int32(2));
    assert_eq!(own_value(&s.obj, "z"), Some(Value::int32(1)));
    assert_eq!(ic.runtime().misses(), 2);
}

#[test]
fn test_absent_key_escalates_to_miss() {
    let mut ctx = VmContext::default();
    let s = scenario(&ctx);
    let ic = IcDispatcher::new(CountingRuntime::default());
    let vector = FeedbackVector::new([
        FeedbackSlotKind::LoadProperty,
        FeedbackSlotKind::StoreNamed(LanguageMode::Sloppy),
    ]);

    let loaded = ic
        .load_ic_normal(
            &mut ctx,
            LoadWithVector {
                receiver: &s.receiver,
                key: &key("w"),
                slot: FeedbackSlot(0),
                vector: &vector,
            },
        )
        .unwrap();
    assert_eq!(loaded, Value::undefined());
    assert_eq!(ic.runtime().misses(), 1);

    ic.store_ic_normal(
        &mut ctx,
        StoreWithVector {
            receiver: &s.receiver,
            key: &key("w"),
            value: Value::int32(7),
            slot: FeedbackSlot(1),
            vector: &vector,
        },
    )
    .unwrap();
    assert_eq!(ic.runtime().misses(), 2);
    // The runtime added it as a new own property
    assert_eq!(own_value(&s.obj, "w"), Some(Value::int32(7)));
}

#[test]
fn test_inherited_property_found_by_fallback() {
    let mut ctx = VmContext::default();
    let proto = ctx.new_object(None);
    proto.add_data_property(key("inherited"), Value::string("p")).unwrap();
    let obj = ctx.new_object(Some(proto));
    obj.normalize().unwrap();
    let receiver = Value::Object(obj);

    let ic = IcDispatcher::new(CountingRuntime::default());
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadProperty]);
    let loaded = ic
        .load_ic_normal(
            &mut ctx,
            LoadWithVector {
                receiver: &receiver,
                key: &key("inherited"),
                slot: FeedbackSlot(0),
                vector: &vector,
            },
        )
        .unwrap();
    assert_eq!(loaded, Value::string("p"));
    assert_eq!(ic.runtime().misses(), 1);
}

#[test]
fn test_miss_dispatchers_drive_state_but_slow_ones_do_not() {
    let mut ctx = VmContext::default();
    let obj = ctx.new_object(None);
    obj.add_data_property(key("a"), Value::int32(1)).unwrap();
    let receiver = Value::Object(obj);
    let ic = IcDispatcher::<GenericRuntime>::default();
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadProperty, FeedbackSlotKind::LoadKeyed]);

    for _ in 0..3 {
        assert_eq!(ic.load_ic_slow(&mut ctx, &receiver, &key("a")).unwrap(), Value::int32(1));
        assert_eq!(
            ic.keyed_load_ic_slow(&mut ctx, &receiver, &Value::string("a")).unwrap(),
            Value::int32(1)
        );
    }
    assert_eq!(vector.state(FeedbackSlot(0)).unwrap(), InlineCacheState::Uninitialized);

    let op = LoadWithVector {
        receiver: &receiver,
        key: &key("a"),
        slot: FeedbackSlot(0),
        vector: &vector,
    };
    ic.load_ic_miss(&mut ctx, op).unwrap();
    assert_eq!(vector.state(FeedbackSlot(0)).unwrap(), InlineCacheState::Premonomorphic);
    ic.load_ic_miss(&mut ctx, op).unwrap();
    assert!(matches!(
        vector.state(FeedbackSlot(0)).unwrap(),
        InlineCacheState::Monomorphic { .. }
    ));

    let keyed = Value::string("a");
    let op = LoadWithVector {
        receiver: &receiver,
        key: &keyed,
        slot: FeedbackSlot(1),
        vector: &vector,
    };
    assert_eq!(ic.keyed_load_ic_miss(&mut ctx, op).unwrap(), Value::int32(1));
    assert_eq!(vector.state(FeedbackSlot(1)).unwrap(), InlineCacheState::Premonomorphic);
}

#[test]
fn test_keyed_store_slow_leaves_state() {
    let mut ctx = VmContext::default();
    let obj = ctx.new_object(None);
    let receiver = Value::Object(obj.clone());
    let ic = IcDispatcher::new(CountingRuntime::default());
    let vector = FeedbackVector::new([FeedbackSlotKind::StoreKeyed(LanguageMode::Strict)]);

    let op = StoreWithVector {
        receiver: &receiver,
        key: &Value::int32(3),
        value: Value::string("three"),
        slot: FeedbackSlot(0),
        vector: &vector,
    };
    assert_eq!(ic.keyed_store_ic_slow(&mut ctx, op).unwrap(), Value::string("three"));
    assert_eq!(vector.state(FeedbackSlot(0)).unwrap(), InlineCacheState::Uninitialized);
    assert_eq!(ic.runtime().plain(), 1);
    assert_eq!(own_value(&obj, "3"), Some(Value::string("three")));
}

#[test]
fn test_store_miss_on_load_slot_is_rejected() {
    let mut ctx = VmContext::default();
    let receiver = Value::Object(ctx.new_object(None));
    let ic = IcDispatcher::<GenericRuntime>::default();
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadProperty]);

    let err = ic
        .store_ic_miss(
            &mut ctx,
            StoreWithVector {
                receiver: &receiver,
                key: &key("x"),
                value: Value::int32(1),
                slot: FeedbackSlot(0),
                vector: &vector,
            },
        )
        .unwrap_err();
    assert!(matches!(err, VmError::Feedback(_)));
}

#[test]
fn test_megamorphic_keyed_store_by_mode() {
    let mut ctx = VmContext::default();
    let obj = ctx.new_object(None);
    obj.define_property(key("ro"), Value::int32(1), PropertyAttributes::read_only())
        .unwrap();
    let receiver = Value::Object(obj.clone());
    let ic = IcDispatcher::<GenericRuntime>::default();

    assert_eq!(
        ic.keyed_store_ic_megamorphic(&mut ctx, &receiver, &Value::string("ro"), Value::int32(2))
            .unwrap(),
        Value::int32(2)
    );
    assert!(
        ic.keyed_store_ic_megamorphic_strict(&mut ctx, &receiver, &Value::string("ro"), Value::int32(2))
            .unwrap_err()
            .is_type_error()
    );
    assert_eq!(own_value(&obj, "ro"), Some(Value::int32(1)));
}

#[test]
fn test_global_loads() {
    let mut ctx = VmContext::default();
    ctx.global()
        .add_data_property(key("answer"), Value::int32(42))
        .unwrap();
    let ic = IcDispatcher::<GenericRuntime>::default();
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadGlobal]);

    let op = LoadGlobalWithVector {
        name: &key("answer"),
        slot: FeedbackSlot(0),
        vector: &vector,
    };
    assert_eq!(ic.load_global_ic_miss(&mut ctx, op).unwrap(), Value::int32(42));
    assert_eq!(ic.load_global_ic_slow(&mut ctx, &key("answer")).unwrap(), Value::int32(42));

    let err = ic.load_global_ic_slow(&mut ctx, &key("undeclared")).unwrap_err();
    assert!(matches!(err, VmError::ReferenceError(_)));
}

#[test]
fn test_accessor_errors_propagate_unchanged() {
    let mut ctx = VmContext::default();
    let obj = ctx.new_object(None);
    let thrower = JsFunction::native("boom", |_, _, _| Err(VmError::exception(Value::string("boom"))));
    obj.define_accessor(key("t"), Some(thrower), None, PropertyAttributes::data())
        .unwrap();
    obj.normalize().unwrap();
    let receiver = Value::Object(obj);

    let ic = IcDispatcher::<GenericRuntime>::default();
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadProperty]);
    let err = ic
        .load_ic_normal(
            &mut ctx,
            LoadWithVector {
                receiver: &receiver,
                key: &key("t"),
                slot: FeedbackSlot(0),
                vector: &vector,
            },
        )
        .unwrap_err();
    assert!(matches!(err, VmError::Exception(ref thrown) if thrown.value == Value::string("boom")));
    assert_eq!(ctx.call_depth(), 0);
}

// ============================================================================
// Deoptimization continuations
// ============================================================================

#[test]
fn test_getter_for_deopt() {
    let mut ctx = VmContext::default();
    let ic = IcDispatcher::<GenericRuntime>::default();
    let receiver = Value::Object(ctx.new_object(None));
    let getter = Value::Function(JsFunction::native("g", |_, this, _| Ok(this.clone())));

    assert_eq!(
        ic.load_ic_getter_for_deopt(&mut ctx, &receiver, &getter).unwrap(),
        receiver
    );
    assert_eq!(
        ic.load_ic_getter_for_deopt(&mut ctx, &receiver, &Value::undefined())
            .unwrap(),
        Value::undefined()
    );
    assert!(
        ic.load_ic_getter_for_deopt(&mut ctx, &receiver, &Value::int32(1))
            .unwrap_err()
            .is_type_error()
    );
}

#[test]
fn test_setter_for_deopt_returns_assigned_value() {
    let mut ctx = VmContext::default();
    let ic = IcDispatcher::<GenericRuntime>::default();
    let receiver = Value::Object(ctx.new_object(None));
    let values = Arc::new(Mutex::new(Vec::new()));
    let setter = Value::Function(recording_setter(values.clone()));

    let result = ic
        .store_ic_setter_for_deopt(&mut ctx, &receiver, &setter, Value::int32(8))
        .unwrap();
    assert_eq!(result, Value::int32(8));
    assert_eq!(*values.lock(), vec![Value::int32(8)]);
    assert_eq!(
        ic.store_ic_setter_for_deopt(&mut ctx, &receiver, &Value::undefined(), Value::int32(9))
            .unwrap(),
        Value::int32(9)
    );
}
