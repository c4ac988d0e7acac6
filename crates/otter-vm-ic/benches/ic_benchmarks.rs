//! Inline Cache Performance Benchmarks
//!
//! Measures call-site dispatch for monomorphic, polymorphic and megamorphic
//! receivers.

use criterion::{Criterion, criterion_group, criterion_main};
use otter_vm_ic::{
    FeedbackSlot, FeedbackSlotKind, FeedbackVector, GcRef, GenericRuntime, IcDispatcher, JsObject,
    KeyedStoreSite, LanguageMode, LoadSite, PropertyKey, StoreSite, Value, VmContext,
};
use std::hint::black_box;
use std::sync::Arc;

fn load_site(name: &str) -> LoadSite {
    let vector = Arc::new(FeedbackVector::new([FeedbackSlotKind::LoadProperty]));
    LoadSite::new(vector, FeedbackSlot(0), PropertyKey::string(name))
}

/// `{ <prefix>, x }` objects with one distinct shape each
fn shaped_objects(ctx: &VmContext, count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let obj: GcRef<JsObject> = ctx.new_object(None);
            if i > 0 {
                obj.add_data_property(PropertyKey::string(&format!("pad{i}")), Value::int32(0))
                    .unwrap();
            }
            obj.add_data_property(PropertyKey::string("x"), Value::int32(i as i32))
                .unwrap();
            Value::Object(obj)
        })
        .collect()
}

/// Benchmark: Monomorphic property access (IC hit)
fn bench_monomorphic_property_access(c: &mut Criterion) {
    let mut ctx = VmContext::default();
    let ic = IcDispatcher::<GenericRuntime>::default();
    let site = load_site("x");
    let receiver = shaped_objects(&ctx, 1).remove(0);

    c.bench_function("ic_monomorphic_1000_reads", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for _ in 0..1000 {
                sum += site.load(&ic, &mut ctx, &receiver).ok().and_then(|v| v.as_number()).unwrap_or(0.0);
            }
            black_box(sum)
        });
    });
}

/// Benchmark: Polymorphic and megamorphic access on the same property
fn bench_polymorphic_property_access(c: &mut Criterion) {
    let mut ctx = VmContext::default();
    let ic = IcDispatcher::<GenericRuntime>::default();

    for (name, shapes) in [("ic_polymorphic_3_shapes", 3), ("ic_megamorphic_8_shapes", 8)] {
        let site = load_site("x");
        let receivers = shaped_objects(&ctx, shapes);
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut sum = 0.0;
                for _ in 0..100 {
                    for receiver in &receivers {
                        sum += site.load(&ic, &mut ctx, receiver).ok().and_then(|v| v.as_number()).unwrap_or(0.0);
                    }
                }
                black_box(sum)
            });
        });
    }
}

/// Benchmark: Property stores, cached and megamorphic keyed
fn bench_property_set(c: &mut Criterion) {
    let mut ctx = VmContext::default();
    let ic = IcDispatcher::<GenericRuntime>::default();

    let vector = Arc::new(FeedbackVector::new([FeedbackSlotKind::StoreNamed(LanguageMode::Strict)]));
    let site = StoreSite::new(vector, FeedbackSlot(0), PropertyKey::string("x"));
    let receiver = shaped_objects(&ctx, 1).remove(0);
    c.bench_function("ic_property_set_100", |b| {
        b.iter(|| {
            for i in 0..100 {
                black_box(site.store(&ic, &mut ctx, &receiver, Value::int32(i)).ok());
            }
        });
    });

    let vector = Arc::new(FeedbackVector::new([FeedbackSlotKind::StoreKeyed(LanguageMode::Sloppy)]));
    let keyed = KeyedStoreSite::new(vector, FeedbackSlot(0));
    let receiver = Value::Object(ctx.new_object(None));
    let keys: Vec<Value> = (0..16).map(|i| Value::string(&format!("k{i}"))).collect();
    c.bench_function("ic_keyed_set_megamorphic_16_keys", |b| {
        b.iter(|| {
            for (i, key) in keys.iter().enumerate() {
                black_box(keyed.store(&ic, &mut ctx, &receiver, key, Value::int32(i as i32)).ok());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_monomorphic_property_access,
    bench_polymorphic_property_access,
    bench_property_set
);
criterion_main!(benches);
