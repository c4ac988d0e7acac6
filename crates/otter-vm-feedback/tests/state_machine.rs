//! Inline cache state machine tests
//!
//! The progression towards less specialization must be monotonic: no miss
//! ever lowers the rank of a site. Only `reset` goes back.

use otter_vm_feedback::state::MAX_POLYMORPHIC_CAPACITY;
use otter_vm_feedback::{
    FeedbackSlot, FeedbackSlotKind, FeedbackVector, Handler, InlineCacheState, LanguageMode,
    MissObservation, ShapeId,
};
use proptest::prelude::*;

fn field(shape: u64) -> MissObservation {
    MissObservation::new(ShapeId(shape), Handler::FastField { offset: 0 })
}

#[test]
fn test_full_progression_to_megamorphic() {
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadProperty]);
    let slot = FeedbackSlot(0);

    vector.record_miss(slot, field(1), 4, 0).unwrap();
    assert_eq!(vector.state(slot).unwrap(), InlineCacheState::Premonomorphic);

    vector.record_miss(slot, field(1), 4, 0).unwrap();
    assert!(matches!(
        vector.state(slot).unwrap(),
        InlineCacheState::Monomorphic { shape: ShapeId(1), .. }
    ));

    for shape in 2..=4 {
        let t = vector.record_miss(slot, field(shape), 4, 0).unwrap();
        assert_eq!(t.to, "polymorphic");
        assert_eq!(t.installed.map(|(s, _)| s), Some(ShapeId(shape)));
    }
    match vector.state(slot).unwrap() {
        InlineCacheState::Polymorphic { entries } => {
            assert_eq!(entries.len(), 4);
            // Most recent first
            assert_eq!(entries[0].0, ShapeId(4));
        }
        other => panic!("expected polymorphic, got {other:?}"),
    }

    let t = vector.record_miss(slot, field(5), 4, 0).unwrap();
    assert_eq!(t.to, "megamorphic");
    assert_eq!(t.installed, None);

    // Saturated: more shapes change nothing
    vector.record_miss(slot, field(1), 4, 0).unwrap();
    assert_eq!(vector.state(slot).unwrap(), InlineCacheState::Megamorphic);
    assert_eq!(vector.lookup(slot, ShapeId(1), 0).unwrap(), None);
}

#[test]
fn test_uncacheable_goes_generic_from_any_state() {
    let vector = FeedbackVector::new([FeedbackSlotKind::StoreKeyed(LanguageMode::Strict)]);
    let slot = FeedbackSlot(0);
    vector.record_miss(slot, field(1), 4, 0).unwrap();
    vector.record_miss(slot, field(1), 4, 0).unwrap();

    let t = vector
        .record_miss(slot, MissObservation::uncacheable(), 4, 0)
        .unwrap();
    assert_eq!(t.from, "monomorphic");
    assert_eq!(t.to, "generic");

    vector.record_miss(slot, field(2), 4, 0).unwrap();
    assert_eq!(vector.state(slot).unwrap(), InlineCacheState::Generic);
}

#[test]
fn test_generic_handler_is_still_per_shape() {
    let mut state = InlineCacheState::Premonomorphic;
    state.on_miss(MissObservation::new(ShapeId(1), Handler::Generic), 4);
    assert_eq!(state.lookup(ShapeId(1)), Some(Handler::Generic));

    let mut state = InlineCacheState::Megamorphic;
    state.on_miss(MissObservation::uncacheable(), 4);
    assert_eq!(state, InlineCacheState::Generic);
}

#[test]
fn test_saturate_never_leaves_generic() {
    let mut state = InlineCacheState::Monomorphic {
        shape: ShapeId(1),
        handler: Handler::Dictionary,
    };
    let t = state.saturate();
    assert_eq!(t.to, "megamorphic");

    let mut state = InlineCacheState::Generic;
    state.saturate();
    assert_eq!(state, InlineCacheState::Generic);
}

#[test]
fn test_reset_is_the_only_way_back() {
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadGlobal]);
    let slot = FeedbackSlot(0);
    vector
        .record_miss(slot, MissObservation::uncacheable(), 4, 0)
        .unwrap();
    assert_eq!(vector.state(slot).unwrap(), InlineCacheState::Generic);

    vector.reset(slot).unwrap();
    assert_eq!(vector.state(slot).unwrap(), InlineCacheState::Uninitialized);
}

#[test]
fn test_stale_epoch_keeps_rank() {
    let vector = FeedbackVector::new([FeedbackSlotKind::LoadProperty]);
    let slot = FeedbackSlot(0);
    for shape in [1, 1, 2, 3] {
        vector.record_miss(slot, field(shape), 4, 1).unwrap();
    }
    let t = vector.record_miss(slot, field(9), 4, 2).unwrap();
    assert_eq!(t.from_rank, t.to_rank);
    match vector.state(slot).unwrap() {
        InlineCacheState::Polymorphic { entries } => {
            assert_eq!(entries.as_slice(), &[(ShapeId(9), Handler::FastField { offset: 0 })]);
        }
        other => panic!("expected polymorphic, got {other:?}"),
    }
    assert_eq!(vector.lookup(slot, ShapeId(1), 2).unwrap(), None);
}

#[test]
fn test_snapshot_serializes() {
    let vector = FeedbackVector::builder()
        .add(FeedbackSlotKind::LoadProperty)
        .add(FeedbackSlotKind::StoreNamed(LanguageMode::Sloppy))
        .build();
    vector.record_miss(FeedbackSlot(0), field(3), 4, 0).unwrap();
    vector.record_miss(FeedbackSlot(0), field(3), 4, 0).unwrap();

    let json = serde_json::to_string(&vector.snapshot()).unwrap();
    let back: Vec<otter_vm_feedback::FeedbackEntry> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, vector.snapshot());
    assert_eq!(back[1].kind, FeedbackSlotKind::StoreNamed(LanguageMode::Sloppy));
}

fn observation() -> impl Strategy<Value = MissObservation> {
    prop_oneof![
        8 => (0u64..12, 0u32..4).prop_map(|(s, o)| MissObservation::new(
            ShapeId(s),
            Handler::FastField { offset: o }
        )),
        2 => (0u64..12).prop_map(|s| MissObservation::new(ShapeId(s), Handler::Dictionary)),
        1 => Just(MissObservation::uncacheable()),
    ]
}

proptest! {
    #[test]
    fn prop_rank_never_decreases(
        misses in prop::collection::vec(observation(), 1..64),
        capacity in 1usize..=MAX_POLYMORPHIC_CAPACITY,
    ) {
        let mut state = InlineCacheState::default();
        for obs in misses {
            let before = state.rank();
            let t = state.on_miss(obs, capacity);
            prop_assert!(t.to_rank >= before);
            prop_assert_eq!(t.to_rank, state.rank());
            if let InlineCacheState::Polymorphic { entries } = &state {
                prop_assert!(entries.len() <= capacity);
            }
        }
    }

    #[test]
    fn prop_installed_entry_is_found(
        misses in prop::collection::vec(observation(), 1..32),
    ) {
        let mut state = InlineCacheState::default();
        for obs in misses {
            let t = state.on_miss(obs, 4);
            if let Some((shape, handler)) = t.installed {
                prop_assert_eq!(state.lookup(shape), Some(handler));
            }
        }
    }
}
