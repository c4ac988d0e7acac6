//! Write barrier contract tests

use otter_vm_gc::{GcHeader, MarkColor, RememberedSet, WriteBarrier, WriteBarrierBuffer, tags};

#[test]
fn test_buffer_records_every_write_in_order() {
    let buffer = WriteBarrierBuffer::new();
    let dict = GcHeader::new(tags::DICTIONARY);
    let obj = GcHeader::new(tags::OBJECT);

    buffer.record_write(&dict, 5, None);
    buffer.record_write(&dict, 8, Some(&obj));

    let records = buffer.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].holder, dict.id());
    assert_eq!(records[0].holder_tag, tags::DICTIONARY);
    assert_eq!(records[0].slot, 5);
    assert_eq!(records[0].target, None);
    assert_eq!(records[1].slot, 8);
    assert_eq!(records[1].target, Some(obj.id()));

    let drained = buffer.drain();
    assert_eq!(drained, records);
    assert!(buffer.is_empty());
}

#[test]
fn test_buffer_applies_insertion_barrier() {
    let buffer = WriteBarrierBuffer::new();
    let holder = GcHeader::new(tags::OBJECT);
    let target = GcHeader::new(tags::STRING);
    holder.set_mark(MarkColor::Black);

    buffer.record_write(&holder, 0, Some(&target));
    assert_eq!(target.mark(), MarkColor::Gray);
}

#[test]
fn test_remembered_set_ignores_primitive_writes() {
    let set = RememberedSet::new();
    let holder = GcHeader::new(tags::OBJECT);
    let target = GcHeader::new(tags::OBJECT);

    set.record_write(&holder, 0, None);
    assert!(set.is_empty());

    set.record_write(&holder, 1, Some(&target));
    assert!(set.contains(holder.id()));
    assert_eq!(set.len(), 1);

    set.clear();
    assert!(set.is_empty());
}

#[test]
fn test_barrier_is_object_safe() {
    let barriers: Vec<Box<dyn WriteBarrier>> =
        vec![Box::new(WriteBarrierBuffer::new()), Box::new(RememberedSet::new())];
    let holder = GcHeader::new(tags::OBJECT);
    for barrier in &barriers {
        barrier.record_write(&holder, 0, None);
    }
}
