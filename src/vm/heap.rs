//! Heap objects and the mark-and-sweep collector.
//!
//! Objects live in a slab addressed by [`ObjectRef`]. A collection marks
//! everything reachable from the roots it is handed, then frees the rest.
//! The heap never collects on its own; the engine asks [`Heap::needs_collection`]
//! between instructions and supplies the roots.

use log::debug;
use serde::Serialize;

use super::value::{ObjectRef, Value};

/// A class instance with its flattened field vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: u16,
    pub fields: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    String(String),
    ArrayInt(Vec<i64>),
    ArrayDouble(Vec<f64>),
    ArrayObject(Vec<Option<ObjectRef>>),
    Instance(Instance),
}

impl HeapObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapObject::String(_) => "string",
            HeapObject::ArrayInt(_) => "int[]",
            HeapObject::ArrayDouble(_) => "double[]",
            HeapObject::ArrayObject(_) => "object[]",
            HeapObject::Instance(_) => "instance",
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match self {
            HeapObject::ArrayInt(items) => Some(items.len()),
            HeapObject::ArrayDouble(items) => Some(items.len()),
            HeapObject::ArrayObject(items) => Some(items.len()),
            _ => None,
        }
    }
}

struct Entry {
    marked: bool,
    object: HeapObject,
}

/// Collector counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub cycles: usize,
    pub allocated: usize,
    pub freed: usize,
    pub live: usize,
    pub threshold: usize,
}

pub struct Heap {
    entries: Vec<Option<Entry>>,
    free: Vec<usize>,
    live: usize,
    threshold: usize,
    increment: usize,
    /// Per class, which flattened fields hold references.
    reference_fields: Vec<Vec<bool>>,
    stats: GcStats,
}

impl Heap {
    pub fn new(threshold: usize, increment: usize) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
            threshold,
            increment,
            reference_fields: Vec::new(),
            stats: GcStats::default(),
        }
    }

    /// Install the reference-field masks the mark phase follows for instances.
    pub fn with_class_layouts(mut self, reference_fields: Vec<Vec<bool>>) -> Self {
        self.reference_fields = reference_fields;
        self
    }

    pub fn alloc(&mut self, object: HeapObject) -> ObjectRef {
        let entry = Entry {
            marked: false,
            object,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };
        self.live += 1;
        self.stats.allocated += 1;
        ObjectRef::new(index)
    }

    pub fn alloc_string(&mut self, value: impl Into<String>) -> ObjectRef {
        self.alloc(HeapObject::String(value.into()))
    }

    /// # Panics
    /// On a handle to a freed object, which only a collector bug can produce.
    pub fn get(&self, object: ObjectRef) -> &HeapObject {
        match self.entries.get(object.index()) {
            Some(Some(entry)) => &entry.object,
            _ => panic!("dangling object handle #{}", object.index()),
        }
    }

    pub fn get_mut(&mut self, object: ObjectRef) -> &mut HeapObject {
        match self.entries.get_mut(object.index()) {
            Some(Some(entry)) => &mut entry.object,
            _ => panic!("dangling object handle #{}", object.index()),
        }
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        matches!(self.entries.get(object.index()), Some(Some(_)))
    }

    /// The string payload, if `object` is a string.
    pub fn string(&self, object: ObjectRef) -> Option<&str> {
        match self.get(object) {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &HeapObject)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (ObjectRef::new(i), &e.object)))
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn needs_collection(&self) -> bool {
        self.live > self.threshold
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            live: self.live,
            threshold: self.threshold,
            ..self.stats
        }
    }

    /// Run a full cycle. Returns the number of objects freed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjectRef>) -> usize {
        let before = self.live;
        self.mark(roots);
        let freed = self.sweep();

        self.stats.cycles += 1;
        self.stats.freed += freed;
        self.threshold += self.increment;
        debug!(
            "gc cycle {}: {} -> {} objects, next threshold {}",
            self.stats.cycles, before, self.live, self.threshold
        );
        freed
    }

    fn mark(&mut self, roots: impl IntoIterator<Item = ObjectRef>) {
        let mut worklist: Vec<ObjectRef> = roots.into_iter().collect();
        while let Some(object) = worklist.pop() {
            let Some(Some(entry)) = self.entries.get_mut(object.index()) else {
                continue;
            };
            if entry.marked {
                continue;
            }
            entry.marked = true;

            match &entry.object {
                HeapObject::String(_) | HeapObject::ArrayInt(_) | HeapObject::ArrayDouble(_) => {}
                HeapObject::ArrayObject(items) => worklist.extend(items.iter().flatten()),
                HeapObject::Instance(instance) => {
                    let Some(mask) = self.reference_fields.get(instance.class as usize) else {
                        continue;
                    };
                    worklist.extend(
                        instance
                            .fields
                            .iter()
                            .zip(mask)
                            .filter(|(_, is_ref)| **is_ref)
                            .filter_map(|(field, _)| field.as_object()),
                    );
                }
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            match slot {
                Some(entry) if entry.marked => entry.marked = false,
                Some(_) => {
                    *slot = None;
                    self.free.push(index);
                    freed += 1;
                }
                None => {}
            }
        }
        self.live -= freed;
        freed
    }
}
