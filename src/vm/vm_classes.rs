//! Instances: allocation, field access, method lookup and casts.

use crate::error::Fault;

use super::heap::{HeapObject, Instance};
use super::value::Value;
use super::vm::{default_value, Vm};

impl Vm {
    /// `NEW`: an instance with every field at its zero value.
    pub(crate) fn new_instance(&mut self, class: usize) -> Result<Value, Fault> {
        let exe = self.exe.clone();
        let fields = exe.classes[class]
            .fields
            .iter()
            .map(|field| default_value(&mut self.heap, &field.ty))
            .collect();
        let object = self.heap.alloc(HeapObject::Instance(Instance {
            class: class as u16,
            fields,
        }));
        Ok(Value::object(object))
    }

    fn instance(&self, value: Value) -> Result<&Instance, Fault> {
        let object = value.as_object().ok_or(Fault::NullPointer)?;
        match self.heap.get(object) {
            HeapObject::Instance(instance) => Ok(instance),
            other => Err(Fault::TypeMismatch {
                expected: "instance",
                found: other.kind_name(),
            }),
        }
    }

    pub(crate) fn get_field(&self, object: Value, index: usize) -> Result<Value, Fault> {
        Ok(self.instance(object)?.fields[index])
    }

    pub(crate) fn set_field(&mut self, object: Value, index: usize, value: Value) -> Result<(), Fault> {
        let object = object.as_object().ok_or(Fault::NullPointer)?;
        match self.heap.get_mut(object) {
            HeapObject::Instance(instance) => {
                instance.fields[index] = value;
                Ok(())
            }
            other => Err(Fault::TypeMismatch {
                expected: "instance",
                found: other.kind_name(),
            }),
        }
    }

    /// Function behind method slot `index` of the object's dynamic class.
    pub(crate) fn method_function(&self, object: Value, index: usize) -> Result<usize, Fault> {
        let class = self.instance(object)?.class;
        Ok(self.exe.classes[class as usize].methods[index].function as usize)
    }

    /// `DOWN_CAST`: null passes; anything else must be the class or a subclass.
    pub(crate) fn down_cast(&self, object: Value, class: usize) -> Result<(), Fault> {
        if object.is_null() {
            return Ok(());
        }
        let actual = self.instance(object)?.class;
        if self.exe.is_subclass(actual, class as u16) {
            Ok(())
        } else {
            Err(Fault::ClassCast {
                from: self.exe.class_name(actual).to_string(),
                to: self.exe.class_name(class as u16).to_string(),
            })
        }
    }

    pub(crate) fn instance_of(&self, object: Value, class: usize) -> bool {
        match self.instance(object) {
            Ok(instance) => self.exe.is_subclass(instance.class, class as u16),
            Err(_) => false,
        }
    }
}
