//! The runtime value cell shared by the stack, globals and object fields.

use std::fmt;

/// Handle to a live heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(u32);

impl ObjectRef {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

const NULL_PAYLOAD: u64 = u64::MAX;

/// A 64-bit payload plus the reference flag.
///
/// Ints and doubles share the payload; which one a slot holds is known
/// statically from the instruction reading it. Only the flag is checked at
/// run time, by the collector.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    payload: u64,
    is_ref: bool,
}

impl Value {
    pub const ZERO: Value = Value {
        payload: 0,
        is_ref: false,
    };

    pub const NULL: Value = Value {
        payload: NULL_PAYLOAD,
        is_ref: true,
    };

    #[inline]
    pub fn int(value: i64) -> Self {
        Self {
            payload: value as u64,
            is_ref: false,
        }
    }

    #[inline]
    pub fn boolean(value: bool) -> Self {
        Self::int(value as i64)
    }

    #[inline]
    pub fn double(value: f64) -> Self {
        Self {
            payload: value.to_bits(),
            is_ref: false,
        }
    }

    #[inline]
    pub fn object(object: ObjectRef) -> Self {
        Self {
            payload: object.0 as u64,
            is_ref: true,
        }
    }

    pub fn reference(object: Option<ObjectRef>) -> Self {
        object.map_or(Self::NULL, Self::object)
    }

    #[inline]
    pub fn as_int(self) -> i64 {
        self.payload as i64
    }

    #[inline]
    pub fn as_bool(self) -> bool {
        self.payload != 0
    }

    #[inline]
    pub fn as_double(self) -> f64 {
        f64::from_bits(self.payload)
    }

    /// The referenced object, or `None` for null and for scalars.
    #[inline]
    pub fn as_object(self) -> Option<ObjectRef> {
        if self.is_ref && self.payload != NULL_PAYLOAD {
            Some(ObjectRef(self.payload as u32))
        } else {
            None
        }
    }

    #[inline]
    pub fn is_ref(self) -> bool {
        self.is_ref
    }

    pub fn is_null(self) -> bool {
        self.is_ref && self.payload == NULL_PAYLOAD
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_ref, self.as_object()) {
            (true, Some(object)) => write!(f, "Object(#{})", object.index()),
            (true, None) => write!(f, "Null"),
            (false, _) => write!(f, "Scalar({:#x})", self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_share_payload() {
        assert_eq!(Value::int(-7).as_int(), -7);
        assert_eq!(Value::double(2.5).as_double(), 2.5);
        assert!(Value::boolean(true).as_bool());
        assert!(!Value::int(3).is_ref());
        assert!(!Value::double(3.0).is_ref());
    }

    #[test]
    fn test_reference_flag() {
        let obj = Value::object(ObjectRef::new(4));
        assert!(obj.is_ref());
        assert_eq!(obj.as_object(), Some(ObjectRef::new(4)));
        assert!(Value::NULL.is_ref());
        assert!(Value::NULL.is_null());
        assert_eq!(Value::NULL.as_object(), None);
        assert_eq!(Value::reference(None), Value::NULL);
    }

    #[test]
    fn test_scalar_is_never_an_object() {
        assert_eq!(Value::int(4).as_object(), None);
        assert_eq!(Value::int(-1).as_object(), None);
    }
}
