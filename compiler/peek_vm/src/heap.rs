//! Object storage.
//!
//! Objects are never freed while the VM lives; an id outside the heap is
//! reported as collected.

use peek_target::{ObjectId, ObjectKind, TargetError, TargetValue};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum HeapObject {
    Str(String),
    Closure {
        class: String,
        captures: Vec<TargetValue>,
    },
    Ref(TargetValue),
    Exception {
        message: String,
    },
}

impl HeapObject {
    fn describe(&self) -> &'static str {
        match self {
            HeapObject::Str(_) => "string",
            HeapObject::Closure { .. } => "closure",
            HeapObject::Ref(_) => "box",
            HeapObject::Exception { .. } => "exception",
        }
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        match self {
            HeapObject::Str(_) => ObjectKind::Str,
            HeapObject::Closure { class, .. } => ObjectKind::Closure {
                class: class.clone(),
            },
            HeapObject::Ref(_) => ObjectKind::Ref,
            HeapObject::Exception { .. } => ObjectKind::Exception,
        }
    }
}

#[derive(Default)]
pub(crate) struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub(crate) fn alloc(&mut self, object: HeapObject) -> ObjectId {
        let id = ObjectId::new(u32::try_from(self.objects.len()).unwrap_or(u32::MAX));
        self.objects.push(object);
        id
    }

    pub(crate) fn get(&self, id: ObjectId) -> Result<&HeapObject, TargetError> {
        self.objects
            .get(id.index())
            .ok_or(TargetError::ObjectCollected { id })
    }

    fn get_mut(&mut self, id: ObjectId) -> Result<&mut HeapObject, TargetError> {
        self.objects
            .get_mut(id.index())
            .ok_or(TargetError::ObjectCollected { id })
    }

    pub(crate) fn string(&self, id: ObjectId) -> Result<&str, TargetError> {
        match self.get(id)? {
            HeapObject::Str(text) => Ok(text),
            other => Err(unexpected(id, "string", other)),
        }
    }

    pub(crate) fn closure(&self, id: ObjectId) -> Result<(&str, &[TargetValue]), TargetError> {
        match self.get(id)? {
            HeapObject::Closure { class, captures } => Ok((class, captures)),
            other => Err(unexpected(id, "closure", other)),
        }
    }

    pub(crate) fn box_get(&self, id: ObjectId) -> Result<TargetValue, TargetError> {
        match self.get(id)? {
            HeapObject::Ref(value) => Ok(*value),
            other => Err(unexpected(id, "box", other)),
        }
    }

    pub(crate) fn box_set(&mut self, id: ObjectId, value: TargetValue) -> Result<(), TargetError> {
        match self.get_mut(id)? {
            HeapObject::Ref(content) => {
                *content = value;
                Ok(())
            }
            other => Err(unexpected(id, "box", other)),
        }
    }

    pub(crate) fn exception_message(&self, id: ObjectId) -> Result<&str, TargetError> {
        match self.get(id)? {
            HeapObject::Exception { message } => Ok(message),
            other => Err(unexpected(id, "exception", other)),
        }
    }
}

fn unexpected(id: ObjectId, expected: &'static str, found: &HeapObject) -> TargetError {
    TargetError::UnexpectedObject {
        id,
        expected,
        found: found.describe(),
    }
}
