use super::Slot;
use crate::session::Session;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Exclusive use of one pooled [`Session`].
///
/// The session goes back to its pool when the lease is dropped, on every exit
/// path including unwinding. A default lease holds nothing; dereferencing it
/// panics.
#[derive(Default)]
pub struct Lease {
    slot: Option<Arc<Slot>>,
    session: Option<Session>,
}

impl Lease {
    pub(crate) fn new(slot: Arc<Slot>, session: Session) -> Self {
        Self {
            slot: Some(slot),
            session: Some(session),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_none()
    }
}

impl Deref for Lease {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session.as_ref().expect("dereferenced an empty lease")
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Session {
        self.session.as_mut().expect("dereferenced an empty lease")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let (Some(slot), Some(session)) = (self.slot.take(), self.session.take()) {
            slot.release(session);
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => f.debug_tuple("Lease").field(session).finish(),
            None => f.write_str("Lease(empty)"),
        }
    }
}
