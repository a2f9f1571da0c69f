//! COMDAT group deduplication state. One `ComdatGroup` exists per signature,
//! interned process-wide; across all live files exactly one of them ends up
//! contributing the group's member sections.

use crate::input_data::FileId;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

/// The current winner of a group. The lowest priority wins; the section index
/// breaks the degenerate tie of one file contributing a signature twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComdatOwner {
    pub file: FileId,
    pub priority: u32,
    pub section_index: object::SectionIndex,
}

pub struct ComdatGroup {
    /// Priority of the current owner; `u32::MAX` while unowned. Only ever
    /// decreases, which is what makes the unlocked fast path in `claim` sound.
    fast_priority: AtomicU32,
    owner: Mutex<Option<ComdatOwner>>,
}

impl ComdatGroup {
    pub(crate) fn new() -> Self {
        Self {
            fast_priority: AtomicU32::new(u32::MAX),
            owner: Mutex::new(None),
        }
    }

    pub fn owner(&self) -> Option<ComdatOwner> {
        *self.owner.lock().unwrap()
    }

    /// Installs `candidate` as the owner if it beats the incumbent. The fast
    /// path rejects already-lost claims without taking the lock.
    pub(crate) fn claim(&self, candidate: ComdatOwner) {
        if self.fast_priority.load(Ordering::Acquire) < candidate.priority {
            return;
        }

        let mut owner = self.owner.lock().unwrap();
        let wins = match *owner {
            None => true,
            Some(incumbent) => {
                (candidate.priority, candidate.section_index.0)
                    < (incumbent.priority, incumbent.section_index.0)
            }
        };
        if wins {
            *owner = Some(candidate);
            self.fast_priority
                .store(candidate.priority, Ordering::Release);
        }
    }
}
