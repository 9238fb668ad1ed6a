//! Process-wide identifier allocation.
//!
//! Every addressable engine object (drawables, textures, components) is
//! referred to by an opaque [`Identifier`] rather than a pointer. Identifiers
//! are allocated from a monotonically increasing 64-bit counter and are never
//! reused, so a stale identifier can never alias a newer resource.
//!
//! The allocator is an explicit service: subsystems receive an
//! `Arc<IdentifierAllocator>` at construction time so tests can run with an
//! isolated counter. [`IdentifierAllocator::global`] provides the shared
//! process-wide instance for callers that do not care.
//!
//! # Example
//!
//! ```
//! use terrascene::ident::{Identifier, IdentifierAllocator};
//!
//! let allocator = IdentifierAllocator::new();
//! let a = allocator.allocate();
//! let b = allocator.allocate();
//! assert_ne!(a, b);
//! assert!(!a.is_empty());
//! assert_eq!(Identifier::EMPTY.value(), 0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque identifier for an engine object.
///
/// Globally unique for the process lifetime. Zero is reserved as the
/// "empty/invalid" identifier and is never handed out by an allocator; it
/// is also the default value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(u64);

impl Identifier {
    /// The reserved empty/invalid identifier.
    pub const EMPTY: Identifier = Identifier(0);

    /// Returns true if this is the reserved empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the raw numeric value.
    ///
    /// Intended for logging and diagnostics; the value carries no meaning
    /// beyond uniqueness.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "Identifier(empty)")
        } else {
            write!(f, "Identifier({})", self.0)
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread-safe allocator of unique [`Identifier`]s.
///
/// Allocation is a single atomic increment; there is no locking and no
/// recycling. The counter starts at 1 so [`Identifier::EMPTY`] is never
/// produced. A 64-bit counter cannot realistically wrap within a process
/// lifetime, so overflow is not handled.
pub struct IdentifierAllocator {
    next: AtomicU64,
}

impl IdentifierAllocator {
    /// Creates a new allocator with its own counter.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the shared process-wide allocator.
    ///
    /// The instance lives for the entire process; it is initialized on first
    /// use and shared by every caller that does not inject its own.
    pub fn global() -> &'static IdentifierAllocator {
        static GLOBAL: IdentifierAllocator = IdentifierAllocator {
            next: AtomicU64::new(1),
        };
        &GLOBAL
    }

    /// Allocates a fresh, never-before-returned identifier.
    pub fn allocate(&self) -> Identifier {
        Identifier(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentifierAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierAllocator")
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}
