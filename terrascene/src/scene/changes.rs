//! Change requests and the cross-thread change queue.
//!
//! All mutation of the GPU-facing [`SceneStore`](crate::scene::SceneStore)
//! flows through [`ChangeRequest`]s pushed onto a [`ChangeQueue`]. Producers
//! (tile builders, the display controller) may enqueue from any thread; the
//! queue is drained only on the layer thread at a frame boundary, which is
//! the single place GPU resource lifetime changes.
//!
//! Requests are applied in FIFO submission order. A request carrying an
//! earliest-apply time (`when`) is held back, in order, until that time has
//! passed; because due entries still apply strictly FIFO, the last-submitted
//! request for a resource determines its final state.
//!
//! # Example
//!
//! ```ignore
//! use terrascene::scene::{ChangeOp, ChangeQueue, ChangeRequest, SceneStore};
//!
//! let queue = ChangeQueue::new();
//! queue.enqueue(ChangeRequest::new(ChangeOp::AddTexture(texture)));
//! queue.enqueue(ChangeRequest::new(ChangeOp::AddDrawable(drawable)));
//!
//! // On the layer thread, at the frame boundary:
//! let report = queue.drain(&mut store, std::time::Instant::now());
//! assert_eq!(report.applied, 2);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use crate::ident::Identifier;
use crate::scene::store::{SceneError, SceneStore};
use crate::scene::{Drawable, Texture};

/// Hook run against the store immediately before a request applies.
pub type PreExecuteHook = Box<dyn FnOnce(&SceneStore) + Send>;

/// A single atomic scene mutation.
#[derive(Debug)]
pub enum ChangeOp {
    /// Register a drawable (disabled until explicitly enabled).
    AddDrawable(Drawable),
    /// Unregister a drawable and release its resources.
    RemoveDrawable(Identifier),
    /// Switch a drawable's frame contribution on or off.
    EnableDrawable {
        /// Drawable to toggle.
        id: Identifier,
        /// New enabled state.
        enabled: bool,
    },
    /// Change a drawable's draw priority.
    SetDrawPriority {
        /// Drawable to reprioritize.
        id: Identifier,
        /// New priority value.
        priority: i32,
    },
    /// Register a texture.
    AddTexture(Texture),
    /// Release a texture (deferred while drawables still reference it).
    RemoveTexture(Identifier),
}

impl ChangeOp {
    /// The identifier of the resource this operation targets.
    pub fn target(&self) -> Identifier {
        match self {
            ChangeOp::AddDrawable(d) => d.id(),
            ChangeOp::RemoveDrawable(id) => *id,
            ChangeOp::EnableDrawable { id, .. } => *id,
            ChangeOp::SetDrawPriority { id, .. } => *id,
            ChangeOp::AddTexture(t) => t.id(),
            ChangeOp::RemoveTexture(id) => *id,
        }
    }

    /// Short operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeOp::AddDrawable(_) => "AddDrawable",
            ChangeOp::RemoveDrawable(_) => "RemoveDrawable",
            ChangeOp::EnableDrawable { .. } => "EnableDrawable",
            ChangeOp::SetDrawPriority { .. } => "SetDrawPriority",
            ChangeOp::AddTexture(_) => "AddTexture",
            ChangeOp::RemoveTexture(_) => "RemoveTexture",
        }
    }

    /// Whether this operation registers a new resource (add class).
    pub fn is_add(&self) -> bool {
        matches!(self, ChangeOp::AddDrawable(_) | ChangeOp::AddTexture(_))
    }
}

/// A queued scene mutation with optional delay and pre-execution hook.
pub struct ChangeRequest {
    op: ChangeOp,
    when: Option<Instant>,
    pre_execute: Option<PreExecuteHook>,
}

impl ChangeRequest {
    /// Creates a request applied at the next drain.
    pub fn new(op: ChangeOp) -> Self {
        Self { op, when: None, pre_execute: None }
    }

    /// Creates a request held back until `when` has passed.
    ///
    /// Supports staged effects such as fade-out before removal.
    pub fn at(op: ChangeOp, when: Instant) -> Self {
        Self { op, when: Some(when), pre_execute: None }
    }

    /// Attaches a hook run against the store just before the op applies.
    pub fn with_pre_execute(mut self, hook: PreExecuteHook) -> Self {
        self.pre_execute = Some(hook);
        self
    }

    /// The operation this request carries.
    pub fn op(&self) -> &ChangeOp {
        &self.op
    }

    /// The earliest-apply time, if delayed.
    pub fn when(&self) -> Option<Instant> {
        self.when
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.when {
            None => true,
            Some(when) => when <= now,
        }
    }
}

impl fmt::Debug for ChangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRequest")
            .field("op", &self.op.name())
            .field("target", &self.op.target())
            .field("delayed", &self.when.is_some())
            .finish()
    }
}

/// An operation the store rejected during a drain.
///
/// The op is handed back so the producer can recover (for example, evict and
/// re-enqueue after a resource exhaustion).
#[derive(Debug)]
pub struct FailedChange {
    /// The rejected operation.
    pub op: ChangeOp,
    /// Why the store rejected it.
    pub error: SceneError,
}

/// Summary of one drain pass.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Requests applied this pass.
    pub applied: usize,
    /// Requests left queued because their time has not passed.
    pub deferred: usize,
    /// Requests the store rejected, with their operations handed back.
    pub failed: Vec<FailedChange>,
}

impl DrainReport {
    /// True if nothing was applied, deferred, or rejected.
    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.deferred == 0 && self.failed.is_empty()
    }
}

/// Global sequence counter so debug output can show enqueue order.
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

struct QueuedChange {
    request: ChangeRequest,
    sequence: u64,
}

/// Ordered, thread-safe queue of pending scene mutations.
///
/// `enqueue` may be called from any thread; [`ChangeQueue::drain`] must be
/// called only from the layer thread.
pub struct ChangeQueue {
    entries: Mutex<VecDeque<QueuedChange>>,
}

impl ChangeQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Adds a request to the back of the queue. Callable from any thread.
    pub fn enqueue(&self, request: ChangeRequest) {
        let sequence = SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .push_back(QueuedChange { request, sequence });
    }

    /// Adds several requests, preserving their iteration order.
    pub fn enqueue_all(&self, requests: impl IntoIterator<Item = ChangeRequest>) {
        let mut entries = self.entries.lock();
        for request in requests {
            let sequence = SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed);
            entries.push_back(QueuedChange { request, sequence });
        }
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no requests are queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Applies every due request to the store, in submission order.
    ///
    /// Must be called only from the layer thread. Requests whose
    /// earliest-apply time has not passed are retained, still in order,
    /// ahead of anything enqueued during the drain. Rejected operations are
    /// returned in the report; draining an empty queue is a no-op.
    pub fn drain(&self, store: &mut SceneStore, now: Instant) -> DrainReport {
        let pending = std::mem::take(&mut *self.entries.lock());
        if pending.is_empty() {
            return DrainReport::default();
        }

        let mut report = DrainReport::default();
        let mut retained: VecDeque<QueuedChange> = VecDeque::new();

        for entry in pending {
            if !entry.request.is_due(now) {
                report.deferred += 1;
                retained.push_back(entry);
                continue;
            }

            let QueuedChange { request, sequence } = entry;
            let ChangeRequest { op, pre_execute, .. } = request;

            if let Some(hook) = pre_execute {
                hook(store);
            }

            match store.apply(op) {
                Ok(()) => report.applied += 1,
                Err((op, error)) => {
                    warn!(
                        op = op.name(),
                        target = %op.target(),
                        sequence,
                        %error,
                        "Change request rejected"
                    );
                    report.failed.push(FailedChange { op, error });
                }
            }
        }

        if !retained.is_empty() {
            let mut entries = self.entries.lock();
            // Not-yet-due entries predate anything enqueued mid-drain.
            for entry in retained.into_iter().rev() {
                entries.push_front(entry);
            }
        }

        report
    }
}

impl Default for ChangeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeQueue")
            .field("len", &self.len())
            .finish()
    }
}
