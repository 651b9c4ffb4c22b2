use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use crate::engine::Engine;
use crate::error::ConvertError;
use crate::reflect::{Reflect, TypeInfo};
use crate::util;

/// A synthesized conversion from one concrete type into another.
pub type Procedure =
    Arc<dyn Fn(&Engine, &mut dyn Reflect, &dyn Reflect) -> Result<(), ConvertError> + Send + Sync>;

/// Wrap a closure as a [`Procedure`].
pub fn procedure<F>(f: F) -> Procedure
where
    F: Fn(&Engine, &mut dyn Reflect, &dyn Reflect) -> Result<(), ConvertError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Cache key: exact destination and source types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypePair {
    pub dst: TypeId,
    pub src: TypeId,
}

impl TypePair {
    pub fn new(dst: &TypeInfo, src: &TypeInfo) -> Self {
        Self {
            dst: dst.id(),
            src: src.id(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  In-progress marker
// ════════════════════════════════════════════════════════════════

/// Result slot of a synthesis still running on some thread.
struct Pending {
    slot: Mutex<Option<Result<Procedure, ConvertError>>>,
    ready: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<Procedure, ConvertError> {
        let mut slot = util::lock(&self.slot, "pending procedure");
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = match self.ready.wait(slot) {
                Ok(guard) => guard,
                Err(poisoned) => {
                    tracing::warn!("pending procedure mutex was poisoned, recovering");
                    poisoned.into_inner()
                }
            };
        }
    }

    fn complete(&self, outcome: Result<Procedure, ConvertError>) {
        *util::lock(&self.slot, "pending procedure") = Some(outcome);
        self.ready.notify_all();
    }
}

/// Stands in for a procedure until synthesis finishes. Calls block until
/// then and forward to the real procedure, or return the synthesis error.
fn placeholder(pending: Arc<Pending>) -> Procedure {
    procedure(move |engine, dst, src| {
        let real = pending.wait()?;
        real(engine, dst, src)
    })
}

// ════════════════════════════════════════════════════════════════
//  ProcedureCache
// ════════════════════════════════════════════════════════════════

/// Procedures keyed by type pair, shared by every thread of an engine.
///
/// Entries are never evicted. A failed synthesis leaves no entry.
#[derive(Default)]
pub struct ProcedureCache {
    entries: RwLock<HashMap<TypePair, Procedure>>,
}

impl std::fmt::Debug for ProcedureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureCache")
            .field("len", &self.len())
            .finish()
    }
}

pub enum Claim<'a> {
    /// A procedure, possibly a placeholder for one still being built.
    Ready(Procedure),
    /// The caller won the race and must synthesize the procedure.
    Reserved(Reservation<'a>),
}

impl ProcedureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &TypePair) -> Option<Procedure> {
        util::read(&self.entries, "procedure cache").get(pair).cloned()
    }

    /// Look up `pair`, inserting a placeholder when absent.
    pub fn claim(&self, pair: TypePair) -> Claim<'_> {
        let mut entries = util::write(&self.entries, "procedure cache");
        if let Some(existing) = entries.get(&pair) {
            return Claim::Ready(existing.clone());
        }
        let pending = Arc::new(Pending::new());
        entries.insert(pair, placeholder(pending.clone()));
        Claim::Reserved(Reservation {
            cache: self,
            pair,
            pending,
            done: false,
        })
    }

    pub fn len(&self) -> usize {
        util::read(&self.entries, "procedure cache").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive right to publish the procedure for one type pair.
///
/// Dropping an unfinished reservation counts as a failed synthesis.
pub struct Reservation<'a> {
    cache: &'a ProcedureCache,
    pair: TypePair,
    pending: Arc<Pending>,
    done: bool,
}

impl Reservation<'_> {
    pub fn pair(&self) -> TypePair {
        self.pair
    }

    pub fn publish(mut self, procedure: Procedure) {
        util::write(&self.cache.entries, "procedure cache").insert(self.pair, procedure.clone());
        self.pending.complete(Ok(procedure));
        self.done = true;
    }

    pub fn fail(mut self, err: &ConvertError) {
        self.abandon(err.clone());
    }

    fn abandon(&mut self, err: ConvertError) {
        util::write(&self.cache.entries, "procedure cache").remove(&self.pair);
        self.pending.complete(Err(err));
        self.done = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!(?self.pair, "procedure synthesis abandoned");
            self.abandon(ConvertError::ShapeMismatch("abandoned procedure synthesis"));
        }
    }
}
