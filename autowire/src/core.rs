//! Core, mostly non-public building blocks shared by the container modules.

use crate::error::InstanceCreationError;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// A type-erased instance as stored by the container.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// A type-erased `Arc<T>` handed back to typed callers, which downcast it.
pub(crate) type AnyBox = Box<dyn Any + Send + Sync>;

/// Turns a stored concrete instance into the boxed `Arc` of a registered type.
pub(crate) type Caster = fn(AnyArc) -> Option<AnyBox>;

thread_local! {
  // Factories whose instances are being constructed or autowired on this
  // thread, innermost last.
  static IN_PROGRESS: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

#[derive(Clone, Copy)]
struct Frame {
  factory: u64,
  shared: bool,
}

/// Identity of a type used as a registry key.
///
/// Equality and hashing only consider the `TypeId`; the name is carried for
/// error messages and logs.
#[derive(Clone, Copy)]
pub struct TypeKey {
  id: TypeId,
  name: &'static str,
}

impl TypeKey {
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }

  pub fn id(&self) -> TypeId {
    self.id
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl PartialEq for TypeKey {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeKey({})", self.name)
  }
}

impl fmt::Display for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// Conversion of a shared concrete instance into a shared `I`.
///
/// Every type trivially upcasts to itself. Implement it (usually through the
/// [`implements!`](crate::implements) macro) for each trait object a concrete
/// type should be registered under.
pub trait Upcast<I: ?Sized>: Any + Send + Sync {
  fn upcast(self: Arc<Self>) -> Arc<I>;
}

impl<T: Any + Send + Sync> Upcast<T> for T {
  fn upcast(self: Arc<Self>) -> Arc<T> {
    self
  }
}

pub(crate) fn cast<I, C>(instance: AnyArc) -> Option<AnyBox>
where
  I: ?Sized + Any + Send + Sync,
  C: Upcast<I>,
{
  let concrete = instance.downcast::<C>().ok()?;
  let abstract_ref: Arc<I> = concrete.upcast();
  Some(Box::new(abstract_ref))
}

pub(crate) fn unbox<T: ?Sized + Any + Send + Sync>(value: AnyBox) -> Option<Arc<T>> {
  value.downcast::<Arc<T>>().ok().map(|arc_in_a_box| *arc_in_a_box)
}

/// An RAII marker for a factory whose instance is being constructed or
/// autowired on the current thread.
///
/// Entering a factory that is already marked means the object graph loops
/// back onto something that is not finished yet, which is reported as a
/// circular dependency instead of recursing forever.
pub(crate) struct ResolutionGuard {
  factory: u64,
}

impl ResolutionGuard {
  pub(crate) fn enter(
    factory: u64,
    key: TypeKey,
    shared: bool,
  ) -> Result<Self, InstanceCreationError> {
    IN_PROGRESS.with(|stack| {
      let mut stack = stack.borrow_mut();
      if stack.iter().any(|frame| frame.factory == factory) {
        return Err(InstanceCreationError::CircularDependency {
          type_name: key.name(),
        });
      }
      stack.push(Frame { factory, shared });
      Ok(Self { factory })
    })
  }

  /// Checks that handing out the already cached instance of `factory` does
  /// not close a cycle running through a transient instance.
  ///
  /// Cycles made only of shared instances are fine: the cached instance is
  /// complete enough to be referenced and its own autowiring finishes once
  /// the stack unwinds.
  pub(crate) fn check_reentry(factory: u64, key: TypeKey) -> Result<(), InstanceCreationError> {
    IN_PROGRESS.with(|stack| {
      let stack = stack.borrow();
      match stack.iter().rposition(|frame| frame.factory == factory) {
        Some(position) if stack[position + 1..].iter().any(|frame| !frame.shared) => {
          Err(InstanceCreationError::CircularDependency {
            type_name: key.name(),
          })
        }
        _ => Ok(()),
      }
    })
  }

  #[cfg(test)]
  pub(crate) fn is_active(factory: u64) -> bool {
    IN_PROGRESS.with(|stack| stack.borrow().iter().any(|frame| frame.factory == factory))
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    IN_PROGRESS.with(|stack| {
      let mut stack = stack.borrow_mut();
      if let Some(position) = stack.iter().rposition(|frame| frame.factory == self.factory) {
        stack.remove(position);
      }
    });
  }
}

// --- Cross-thread singleton builds ---

/// Which thread builds which singleton, and which singleton each blocked
/// thread waits for. Shared by every container of the process since factory
/// ids are globally unique.
#[derive(Default)]
struct BuildGraph {
  owners: HashMap<u64, ThreadId>,
  waiting: HashMap<ThreadId, u64>,
}

impl BuildGraph {
  // Follows the wait-for chain starting at `owner`; reaching `me` means
  // blocking would never end.
  fn closes_cycle(&self, owner: ThreadId, me: ThreadId) -> bool {
    let mut current = owner;
    for _ in 0..=self.owners.len() {
      if current == me {
        return true;
      }
      match self.waiting.get(&current).and_then(|factory| self.owners.get(factory)) {
        Some(next) => current = *next,
        None => return false,
      }
    }
    false
  }
}

struct Builds {
  graph: Mutex<BuildGraph>,
  released: Condvar,
}

static BUILDS: Lazy<Builds> = Lazy::new(|| Builds {
  graph: Mutex::new(BuildGraph::default()),
  released: Condvar::new(),
});

/// Outcome of [`claim_build`].
pub(crate) enum Claim<T> {
  /// Another thread finished the build while this one waited.
  Ready(T),
  /// This thread owns the build until the ticket drops.
  Build(BuildTicket),
}

/// Exclusive right to build the singleton of one factory.
pub(crate) struct BuildTicket {
  factory: u64,
}

impl Drop for BuildTicket {
  fn drop(&mut self) {
    BUILDS.graph.lock().owners.remove(&self.factory);
    BUILDS.released.notify_all();
  }
}

/// Claims the build of `factory`'s singleton, waiting while another thread
/// builds it.
///
/// `ready` is polled under the graph lock; the builder must publish its
/// instance before dropping its ticket. Waiting on a thread that itself
/// (transitively) waits on this one fails with `CircularDependency`.
pub(crate) fn claim_build<T>(
  factory: u64,
  key: TypeKey,
  ready: impl Fn() -> Option<T>,
) -> Result<Claim<T>, InstanceCreationError> {
  let me = thread::current().id();
  let mut graph = BUILDS.graph.lock();
  loop {
    if let Some(value) = ready() {
      return Ok(Claim::Ready(value));
    }
    let owner = match graph.owners.get(&factory) {
      Some(owner) => *owner,
      None => {
        graph.owners.insert(factory, me);
        return Ok(Claim::Build(BuildTicket { factory }));
      }
    };
    if graph.closes_cycle(owner, me) {
      debug!(instance_type = %key, "singleton build would wait on its own thread");
      return Err(InstanceCreationError::CircularDependency {
        type_name: key.name(),
      });
    }
    graph.waiting.insert(me, factory);
    BUILDS.released.wait(&mut graph);
    graph.waiting.remove(&me);
  }
}
