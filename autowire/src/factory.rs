//! Instance production for a single registration: singleton cache, transient
//! construction, fixed existing instance or delegation to a factory method.

use crate::container::Container;
use crate::core::{claim_build, AnyArc, Claim, ResolutionGuard, TypeKey};
use crate::error::{InstanceCreationError, RegistrationError, Result};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) type FactoryMethod = Arc<dyn Fn(&Container) -> Result<AnyArc> + Send + Sync>;
pub(crate) type ConstructFn = fn(&Container) -> Result<AnyArc>;

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub(crate) struct InstanceFactoryParameters {
  pub(crate) instance_type: TypeKey,
  pub(crate) creates_singleton: bool,
  pub(crate) existing_instance: Option<AnyArc>,
  pub(crate) factory_method: Option<FactoryMethod>,
  pub(crate) constructor: Option<ConstructFn>,
}

impl InstanceFactoryParameters {
  pub(crate) fn new(instance_type: TypeKey) -> Self {
    Self {
      instance_type,
      creates_singleton: true,
      existing_instance: None,
      factory_method: None,
      constructor: None,
    }
  }

  fn construct(&self, container: &Container) -> Result<AnyArc> {
    if let Some(method) = &self.factory_method {
      return method(container);
    }
    if let Some(constructor) = self.constructor {
      return constructor(container);
    }
    Err(
      InstanceCreationError::NoStrategy {
        type_name: self.instance_type.name(),
      }
      .into(),
    )
  }
}

impl fmt::Debug for InstanceFactoryParameters {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InstanceFactoryParameters")
      .field("instance_type", &self.instance_type)
      .field("creates_singleton", &self.creates_singleton)
      .field("existing_instance", &self.existing_instance.is_some())
      .field("factory_method", &self.factory_method.is_some())
      .field("constructor", &self.constructor.is_some())
      .finish()
  }
}

/// Where a handed-out instance comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
  /// Built by this call and owned by the caller.
  Transient,
  /// The cached singleton, possibly built by this call.
  Singleton,
  /// The fixed instance supplied at registration.
  Existing,
}

pub(crate) struct Produced {
  pub(crate) instance: AnyArc,
  pub(crate) origin: Origin,
}

// Autowiring progress of a singleton.
const UNWIRED: u8 = 0;
const WIRING: u8 = 1;
const WIRED: u8 = 2;
const FAILED: u8 = 3;

pub(crate) struct InstanceFactory {
  id: u64,
  params: RwLock<InstanceFactoryParameters>,
  singleton: OnceCell<AnyArc>,
  wiring: AtomicU8,
  // Set once a shared (singleton or existing) instance has been handed out.
  frozen: AtomicBool,
}

impl InstanceFactory {
  pub(crate) fn new(params: InstanceFactoryParameters) -> Self {
    Self {
      id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
      params: RwLock::new(params),
      singleton: OnceCell::new(),
      wiring: AtomicU8::new(UNWIRED),
      frozen: AtomicBool::new(false),
    }
  }

  pub(crate) fn id(&self) -> u64 {
    self.id
  }

  pub(crate) fn creates_singleton(&self) -> bool {
    self.params.read().creates_singleton
  }

  /// Returns the instance governed by the current scope parameters.
  ///
  /// Newly constructed instances are not autowired here.
  pub(crate) fn get_instance(&self, container: &Container) -> Result<Produced> {
    let params = self.params.read().clone();

    if let Some(existing) = &params.existing_instance {
      self.freeze();
      return Ok(Produced {
        instance: Arc::clone(existing),
        origin: Origin::Existing,
      });
    }

    if !params.creates_singleton {
      return self.construct_fresh_with(&params, container);
    }

    if let Some(cached) = self.singleton.get() {
      ResolutionGuard::check_reentry(self.id, params.instance_type)?;
      return Ok(self.hand_out(Arc::clone(cached)));
    }

    // Same-thread re-entry is caught here, cross-thread waits by the claim.
    let _guard = ResolutionGuard::enter(self.id, params.instance_type, true)?;
    let claim = claim_build(self.id, params.instance_type, || self.singleton.get().cloned())?;
    let ticket = match claim {
      Claim::Ready(instance) => return Ok(self.hand_out(instance)),
      Claim::Build(ticket) => ticket,
    };

    debug!(instance_type = %params.instance_type, "creating singleton instance");
    let built = params.construct(container)?;
    let instance = Arc::clone(self.singleton.get_or_init(|| built));
    drop(ticket);
    Ok(self.hand_out(instance))
  }

  fn hand_out(&self, instance: AnyArc) -> Produced {
    self.freeze();
    Produced {
      instance,
      origin: Origin::Singleton,
    }
  }

  fn freeze(&self) {
    self.frozen.store(true, Ordering::Release);
  }

  /// Builds a new instance with the configured strategy, ignoring scope.
  pub(crate) fn construct_fresh(&self, container: &Container) -> Result<Produced> {
    let params = self.params.read().clone();
    self.construct_fresh_with(&params, container)
  }

  fn construct_fresh_with(
    &self,
    params: &InstanceFactoryParameters,
    container: &Container,
  ) -> Result<Produced> {
    let _guard = ResolutionGuard::enter(self.id, params.instance_type, false)?;
    Ok(Produced {
      instance: params.construct(container)?,
      origin: Origin::Transient,
    })
  }

  // --- Singleton wiring state ---

  /// Marks the singleton as being autowired, unless it is already wired or
  /// another visit is wiring it. A failed wiring may be retried.
  pub(crate) fn begin_wiring(&self) -> bool {
    self
      .wiring
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
        matches!(state, UNWIRED | FAILED).then_some(WIRING)
      })
      .is_ok()
  }

  pub(crate) fn end_wiring(&self, succeeded: bool) {
    let state = if succeeded { WIRED } else { FAILED };
    self.wiring.store(state, Ordering::Release);
  }

  // --- Scope mutators ---

  pub(crate) fn single_instance(&self) -> Result<(), RegistrationError> {
    self.update(|params| params.creates_singleton = true)
  }

  pub(crate) fn new_instance(&self) -> Result<(), RegistrationError> {
    self.update(|params| {
      params.creates_singleton = false;
      params.existing_instance = None;
    })
  }

  pub(crate) fn existing_instance(&self, instance: AnyArc) -> Result<(), RegistrationError> {
    self.update(move |params| {
      params.creates_singleton = true;
      params.existing_instance = Some(instance);
    })
  }

  fn update(
    &self,
    change: impl FnOnce(&mut InstanceFactoryParameters),
  ) -> Result<(), RegistrationError> {
    let mut params = self.params.write();
    if self.frozen.load(Ordering::Acquire) {
      warn!(
        instance_type = %params.instance_type,
        "rejected scope change on a registration that already handed out a shared instance"
      );
      return Err(RegistrationError::ScopeFrozen {
        type_name: params.instance_type.name(),
      });
    }
    change(&mut params);
    Ok(())
  }
}

impl fmt::Debug for InstanceFactory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InstanceFactory")
      .field("id", &self.id)
      .field("params", &*self.params.read())
      .field("cached", &self.singleton.get().is_some())
      .finish()
  }
}
