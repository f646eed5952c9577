//! The main `Container` struct and its associated methods.

use crate::autowire;
use crate::constructor;
use crate::core::{self, AnyArc, AnyBox, TypeKey, Upcast};
use crate::descriptor::{Descriptor, Injectable, Qualifier};
use crate::error::{Error, ResolveError, Result};
use crate::factory::{InstanceFactory, InstanceFactoryParameters};
use crate::options::{InstantiationContext, Options};
use crate::registration::{AutowireFn, Entry, Registration};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A single lookup, as issued by the typed API and by the autowirer.
pub(crate) struct Request {
  pub(crate) target: TypeKey,
  pub(crate) qualifier: Option<Qualifier>,
  pub(crate) options: Options,
  pub(crate) fresh: bool,
}

/// The dependency-injection container.
///
/// It maps registered types (usually trait objects) to the concrete types
/// implementing them, creates instances in the configured scope and autowires
/// the dependency fields of freshly created instances. It is thread-safe:
/// registration and resolution may happen concurrently from any thread.
#[derive(Default)]
pub struct Container {
  registry: DashMap<TypeKey, Vec<Arc<Entry>>>,
  descriptors: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
  persistent: RwLock<Options>,
}

impl Container {
  /// Creates a new, empty `Container`.
  pub fn new() -> Self {
    Self::default()
  }

  // --- Persistent options ---

  /// Replaces the options applied to every subsequent call.
  pub fn set_persistent_options(&self, options: Options) {
    debug!(?options, "setting persistent options");
    *self.persistent.write() = options;
  }

  /// Resets the persistent options to the defaults.
  pub fn clear_persistent_options(&self) {
    *self.persistent.write() = Options::new();
  }

  pub fn persistent_options(&self) -> Options {
    *self.persistent.read()
  }

  fn effective(&self, options: Options) -> Options {
    options | self.persistent_options()
  }

  // --- Registration ---

  /// Registers `C` as an implementation of `I`, built through its
  /// constructors and autowired after creation. Singleton by default.
  pub fn register<I, C>(&self) -> Registration<C>
  where
    I: ?Sized + Any + Send + Sync,
    C: Injectable + Upcast<I>,
  {
    self.register_with::<I, C>(Options::new())
  }

  pub fn register_with<I, C>(&self, options: Options) -> Registration<C>
  where
    I: ?Sized + Any + Send + Sync,
    C: Injectable + Upcast<I>,
  {
    let mut params = InstanceFactoryParameters::new(TypeKey::of::<C>());
    params.constructor = Some(constructor::construct_erased::<C>);
    self.insert::<I, C>(params, Some(autowire::autowire_erased::<C>), options)
  }

  /// Registers `C` as an implementation of `I`, built by `factory`.
  /// Instances it returns are autowired like constructed ones.
  pub fn register_factory<I, C, F>(&self, factory: F) -> Registration<C>
  where
    I: ?Sized + Any + Send + Sync,
    C: Injectable + Upcast<I>,
    F: Fn(&Container) -> Result<C> + Send + Sync + 'static,
  {
    let mut params = InstanceFactoryParameters::new(TypeKey::of::<C>());
    params.factory_method = Some(Arc::new(move |container: &Container| -> Result<AnyArc> {
      let instance: AnyArc = Arc::new(factory(container)?);
      Ok(instance)
    }));
    params.constructor = Some(constructor::construct_erased::<C>);
    self.insert::<I, C>(params, Some(autowire::autowire_erased::<C>), Options::new())
  }

  /// Registers a fixed instance of `C` as an implementation of `I`.
  pub fn register_instance<I, C>(&self, instance: C) -> Registration<C>
  where
    I: ?Sized + Any + Send + Sync,
    C: Upcast<I>,
  {
    self.register_arc::<I, C>(Arc::new(instance))
  }

  /// Registers an already shared instance of `C` as an implementation of `I`.
  pub fn register_arc<I, C>(&self, instance: Arc<C>) -> Registration<C>
  where
    I: ?Sized + Any + Send + Sync,
    C: Upcast<I>,
  {
    let instance: AnyArc = instance;
    let mut params = InstanceFactoryParameters::new(TypeKey::of::<C>());
    params.existing_instance = Some(instance);
    self.insert::<I, C>(params, None, Options::new())
  }

  fn insert<I, C>(
    &self,
    params: InstanceFactoryParameters,
    autowire: Option<AutowireFn>,
    options: Options,
  ) -> Registration<C>
  where
    I: ?Sized + Any + Send + Sync,
    C: Upcast<I>,
  {
    let options = self.effective(options);
    let registered = TypeKey::of::<I>();
    let instance_type = TypeKey::of::<C>();
    let factory = Arc::new(InstanceFactory::new(params));
    let entry = Arc::new(Entry::new(
      registered,
      instance_type,
      core::cast::<I, C>,
      factory,
      autowire,
    ));
    if let Some(replaced) = self.upsert(Arc::clone(&entry)) {
      self.unlink(&replaced);
    }

    if registered != instance_type && options.adds_concrete_type_registration() {
      let link = Entry::linked(instance_type, core::cast::<C, C>, Arc::clone(&entry));
      self.upsert(Arc::new(link));
    }

    debug!(registered = %registered, instance_type = %instance_type, "registered type");
    Registration::new(entry)
  }

  // Replaces the entry for the same (registered, instance) pair, or appends.
  fn upsert(&self, entry: Arc<Entry>) -> Option<Arc<Entry>> {
    let mut entries = self.registry.entry(entry.registered_type()).or_default();
    match entries
      .iter()
      .position(|existing| existing.instance_type() == entry.instance_type())
    {
      Some(index) => Some(std::mem::replace(&mut entries[index], entry)),
      None => {
        entries.push(entry);
        None
      }
    }
  }

  // Drops the concrete-type aliases still serving a replaced entry.
  fn unlink(&self, replaced: &Arc<Entry>) {
    let key = replaced.instance_type();
    if let Some(mut entries) = self.registry.get_mut(&key) {
      entries.retain(|entry| !entry.links_to(replaced));
    }
    if self.registry.remove_if(&key, |_, entries| entries.is_empty()).is_some() {
      trace!(instance_type = %key, "removed stale concrete-type alias");
    }
  }

  pub fn contains<T: ?Sized + Any>(&self) -> bool {
    self.registration_count::<T>() > 0
  }

  pub fn registration_count<T: ?Sized + Any>(&self) -> usize {
    self
      .registry
      .get(&TypeKey::of::<T>())
      .map_or(0, |entries| entries.len())
  }

  /// Concrete types registered under `T`, in registration order.
  pub fn implementations<T: ?Sized + Any>(&self) -> Vec<TypeKey> {
    self.entries(TypeKey::of::<T>()).iter().map(|entry| entry.instance_type()).collect()
  }

  // --- Resolution ---

  /// Resolves the single registration of `T`.
  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.resolve_with::<T>(Options::new())?.ok_or_else(|| {
      ResolveError::NotRegistered {
        type_name: std::any::type_name::<T>(),
      }
      .into()
    })
  }

  /// Resolves the single registration of `T`; with `no_resolve_exception` a
  /// missing registration yields `None`.
  pub fn resolve_with<T: ?Sized + Any + Send + Sync>(
    &self,
    options: Options,
  ) -> Result<Option<Arc<T>>> {
    let request = Request {
      target: TypeKey::of::<T>(),
      qualifier: None,
      options,
      fresh: false,
    };
    self.resolve_typed::<T>(request, InstantiationContext::AUTOWIRE)
  }

  /// Resolves the registration of `T` whose concrete type is `Q`.
  ///
  /// With `register_before_resolving`, a missing `(T, Q)` registration is
  /// created on the spot.
  pub fn resolve_qualified<T, Q>(&self, options: Options) -> Result<Option<Arc<T>>>
  where
    T: ?Sized + Any + Send + Sync,
    Q: Injectable + Upcast<T>,
  {
    let request = Request {
      target: TypeKey::of::<T>(),
      qualifier: Some(Qualifier {
        key: TypeKey::of::<Q>(),
        registrar: auto_register::<T, Q>,
      }),
      options,
      fresh: false,
    };
    self.resolve_typed::<T>(request, InstantiationContext::AUTOWIRE)
  }

  /// Resolves `T` without autowiring the instance if it gets created by
  /// this call. Meant for bootstrap code.
  pub fn resolve_unwired<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let request = Request {
      target: TypeKey::of::<T>(),
      qualifier: None,
      options: Options::new(),
      fresh: false,
    };
    self.resolve_typed::<T>(request, InstantiationContext::BARE)?.ok_or_else(|| {
      ResolveError::NotRegistered {
        type_name: std::any::type_name::<T>(),
      }
      .into()
    })
  }

  /// Resolves one instance per concrete type registered under `T`.
  pub fn resolve_all<T: ?Sized + Any + Send + Sync>(&self) -> Result<Vec<Arc<T>>> {
    self.resolve_all_with::<T>(Options::new())
  }

  /// Like [`resolve_all`](Self::resolve_all); with `no_resolve_exception` an
  /// unregistered `T` yields an empty vector instead of an error.
  pub fn resolve_all_with<T: ?Sized + Any + Send + Sync>(
    &self,
    options: Options,
  ) -> Result<Vec<Arc<T>>> {
    self
      .resolve_all_erased(TypeKey::of::<T>(), options)?
      .into_iter()
      .map(|value| downcast::<T>(value))
      .collect()
  }

  fn resolve_typed<T: ?Sized + Any + Send + Sync>(
    &self,
    request: Request,
    context: InstantiationContext,
  ) -> Result<Option<Arc<T>>> {
    match self.resolve_in(request, context)? {
      Some(value) => downcast::<T>(value).map(Some),
      None => Ok(None),
    }
  }

  // --- Autowiring ---

  /// Populates the unset dependency fields of `instance` from this container.
  pub fn autowire<T: Injectable>(&self, instance: &T) -> Result<()> {
    autowire::autowire(self, instance)
  }

  // --- Internals shared with the injector and the autowirer ---

  pub(crate) fn descriptor<T: Injectable>(&self) -> Result<Arc<Descriptor<T>>> {
    let type_id = TypeId::of::<T>();
    let cached = self.descriptors.get(&type_id).map(|entry| Arc::clone(entry.value()));
    let erased = match cached {
      Some(erased) => erased,
      None => {
        // Built outside the map lock; a concurrent builder may win the insert.
        let built: Arc<dyn Any + Send + Sync> = Arc::new(T::descriptor());
        Arc::clone(self.descriptors.entry(type_id).or_insert(built).value())
      }
    };
    erased.downcast::<Descriptor<T>>().map_err(|_| {
      ResolveError::TypeMismatch {
        type_name: std::any::type_name::<T>(),
      }
      .into()
    })
  }

  pub(crate) fn resolve_erased(&self, request: Request) -> Result<Option<AnyBox>> {
    self.resolve_in(request, InstantiationContext::AUTOWIRE)
  }

  pub(crate) fn resolve_argument(&self, target: TypeKey) -> Result<AnyBox> {
    let request = Request {
      target,
      qualifier: None,
      options: Options::new(),
      fresh: false,
    };
    self
      .resolve_in(request, InstantiationContext::AUTOWIRE)?
      .ok_or_else(|| ResolveError::NotRegistered { type_name: target.name() }.into())
  }

  fn resolve_in(&self, request: Request, context: InstantiationContext) -> Result<Option<AnyBox>> {
    trace!(requested = %request.target, qualifier = ?request.qualifier, "resolving");
    let entry = match self.lookup(&request)? {
      Some(entry) => entry,
      None => return Ok(None),
    };
    let instance = if request.fresh {
      entry.fresh_instance(self, context)?
    } else {
      entry.get_instance(self, context)?
    };
    cast_entry(&entry, instance).map(Some)
  }

  pub(crate) fn resolve_all_erased(&self, target: TypeKey, options: Options) -> Result<Vec<AnyBox>> {
    let options = self.effective(options);
    let entries = self.entries(target);
    if entries.is_empty() {
      if options.suppresses_resolve_errors() {
        return Ok(Vec::new());
      }
      return Err(ResolveError::NotRegistered { type_name: target.name() }.into());
    }
    trace!(requested = %target, count = entries.len(), "resolving all");
    entries
      .iter()
      .map(|entry| {
        let instance = entry.get_instance(self, InstantiationContext::AUTOWIRE)?;
        cast_entry(entry, instance)
      })
      .collect()
  }

  // Clones the entries out so no map lock is held while instances are built.
  fn entries(&self, target: TypeKey) -> Vec<Arc<Entry>> {
    self
      .registry
      .get(&target)
      .map(|entries| entries.value().clone())
      .unwrap_or_default()
  }

  fn find(&self, target: TypeKey, qualifier: Option<&Qualifier>) -> Result<Option<Arc<Entry>>> {
    let entries = self.entries(target);
    match qualifier {
      Some(qualifier) => Ok(
        entries
          .into_iter()
          .find(|entry| entry.instance_type() == qualifier.key),
      ),
      None => match entries.len() {
        0 => Ok(None),
        1 => Ok(entries.into_iter().next()),
        _ => Err(
          ResolveError::Ambiguous {
            type_name: target.name(),
            candidates: entries.iter().map(|entry| entry.instance_type().name()).collect(),
          }
          .into(),
        ),
      },
    }
  }

  fn lookup(&self, request: &Request) -> Result<Option<Arc<Entry>>> {
    let options = self.effective(request.options);
    if let Some(entry) = self.find(request.target, request.qualifier.as_ref())? {
      return Ok(Some(entry));
    }

    if let Some(qualifier) = &request.qualifier {
      if options.registers_before_resolving() {
        debug!(requested = %request.target, qualifier = %qualifier.key, "registering before resolving");
        (qualifier.registrar)(self);
        if let Some(entry) = self.find(request.target, Some(qualifier))? {
          return Ok(Some(entry));
        }
      }
    }

    if options.suppresses_resolve_errors() {
      trace!(requested = %request.target, "lookup miss suppressed");
      return Ok(None);
    }
    Err(match &request.qualifier {
      Some(qualifier) if self.registry.contains_key(&request.target) => ResolveError::QualifierNotFound {
        type_name: request.target.name(),
        qualifier: qualifier.key.name(),
      },
      _ => ResolveError::NotRegistered {
        type_name: request.target.name(),
      },
    }
    .into())
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("registered_types", &self.registry.len())
      .field("persistent_options", &self.persistent_options())
      .finish()
  }
}

/// Registers `(I, C)` on behalf of a qualified lookup miss.
pub(crate) fn auto_register<I, C>(container: &Container)
where
  I: ?Sized + Any + Send + Sync,
  C: Injectable + Upcast<I>,
{
  container.register::<I, C>();
}

fn cast_entry(entry: &Entry, instance: AnyArc) -> Result<AnyBox> {
  entry.cast(instance).ok_or_else(|| {
    ResolveError::TypeMismatch {
      type_name: entry.registered_type().name(),
    }
    .into()
  })
}

fn downcast<T: ?Sized + Any + Send + Sync>(value: AnyBox) -> Result<Arc<T>> {
  core::unbox::<T>(value).ok_or_else(|| {
    Error::from(ResolveError::TypeMismatch {
      type_name: std::any::type_name::<T>(),
    })
  })
}
