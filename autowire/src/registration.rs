//! Registry entries and the fluent handle returned by `register`.

use crate::container::Container;
use crate::core::{AnyArc, AnyBox, Caster, ResolutionGuard, TypeKey};
use crate::error::{Error, RegistrationError, Result};
use crate::factory::{InstanceFactory, Origin, Produced};
use crate::options::InstantiationContext;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type AutowireFn = fn(&Container, &AnyArc) -> Result<()>;

enum Source {
  Own {
    factory: Arc<InstanceFactory>,
    autowire: Option<AutowireFn>,
  },
  Linked(Arc<Entry>),
}

/// A binding from a registered type to the factory serving it.
pub(crate) struct Entry {
  registered: TypeKey,
  instance_type: TypeKey,
  cast: Caster,
  source: Source,
}

impl Entry {
  pub(crate) fn new(
    registered: TypeKey,
    instance_type: TypeKey,
    cast: Caster,
    factory: Arc<InstanceFactory>,
    autowire: Option<AutowireFn>,
  ) -> Self {
    Self {
      registered,
      instance_type,
      cast,
      source: Source::Own { factory, autowire },
    }
  }

  /// An alias whose instances all come from `target`.
  pub(crate) fn linked(registered: TypeKey, cast: Caster, target: Arc<Entry>) -> Self {
    Self {
      registered,
      instance_type: target.instance_type,
      cast,
      source: Source::Linked(target),
    }
  }

  pub(crate) fn registered_type(&self) -> TypeKey {
    self.registered
  }

  pub(crate) fn instance_type(&self) -> TypeKey {
    self.instance_type
  }

  /// The factory that ultimately serves this entry.
  pub(crate) fn factory(&self) -> &Arc<InstanceFactory> {
    match &self.source {
      Source::Own { factory, .. } => factory,
      Source::Linked(target) => target.factory(),
    }
  }

  pub(crate) fn get_instance(
    &self,
    container: &Container,
    context: InstantiationContext,
  ) -> Result<AnyArc> {
    match &self.source {
      Source::Linked(target) => target.get_instance(container, context),
      Source::Own { factory, autowire } => {
        let produced = factory.get_instance(container)?;
        self.finish(container, context, factory, *autowire, produced)
      }
    }
  }

  /// A new instance regardless of the registered scope.
  pub(crate) fn fresh_instance(
    &self,
    container: &Container,
    context: InstantiationContext,
  ) -> Result<AnyArc> {
    match &self.source {
      Source::Linked(target) => target.fresh_instance(container, context),
      Source::Own { factory, autowire } => {
        let produced = factory.construct_fresh(container)?;
        self.finish(container, context, factory, *autowire, produced)
      }
    }
  }

  fn finish(
    &self,
    container: &Container,
    context: InstantiationContext,
    factory: &InstanceFactory,
    autowire: Option<AutowireFn>,
    produced: Produced,
  ) -> Result<AnyArc> {
    let autowire = match autowire {
      Some(autowire) if context.autowire_instance => autowire,
      _ => return Ok(produced.instance),
    };
    match produced.origin {
      Origin::Existing => {}
      Origin::Transient => {
        let _guard = ResolutionGuard::enter(factory.id(), self.instance_type, false)?;
        autowire(container, &produced.instance)?;
      }
      // A singleton being wired higher up the stack (or on another thread)
      // is handed out as is; one whose wiring failed is wired again.
      Origin::Singleton if factory.begin_wiring() => {
        let wired = ResolutionGuard::enter(factory.id(), self.instance_type, true)
          .map_err(Error::from)
          .and_then(|_guard| autowire(container, &produced.instance));
        factory.end_wiring(wired.is_ok());
        wired?;
      }
      Origin::Singleton => {}
    }
    Ok(produced.instance)
  }

  /// Whether this entry is an alias of `target`.
  pub(crate) fn links_to(&self, target: &Arc<Entry>) -> bool {
    matches!(&self.source, Source::Linked(linked) if Arc::ptr_eq(linked, target))
  }

  pub(crate) fn cast(&self, instance: AnyArc) -> Option<AnyBox> {
    (self.cast)(instance)
  }
}

impl fmt::Debug for Entry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut debug = f.debug_struct("Entry");
    debug
      .field("registered", &self.registered)
      .field("instance_type", &self.instance_type);
    match &self.source {
      Source::Own { factory, .. } => debug.field("factory", factory),
      Source::Linked(target) => debug.field("linked_to", &target.registered),
    };
    debug.finish()
  }
}

/// Handle to a registration, used to choose its scope.
///
/// Scope changes are only accepted until the registration hands out its
/// first shared instance (see [`RegistrationError::ScopeFrozen`]).
pub struct Registration<C> {
  entry: Arc<Entry>,
  _marker: PhantomData<fn() -> C>,
}

impl<C: Any + Send + Sync> Registration<C> {
  pub(crate) fn new(entry: Arc<Entry>) -> Self {
    Self {
      entry,
      _marker: PhantomData,
    }
  }

  /// Every resolution returns the same lazily created instance.
  pub fn single_instance(&self) -> Result<&Self, RegistrationError> {
    self.entry.factory().single_instance()?;
    Ok(self)
  }

  /// Every resolution constructs a new instance.
  pub fn new_instance(&self) -> Result<&Self, RegistrationError> {
    self.entry.factory().new_instance()?;
    Ok(self)
  }

  /// Every resolution returns `instance`, which is never autowired.
  pub fn existing_instance(&self, instance: C) -> Result<&Self, RegistrationError> {
    self.existing_arc(Arc::new(instance))
  }

  /// Like [`existing_instance`](Self::existing_instance), for an instance
  /// that is already shared.
  pub fn existing_arc(&self, instance: Arc<C>) -> Result<&Self, RegistrationError> {
    self.entry.factory().existing_instance(instance)?;
    Ok(self)
  }

  pub fn registered_type(&self) -> TypeKey {
    self.entry.registered_type()
  }

  pub fn instance_type(&self) -> TypeKey {
    self.entry.instance_type()
  }

  pub fn is_singleton(&self) -> bool {
    self.entry.factory().creates_singleton()
  }
}

impl<C> Clone for Registration<C> {
  fn clone(&self) -> Self {
    Self {
      entry: Arc::clone(&self.entry),
      _marker: PhantomData,
    }
  }
}

impl<C> fmt::Debug for Registration<C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Registration").field(&self.entry).finish()
  }
}
