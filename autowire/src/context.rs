//! Application contexts: declarative groups of factory-method registrations.

use crate::container::Container;
use crate::core::{AnyArc, TypeKey, Upcast};
use crate::descriptor::Injectable;
use crate::error::{ResolveError, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Lifetime of a component produced by a context method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
  #[default]
  Singleton,
  Prototype,
}

/// A type whose methods produce the components of an application.
///
/// ```
/// use fibre_autowire::{
///   ApplicationContext, Autowired, Components, Container, Descriptor, Injectable,
/// };
///
/// struct Settings {
///   name: String,
/// }
///
/// struct Banner {
///   text: String,
/// }
///
/// fibre_autowire::injectable!(Settings, Banner);
///
/// struct AppContext {
///   settings: Autowired<Settings>,
/// }
///
/// impl Injectable for AppContext {
///   fn descriptor() -> Descriptor<Self> {
///     Descriptor::<Self>::new().field("settings", |ctx| &ctx.settings)
///   }
/// }
///
/// impl ApplicationContext for AppContext {
///   fn components(components: &mut Components<Self>) {
///     components.singleton(|_| Settings { name: "demo".into() });
///     components.prototype(|ctx| Banner {
///       text: format!("welcome to {}", ctx.settings.get().map_or("?", |s| s.name.as_str())),
///     });
///   }
/// }
///
/// let container = Container::new();
/// let ctx = container
///   .register_context(AppContext { settings: Default::default() })
///   .unwrap();
/// assert!(ctx.settings.is_wired());
/// assert_eq!(container.resolve::<Banner>().unwrap().text, "welcome to demo");
/// ```
pub trait ApplicationContext: Injectable {
  fn components(components: &mut Components<Self>);
}

type Binder<Ctx> = Box<dyn FnOnce(&Container, &Arc<Ctx>) -> Result<()>>;

struct ComponentMethod<Ctx> {
  registered: TypeKey,
  instance_type: TypeKey,
  scope: Scope,
  bind: Binder<Ctx>,
}

/// The factory methods declared by a context.
pub struct Components<Ctx> {
  methods: Vec<ComponentMethod<Ctx>>,
}

impl<Ctx: ApplicationContext> Components<Ctx> {
  pub fn new() -> Self {
    Self {
      methods: Vec::new(),
    }
  }

  /// A component built once, on first resolution.
  pub fn singleton<C, F>(&mut self, method: F) -> &mut Self
  where
    C: Injectable,
    F: Fn(&Ctx) -> C + Send + Sync + 'static,
  {
    self.component::<C, C, F>(Scope::Singleton, method)
  }

  /// A component built on every resolution.
  pub fn prototype<C, F>(&mut self, method: F) -> &mut Self
  where
    C: Injectable,
    F: Fn(&Ctx) -> C + Send + Sync + 'static,
  {
    self.component::<C, C, F>(Scope::Prototype, method)
  }

  /// A singleton component registered under the supertype `I`.
  pub fn singleton_as<I, C, F>(&mut self, method: F) -> &mut Self
  where
    I: ?Sized + Any + Send + Sync,
    C: Injectable + Upcast<I>,
    F: Fn(&Ctx) -> C + Send + Sync + 'static,
  {
    self.component::<I, C, F>(Scope::Singleton, method)
  }

  /// A prototype component registered under the supertype `I`.
  pub fn prototype_as<I, C, F>(&mut self, method: F) -> &mut Self
  where
    I: ?Sized + Any + Send + Sync,
    C: Injectable + Upcast<I>,
    F: Fn(&Ctx) -> C + Send + Sync + 'static,
  {
    self.component::<I, C, F>(Scope::Prototype, method)
  }

  pub fn component<I, C, F>(&mut self, scope: Scope, method: F) -> &mut Self
  where
    I: ?Sized + Any + Send + Sync,
    C: Injectable + Upcast<I>,
    F: Fn(&Ctx) -> C + Send + Sync + 'static,
  {
    let bind: Binder<Ctx> = Box::new(move |container: &Container, ctx: &Arc<Ctx>| -> Result<()> {
      let ctx = Arc::clone(ctx);
      let registration = container.register_factory::<I, C, _>(move |_| Ok(method(&ctx)));
      if scope == Scope::Prototype {
        registration.new_instance()?;
      }
      Ok(())
    });
    self.methods.push(ComponentMethod {
      registered: TypeKey::of::<I>(),
      instance_type: TypeKey::of::<C>(),
      scope,
      bind,
    });
    self
  }

  pub fn len(&self) -> usize {
    self.methods.len()
  }

  pub fn is_empty(&self) -> bool {
    self.methods.is_empty()
  }
}

impl<Ctx: ApplicationContext> Default for Components<Ctx> {
  fn default() -> Self {
    Self::new()
  }
}

impl<Ctx> fmt::Debug for Components<Ctx> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list()
      .entries(
        self
          .methods
          .iter()
          .map(|m| (m.registered, m.instance_type, m.scope)),
      )
      .finish()
  }
}

impl Container {
  /// Registers every component of `ctx`, registers `ctx` itself as an
  /// existing instance and finally autowires it.
  pub fn register_context<Ctx: ApplicationContext>(&self, ctx: Ctx) -> Result<Arc<Ctx>> {
    self.ingest_context(Arc::new(ctx))
  }

  /// Builds the context through its own constructors, then behaves like
  /// [`register_context`](Self::register_context).
  pub fn register_context_type<Ctx: ApplicationContext>(&self) -> Result<Arc<Ctx>> {
    let instance: AnyArc = crate::constructor::construct_erased::<Ctx>(self)?;
    let ctx = instance.downcast::<Ctx>().map_err(|_| ResolveError::TypeMismatch {
      type_name: std::any::type_name::<Ctx>(),
    })?;
    self.ingest_context(ctx)
  }

  fn ingest_context<Ctx: ApplicationContext>(&self, ctx: Arc<Ctx>) -> Result<Arc<Ctx>> {
    let mut components = Components::new();
    Ctx::components(&mut components);
    debug!(
      context = std::any::type_name::<Ctx>(),
      components = components.len(),
      "registering application context"
    );

    for method in components.methods {
      debug!(
        registered = %method.registered,
        instance_type = %method.instance_type,
        scope = ?method.scope,
        "registering context component"
      );
      (method.bind)(self, &ctx)?;
    }

    self.register_arc::<Ctx, Ctx>(Arc::clone(&ctx));
    self.autowire(ctx.as_ref())?;
    Ok(ctx)
  }
}
