//! Statically declared injection metadata.
//!
//! Each injectable type describes itself once through [`Injectable::descriptor`]:
//! its constructors in declaration order, the fields the autowirer populates
//! and the embedded ancestors whose own fields are walked as well. The
//! container caches the descriptor per type, so nothing is re-derived on the
//! resolution path.

use crate::container::{self, Container};
use crate::core::{TypeKey, Upcast};
use crate::error::{InstanceCreationError, Result};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A type the container knows how to construct and autowire.
pub trait Injectable: Any + Send + Sync + Sized {
  fn descriptor() -> Descriptor<Self>;
}

/// Injection metadata of `T`.
pub struct Descriptor<T> {
  pub(crate) constructors: Vec<Constructor<T>>,
  pub(crate) fields: Vec<FieldDecl<T>>,
  pub(crate) ancestors: Vec<Ancestor<T>>,
}

impl<T: Injectable> Descriptor<T> {
  /// An empty descriptor: no constructors, no dependency fields.
  ///
  /// Such a type can only be registered through a factory method or as an
  /// existing instance.
  pub fn new() -> Self {
    Self {
      constructors: Vec::new(),
      fields: Vec::new(),
      ancestors: Vec::new(),
    }
  }

  /// A descriptor whose only constructor is `T::default()`.
  pub fn with_default() -> Self
  where
    T: Default,
  {
    Self::new().constructor(Constructor::new(|_| Ok(T::default())))
  }

  /// Appends a constructor. Declaration order drives constructor selection.
  pub fn constructor(mut self, constructor: Constructor<T>) -> Self {
    self.constructors.push(constructor);
    self
  }

  /// Declares a dependency field with default injection settings.
  pub fn field<S: TypedSlot>(self, name: &'static str, accessor: fn(&T) -> &S) -> Self {
    self.field_with(name, accessor, Inject::new())
  }

  /// Declares a dependency field with explicit injection settings.
  pub fn field_with<S: TypedSlot>(
    mut self,
    name: &'static str,
    accessor: fn(&T) -> &S,
    inject: Inject<S::Target>,
  ) -> Self {
    self.fields.push(FieldDecl {
      name,
      dependency: Dependency {
        target: TypeKey::of::<S::Target>(),
        qualifier: inject.qualifier,
        optional: inject.optional,
        is_array: S::IS_ARRAY,
        force_new: inject.new_instance,
      },
      slot: erase_slot(move |owner: &T| accessor(owner) as &dyn Slot),
    });
    self
  }

  /// Declares an embedded ancestor whose own dependency fields are autowired
  /// after the fields of `T`.
  pub fn extends<B: Injectable>(mut self, accessor: fn(&T) -> &B) -> Self {
    self.ancestors.push(Ancestor {
      type_key: TypeKey::of::<B>(),
      autowire: Box::new(move |container: &Container, owner: &T| {
        crate::autowire::autowire(container, accessor(owner))
      }),
    });
    self
  }

  pub fn constructor_count(&self) -> usize {
    self.constructors.len()
  }

  pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.fields.iter().map(|field| field.name)
  }
}

impl<T: Injectable> Default for Descriptor<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for Descriptor<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Descriptor")
      .field("type", &std::any::type_name::<T>())
      .field("constructors", &self.constructors.len())
      .field("fields", &self.fields)
      .field("ancestors", &self.ancestors.iter().map(|a| a.type_key).collect::<Vec<_>>())
      .finish()
  }
}

// --- Constructors ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Param {
  Dependency(TypeKey),
  Primitive(TypeKey),
}

impl Param {
  pub(crate) fn is_resolvable(&self) -> bool {
    matches!(self, Param::Dependency(_))
  }
}

/// One way of building `T`, with the parameters it needs.
///
/// The build closure receives the resolved dependency arguments in the order
/// they were declared with [`param`](Constructor::param).
pub struct Constructor<T> {
  pub(crate) params: Vec<Param>,
  pub(crate) build: Box<dyn Fn(&mut Args) -> Result<T> + Send + Sync>,
}

impl<T: 'static> Constructor<T> {
  pub fn new(build: impl Fn(&mut Args) -> Result<T> + Send + Sync + 'static) -> Self {
    Self {
      params: Vec::new(),
      build: Box::new(build),
    }
  }

  /// A parameter resolved from the container by type.
  pub fn param<D: ?Sized + Any + Send + Sync>(mut self) -> Self {
    self.params.push(Param::Dependency(TypeKey::of::<D>()));
    self
  }

  /// A plain value parameter the container cannot supply. A constructor with
  /// one of these is never selected for injection.
  pub fn primitive<P: Any>(mut self) -> Self {
    self.params.push(Param::Primitive(TypeKey::of::<P>()));
    self
  }

  pub fn arity(&self) -> usize {
    self.params.len()
  }
}

/// Resolved constructor arguments, consumed in declaration order.
pub struct Args {
  owner: &'static str,
  values: std::vec::IntoIter<Box<dyn Any + Send + Sync>>,
  position: usize,
}

impl Args {
  pub(crate) fn new(owner: &'static str, values: Vec<Box<dyn Any + Send + Sync>>) -> Self {
    Self {
      owner,
      values: values.into_iter(),
      position: 0,
    }
  }

  /// Takes the next argument as `Arc<D>`.
  pub fn next<D: ?Sized + Any + Send + Sync>(&mut self) -> Result<Arc<D>> {
    let index = self.position;
    self.position += 1;
    self
      .values
      .next()
      .and_then(crate::core::unbox::<D>)
      .ok_or_else(|| {
        InstanceCreationError::ArgumentMismatch {
          type_name: self.owner,
          index,
          expected: std::any::type_name::<D>(),
        }
        .into()
      })
  }

  pub fn remaining(&self) -> usize {
    self.values.len()
  }
}

// --- Dependency declarations ---

#[derive(Clone, Copy)]
pub(crate) struct Qualifier {
  pub(crate) key: TypeKey,
  pub(crate) registrar: fn(&Container),
}

impl fmt::Debug for Qualifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Qualifier({})", self.key)
  }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Dependency {
  pub(crate) target: TypeKey,
  pub(crate) qualifier: Option<Qualifier>,
  pub(crate) optional: bool,
  pub(crate) is_array: bool,
  pub(crate) force_new: bool,
}

type SlotAccessor<T> = dyn for<'a> Fn(&'a T) -> &'a (dyn Slot + 'a) + Send + Sync;

fn erase_slot<T, F>(accessor: F) -> Box<SlotAccessor<T>>
where
  F: for<'a> Fn(&'a T) -> &'a (dyn Slot + 'a) + Send + Sync + 'static,
{
  Box::new(accessor)
}

pub(crate) struct FieldDecl<T> {
  pub(crate) name: &'static str,
  pub(crate) dependency: Dependency,
  pub(crate) slot: Box<SlotAccessor<T>>,
}

impl<T> fmt::Debug for FieldDecl<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FieldDecl")
      .field("name", &self.name)
      .field("dependency", &self.dependency)
      .finish()
  }
}

pub(crate) struct Ancestor<T> {
  pub(crate) type_key: TypeKey,
  pub(crate) autowire: Box<dyn Fn(&Container, &T) -> Result<()> + Send + Sync>,
}

/// Injection settings of one dependency field whose target type is `D`.
pub struct Inject<D: ?Sized> {
  qualifier: Option<Qualifier>,
  optional: bool,
  new_instance: bool,
  _marker: PhantomData<fn() -> Arc<D>>,
}

impl<D: ?Sized + Any + Send + Sync> Inject<D> {
  pub fn new() -> Self {
    Self {
      qualifier: None,
      optional: false,
      new_instance: false,
      _marker: PhantomData,
    }
  }

  /// Selects the registration of `D` whose concrete type is `Q`.
  pub fn qualifier<Q: Injectable + Upcast<D>>(mut self) -> Self {
    self.qualifier = Some(Qualifier {
      key: TypeKey::of::<Q>(),
      registrar: container::auto_register::<D, Q>,
    });
    self
  }

  /// A missing registration leaves the field unset (or empty, for
  /// collections) instead of failing.
  pub fn optional(mut self) -> Self {
    self.optional = true;
    self
  }

  /// Always builds a fresh instance, whatever the registered scope.
  pub fn new_instance(mut self) -> Self {
    self.new_instance = true;
    self
  }
}

impl<D: ?Sized + Any + Send + Sync> Default for Inject<D> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Slots ---

mod sealed {
  pub trait Sealed {}
}

/// A field the autowirer can populate.
pub trait Slot: sealed::Sealed + Send + Sync {
  /// Whether the field already holds a value. Populated fields are skipped.
  fn is_populated(&self) -> bool;

  #[doc(hidden)]
  fn fill_one(&self, value: Box<dyn Any + Send + Sync>) -> bool;

  #[doc(hidden)]
  fn fill_many(&self, values: Vec<Box<dyn Any + Send + Sync>>) -> bool;
}

/// Static shape of a slot: the element type it holds and whether it holds
/// every implementation or a single one.
pub trait TypedSlot: Slot + Sized + 'static {
  type Target: ?Sized + Any + Send + Sync;
  const IS_ARRAY: bool;
}

/// A single autowired dependency.
pub struct Autowired<D: ?Sized> {
  cell: OnceCell<Arc<D>>,
}

impl<D: ?Sized> Autowired<D> {
  pub fn new() -> Self {
    Self {
      cell: OnceCell::new(),
    }
  }

  /// A slot that already holds `value`; the autowirer leaves it alone.
  pub fn with(value: Arc<D>) -> Self {
    Self {
      cell: OnceCell::with_value(value),
    }
  }

  pub fn get(&self) -> Option<&Arc<D>> {
    self.cell.get()
  }

  pub fn is_wired(&self) -> bool {
    self.cell.get().is_some()
  }
}

impl<D: ?Sized> Default for Autowired<D> {
  fn default() -> Self {
    Self::new()
  }
}

impl<D: ?Sized> fmt::Debug for Autowired<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Autowired")
      .field("target", &std::any::type_name::<D>())
      .field("wired", &self.is_wired())
      .finish()
  }
}

impl<D: ?Sized> sealed::Sealed for Autowired<D> {}

impl<D: ?Sized + Any + Send + Sync> Slot for Autowired<D> {
  fn is_populated(&self) -> bool {
    self.is_wired()
  }

  fn fill_one(&self, value: Box<dyn Any + Send + Sync>) -> bool {
    match crate::core::unbox::<D>(value) {
      Some(arc) => {
        // Losing a race against another autowiring thread is fine.
        let _ = self.cell.set(arc);
        true
      }
      None => false,
    }
  }

  fn fill_many(&self, _values: Vec<Box<dyn Any + Send + Sync>>) -> bool {
    false
  }
}

impl<D: ?Sized + Any + Send + Sync> TypedSlot for Autowired<D> {
  type Target = D;
  const IS_ARRAY: bool = false;
}

/// Every registered implementation of `D`.
pub struct AutowiredAll<D: ?Sized> {
  cell: OnceCell<Vec<Arc<D>>>,
}

impl<D: ?Sized> AutowiredAll<D> {
  pub fn new() -> Self {
    Self {
      cell: OnceCell::new(),
    }
  }

  pub fn get(&self) -> Option<&[Arc<D>]> {
    self.cell.get().map(Vec::as_slice)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Arc<D>> {
    self.get().unwrap_or(&[]).iter()
  }

  pub fn len(&self) -> usize {
    self.get().map_or(0, <[Arc<D>]>::len)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_wired(&self) -> bool {
    self.cell.get().is_some()
  }
}

impl<D: ?Sized> Default for AutowiredAll<D> {
  fn default() -> Self {
    Self::new()
  }
}

impl<D: ?Sized> fmt::Debug for AutowiredAll<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AutowiredAll")
      .field("target", &std::any::type_name::<D>())
      .field("len", &self.len())
      .finish()
  }
}

impl<D: ?Sized> sealed::Sealed for AutowiredAll<D> {}

impl<D: ?Sized + Any + Send + Sync> Slot for AutowiredAll<D> {
  fn is_populated(&self) -> bool {
    self.is_wired()
  }

  fn fill_one(&self, _value: Box<dyn Any + Send + Sync>) -> bool {
    false
  }

  fn fill_many(&self, values: Vec<Box<dyn Any + Send + Sync>>) -> bool {
    let mut items = Vec::with_capacity(values.len());
    for value in values {
      match crate::core::unbox::<D>(value) {
        Some(arc) => items.push(arc),
        None => return false,
      }
    }
    let _ = self.cell.set(items);
    true
  }
}

impl<D: ?Sized + Any + Send + Sync> TypedSlot for AutowiredAll<D> {
  type Target = D;
  const IS_ARRAY: bool = true;
}
