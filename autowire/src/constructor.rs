//! Constructor selection and argument resolution.

use crate::container::Container;
use crate::core::{AnyArc, TypeKey};
use crate::descriptor::{Args, Constructor, Descriptor, Injectable, Param};
use crate::error::{InstanceCreationError, Result};
use std::sync::Arc;
use tracing::trace;

/// How a type gets built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selection {
  /// A parameterless constructor came first: no constructor injection.
  Plain(usize),
  /// The constructor at this index gets its arguments from the container.
  Inject(usize),
}

/// Walks constructors in declaration order and stops at the first one that
/// either takes no parameters or takes only resolvable ones.
pub(crate) fn select<T>(descriptor: &Descriptor<T>) -> Result<Selection, InstanceCreationError> {
  for (index, constructor) in descriptor.constructors.iter().enumerate() {
    if constructor.params.is_empty() {
      return Ok(Selection::Plain(index));
    }
    if constructor.params.iter().all(Param::is_resolvable) {
      return Ok(Selection::Inject(index));
    }
  }
  Err(InstanceCreationError::NoInjectableConstructor {
    type_name: std::any::type_name::<T>(),
  })
}

/// Builds a `T` through its selected constructor.
pub(crate) fn construct<T: Injectable>(container: &Container) -> Result<T> {
  let descriptor = container.descriptor::<T>()?;
  let index = match select(descriptor.as_ref())? {
    Selection::Plain(index) | Selection::Inject(index) => index,
  };
  let constructor = &descriptor.constructors[index];
  trace!(
    instance_type = std::any::type_name::<T>(),
    constructor = index,
    arity = constructor.params.len(),
    "invoking constructor"
  );
  let mut args = Args::new(std::any::type_name::<T>(), resolve_arguments(container, constructor)?);
  (constructor.build)(&mut args)
}

pub(crate) fn construct_erased<T: Injectable>(container: &Container) -> Result<AnyArc> {
  let instance: AnyArc = Arc::new(construct::<T>(container)?);
  Ok(instance)
}

fn resolve_arguments<T>(
  container: &Container,
  constructor: &Constructor<T>,
) -> Result<Vec<Box<dyn std::any::Any + Send + Sync>>> {
  constructor
    .params
    .iter()
    .filter_map(|param| match param {
      Param::Dependency(key) => Some(*key),
      Param::Primitive(_) => None,
    })
    .map(|key: TypeKey| container.resolve_argument(key))
    .collect()
}
