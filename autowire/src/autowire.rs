//! Post-construction population of dependency fields.

use crate::container::{Container, Request};
use crate::core::AnyArc;
use crate::descriptor::{FieldDecl, Injectable, Slot};
use crate::error::{ResolveError, Result};
use crate::options::Options;
use tracing::trace;

/// Populates every unset dependency field of `instance`, then those of its
/// ancestors.
pub(crate) fn autowire<T: Injectable>(container: &Container, instance: &T) -> Result<()> {
  let descriptor = container.descriptor::<T>()?;
  for field in &descriptor.fields {
    let slot = (field.slot)(instance);
    // A populated field is either user-supplied or was wired by an earlier
    // visit of this object; both end the walk for this field.
    if slot.is_populated() {
      trace!(owner = std::any::type_name::<T>(), field = field.name, "field already populated");
      continue;
    }
    inject_field(container, field, slot)?;
  }
  for ancestor in &descriptor.ancestors {
    trace!(
      owner = std::any::type_name::<T>(),
      ancestor = %ancestor.type_key,
      "autowiring ancestor"
    );
    (ancestor.autowire)(container, instance)?;
  }
  Ok(())
}

pub(crate) fn autowire_erased<T: Injectable>(container: &Container, instance: &AnyArc) -> Result<()> {
  let typed = instance
    .downcast_ref::<T>()
    .ok_or(ResolveError::TypeMismatch {
      type_name: std::any::type_name::<T>(),
    })?;
  autowire(container, typed)
}

fn inject_field<T>(container: &Container, field: &FieldDecl<T>, slot: &dyn Slot) -> Result<()> {
  let dependency = &field.dependency;
  let options = if dependency.optional {
    Options::new().no_resolve_exception()
  } else {
    Options::new()
  };

  let filled = if dependency.is_array {
    let values = container.resolve_all_erased(dependency.target, options)?;
    trace!(field = field.name, count = values.len(), "assigning collection");
    slot.fill_many(values)
  } else {
    let request = Request {
      target: dependency.target,
      qualifier: dependency.qualifier,
      options,
      fresh: dependency.force_new,
    };
    match container.resolve_erased(request)? {
      Some(value) => {
        trace!(field = field.name, requested = %dependency.target, "assigning dependency");
        slot.fill_one(value)
      }
      None => {
        trace!(field = field.name, requested = %dependency.target, "optional dependency left unset");
        true
      }
    }
  };

  if filled {
    Ok(())
  } else {
    Err(
      ResolveError::TypeMismatch {
        type_name: dependency.target.name(),
      }
      .into(),
    )
  }
}
