//! Resolution and registration options.

use std::ops::BitOr;

/// The set of recognized registration and resolution switches.
///
/// Per-call options are combined with the container's persistent options
/// (see [`Container::set_persistent_options`](crate::Container::set_persistent_options)).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
  do_not_add_concrete_type_registration: bool,
  register_before_resolving: bool,
  no_resolve_exception: bool,
}

impl Options {
  pub const fn new() -> Self {
    Self {
      do_not_add_concrete_type_registration: false,
      register_before_resolving: false,
      no_resolve_exception: false,
    }
  }

  /// Registering `(Abstract, Concrete)` will not add the `Concrete -> Concrete` entry.
  pub const fn do_not_add_concrete_type_registration(mut self) -> Self {
    self.do_not_add_concrete_type_registration = true;
    self
  }

  /// A lookup miss on a qualified resolution registers the qualifier first.
  pub const fn register_before_resolving(mut self) -> Self {
    self.register_before_resolving = true;
    self
  }

  /// A lookup miss yields an absent or empty result instead of an error.
  pub const fn no_resolve_exception(mut self) -> Self {
    self.no_resolve_exception = true;
    self
  }

  pub const fn union(self, other: Options) -> Self {
    Self {
      do_not_add_concrete_type_registration: self.do_not_add_concrete_type_registration
        || other.do_not_add_concrete_type_registration,
      register_before_resolving: self.register_before_resolving || other.register_before_resolving,
      no_resolve_exception: self.no_resolve_exception || other.no_resolve_exception,
    }
  }

  pub fn adds_concrete_type_registration(&self) -> bool {
    !self.do_not_add_concrete_type_registration
  }

  pub fn registers_before_resolving(&self) -> bool {
    self.register_before_resolving
  }

  pub fn suppresses_resolve_errors(&self) -> bool {
    self.no_resolve_exception
  }
}

impl BitOr for Options {
  type Output = Options;

  fn bitor(self, rhs: Options) -> Options {
    self.union(rhs)
  }
}

/// Whether a resolution should autowire the instance it freshly creates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InstantiationContext {
  pub(crate) autowire_instance: bool,
}

impl InstantiationContext {
  pub(crate) const AUTOWIRE: Self = Self {
    autowire_instance: true,
  };
  pub(crate) const BARE: Self = Self {
    autowire_instance: false,
  };
}
