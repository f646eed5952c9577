use thiserror::Error;

/// Failure to find a unique registration for a requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  #[error("No registration found for type: {type_name}")]
  NotRegistered { type_name: &'static str },

  #[error("Ambiguous resolution of {type_name}: candidates {candidates:?}, a qualifier is required")]
  Ambiguous {
    type_name: &'static str,
    candidates: Vec<&'static str>,
  },

  #[error("No registration of {type_name} is qualified by {qualifier}")]
  QualifierNotFound {
    type_name: &'static str,
    qualifier: &'static str,
  },

  #[error("Registration for {type_name} produced an instance of an unexpected type")]
  TypeMismatch { type_name: &'static str },
}

/// Failure to produce an instance once a registration has been selected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceCreationError {
  #[error("No construction strategy configured for {type_name}")]
  NoStrategy { type_name: &'static str },

  #[error("No injectable constructor found for {type_name}")]
  NoInjectableConstructor { type_name: &'static str },

  #[error("Circular dependency detected while creating {type_name}")]
  CircularDependency { type_name: &'static str },

  #[error("Constructor of {type_name} expected argument {index} of type {expected}")]
  ArgumentMismatch {
    type_name: &'static str,
    index: usize,
    expected: &'static str,
  },
}

/// Misuse of a registration handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
  #[error("Scope of {type_name} cannot change after a shared instance was handed out")]
  ScopeFrozen { type_name: &'static str },
}

/// The main error type for the `fibre_autowire` library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  InstanceCreation(#[from] InstanceCreationError),

  #[error(transparent)]
  Registration(#[from] RegistrationError),
}

impl Error {
  pub fn is_resolve(&self) -> bool {
    matches!(self, Error::Resolve(_))
  }

  pub fn is_instance_creation(&self) -> bool {
    matches!(self, Error::InstanceCreation(_))
  }
}

/// A specialized `Result` type for `fibre_autowire` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
