//! Public macros for the boilerplate impls the container relies on.

/// Declares that a concrete type can be handed out as one or more trait
/// objects, by implementing [`Upcast`](crate::Upcast) for each of them.
///
/// # Examples
///
/// ```
/// use fibre_autowire::{implements, Container};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///   fn greet(&self) -> String;
/// }
///
/// struct EnglishGreeter;
///
/// impl Greeter for EnglishGreeter {
///   fn greet(&self) -> String {
///     "Hello!".to_string()
///   }
/// }
///
/// implements!(EnglishGreeter => dyn Greeter);
///
/// let container = Container::new();
/// container.register_instance::<dyn Greeter, _>(EnglishGreeter);
/// let greeter: Arc<dyn Greeter> = container.resolve::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! implements {
  ($concrete:ty => $($abstract:ty),+ $(,)?) => {
    $(
      impl $crate::Upcast<$abstract> for $concrete {
        fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$abstract> {
          self
        }
      }
    )+
  };
}

/// Implements [`Injectable`](crate::Injectable) for types without dependency
/// fields.
///
/// `injectable!(A, B)` gives them an empty descriptor, so they can only be
/// produced by factory methods or registered as existing instances.
/// `injectable!(default: A, B)` builds them through `Default::default()`.
///
/// # Examples
///
/// ```
/// use fibre_autowire::{injectable, Container};
///
/// #[derive(Default)]
/// struct Clock;
///
/// injectable!(default: Clock);
///
/// let container = Container::new();
/// container.register::<Clock, Clock>();
/// assert!(container.resolve::<Clock>().is_ok());
/// ```
#[macro_export]
macro_rules! injectable {
  (default: $($ty:ty),+ $(,)?) => {
    $(
      impl $crate::Injectable for $ty {
        fn descriptor() -> $crate::Descriptor<Self> {
          $crate::Descriptor::with_default()
        }
      }
    )+
  };
  ($($ty:ty),+ $(,)?) => {
    $(
      impl $crate::Injectable for $ty {
        fn descriptor() -> $crate::Descriptor<Self> {
          $crate::Descriptor::new()
        }
      }
    )+
  };
}
