mod common;

use common::{init_logging, same_object};
use fibre_autowire::{
  implements, injectable, Container, Error, InstanceCreationError, Options, RegistrationError,
  ResolveError, TypeKey,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// --- Test Fixtures ---

// The trait must be Send + Sync for the container to accept it.
trait Greeter: Send + Sync {
  fn greet(&self) -> String;
}

#[derive(Default)]
struct EnglishGreeter;

impl Greeter for EnglishGreeter {
  fn greet(&self) -> String {
    "Hello!".to_string()
  }
}

implements!(EnglishGreeter => dyn Greeter);
injectable!(default: EnglishGreeter);

// A simple value type without constructors: factory or existing instance only.
#[derive(Debug, PartialEq, Eq)]
struct Token(usize);

injectable!(Token);

// --- Basic Tests ---

#[test]
fn test_singleton_scope_returns_same_instance() {
  init_logging();
  // Arrange
  let container = Container::new();
  container.register::<EnglishGreeter, EnglishGreeter>();

  // Act
  let r1 = container.resolve::<EnglishGreeter>().unwrap();
  let r2 = container.resolve::<EnglishGreeter>().unwrap();

  // Assert
  assert!(Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_transient_scope_returns_distinct_instances() {
  // Arrange
  let container = Container::new();
  container
    .register::<EnglishGreeter, EnglishGreeter>()
    .new_instance()
    .unwrap();

  // Act
  let r1 = container.resolve::<EnglishGreeter>().unwrap();
  let r2 = container.resolve::<EnglishGreeter>().unwrap();

  // Assert
  assert!(!Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_abstract_and_concrete_lookups_share_the_singleton() {
  // Arrange
  let container = Container::new();
  let registration = container.register::<dyn Greeter, EnglishGreeter>();

  // Act
  let by_trait = container.resolve::<dyn Greeter>().unwrap();
  let by_type = container.resolve::<EnglishGreeter>().unwrap();

  // Assert
  assert_eq!(by_trait.greet(), "Hello!");
  assert!(same_object(&by_trait, &by_type));
  assert!(registration.is_singleton());
  assert_eq!(registration.registered_type(), TypeKey::of::<dyn Greeter>());
  assert_eq!(registration.instance_type().name(), std::any::type_name::<EnglishGreeter>());
}

#[test]
fn test_concrete_registration_can_be_suppressed() {
  // Arrange
  let container = Container::new();
  container.register_with::<dyn Greeter, EnglishGreeter>(
    Options::new().do_not_add_concrete_type_registration(),
  );

  // Act
  let concrete = container.resolve::<EnglishGreeter>();

  // Assert
  assert!(container.contains::<dyn Greeter>());
  assert!(!container.contains::<EnglishGreeter>());
  assert!(matches!(
    concrete,
    Err(Error::Resolve(ResolveError::NotRegistered { .. }))
  ));
}

#[test]
fn test_registering_same_pair_twice_replaces_the_registration() {
  // Arrange: transient first, then singleton.
  let container = Container::new();
  container
    .register::<dyn Greeter, EnglishGreeter>()
    .new_instance()
    .unwrap();
  container.register::<dyn Greeter, EnglishGreeter>();

  // Act
  let r1 = container.resolve::<dyn Greeter>().unwrap();
  let r2 = container.resolve::<dyn Greeter>().unwrap();

  // Assert: one registration, governed by the second call's scope.
  assert_eq!(container.registration_count::<dyn Greeter>(), 1);
  assert!(Arc::ptr_eq(&r1, &r2));

  // And the other way around.
  let container = Container::new();
  container.register::<dyn Greeter, EnglishGreeter>();
  container
    .register::<dyn Greeter, EnglishGreeter>()
    .new_instance()
    .unwrap();
  let r1 = container.resolve::<dyn Greeter>().unwrap();
  let r2 = container.resolve::<dyn Greeter>().unwrap();
  assert!(!Arc::ptr_eq(&r1, &r2));

  // Replacing without a concrete alias also drops the alias of the first one.
  let container = Container::new();
  container.register::<dyn Greeter, EnglishGreeter>();
  container
    .register_with::<dyn Greeter, EnglishGreeter>(
      Options::new().do_not_add_concrete_type_registration(),
    )
    .new_instance()
    .unwrap();
  assert!(!container.contains::<EnglishGreeter>());
  let r1 = container.resolve::<dyn Greeter>().unwrap();
  let r2 = container.resolve::<dyn Greeter>().unwrap();
  assert!(!Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_existing_instance_registration() {
  // Arrange
  let container = Container::new();
  let shared = Arc::new(EnglishGreeter);
  container.register_arc::<dyn Greeter, _>(shared.clone());

  // Act
  let resolved = container.resolve::<dyn Greeter>().unwrap();

  // Assert
  assert!(same_object(&resolved, &shared));
}

#[test]
fn test_existing_instance_set_through_the_handle() {
  // Arrange
  let container = Container::new();
  container
    .register::<Token, Token>()
    .existing_instance(Token(7))
    .unwrap();

  // Act
  let r1 = container.resolve::<Token>().unwrap();
  let r2 = container.resolve::<Token>().unwrap();

  // Assert
  assert_eq!(*r1, Token(7));
  assert!(Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_factory_method_runs_once_for_singletons() {
  // Arrange
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let container = Container::new();
  container.register_factory::<Token, Token, _>(move |_| {
    Ok(Token(counter.fetch_add(1, Ordering::SeqCst)))
  });

  // Act
  let r1 = container.resolve::<Token>().unwrap();
  let r2 = container.resolve::<Token>().unwrap();

  // Assert
  assert_eq!(*r1, Token(0));
  assert!(Arc::ptr_eq(&r1, &r2));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_factory_method_can_resolve_from_the_container() {
  // Arrange
  let container = Container::new();
  container.register_instance::<usize, _>(41_usize);
  container.register_factory::<Token, Token, _>(|c| Ok(Token(*c.resolve::<usize>()? + 1)));

  // Act
  let token = container.resolve::<Token>().unwrap();

  // Assert
  assert_eq!(*token, Token(42));
}

#[test]
fn test_scope_change_after_first_resolution_is_rejected() {
  // Arrange
  let container = Container::new();
  let registration = container.register::<EnglishGreeter, EnglishGreeter>();
  let before = container.resolve::<EnglishGreeter>().unwrap();

  // Act
  let result = registration.new_instance().map(|_| ());

  // Assert: still exactly one live singleton.
  assert!(matches!(result, Err(RegistrationError::ScopeFrozen { .. })));
  let after = container.resolve::<EnglishGreeter>().unwrap();
  assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn test_failed_singleton_construction_leaves_scope_open() {
  // Arrange: no constructor, no factory method.
  let container = Container::new();
  let registration = container.register::<Token, Token>();
  assert!(container.resolve::<Token>().is_err());

  // Act
  let result = registration.existing_instance(Token(3)).map(|_| ());

  // Assert
  assert!(result.is_ok());
  assert_eq!(*container.resolve::<Token>().unwrap(), Token(3));
}

#[test]
fn test_transient_without_construction_strategy_fails() {
  // Arrange: an existing instance switched to transient has nothing to build with.
  let container = Container::new();
  container
    .register_instance::<Token, _>(Token(1))
    .new_instance()
    .unwrap();

  // Act
  let result = container.resolve::<Token>();

  // Assert
  assert!(matches!(
    result,
    Err(Error::InstanceCreation(InstanceCreationError::NoStrategy { .. }))
  ));
}

#[test]
fn test_unregistered_type_fails_to_resolve() {
  let container = Container::new();
  let err = container.resolve::<dyn Greeter>().err().unwrap();
  assert!(err.is_resolve());
  assert_eq!(
    err,
    Error::Resolve(ResolveError::NotRegistered {
      type_name: std::any::type_name::<dyn Greeter>(),
    })
  );
}

#[test]
fn test_persistent_options_apply_until_cleared() {
  // Arrange
  let container = Container::new();
  container.set_persistent_options(Options::new().no_resolve_exception());

  // Act & Assert: the miss is suppressed while the option is set...
  assert!(container.resolve_with::<dyn Greeter>(Options::new()).unwrap().is_none());
  assert!(container.resolve_all::<dyn Greeter>().unwrap().is_empty());

  // ...and fails again once cleared.
  container.clear_persistent_options();
  assert!(container.resolve_with::<dyn Greeter>(Options::new()).is_err());
}

#[test]
fn test_persistent_options_are_replaced_not_merged() {
  let container = Container::new();
  container.set_persistent_options(Options::new().no_resolve_exception());
  container.set_persistent_options(Options::new().register_before_resolving());

  assert_eq!(
    container.persistent_options(),
    Options::new().register_before_resolving()
  );
  assert!(container.resolve_with::<dyn Greeter>(Options::new()).is_err());
}

#[test]
fn test_persistent_option_suppresses_concrete_registration() {
  let container = Container::new();
  container.set_persistent_options(Options::new().do_not_add_concrete_type_registration());
  container.register::<dyn Greeter, EnglishGreeter>();
  assert!(!container.contains::<EnglishGreeter>());
}

#[test]
fn test_dropping_the_container_drops_singletons() {
  static DROP_COUNTER: AtomicUsize = AtomicUsize::new(0);

  #[derive(Default)]
  struct ConnectionPool;

  impl Drop for ConnectionPool {
    fn drop(&mut self) {
      DROP_COUNTER.fetch_add(1, Ordering::SeqCst);
    }
  }

  injectable!(default: ConnectionPool);

  // Arrange
  let container = Container::new();
  container.register::<ConnectionPool, ConnectionPool>();

  // Act
  let pool = container.resolve::<ConnectionPool>().unwrap();
  drop(pool);
  assert_eq!(DROP_COUNTER.load(Ordering::SeqCst), 0);
  drop(container);

  // Assert
  assert_eq!(DROP_COUNTER.load(Ordering::SeqCst), 1);
}
