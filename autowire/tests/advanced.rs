mod common;

use common::init_logging;
use fibre_autowire::{
  implements, injectable, Autowired, Container, Descriptor, Error, Injectable,
  InstanceCreationError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

trait Cache: Send + Sync {
  fn capacity(&self) -> usize;
}

struct LruCache;

impl Cache for LruCache {
  fn capacity(&self) -> usize {
    128
  }
}

implements!(LruCache => dyn Cache);
injectable!(LruCache);

#[test]
fn test_singleton_factory_is_called_only_once_under_concurrency() {
  init_logging();
  static FACTORY_EXECUTION_COUNT: AtomicUsize = AtomicUsize::new(0);

  // Arrange
  let container = Container::new();
  container.register_factory::<dyn Cache, LruCache, _>(|_| {
    FACTORY_EXECUTION_COUNT.fetch_add(1, Ordering::SeqCst);
    // Widen the window for a racing initialization.
    thread::sleep(Duration::from_millis(50));
    Ok(LruCache)
  });

  // Act
  let instances: Vec<Arc<dyn Cache>> = thread::scope(|s| {
    let handles: Vec<_> = (0..20)
      .map(|_| s.spawn(|| container.resolve::<dyn Cache>().unwrap()))
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  // Assert
  assert_eq!(FACTORY_EXECUTION_COUNT.load(Ordering::SeqCst), 1);
  let first = &instances[0];
  assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, first)));
  assert_eq!(first.capacity(), 128);
}

#[test]
fn test_concurrent_registration_and_resolution() {
  // Arrange
  #[derive(Default)]
  struct Worker {
    cache: Autowired<dyn Cache>,
  }

  impl Injectable for Worker {
    fn descriptor() -> Descriptor<Self> {
      Descriptor::with_default().field("cache", |w: &Worker| &w.cache)
    }
  }

  let container = Container::new();
  container.register_instance::<dyn Cache, _>(LruCache);

  // Act: half of the threads keep re-registering `Worker`, the rest resolve it.
  thread::scope(|s| {
    for i in 0..8 {
      let container = &container;
      s.spawn(move || {
        for _ in 0..50 {
          if i % 2 == 0 {
            container.register::<Worker, Worker>();
          } else if let Ok(worker) = container.resolve::<Worker>() {
            assert!(worker.cache.is_wired());
          }
        }
      });
    }
  });

  // Assert: re-registration replaced rather than accumulated.
  assert_eq!(container.registration_count::<Worker>(), 1);
}

#[test]
fn test_independent_singletons_resolve_in_parallel() {
  // A slow singleton must not block resolution of an unrelated one.
  struct Slow;
  struct Fast;

  injectable!(Slow, Fast);

  let container = Container::new();
  container.register_factory::<Slow, Slow, _>(|_| {
    thread::sleep(Duration::from_millis(300));
    Ok(Slow)
  });
  container.register_factory::<Fast, Fast, _>(|_| Ok(Fast));

  thread::scope(|s| {
    let slow = s.spawn(|| container.resolve::<Slow>().is_ok());
    // Give the slow factory a head start.
    thread::sleep(Duration::from_millis(20));
    let started = std::time::Instant::now();
    assert!(container.resolve::<Fast>().is_ok());
    assert!(started.elapsed() < Duration::from_millis(250));
    assert!(slow.join().unwrap());
  });
}

#[test]
fn test_factory_may_resolve_other_registrations() {
  // Resolution from inside a factory must not deadlock on the registry.
  struct Config(usize);
  struct Pool(usize);

  injectable!(Config, Pool);

  let container = Container::new();
  container.register_factory::<Config, Config, _>(|_| Ok(Config(4)));
  container.register_factory::<Pool, Pool, _>(|c| {
    let config = c.resolve::<Config>()?;
    // Registering from inside a factory is allowed too.
    c.register_instance::<usize, _>(config.0);
    Ok(Pool(config.0 * 2))
  });

  let pool = container.resolve::<Pool>().unwrap();

  assert_eq!(pool.0, 8);
  assert_eq!(*container.resolve::<usize>().unwrap(), 4);
}

#[test]
fn test_containers_are_isolated() {
  let first = Container::new();
  let second = Container::new();
  first.register_instance::<dyn Cache, _>(LruCache);

  assert!(first.resolve::<dyn Cache>().is_ok());
  assert!(second.resolve::<dyn Cache>().is_err());
}

#[test]
fn test_cross_thread_construction_cycle_fails_instead_of_hanging() {
  struct Left;
  struct Right;

  injectable!(Left, Right);

  // Both factories start building at the same moment, each on its own
  // thread, then ask for the other singleton.
  let barrier = Arc::new(Barrier::new(2));
  let container = Container::new();
  let (gate, first_call) = (barrier.clone(), AtomicBool::new(true));
  container.register_factory::<Left, Left, _>(move |c| {
    if first_call.swap(false, Ordering::SeqCst) {
      gate.wait();
    }
    c.resolve::<Right>()?;
    Ok(Left)
  });
  let (gate, first_call) = (barrier, AtomicBool::new(true));
  container.register_factory::<Right, Right, _>(move |c| {
    if first_call.swap(false, Ordering::SeqCst) {
      gate.wait();
    }
    c.resolve::<Left>()?;
    Ok(Right)
  });

  // Act
  let (left, right) = thread::scope(|s| {
    let left = s.spawn(|| container.resolve::<Left>().err());
    let right = s.spawn(|| container.resolve::<Right>().err());
    (left.join().unwrap(), right.join().unwrap())
  });

  // Assert
  for err in [left, right] {
    assert!(matches!(
      err,
      Some(Error::InstanceCreation(InstanceCreationError::CircularDependency { .. }))
    ));
  }
}
