use fibre_autowire::{
  ApplicationContext, Autowired, Components, Constructor, Container, Descriptor, Injectable,
};

struct DatabaseConfig {
  url: String,
}

struct Repository {
  url: String,
}

fibre_autowire::injectable!(DatabaseConfig, Repository);

// A context groups the methods producing the application's components.
struct AppContext {
  config: Autowired<DatabaseConfig>,
}

impl Injectable for AppContext {
  fn descriptor() -> Descriptor<Self> {
    Descriptor::new()
      .constructor(Constructor::new(|_| {
        Ok(AppContext {
          config: Autowired::new(),
        })
      }))
      .field("config", |ctx| &ctx.config)
  }
}

impl ApplicationContext for AppContext {
  fn components(components: &mut Components<Self>) {
    components
      .singleton(|_| DatabaseConfig {
        url: "postgres://localhost:5432/app".to_string(),
      })
      .prototype(|ctx| Repository {
        url: ctx
          .config
          .get()
          .map(|config| config.url.clone())
          .unwrap_or_default(),
      });
  }
}

fn main() -> fibre_autowire::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let container = Container::new();
  container.register_context_type::<AppContext>()?;

  let first = container.resolve::<Repository>()?;
  let second = container.resolve::<Repository>()?;
  println!("repository connected to {}", first.url);
  println!("prototype scope gives distinct instances: {}", !std::sync::Arc::ptr_eq(&first, &second));
  Ok(())
}
