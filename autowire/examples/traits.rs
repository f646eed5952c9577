use fibre_autowire::{implements, injectable, Autowired, Container, Descriptor, Injectable};

// 1. Define the abstraction (the trait)
trait Logger: Send + Sync {
  fn log(&self, message: &str);
}

// 2. Define a concrete implementation and declare which traits it serves
#[derive(Default)]
struct ConsoleLogger;

impl Logger for ConsoleLogger {
  fn log(&self, message: &str) {
    println!("[CONSOLE LOG]: {}", message);
  }
}

implements!(ConsoleLogger => dyn Logger);
injectable!(default: ConsoleLogger);

// 3. Define a service that depends on the abstraction through a field
#[derive(Default)]
struct ReportService {
  logger: Autowired<dyn Logger>,
}

impl Injectable for ReportService {
  fn descriptor() -> Descriptor<Self> {
    Descriptor::with_default().field("logger", |service: &ReportService| &service.logger)
  }
}

impl ReportService {
  fn generate_report(&self) {
    if let Some(logger) = self.logger.get() {
      logger.log("Starting report generation.");
      logger.log("Finished report generation.");
    }
  }
}

fn main() -> fibre_autowire::Result<()> {
  // --- Registration ---
  let container = Container::new();
  container.register::<dyn Logger, ConsoleLogger>();
  container.register::<ReportService, ReportService>();

  // --- Resolution and Usage ---
  println!("Resolving the high-level service...");
  let report_service = container.resolve::<ReportService>()?;

  println!("Using the service...");
  report_service.generate_report();
  Ok(())
}
