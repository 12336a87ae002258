pub mod diagnostics;
pub mod logger;
pub mod thread;
pub mod timer;

pub use diagnostics::render_report;
pub use logger::init_logging;
pub use thread::thread_label;
pub use timer::Stopwatch;
