/// Streak engine services
///
/// Live completions, the nightly batch that enqueues reset jobs, the
/// processor that applies them, and the runtime pieces (worker pool, daily
/// trigger) that drive the last two.

pub mod completion;
pub mod scheduler;
pub mod processor;
pub mod worker;
pub mod trigger;

pub use completion::*;
pub use scheduler::*;
pub use processor::*;
pub use worker::*;
pub use trigger::*;
