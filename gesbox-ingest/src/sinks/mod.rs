pub mod console;
pub mod working_set;

pub use console::ConsoleTableSink;
