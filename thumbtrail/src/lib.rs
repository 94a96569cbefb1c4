mod commands;
mod logger;

#[doc(hidden)]
pub use commands::Args;
pub use logger::Logger;
