pub mod context;
pub mod vm;

mod engine;
pub(crate) mod job_executor;

#[cfg(test)]
mod tests;

pub use context::Context;
pub use vm::Vm;
