//! Host-to-engine bridges: native functions, accessor properties and
//! binary buffers.

mod buffer;
pub(crate) mod callbacks;
mod function;
mod property;

pub use buffer::BufferShare;
pub use property::PropertyDescriptor;
