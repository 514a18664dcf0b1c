//! jsbridge
//!
//! A host-side bridge to the Boa JavaScript engine. The crate covers the
//! value and async interop layer between Rust and JavaScript:
//!
//! - **VM / Context**: a [`Vm`] owns the engine and its garbage-collected heap;
//!   each [`Context`] is one global environment (realm) inside it
//! - **Values**: [`Value`] handles with type predicates, coercions, calls and
//!   property access
//! - **Bridges**: native accessors ([`PropertyDescriptor`]), native functions,
//!   and binary buffers shared with or without copying ([`BufferShare`])
//! - **Async interop**: promise-returning scripts are awaited through a
//!   single-resume [`Continuation`]
//!
//! # Example
//!
//! ```no_run
//! use jsbridge::{Context, Vm};
//!
//! # fn main() -> jsbridge::Result<()> {
//! let vm = Vm::new()?;
//! let ctx = Context::new(&vm)?;
//!
//! let add = ctx.new_function("add", |ctx, _this, args| {
//!     let sum: f64 = args.iter().filter_map(|arg| arg.number_value()).sum();
//!     Ok(ctx.number(sum))
//! })?;
//! ctx.global().set("add", &add)?;
//!
//! let result = ctx.eval("add(1, 2)")?;
//! assert_eq!(result.number_value(), Some(3.0));
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod error;
pub mod limits;
pub mod promise;
pub mod runtime;
pub mod value;

pub use bridge::{BufferShare, PropertyDescriptor};
pub use boa_engine::object::builtins::AlignedVec;
pub use error::{Error, Result};
pub use limits::ResourceLimits;
pub use promise::{AsyncEvalOptions, Continuation, Pending, PromiseResolvers};
pub use runtime::{Context, Vm};
pub use value::Value;
