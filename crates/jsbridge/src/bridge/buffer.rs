//! Binary buffers shared between host and engine.
//!
//! [`Context::buffer_copy`] copies host bytes into a fresh `ArrayBuffer`.
//! [`Context::buffer_no_copy`] hands the allocation of a [`BufferShare`] to
//! the engine instead. The engine stores array buffer contents in 64-byte
//! aligned blocks ([`AlignedVec`]), so only a share built from such a block
//! is handed over without a copy. A share can carry a deallocator; it is attached to the
//! buffer as a collector-traced release token and runs exactly once, when the
//! engine reclaims the buffer. If the thread or process ends before the
//! collector gets to it, it may never run.

use crate::error::{Error, Result};
use crate::runtime::context::Context;
use crate::value::Value;
use boa_engine::{
    object::{
        builtins::{AlignedVec, JsArrayBuffer},
        JsObject,
    },
    property::PropertyDescriptor as EngineDescriptor,
    Context as Engine, JsData, JsNativeError, JsResult, JsString, JsSymbol, JsValue,
};
use boa_gc::{Finalize, Trace};
use std::cell::Cell;
use std::fmt;

type Deallocator = Box<dyn FnOnce()>;

/// Alignment of the blocks backing every `ArrayBuffer`.
const BLOCK_ALIGN: usize = 64;

/// Host bytes to be exposed to script without a copy.
pub struct BufferShare {
    bytes: AlignedVec<u8>,
    deallocator: Option<Deallocator>,
}

impl BufferShare {
    /// Wraps an engine-aligned block. This is the zero-copy path: the same
    /// allocation ends up backing the `ArrayBuffer`.
    pub fn from_aligned(bytes: AlignedVec<u8>) -> Self {
        Self {
            bytes,
            deallocator: None,
        }
    }

    /// A zero-filled aligned block of `len` bytes, to be filled through
    /// [`BufferShare::as_mut_slice`] before it is shared.
    pub fn zeroed(len: usize) -> Self {
        Self::from_aligned(AlignedVec::from_iter(BLOCK_ALIGN, std::iter::repeat_n(0, len)))
    }

    /// Copies `bytes` once into an aligned block.
    ///
    /// A plain `Vec<u8>` has no 64-byte alignment guarantee, so its contents
    /// are moved into a block the engine can adopt. Use
    /// [`BufferShare::from_aligned`] or [`BufferShare::zeroed`] to avoid this
    /// copy.
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Self::from_aligned(AlignedVec::from_slice(BLOCK_ALIGN, bytes.as_ref()))
    }

    /// Runs `deallocator` once the engine has released the buffer.
    pub fn with_deallocator<F>(mut self, deallocator: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.deallocator = Some(Box::new(deallocator));
        self
    }

    /// Number of bytes the buffer will expose.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The bytes, for filling in before the share is handed to the engine.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Address of the block, stable until the share is consumed.
    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }
}

impl From<AlignedVec<u8>> for BufferShare {
    fn from(bytes: AlignedVec<u8>) -> Self {
        Self::from_aligned(bytes)
    }
}

/// Copies once; see [`BufferShare::new`].
impl From<Vec<u8>> for BufferShare {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for BufferShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferShare")
            .field("len", &self.bytes.len())
            .field("deallocator", &self.deallocator.is_some())
            .finish()
    }
}

/// Lives in the engine heap next to a no-copy buffer and fires the
/// deallocator when collected.
#[derive(Trace, JsData)]
struct ReleaseToken {
    #[unsafe_ignore_trace]
    deallocator: Cell<Option<Deallocator>>,
    len: usize,
}

impl Finalize for ReleaseToken {
    fn finalize(&self) {
        if let Some(deallocator) = self.deallocator.take() {
            tracing::debug!(bytes = self.len, "No-copy buffer released");
            deallocator();
        }
    }
}

impl Context {
    /// A new `ArrayBuffer` holding a copy of `bytes`.
    ///
    /// # Errors
    ///
    /// - `Error::CannotCreateArrayBuffer` if the engine refuses the allocation
    /// - `Error::ContextBusy` if the engine is driving jobs for another caller
    pub fn buffer_copy(&self, bytes: impl AsRef<[u8]>) -> Result<Value> {
        let bytes = AlignedVec::from_slice(BLOCK_ALIGN, bytes.as_ref());
        let len = bytes.len();
        let buffer = self
            .enter(|engine| JsArrayBuffer::from_byte_block(bytes, engine))?
            .map_err(|e| Error::CannotCreateArrayBuffer(e.to_string()))?;

        tracing::trace!(bytes = len, "ArrayBuffer copied from host");
        Ok(self.wrap(buffer.into()))
    }

    /// Construction helper for binary data; same as [`Context::buffer_copy`].
    pub fn data(&self, bytes: impl AsRef<[u8]>) -> Result<Value> {
        self.buffer_copy(bytes)
    }

    /// An `ArrayBuffer` that takes over the allocation of `share`.
    ///
    /// Script writes land in that allocation. The deallocator, if any, runs
    /// exactly once after the buffer becomes unreachable and is collected.
    ///
    /// # Errors
    ///
    /// Same as [`Context::buffer_copy`]. The deallocator of a share that
    /// fails here is dropped without running.
    pub fn buffer_no_copy(&self, share: BufferShare) -> Result<Value> {
        let BufferShare { bytes, deallocator } = share;
        let len = bytes.len();

        let buffer = self.enter(|engine| -> JsResult<JsArrayBuffer> {
            let buffer = JsArrayBuffer::from_byte_block(bytes, engine)?;
            if let Some(deallocator) = deallocator {
                attach_release_token(&buffer, deallocator, len, engine)?;
            }
            Ok(buffer)
        })?;
        let buffer = buffer.map_err(|e| Error::CannotCreateArrayBuffer(e.to_string()))?;

        tracing::debug!(bytes = len, "No-copy ArrayBuffer created");
        Ok(self.wrap(buffer.into()))
    }
}

fn attach_release_token(
    buffer: &JsArrayBuffer,
    deallocator: Deallocator,
    len: usize,
    engine: &mut Engine,
) -> JsResult<()> {
    let token = JsObject::from_proto_and_data(
        None::<JsObject>,
        ReleaseToken {
            deallocator: Cell::new(Some(deallocator)),
            len,
        },
    );
    let key = JsSymbol::new(Some(JsString::from("jsbridge.release")))
        .ok_or_else(|| JsNativeError::range().with_message("Symbol space exhausted"))?;
    let descriptor = EngineDescriptor::builder()
        .value(token)
        .writable(false)
        .enumerable(false)
        .configurable(false)
        .build();

    let object: JsObject = buffer.clone().into();
    object.define_property_or_throw(key, descriptor, engine)?;
    Ok(())
}

impl Value {
    /// Byte length of an `ArrayBuffer`, or of the window of a typed array or
    /// `DataView`. `None` for anything else and for detached buffers.
    pub fn byte_length(&self) -> Option<usize> {
        self.byte_window().map(|(_, _, len)| len)
    }

    /// A copy of the bytes [`Value::byte_length`] describes.
    pub fn copy_bytes(&self) -> Option<Vec<u8>> {
        let (buffer, offset, len) = self.byte_window()?;
        let data = buffer.data()?;
        data.get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
    }

    fn byte_window(&self) -> Option<(JsArrayBuffer, usize, usize)> {
        let object = self.as_js_value().as_object()?.clone();

        if let Ok(buffer) = JsArrayBuffer::from_object(object.clone()) {
            let len = buffer.data()?.len();
            return Some((buffer, 0, len));
        }

        // Typed arrays and DataView expose the same three accessors
        let view = self.context().ok()?.enter(|engine| -> JsResult<Option<(JsValue, f64, f64)>> {
            if !object.has_property(JsString::from("byteOffset"), engine)? {
                return Ok(None);
            }
            let buffer = object.get(JsString::from("buffer"), engine)?;
            let offset = object.get(JsString::from("byteOffset"), engine)?.to_number(engine)?;
            let len = object.get(JsString::from("byteLength"), engine)?.to_number(engine)?;
            Ok(Some((buffer, offset, len)))
        });

        let (buffer, offset, len) = view.ok()?.ok()??;
        let buffer = JsArrayBuffer::from_object(buffer.as_object()?.clone()).ok()?;
        Some((buffer, offset as usize, len as usize))
    }
}
