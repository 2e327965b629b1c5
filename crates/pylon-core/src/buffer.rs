//! Copying values into fixed-capacity caller buffers.
//!
//! The host hands out preallocated buffers and never lets this layer grow
//! them. Values that do not fit are cut; whatever was copied stays valid up
//! to [`BufferCopy::copied`].

/// Result of copying a value into a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferCopy {
    /// Number of value bytes written (excluding any terminator).
    pub copied: usize,
    /// Whether the value was cut to fit.
    pub truncated: bool,
}

impl BufferCopy {
    /// Returns `true` if the whole value fit.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.truncated
    }
}

/// Copies `value` into `dest` and writes a trailing NUL.
///
/// At most `dest.len() - 1` bytes are copied. An empty `dest` receives
/// nothing and reports truncation unless `value` is empty too.
pub fn copy_nul_terminated(value: &[u8], dest: &mut [u8]) -> BufferCopy {
    let Some(room) = dest.len().checked_sub(1) else {
        return BufferCopy {
            copied: 0,
            truncated: !value.is_empty(),
        };
    };
    let copied = value.len().min(room);
    dest[..copied].copy_from_slice(&value[..copied]);
    dest[copied] = 0;
    BufferCopy {
        copied,
        truncated: copied < value.len(),
    }
}

/// Copies raw bytes into `dest` with no terminator.
pub fn copy_bytes(value: &[u8], dest: &mut [u8]) -> BufferCopy {
    let copied = value.len().min(dest.len());
    dest[..copied].copy_from_slice(&value[..copied]);
    BufferCopy {
        copied,
        truncated: copied < value.len(),
    }
}
