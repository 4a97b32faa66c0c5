//! Native string objects.

use std::ffi::{CStr, CString, c_char};

use crate::error::{Error, Result};
use crate::handle::{NativeHandle, OwnedHandle, ReleaseFn};

pub type StringDataFn = unsafe extern "C" fn(NativeHandle) -> *const c_char;

/// Accessors for `<engine>_String_*` objects.
#[derive(Debug, Clone, Copy)]
pub struct StringFns {
    pub data: StringDataFn,
    pub delete: ReleaseFn,
}

impl StringFns {
    /// Copy a native string into host memory and release it.
    ///
    /// Returns `None` for a null handle or null data.
    pub fn take(&self, handle: NativeHandle) -> Option<String> {
        let owned = OwnedHandle::new(handle, self.delete);
        if !owned.is_valid() {
            return None;
        }
        let ptr = unsafe { (self.data)(owned.raw()) };
        if ptr.is_null() {
            return None;
        }
        // Safety: the engine guarantees NUL-terminated data that lives as
        // long as the string object, which `owned` keeps alive here.
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Convert a host string for a native call.
pub fn to_cstring(value: &str) -> Result<CString> {
    CString::new(value).map_err(|e| {
        Error::InvalidOperation(format!(
            "string passed to native code contains NUL at byte {}",
            e.nul_position()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cstring_rejects_nul() {
        assert!(to_cstring("plain").is_ok());
        assert!(matches!(to_cstring("a\0b"), Err(Error::InvalidOperation(_))));
    }
}
