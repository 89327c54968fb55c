//! Extended attributes on the link inode itself (never followed).

use crate::config::types::{Result, StaunchError};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        StaunchError::Format(format!("path {} contains a NUL byte", path.display()))
    })
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name)
        .map_err(|_| StaunchError::Format(format!("attribute name {:?} contains a NUL byte", name)))
}

/// Read attribute `name` of `path` into a buffer of at most `max_len` bytes.
///
/// Returns `NotFound` when the attribute is absent and `TooLong` when the
/// stored value is larger than `max_len`.
pub fn get(path: &Path, name: &str, max_len: usize) -> Result<Vec<u8>> {
    let path_c = c_path(path)?;
    let name_c = c_name(name)?;
    let mut buffer = vec![0u8; max_len];

    // SAFETY: path and name are valid NUL-terminated strings; buffer is a live
    // allocation of exactly buffer.len() bytes and the kernel writes at most that.
    let len = unsafe {
        libc::lgetxattr(
            path_c.as_ptr(),
            name_c.as_ptr(),
            buffer.as_mut_ptr() as *mut libc::c_void,
            buffer.len(),
        )
    };

    if len < 0 {
        let err = std::io::Error::last_os_error();
        return match err.raw_os_error() {
            Some(libc::ENODATA) => Err(StaunchError::NotFound(path.to_path_buf())),
            Some(libc::ERANGE) => Err(StaunchError::TooLong {
                len: max_len + 1,
                max: max_len,
            }),
            _ => Err(StaunchError::Io(std::io::Error::new(
                err.kind(),
                format!("reading attribute {} of {}: {}", name, path.display(), err),
            ))),
        };
    }

    buffer.truncate(len as usize);
    Ok(buffer)
}

/// Create or replace attribute `name` of `path`.
pub fn set(path: &Path, name: &str, value: &[u8]) -> Result<()> {
    let path_c = c_path(path)?;
    let name_c = c_name(name)?;

    // SAFETY: pointers come from live CStrings and a live slice whose length is passed.
    let rc = unsafe {
        libc::lsetxattr(
            path_c.as_ptr(),
            name_c.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            0,
        )
    };

    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(StaunchError::Io(std::io::Error::new(
            err.kind(),
            format!("writing attribute {} of {}: {}", name, path.display(), err),
        )));
    }
    Ok(())
}
