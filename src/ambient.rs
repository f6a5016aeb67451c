//! Ambient process user resolution for VNF identities (design §3, "VNF
//! Identity for Remote Calls").
//!
//! Mirrors `getpass.getuser()`'s precedence: the `LOGNAME`/`USER` environment
//! variables win when set, falling back to the password database entry for
//! the real UID when neither is.

/// Resolve the user name to embed in every `VnfIdentity.fullname()` for the
/// lifetime of this call. Re-resolved per call rather than cached once, since
/// the environment a FUSE request arrives under may differ between calls.
pub fn current_user() -> String {
    for var in ["LOGNAME", "USER"] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                return name;
            }
        }
    }
    passwd_entry_name().unwrap_or_else(|| "unknown".to_owned())
}

#[cfg(target_os = "linux")]
fn passwd_entry_name() -> Option<String> {
    use std::ffi::CStr;

    let uid = unsafe { libc::getuid() };
    let mut buf = vec![0_i8; 1024];
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let rc = unsafe {
        libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
    };

    if rc != 0 || result.is_null() {
        return None;
    }

    let name = unsafe { CStr::from_ptr(pwd.pw_name) };
    name.to_str().ok().map(str::to_owned)
}

#[cfg(not(target_os = "linux"))]
fn passwd_entry_name() -> Option<String> {
    None
}
