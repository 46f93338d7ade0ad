//! Registration of the sqlite-vec extension.
//!
//! All unsafe code of the crate lives here.

use std::os::raw::{c_char, c_int};
use std::sync::Once;

use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;

type ExtensionEntryPoint =
    unsafe extern "C" fn(*mut sqlite3, *mut *mut c_char, *const sqlite3_api_routines) -> c_int;

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto-loaded extension for every new connection.
///
/// Idempotent; must run before the first store connection is opened so that
/// `vec_distance_l2` is available to queries.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    REGISTER.call_once(|| {
        // SAFETY: sqlite3_vec_init has the standard extension entry point
        // signature; the crate only exposes it untyped.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<*const (), ExtensionEntryPoint>(
                sqlite3_vec_init as *const (),
            )));
        }
    });
}
