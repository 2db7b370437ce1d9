//! Environment Interceptor: guarded replacements for global capabilities.

pub(crate) mod channel;
pub(crate) mod console;
pub(crate) mod dynamic_code;
pub(crate) mod shield;
pub mod storage;

pub use shield::{is_devtools_shortcut, SHIELDED_EVENTS};
pub use storage::SuspiciousKeys;
