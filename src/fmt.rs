//! Logging facade.
//!
//! Log statements go to `defmt` or `log` depending on the enabled feature.
//! With neither feature enabled the macros expand to nothing.

#![allow(unused_imports, unused_macros)]

cfg_if::cfg_if! {
    if #[cfg(feature = "defmt")] {
        pub(crate) use defmt::{debug, error, info, trace, warn};
    } else if #[cfg(feature = "log")] {
        pub(crate) use log::{debug, error, info, trace, warn};
    } else {
        pub(crate) use noop::{debug, error, info, trace, warn};
    }
}

#[cfg(not(any(feature = "defmt", feature = "log")))]
mod noop {
    macro_rules! noop_trace {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! noop_debug {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! noop_info {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! noop_warn {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! noop_error {
        ($($arg:tt)*) => {{}};
    }
    // a macro named `warn` cannot be re-exported under its own name
    pub(crate) use noop_debug as debug;
    pub(crate) use noop_error as error;
    pub(crate) use noop_info as info;
    pub(crate) use noop_trace as trace;
    pub(crate) use noop_warn as warn;
}
