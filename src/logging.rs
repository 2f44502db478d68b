//! Logging macros shared by the library and the firmware.
//!
//! With the `firmware` feature the macros forward to `defmt` (RTT transport).
//! Unit tests print to stdout/stderr. Anything else compiles the arguments
//! but emits nothing, so arguments must implement both `defmt::Format` and
//! `core::fmt::Display`.

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        std::eprintln!("[ERROR] {}", ::core::format_args!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        std::eprintln!("[WARN] {}", ::core::format_args!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        std::println!("[INFO] {}", ::core::format_args!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        std::println!("[DEBUG] {}", ::core::format_args!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "firmware")]
        ::defmt::trace!($($arg)*);

        #[cfg(all(not(feature = "firmware"), test))]
        std::println!("[TRACE] {}", ::core::format_args!($($arg)*));

        #[cfg(all(not(feature = "firmware"), not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}
