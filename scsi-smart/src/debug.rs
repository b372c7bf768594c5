// feature=log? use log::debug
//   neither? use nothing (but still type-check the arguments)

#[cfg(feature = "log")]
pub(crate) use log::debug as println;

#[cfg(not(feature = "log"))]
macro_rules! println {
    ($($arg:tt)*) => {{
        if false {
            let _ = format!($($arg)*);
        }
    }};
}

#[cfg(not(feature = "log"))]
pub(crate) use println;
