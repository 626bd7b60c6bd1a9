// Roel Kluin, 2023, GPL v3

//! Debug-build helpers. Everything here compiles to nothing observable in release builds.

#[macro_export]
macro_rules! dbg_print {
	($($arg:tt)+) => {
		if cfg!(debug_assertions) {
			::tracing::trace!($($arg)+);
		}
	};
}

/// Like `debug_assert!`, but the failure is also reported through `tracing` so it ends up in
/// the run log next to the events that led to it.
#[macro_export]
macro_rules! dbg_assert {
	($cond:expr $(,)?) => {
		$crate::dbg_assert!($cond, "assertion failed: {}", stringify!($cond))
	};
	($cond:expr, $($arg:tt)+) => {
		if cfg!(debug_assertions) && !($cond) {
			::tracing::error!($($arg)+);
			panic!($($arg)+);
		}
	};
}

#[macro_export]
macro_rules! dbg_assert_eq {
	($left:expr, $right:expr $(,)?) => {
		match (&$left, &$right) {
			(left, right) => {
				$crate::dbg_assert!(
					*left == *right,
					"[{}:{}] {} != {}: {:?} vs {:?}",
					file!(),
					line!(),
					stringify!($left),
					stringify!($right),
					left,
					right
				);
			}
		}
	};
}
