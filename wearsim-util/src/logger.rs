//! Logger

// Imports
use {
	std::{
		fs,
		io,
		path::Path,
		sync::Mutex,
	},
	tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer},
};

/// Messages logged before the logger is initialized.
pub mod pre_init {
	// Imports
	use std::sync::Mutex;

	/// Buffered messages
	static MESSAGES: Mutex<Vec<String>> = Mutex::new(Vec::new());

	/// Records a debug message to be emitted once the logger is initialized
	pub fn debug(message: String) {
		MESSAGES.lock().expect("Poisoned pre-init message buffer").push(message);
	}

	/// Drains all buffered messages
	pub(super) fn drain() -> Vec<String> {
		std::mem::take(&mut *MESSAGES.lock().expect("Poisoned pre-init message buffer"))
	}
}

/// Initializes the logger.
///
/// Logs to stderr, filtered by `RUST_LOG` (defaults to `info`).
/// If `log_file` is given, additionally logs to it, filtered by
/// `RUST_LOG_FILE` (defaults to `debug`).
pub fn init(log_file: Option<&Path>, log_file_append: bool) {
	let stderr_layer = fmt::layer()
		.with_writer(io::stderr)
		.with_filter(env_filter("RUST_LOG", "info"));

	let file_layer = log_file.and_then(|path| {
		let mut open_options = fs::OpenOptions::new();
		open_options.create(true).write(true);
		match log_file_append {
			true => open_options.append(true),
			false => open_options.truncate(true),
		};

		match open_options.open(path) {
			Ok(file) => Some(
				fmt::layer()
					.with_writer(Mutex::new(file))
					.with_ansi(false)
					.with_filter(env_filter("RUST_LOG_FILE", "debug")),
			),
			Err(err) => {
				eprintln!("Unable to create log file {}: {err}", path.display());
				None
			},
		}
	});

	tracing_subscriber::registry().with(stderr_layer).with(file_layer).init();

	// Then emit everything that was logged before we were ready
	for message in pre_init::drain() {
		tracing::debug!("{message}");
	}
}

/// Returns the filter from environment variable `var`, else a `default` filter
fn env_filter(var: &str, default: &str) -> EnvFilter {
	EnvFilter::try_from_env(var).unwrap_or_else(|_| EnvFilter::new(default))
}
