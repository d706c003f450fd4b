pub mod process;

pub use process::{is_process_alive, read_pid_file, terminate_process_group, write_pid_file};

use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install a file-backed subscriber. Returns false if one was already set.
pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init()
        .is_ok()
}
