//! `tracing` + `tracing-subscriber` initialization (SPEC_FULL.md §6.8).
//! `fatal` has no equivalent tracing level, so it is mapped to `error` — the
//! most severe level tracing actually has.

use tracing_subscriber::EnvFilter;

pub fn init(log_level: &str) {
    let level = match log_level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" | "fatal" => "error",
        other => {
            eprintln!("unrecognized log level '{other}', defaulting to warn");
            "warn"
        }
    };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
