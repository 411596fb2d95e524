use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "HEALTHCHECK_LOG";

/// Install the stderr subscriber. `HEALTHCHECK_LOG` wins over `verbosity`
/// (0 = warn, 1 = info, 2+ = debug). Safe to call more than once.
pub fn init(verbosity: u8) {
    let fallback = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
