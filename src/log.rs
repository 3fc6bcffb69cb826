use tracing::metadata::LevelFilter;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber.
///
/// `verbose` counts `-v` flags: 1 = WARN, 2 = INFO, 3+ = DEBUG. With no flag the
/// filter comes from `RUST_LOG`.
pub fn log_init(verbose: u8) {
    let log_level = match verbose {
        0 => None,
        1 => Some(LevelFilter::WARN),
        2 => Some(LevelFilter::INFO),
        _ => Some(LevelFilter::DEBUG),
    };

    let builder = SubscriberBuilder::default().with_writer(std::io::stderr);
    let installed = match log_level {
        Some(level) => builder.with_max_level(level).try_init(),
        None => builder.with_env_filter(EnvFilter::from_default_env()).try_init(),
    };
    if let Err(err) = installed {
        eprintln!("logging already initialised: {err}");
    }
}
