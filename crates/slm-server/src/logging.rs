use std::io::Write;

/// Initialize the global logger.
///
/// `log_level` is an env_logger filter (e.g. `info,slm_core=debug`) and wins
/// over `debug`; without either the level is `info`.
pub fn init_logging(debug: bool, log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) if !level.trim().is_empty() => level.to_string(),
        _ if debug => "debug".to_string(),
        _ => "info".to_string(),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
