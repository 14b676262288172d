use std::path::Path;

/// Loads `.env` (or the given file) and then starts `env_logger`, so a
/// `RUST_LOG` set in the dotenv file takes effect. Variables already present
/// in the process environment win over the file.
pub fn init(default_filter: &str, dotenv_file: Option<&Path>) {
    let loaded = match dotenv_file {
        Some(path) => dotenv::from_path(path).map(|_| path.to_path_buf()),
        None => dotenv::dotenv(),
    };

    let _ = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(default_filter))
        .try_init();

    match loaded {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(e) => log::debug!("No dotenv file loaded: {}", e),
    }
}
