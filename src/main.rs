/// tilecheck entry point: review tiles from the terminal.
fn main() {
    use std::path::PathBuf;
    use tilecheck::terminal::TerminalHost;
    use tilecheck::{SessionConfig, SessionController};

    let path = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => path,
        None => match SessionConfig::default_path() {
            Some(path) => path,
            None => {
                eprintln!("Usage: tilecheck <config.json>");
                std::process::exit(2);
            }
        },
    };

    let config = match SessionConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Cannot load {}: {}", path.display(), e);
            std::process::exit(2);
        }
    };

    // RUST_LOG overrides the configured level
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let result = SessionController::open(&config).and_then(|mut session| {
        let stdin = std::io::stdin();
        let mut host = TerminalHost::new(stdin.lock(), std::io::stdout());
        session.run(&mut host)
    });

    match result {
        Ok(summary) => println!(
            "Reviewed {} tiles, skipped {}, {} remaining",
            summary.reviewed.len(),
            summary.skipped_missing.len(),
            summary.remaining
        ),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Session error: {}", e);
            std::process::exit(1);
        }
    }
}
