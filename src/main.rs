use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use books_loadtest::config::DriverConfig;
use books_loadtest::{LoadTestError, THRESHOLD_EXIT_CODE};

#[tokio::main]
async fn main() -> Result<(), LoadTestError> {
    // Goose's own logger initialization becomes a no-op once this one is installed.
    if let Err(e) = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("failed to initialize logger: {}", e);
    }

    let config = DriverConfig::from_env()?;
    let outcome = books_loadtest::run(config).await?;
    print!("{}", outcome);

    if !outcome.passed() {
        std::process::exit(THRESHOLD_EXIT_CODE);
    }
    Ok(())
}
