mod app;

use app::{AppError, PingApp};
use crossterm::style::Stylize;
use flexi_logger::Logger;

fn main() {
    if let Err(err) = run() {
        eprintln!("ping: {}", err.to_string().red());
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let app = PingApp::from_args()?;

    let logger = if app.verbose() {
        Logger::try_with_str("debug")?
    } else {
        Logger::try_with_env_or_str("warn")?
    };
    let _logger = logger.start()?;

    app.run()
}
