use std::io::Write;

use colored::Colorize;
use env_logger::Builder;
use log::Level;

pub fn init() {
    let mut builder = Builder::from_default_env();

    builder
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => "ERROR".red(),
                Level::Warn => "WARN".yellow(),
                Level::Info => "INFO".green(),
                Level::Debug => "DEBUG".blue(),
                Level::Trace => "TRACE".magenta(),
            };
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                level,
                record.target(),
                record.args()
            )
        })
        .try_init()
        .ok();
}
