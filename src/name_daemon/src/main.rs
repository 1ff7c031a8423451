mod name_daemon;

use log::error;
use std::env;
use std::path::PathBuf;

use crate::name_daemon::{run_name_daemon, NameDaemonRunOptions, DEFAULT_NAME_DAEMON_CONFIG_PATH};

fn usage() -> String {
    format!(
        "usage: name_daemon [--config <path>] [--data-dir <path>]\n\
         defaults:\n\
         --config {}",
        DEFAULT_NAME_DAEMON_CONFIG_PATH
    )
}

fn parse_args(args: &[String]) -> Result<NameDaemonRunOptions, String> {
    let mut config_path = PathBuf::from(DEFAULT_NAME_DAEMON_CONFIG_PATH);
    let mut data_dir = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Err(usage()),
            "--config" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config_path = PathBuf::from(value);
            }
            "--data-dir" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --data-dir".to_string())?;
                data_dir = Some(PathBuf::from(value));
            }
            other => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
        }
        i += 1;
    }

    Ok(NameDaemonRunOptions {
        config_path,
        data_dir,
    })
}

fn main() {
    env_logger::init();
    let args = env::args().skip(1).collect::<Vec<String>>();
    let options = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    if let Err(err) = run_name_daemon(options) {
        error!("run name_daemon failed: {}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod name_daemon_tests;
