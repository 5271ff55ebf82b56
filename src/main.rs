use std::process::ExitCode;

use http_dump::{bootstrap, logging, Config, DumpServer};
use log::error;

fn main() -> ExitCode {
    logging::init();

    let config = Config::from_args();

    match bootstrap(&config).and_then(DumpServer::run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
