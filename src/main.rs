use std::process::ExitCode;

use tilesizer::error::TileError;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match tilesizer::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            let code = e
                .downcast_ref::<TileError>()
                .map(TileError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}
