use std::process::ExitCode;

fn main() -> ExitCode {
    audiomoth_live::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = match audiomoth_live::cli::parse(&args) {
        Ok(settings) => settings,
        Err(err) => {
            audiomoth_live::console::error(&err.to_string());
            return ExitCode::FAILURE;
        }
    };

    match audiomoth_live::lifecycle::run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
