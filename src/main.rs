use std::env::args_os;
use std::process::ExitCode;

use rankcompress::{CLIParser, logger, run};

fn main() -> ExitCode {
    let mut cli_parser = CLIParser::default();
    let arguments = cli_parser.parse(args_os());

    if let Err(e) = logger::init(arguments.log_level, arguments.log_config.as_deref()) {
        eprintln!("Logging setup failed because of: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&arguments) {
        Ok(_) => {
            log::info!("Wrote {}", arguments.output_file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Compression failed ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}
