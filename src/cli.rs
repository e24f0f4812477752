use crate::Arguments;
use crate::compress::parse_rank;
use clap::{
    Arg, ArgMatches, Command, arg, crate_description, crate_name, crate_version, value_parser,
};
use log::LevelFilter;
use std::ffi::OsString;
use std::path::PathBuf;
use std::{io, thread};

const DEFAULT_OUTPUT_FILE: &str = "compressed_image.png";
const DEFAULT_RANK: &str = "2";

pub struct CLIParser {
    command: Command,
}

impl CLIParser {
    pub fn new() -> Self {
        let command = Self::create_base_command();
        let command = Self::register_arguments(command);
        CLIParser { command }
    }

    pub fn parse<I, T>(&mut self, itr: I) -> Arguments
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self
            .command
            .try_get_matches_from_mut(itr)
            .unwrap_or_else(|e| e.exit());
        Self::extract_arguments(&matches)
    }

    fn register_arguments(command: Command) -> Command {
        let command = Self::register_input_file_argument(command);
        let command = Self::register_output_file_argument(command);
        let command = Self::register_rank_argument(command);
        let command = Self::register_threads_argument(command);
        let command = Self::register_log_level_argument(command);
        Self::register_log_config_argument(command)
    }

    fn register_input_file_argument(command: Command) -> Command {
        command.arg(Self::create_input_file_argument())
    }

    fn register_output_file_argument(command: Command) -> Command {
        command.arg(Self::create_output_file_argument())
    }

    fn register_rank_argument(command: Command) -> Command {
        command.arg(Self::create_rank_argument())
    }

    fn register_threads_argument(command: Command) -> Command {
        command.arg(Self::create_threads_argument())
    }

    fn register_log_level_argument(command: Command) -> Command {
        command.arg(Self::create_log_level_argument())
    }

    fn register_log_config_argument(command: Command) -> Command {
        command.arg(Self::create_log_config_argument())
    }

    fn create_base_command() -> Command {
        Command::new(crate_name!())
            .version(crate_version!())
            .about(crate_description!())
    }

    fn create_input_file_argument() -> Arg {
        Arg::new("input_file")
            .help("Path to the source image")
            .value_parser(value_parser!(PathBuf))
            .required(true)
    }

    fn create_output_file_argument() -> Arg {
        Arg::new("output_file")
            .help("Path of the side-by-side comparison image, format taken from the extension")
            .value_parser(value_parser!(PathBuf))
            .default_value(DEFAULT_OUTPUT_FILE)
    }

    fn create_rank_argument() -> Arg {
        arg!(-k --rank <RANK> "Number of singular values kept per channel")
            .default_value(DEFAULT_RANK)
            .allow_negative_numbers(true)
            .value_parser(parse_rank)
    }

    fn create_threads_argument() -> Arg {
        arg!(-t --threads <THREADS> "Number of threads")
            .default_value(get_number_of_threads().unwrap_or(1).to_string())
            .required(false)
            .value_parser(value_parser!(usize))
    }

    fn create_log_level_argument() -> Arg {
        Arg::new("log_level")
            .short('l')
            .long("log-level")
            .value_name("LEVEL")
            .help("Log level of the console logger")
            .default_value("info")
            .value_parser(["error", "warn", "info", "debug", "trace"])
    }

    fn create_log_config_argument() -> Arg {
        Arg::new("log_config")
            .long("log-config")
            .value_name("FILE")
            .help("log4rs configuration file, replaces the console logger")
            .value_parser(value_parser!(PathBuf))
            .required(false)
    }

    fn extract_arguments(matches: &ArgMatches) -> Arguments {
        Arguments {
            input_file: Self::extract_input_file_argument(matches),
            output_file: Self::extract_output_file_argument(matches),
            rank: Self::extract_rank_argument(matches),
            number_of_threads: Self::extract_threads_argument(matches),
            log_level: Self::extract_log_level_argument(matches),
            log_config: Self::extract_log_config_argument(matches),
        }
    }

    fn extract_input_file_argument(matches: &ArgMatches) -> PathBuf {
        matches
            .get_one::<PathBuf>("input_file")
            .expect("Required argument input_file not provided")
            .clone()
    }

    fn extract_output_file_argument(matches: &ArgMatches) -> PathBuf {
        matches
            .get_one::<PathBuf>("output_file")
            .expect("Output file must be provided, but was unset.")
            .clone()
    }

    fn extract_rank_argument(matches: &ArgMatches) -> usize {
        matches
            .get_one::<usize>("rank")
            .expect("Rank must be provided, but was unset.")
            .to_owned()
    }

    fn extract_threads_argument(matches: &ArgMatches) -> usize {
        matches
            .get_one::<usize>("threads")
            .expect("Required argument threads not provided")
            .to_owned()
    }

    fn extract_log_level_argument(matches: &ArgMatches) -> LevelFilter {
        matches
            .get_one::<String>("log_level")
            .expect("Log level must be provided, but was unset.")
            .parse::<LevelFilter>()
            .expect("Argument value for log level must be a known level")
    }

    fn extract_log_config_argument(matches: &ArgMatches) -> Option<PathBuf> {
        matches.get_one::<PathBuf>("log_config").cloned()
    }
}

impl Default for CLIParser {
    fn default() -> Self {
        Self::new()
    }
}

fn get_number_of_threads() -> io::Result<usize> {
    Ok(thread::available_parallelism()?.get())
}
