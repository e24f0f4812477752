use std::{
    fs::File,
    path::{Path, PathBuf},
};

pub use cli::CLIParser;
pub use compress::{
    ChannelSvd, Compressible, compress_channel, compress_image, effective_rank,
    frobenius_distance, frobenius_norm, parse_rank, quantize, storage_ratio,
};
pub use error::CompressionError;
pub use imagewrapper::{Image, PixelArray, side_by_side};
use image::ImageFormat;
use log::LevelFilter;
use rayon::ThreadPoolBuilder;

mod cli;
pub mod compress;
pub mod error;
pub mod imagewrapper;
mod jacobi;
pub mod logger;

pub type Result<T> = std::result::Result<T, error::CompressionError>;

pub struct Arguments {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub rank: usize,
    pub number_of_threads: usize,
    pub log_level: LevelFilter,
    pub log_config: Option<PathBuf>,
}

fn open_input_file(file_path: &Path) -> Result<File> {
    File::open(file_path).map_err(CompressionError::from)
}

fn report(original: &Image, approximation: &Image, rank: usize) -> Result<()> {
    let (height, width) = (original.height(), original.width());
    log::info!(
        "{}x{} image, {} channel(s), rank {} keeps {:.1}% of the raw storage",
        width,
        height,
        original.channels().len(),
        rank,
        100.0 * storage_ratio(height, width, rank)
    );
    for (index, (source, approx)) in original
        .channels()
        .iter()
        .zip(approximation.channels())
        .enumerate()
    {
        let norm = frobenius_norm(source.as_ref());
        let error = frobenius_distance(source.as_ref(), approx.as_ref())?;
        let relative = if norm > 0.0 { error / norm } else { 0.0 };
        log::info!("channel {}: relative Frobenius error {:.4}", index, relative);
    }
    Ok(())
}

/// Loads the input, compresses it to the requested rank and writes the original
/// and the approximation side by side. Nothing is written on failure.
pub fn run(arguments: &Arguments) -> Result<()> {
    let format = ImageFormat::from_path(&arguments.output_file)?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(arguments.number_of_threads)
        .build()
        .map_err(|e| CompressionError::InvalidArgument(format!("thread pool: {}", e)))?;

    let original = imagewrapper::load(open_input_file(&arguments.input_file)?)?;
    let image = Image::from_dynamic(&original)?;

    let approximation = pool.install(|| image.compress(arguments.rank))?;
    let kept = arguments.rank.min(image.height().min(image.width()));
    report(&image, &approximation, kept)?;

    let compressed = quantize(&approximation).into_dynamic()?;
    let canvas = side_by_side(&original, &compressed)?;
    imagewrapper::save(&canvas, &arguments.output_file, format)
}
