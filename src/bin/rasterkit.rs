use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rasterkit::codec::{self, EncodeOptions, OutputFormat};
use rasterkit::{BatchSummary, Engine, Operation, ProcessResult};

#[derive(Parser)]
#[command(
    name = "rasterkit",
    about = "Apply raster image tools (colorize, background, crop, resize, watermark, ...)",
    version,
    after_help = "The operation is JSON with a \"tool\" key, inline or in a file:\n  \
                  rasterkit photo.jpg -s '{\"tool\": \"resize\", \"width\": 800}'\n  \
                  rasterkit -s '{\"tool\": \"textToImage\", \"text\": \"Hi\"}' -o hi.png"
)]
struct Cli {
    /// Input image file or directory (omit for textToImage)
    input: Option<String>,

    /// Operation as inline JSON or a path to a JSON file
    #[arg(short, long)]
    settings: String,

    /// Output file or directory (default: {name}_{tool}.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Output format (png, jpg, webp, bmp); default from the output extension
    #[arg(short, long)]
    format: Option<String>,

    /// Encoder quality for jpg/webp (1-100)
    #[arg(long, default_value = "92")]
    quality: u8,

    /// Target output size in kilobytes for jpg/webp
    #[arg(long)]
    target_kb: Option<u64>,

    /// Seed for reproducible colorization
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "rasterkit=debug"
    } else if quiet {
        "rasterkit=error"
    } else {
        "rasterkit=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

fn load_operation(settings: &str) -> rasterkit::Result<Operation> {
    let path = Path::new(settings);
    if !settings.trim_start().starts_with('{') && path.is_file() {
        let json = std::fs::read_to_string(path)?;
        return Operation::from_json(&json);
    }
    Operation::from_json(settings)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let operation = match load_operation(&cli.settings) {
        Ok(op) => op,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let format = match cli.format.as_deref() {
        Some(name) => match OutputFormat::from_extension(name) {
            Some(format) => Some(format),
            None => {
                eprintln!("Error: Unsupported output format: {name}");
                process::exit(1);
            }
        },
        None => None,
    };
    let encode = EncodeOptions {
        format,
        quality: cli.quality.clamp(1, 100),
        target_kb: cli.target_kb,
    };
    let engine = cli.seed.map_or_else(Engine::new, Engine::with_seed);

    let results = if operation.needs_input() {
        let Some(input) = &cli.input else {
            eprintln!("Error: {} needs an input image", operation.name());
            process::exit(1);
        };
        let input_path = Path::new(input);
        if !input_path.exists() {
            eprintln!("Error: Input path does not exist: {input}");
            process::exit(1);
        }

        if input_path.is_dir() {
            let output_dir = if let Some(o) = &cli.output {
                PathBuf::from(o)
            } else {
                eprintln!("Error: Output directory is required for batch processing");
                eprintln!("Usage: rasterkit <input_dir> -s <settings> -o <output_dir>");
                process::exit(1);
            };
            engine.process_directory(input_path, &output_dir, &operation, &encode)
        } else {
            let output_path = match &cli.output {
                Some(o) => PathBuf::from(o),
                None => codec::default_output_path(input_path, operation.name(), format),
            };
            vec![engine.process_file(input_path, &output_path, &operation, &encode)]
        }
    } else {
        vec![render(&engine, &operation, cli.output.as_deref(), &encode)]
    };

    for r in &results {
        print_result(r, cli.quiet, cli.verbose);
    }

    let summary = BatchSummary::from_results(&results);
    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {}", summary.success_count);
        if summary.error_count > 0 {
            eprint!(", Failed: {}", summary.error_count);
        }
        eprintln!(" (Total: {})", results.len());
    }

    if summary.error_count > 0 {
        process::exit(1);
    }
}

fn render(
    engine: &Engine,
    operation: &Operation,
    output: Option<&str>,
    encode: &EncodeOptions,
) -> ProcessResult {
    let ext = encode.format.unwrap_or_default().extension();
    let path = output.map_or_else(
        || PathBuf::from(format!("{}.{ext}", operation.name())),
        PathBuf::from,
    );
    let written = engine
        .render(operation)
        .and_then(|buffer| codec::save(&buffer, &path, encode));
    match written {
        Ok(bytes) => ProcessResult {
            message: format!("{bytes} bytes"),
            outputs: vec![path.clone()],
            path,
            success: true,
        },
        Err(e) => ProcessResult {
            message: e.to_string(),
            outputs: Vec::new(),
            path,
            success: false,
        },
    }
}

fn print_result(result: &ProcessResult, quiet: bool, verbose: bool) {
    if quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.success {
        eprintln!("[OK] {filename}: {}", result.message);
        if verbose {
            for output in &result.outputs {
                eprintln!("  -> {}", output.display());
            }
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }
}
