use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use cartoonme_contracts::events::{EventPayload, EventWriter};
use cartoonme_contracts::params::{
    format_control_strength, lookup_theme_parameters, theme_parameters,
};
use cartoonme_contracts::themes::catalog;
use cartoonme_engine::{
    error_chain_text, new_run_id, FixedDetector, ImageProcessor, ProcessorConfig, StylizedImage,
    DEFAULT_PROVIDER, GENERIC_FAILURE_MESSAGE, STYLIZER_NAMES,
};
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(name = "cartoonme", version, about = "Turn photos into themed cartoons")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Themes(ThemesArgs),
    Params(ParamsArgs),
    Cartoonify(CartoonifyArgs),
}

#[derive(Debug, Parser)]
struct ThemesArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct ParamsArgs {
    #[arg(long)]
    theme: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct CartoonifyArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    theme: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(
        long,
        default_value = DEFAULT_PROVIDER,
        value_parser = PossibleValuesParser::new(STYLIZER_NAMES)
    )]
    provider: String,
    #[arg(long)]
    strength: Option<f64>,
    /// Tell the model the photo shows people.
    #[arg(long, conflicts_with = "no_person")]
    person: bool,
    /// Tell the model the photo shows no people.
    #[arg(long)]
    no_person: bool,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("cartoonme error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Themes(args) => run_themes(args),
        Command::Params(args) => run_params(args),
        Command::Cartoonify(args) => Ok(run_cartoonify(args)),
    }
}

fn run_themes(args: ThemesArgs) -> Result<i32> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(catalog())?);
        return Ok(0);
    }
    for theme in catalog() {
        let logo = theme.logo.unwrap_or("-");
        println!(
            "{:<18} {}  sample={} logo={}",
            theme.name,
            theme.color.hex(),
            theme.sample_image,
            logo
        );
    }
    Ok(0)
}

fn run_params(args: ParamsArgs) -> Result<i32> {
    let known = lookup_theme_parameters(&args.theme).is_some();
    let params = theme_parameters(&args.theme);
    if args.json {
        let payload = json!({
            "theme": args.theme,
            "known": known,
            "parameters": params,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(0);
    }
    if !known {
        println!(
            "Theme '{}' not explicitly defined; showing default cartoon parameters.",
            args.theme.trim()
        );
    }
    println!(
        "control_strength: {}",
        format_control_strength(params.control_strength)
    );
    println!("output_format: {}", params.output_format.as_str());
    println!("prompt_enhancers: {}", params.positive_prompt_enhancers);
    println!("negative_prompt: {}", params.negative_prompt);
    Ok(0)
}

fn default_events_path(out: &Path) -> PathBuf {
    out.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join("events.jsonl"))
        .unwrap_or_else(|| PathBuf::from("events.jsonl"))
}

/// Every failure prints the same generic line and exits 1; the detail only
/// goes to the event log.
fn run_cartoonify(args: CartoonifyArgs) -> i32 {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| default_events_path(&args.out));
    let events = EventWriter::new(&events_path, new_run_id());
    match cartoonify_to_file(&args, &events) {
        Ok(Some(image)) => {
            println!(
                "Saved {} ({}x{}, {})",
                args.out.display(),
                image.width,
                image.height,
                image.mime_type
            );
            0
        }
        // The processor has already logged why.
        Ok(None) => {
            eprintln!("{GENERIC_FAILURE_MESSAGE}");
            1
        }
        Err(err) => {
            let mut payload = EventPayload::new();
            payload.insert("theme".to_string(), Value::String(args.theme.clone()));
            payload.insert("provider".to_string(), Value::String(args.provider.clone()));
            payload.insert(
                "error".to_string(),
                Value::String(error_chain_text(&err, 2048)),
            );
            let _ = events.emit("stylize_failed", payload);
            eprintln!("{GENERIC_FAILURE_MESSAGE}");
            1
        }
    }
}

fn cartoonify_to_file(
    args: &CartoonifyArgs,
    events: &EventWriter,
) -> Result<Option<StylizedImage>> {
    let image_bytes = fs::read(&args.image)
        .with_context(|| format!("failed reading {}", args.image.display()))?;
    let mut processor = ImageProcessor::new(ProcessorConfig::from_env())?
        .with_provider(&args.provider)?
        .with_events(events.clone());
    if args.person || args.no_person {
        processor = processor.with_detector(FixedDetector(args.person));
    }

    println!(
        "Cartoonifying {} as '{}' via {}...",
        args.image.display(),
        args.theme.trim(),
        processor.provider()
    );
    let (tx, rx) = mpsc::channel();
    let worker = processor.cartoonify_in_background(
        image_bytes,
        args.theme.clone(),
        args.strength,
        move |result| {
            let _ = tx.send(result);
        },
    );
    let result = rx.recv().ok().flatten();
    worker
        .join()
        .map_err(|_| anyhow!("stylization worker panicked"))?;

    let Some(image) = result else {
        return Ok(None);
    };
    if let Some(parent) = args.out.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&args.out, &image.bytes)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    Ok(Some(image))
}
