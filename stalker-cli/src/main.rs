use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;

use stalker_core::huffman::TextEncodeMode;
use stalker_core::{run, RandomiserSettings};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TextMode {
    Lenient,
    Strict,
}

impl From<TextMode> for TextEncodeMode {
    fn from(mode: TextMode) -> Self {
        match mode {
            TextMode::Lenient => TextEncodeMode::Lenient,
            TextMode::Strict => TextEncodeMode::Strict,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "stalker-randomiser", version, about = "Landstalker item randomiser")]
struct Args {
    /// Load every option from a JSON settings file instead of the flags below.
    #[arg(long, value_name = "JSON")]
    settings: Option<PathBuf>,

    #[arg(long, required_unless_present = "settings")]
    input: Option<PathBuf>,

    #[arg(long, required_unless_present = "settings")]
    output: Option<PathBuf>,

    #[arg(long, required_unless_present = "settings")]
    seed: Option<u64>,

    /// World description replacing the built-in one.
    #[arg(long, value_name = "JSON")]
    world: Option<PathBuf>,

    /// Start the game in another region.
    #[arg(long)]
    spawn: Option<String>,

    /// Patch scripts applied before randomization. Can be repeated.
    #[arg(long = "patch-before", value_name = "SCRIPT")]
    patches_before: Vec<PathBuf>,

    /// Patch scripts applied after randomization. Can be repeated.
    #[arg(long = "patch-after", value_name = "SCRIPT")]
    patches_after: Vec<PathBuf>,

    #[arg(long, default_value_t = false)]
    reencode_text: bool,

    #[arg(long, value_enum, default_value_t = TextMode::Lenient)]
    text_mode: TextMode,

    /// Write the decoded game text to this file.
    #[arg(long, value_name = "TXT")]
    dump_text: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn settings_from_args(args: Args) -> Result<RandomiserSettings, String> {
    if let Some(path) = &args.settings {
        let mut settings = RandomiserSettings::load(path).map_err(|e| e.to_string())?;
        settings.debug |= args.debug;
        return Ok(settings);
    }

    // clap guarantees these three whenever --settings is absent.
    let (Some(seed), Some(input), Some(output)) = (args.seed, args.input, args.output) else {
        return Err("--input, --output and --seed are required".to_string());
    };

    let mut settings = RandomiserSettings::new(seed, input, output);
    settings.world_path = args.world;
    settings.spawn = args.spawn;
    settings.patches_before = args.patches_before;
    settings.patches_after = args.patches_after;
    settings.reencode_text = args.reencode_text;
    settings.text_mode = args.text_mode.into();
    settings.dump_text = args.dump_text;
    settings.debug = args.debug;
    Ok(settings)
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let settings = match settings_from_args(args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };

    match run(settings) {
        Ok(report) => {
            info!(
                "seed {}: {} items placed, key items in order: {}",
                report.seed,
                report.placements.len(),
                report.key_item_order.join(", ")
            );
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}
