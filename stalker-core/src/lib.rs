use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod asm;
pub mod bitfield;
pub mod huffman;
pub mod items;
pub mod patch_script;
pub mod randomizer;
pub mod rom;
pub mod textbanks;
pub mod world;
pub mod world_data;

use huffman::{HuffmanTrees, TextEncodeMode, TextError};
use patch_script::{apply_patches, parse_patch_script, PatchScriptError};
use randomizer::{randomize, PlacementError, RandomizationReport};
use rom::{GameRom, RomError};
use textbanks::{reencode_game_text, TextBanks};
use world_data::WorldData;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomiserSettings {
    pub seed: u64,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// World description to use instead of the built-in one.
    #[serde(default)]
    pub world_path: Option<PathBuf>,
    /// Region name replacing the world's spawn point.
    #[serde(default)]
    pub spawn: Option<String>,
    #[serde(default)]
    pub patches_before: Vec<PathBuf>,
    #[serde(default)]
    pub patches_after: Vec<PathBuf>,
    #[serde(default)]
    pub reencode_text: bool,
    #[serde(default)]
    pub text_mode: TextEncodeMode,
    #[serde(default)]
    pub dump_text: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
}

impl RandomiserSettings {
    pub fn new(seed: u64, input_path: PathBuf, output_path: PathBuf) -> Self {
        RandomiserSettings {
            seed,
            input_path,
            output_path,
            world_path: None,
            spawn: None,
            patches_before: Vec::new(),
            patches_after: Vec::new(),
            reencode_text: false,
            text_mode: TextEncodeMode::default(),
            dump_text: None,
            debug: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Error)]
pub enum RandomiserError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("input is not a Landstalker ROM ({len} bytes, expected {})", rom::ROM_SIZE)]
    InvalidRom { len: usize },
    #[error("world data error: {0}")]
    WorldData(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Rom(#[from] RomError),
    #[error("text error: {0}")]
    Text(#[from] TextError),
    #[error("patch script {}: {source}", path.display())]
    Patch {
        path: PathBuf,
        #[source]
        source: PatchScriptError,
    },
    #[error(transparent)]
    Placement(#[from] PlacementError),
}

pub type Result<T> = std::result::Result<T, RandomiserError>;

fn apply_patch_files(rom: &mut GameRom, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let src = fs::read_to_string(path)?;
        let patches = parse_patch_script(&src).map_err(|source| RandomiserError::Patch {
            path: path.clone(),
            source,
        })?;
        let applied = apply_patches(rom, &patches);
        info!("applied {applied} patches from {}", path.display());
    }
    Ok(())
}

fn sidecar_path(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn run(settings: RandomiserSettings) -> Result<RandomizationReport> {
    if !settings.input_path.exists() {
        return Err(RandomiserError::Config(format!(
            "Input path does not exist: {}",
            settings.input_path.display()
        )));
    }

    info!("loading ROM from {}", settings.input_path.display());
    let mut rom = GameRom::load(&settings.input_path)?;
    apply_patch_files(&mut rom, &settings.patches_before)?;

    let world_data = match &settings.world_path {
        Some(path) => {
            info!("loading world from {}", path.display());
            WorldData::load(path)?
        }
        None => WorldData::landstalker()?,
    };
    let (mut world, pools) = world_data.build()?;

    if let Some(name) = &settings.spawn {
        let region = world.region_by_name(name).ok_or_else(|| {
            RandomiserError::Config(format!("spawn region '{name}' does not exist"))
        })?;
        world.set_spawn(region);
    }

    info!(
        "randomizing {} sources over {} regions with seed {}",
        world.sources().len(),
        world.regions().len(),
        settings.seed
    );
    let report = randomize(&mut world, &pools, settings.seed)?;
    world.write_to_rom(&mut rom)?;

    let text = if settings.reencode_text {
        info!("re-encoding game text ({:?})", settings.text_mode);
        Some(reencode_game_text(&mut rom, settings.text_mode)?)
    } else if settings.dump_text.is_some() {
        let trees = HuffmanTrees::parse_from_rom(&rom)?;
        Some(TextBanks::read(&rom, &trees)?)
    } else {
        None
    };

    if let (Some(path), Some(lines)) = (&settings.dump_text, &text) {
        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(path, out)?;
        info!("wrote {} text lines to {}", lines.len(), path.display());
    }

    apply_patch_files(&mut rom, &settings.patches_after)?;

    if let Some(parent) = settings.output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    rom.save(&settings.output_path)?;
    info!(
        "wrote {} (checksum {:#06X})",
        settings.output_path.display(),
        rom.checksum()
    );

    if settings.debug {
        let placements_path = sidecar_path(&settings.output_path, ".placements.json");
        fs::write(&placements_path, serde_json::to_string_pretty(&report)?)?;
        let settings_path = sidecar_path(&settings.output_path, ".settings.json");
        fs::write(&settings_path, serde_json::to_string_pretty(&settings)?)?;
        debug!(
            "wrote {} and {}",
            placements_path.display(),
            settings_path.display()
        );
    }

    Ok(report)
}
