//! Item placement.
//!
//! Before any item is placed, one region with dark rooms is picked and
//! made to require the Lantern on every path leading into it.
//!
//! The world is explored from the spawn with the items collected so far.
//! Each round places one key item picked among those blocking further
//! exploration into a reachable source, then spreads some filler items over
//! what is already reachable. Once nothing blocks exploration anymore, every
//! remaining source is filled from the filler pool.

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::world::{Inventory, Reachability, RegionId, SourceId, World};

/// Share of the reachable empty sources filled with filler after each key item.
pub const FILLING_RATE: f64 = 0.25;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ItemPools {
    pub filler: Vec<u8>,
    /// Placed first anywhere in the world, before any key item.
    pub priority: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("world generation failed for seed {seed}: no reachable source can hold key item '{item}'")]
    NoAppropriateItemSource { item: String, seed: u64 },

    #[error("world generation failed for seed {seed}: the world has no spawn region")]
    MissingSpawn { seed: u64 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    Exploring,
    KeyItemPlacement,
    GoMode,
    Done,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementKind {
    Fixed,
    Priority,
    Key,
    Filler,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub source: String,
    pub region: String,
    pub item: String,
    pub item_id: u8,
    pub kind: PlacementKind,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub reachable_regions: usize,
    pub reachable_empty_sources: usize,
    pub key_item: Option<String>,
    pub key_item_source: Option<String>,
    pub filler_placed: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RandomizationReport {
    pub seed: u64,
    pub dark_region: Option<String>,
    pub key_item_order: Vec<String>,
    pub placements: Vec<Placement>,
    pub unplaced_items: Vec<String>,
    pub unfilled_sources: Vec<String>,
    pub required_key_items: Vec<String>,
    pub steps: Vec<StepReport>,
    /// Next value the generator would have produced.
    pub rng_checkpoint: u64,
}

/// Fills every randomizable source of `world`. The same seed always gives
/// the same placement, or the same failure.
pub fn randomize(
    world: &mut World,
    pools: &ItemPools,
    seed: u64,
) -> Result<RandomizationReport, PlacementError> {
    let spawn = world.spawn().ok_or(PlacementError::MissingSpawn { seed })?;
    let mut randomizer = Randomizer::new(world, pools, seed, spawn);
    randomizer.run()?;
    Ok(randomizer.into_report())
}

struct Randomizer<'a> {
    world: &'a mut World,
    seed: u64,
    spawn: RegionId,
    rng: StdRng,
    inventory: Inventory,
    filler: Vec<u8>,
    priority: Vec<u8>,
    key_item_order: Vec<u8>,
    placements: Vec<(SourceId, PlacementKind)>,
    steps: Vec<StepReport>,
}

impl<'a> Randomizer<'a> {
    fn new(world: &'a mut World, pools: &ItemPools, seed: u64, spawn: RegionId) -> Self {
        Randomizer {
            world,
            seed,
            spawn,
            rng: StdRng::seed_from_u64(seed),
            inventory: Inventory::new(),
            filler: pools.filler.clone(),
            priority: pools.priority.clone(),
            key_item_order: Vec::new(),
            placements: Vec::new(),
            steps: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), PlacementError> {
        self.world.reset_placements();
        self.darken_random_region();
        self.inventory.clear();
        for (id, src) in self.world.sources().iter().enumerate() {
            if src.item.is_some() {
                self.placements.push((id, PlacementKind::Fixed));
            }
        }

        self.filler.shuffle(&mut self.rng);
        self.place_priority_items();

        let mut phase = Phase::Exploring;
        let mut reach = Reachability::default();
        while phase != Phase::Done {
            phase = match phase {
                Phase::Exploring => {
                    reach = self.explore();
                    if reach.needed_items.is_empty() {
                        Phase::GoMode
                    } else {
                        Phase::KeyItemPlacement
                    }
                }
                Phase::KeyItemPlacement => {
                    self.place_key_item(&reach)?;
                    Phase::Exploring
                }
                Phase::GoMode => {
                    self.fill_everything();
                    Phase::Done
                }
                Phase::Done => Phase::Done,
            };
        }
        Ok(())
    }

    fn darken_random_region(&mut self) {
        let mut regions = self.world.darkenable_regions();
        regions.shuffle(&mut self.rng);
        let region = regions.first().copied();
        if let Some(region) = region {
            info!("darkened region: {}", self.world.region(region).name);
        }
        self.world.set_dark_region(region);
    }

    fn place(&mut self, source: SourceId, item: u8, kind: PlacementKind) {
        debug!(
            "{kind:?}: '{}' goes to \"{}\"",
            self.world.catalog().name(item),
            self.world.source(source).name
        );
        self.world.place_item(source, item);
        self.placements.push((source, kind));
    }

    fn place_priority_items(&mut self) {
        let mut items = std::mem::take(&mut self.priority);
        items.shuffle(&mut self.rng);
        let mut sources = self.world.empty_sources();
        sources.shuffle(&mut self.rng);

        for item in items {
            let target = sources.iter().position(|&s| {
                self.world.source(s).item.is_none() && self.world.is_item_compatible(s, Some(item))
            });
            match target {
                Some(idx) => {
                    let source = sources.remove(idx);
                    self.place(source, item, PlacementKind::Priority);
                }
                None => {
                    warn!(
                        "no source can hold priority item '{}'",
                        self.world.catalog().name(item)
                    );
                    self.filler.push(item);
                }
            }
        }
    }

    /// Re-explores until the items lying in reachable sources stop opening
    /// anything new.
    fn explore(&mut self) -> Reachability {
        loop {
            let reach = self.world.evaluate_reachable_regions(self.spawn, &self.inventory);
            let mut grew = false;
            for &item in &reach.collected_items {
                grew |= self.inventory.insert(item);
            }
            if !grew {
                return reach;
            }
        }
    }

    fn place_key_item(&mut self, reach: &Reachability) -> Result<(), PlacementError> {
        let mut sources = reach.empty_sources.clone();
        sources.shuffle(&mut self.rng);

        let mut candidates: Vec<u8> = reach
            .needed_items
            .iter()
            .flat_map(|n| std::iter::repeat(n.item).take(usize::from(n.weight.max(1))))
            .collect();
        candidates.shuffle(&mut self.rng);
        let Some(&item) = candidates.first() else {
            return Ok(());
        };

        let Some(idx) = sources
            .iter()
            .position(|&s| self.world.is_item_compatible(s, Some(item)))
        else {
            return Err(PlacementError::NoAppropriateItemSource {
                item: self.world.catalog().name(item),
                seed: self.seed,
            });
        };
        let source = sources.remove(idx);
        self.place(source, item, PlacementKind::Key);
        self.inventory.insert(item);
        self.key_item_order.push(item);

        let count = (sources.len() as f64 * FILLING_RATE).floor() as usize;
        let filled = self.fill_sources(&sources[..count]);
        self.steps.push(StepReport {
            step: self.steps.len() + 1,
            reachable_regions: reach.regions.len(),
            reachable_empty_sources: reach.empty_sources.len(),
            key_item: Some(self.world.catalog().name(item)),
            key_item_source: Some(self.world.source(source).name.clone()),
            filler_placed: filled,
        });
        Ok(())
    }

    /// Puts the first compatible filler item in each source. Sources nothing
    /// fits in are left empty.
    fn fill_sources(&mut self, sources: &[SourceId]) -> usize {
        let mut filled = 0;
        for &source in sources {
            let pick = self
                .filler
                .iter()
                .position(|&item| self.world.is_item_compatible(source, Some(item)));
            if let Some(idx) = pick {
                let item = self.filler.remove(idx);
                self.place(source, item, PlacementKind::Filler);
                filled += 1;
            }
        }
        filled
    }

    fn fill_everything(&mut self) {
        let reach = self.explore();
        let sources = self.world.empty_sources();
        let filled = self.fill_sources(&sources);
        self.steps.push(StepReport {
            step: self.steps.len() + 1,
            reachable_regions: reach.regions.len(),
            reachable_empty_sources: reach.empty_sources.len(),
            key_item: None,
            key_item_source: None,
            filler_placed: filled,
        });
        info!(
            "placed {} key items, {} filler items left over",
            self.key_item_order.len(),
            self.filler.len()
        );
    }

    fn into_report(mut self) -> RandomizationReport {
        let world = &*self.world;
        let placements = self
            .placements
            .iter()
            .filter_map(|&(source, kind)| {
                let src = world.source(source);
                src.item.map(|item_id| Placement {
                    source: src.name.clone(),
                    region: world.region(src.region).name.clone(),
                    item: world.catalog().name(item_id),
                    item_id,
                    kind,
                })
            })
            .collect();

        let required_key_items = world
            .goal()
            .map(|goal| {
                world
                    .strictly_required_items(goal)
                    .into_iter()
                    .map(|i| world.catalog().name(i))
                    .collect()
            })
            .unwrap_or_default();

        let unfilled_sources: Vec<String> = world
            .sources()
            .iter()
            .filter(|s| s.item.is_none())
            .map(|s| s.name.clone())
            .collect();
        if !unfilled_sources.is_empty() {
            warn!("{} sources were left empty", unfilled_sources.len());
        }

        RandomizationReport {
            seed: self.seed,
            dark_region: world.dark_region().map(|r| world.region(r).name.clone()),
            key_item_order: self
                .key_item_order
                .iter()
                .map(|&i| world.catalog().name(i))
                .collect(),
            placements,
            unplaced_items: self.filler.iter().map(|&i| world.catalog().name(i)).collect(),
            unfilled_sources,
            required_key_items,
            steps: self.steps.clone(),
            rng_checkpoint: self.rng.gen(),
        }
    }
}
