use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::items::ItemCatalog;
use crate::randomizer::ItemPools;
use crate::world::{ShopId, SourceKind, World};
use crate::{RandomiserError, Result};

const LANDSTALKER_WORLD: &str = include_str!("../data/world.json");

/// Either a plain JSON integer or a string such as `"0x02101D"`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(u32),
    Text(String),
}

impl Number {
    pub fn value(&self) -> Result<u32> {
        match self {
            Number::Int(v) => Ok(*v),
            Number::Text(s) => {
                let s = s.trim();
                let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => s.parse::<u32>(),
                };
                parsed.map_err(|_| RandomiserError::WorldData(format!("'{s}' is not a number")))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKindData {
    Chest {
        chest_id: Number,
    },
    Ground {
        addresses: Vec<Number>,
    },
    Shop {
        shop: String,
        addresses: Vec<Number>,
        #[serde(default = "default_true")]
        allow_lifestock: bool,
    },
    NpcReward {
        addresses: Vec<Number>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceData {
    pub name: String,
    #[serde(flatten)]
    pub kind: SourceKindData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    /// Pre-seeded content. The randomizer never touches such a source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestrictedSourceData {
    pub requires: String,
    pub source: SourceData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    /// Rooms left without light if this region gets darkened.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dark_rooms: Vec<Number>,
    #[serde(default)]
    pub sources: Vec<SourceData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted: Vec<RestrictedSourceData>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathData {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: u16,
    #[serde(default)]
    pub two_way: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolEntry {
    pub item: String,
    pub count: usize,
}

/// Serializable description of the game world and its item pools.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldData {
    pub spawn: String,
    #[serde(default)]
    pub goal: Option<String>,
    pub regions: Vec<RegionData>,
    #[serde(default)]
    pub paths: Vec<PathData>,
    #[serde(default)]
    pub filler_items: Vec<PoolEntry>,
    #[serde(default)]
    pub priority_items: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> u16 {
    1
}

impl WorldData {
    /// The stock world shipped with the crate.
    pub fn landstalker() -> Result<Self> {
        Self::from_json(LANDSTALKER_WORLD)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn build(&self) -> Result<(World, ItemPools)> {
        let catalog = ItemCatalog::landstalker();
        let item_id = |name: &str| -> Result<u8> {
            catalog
                .by_name(name)
                .map(|i| i.id)
                .ok_or_else(|| RandomiserError::WorldData(format!("unknown item '{name}'")))
        };

        let mut world = World::new(catalog.clone());
        let mut shops: HashMap<String, ShopId> = HashMap::new();

        for region_data in &self.regions {
            if world.region_by_name(&region_data.name).is_some() {
                return Err(RandomiserError::WorldData(format!(
                    "region '{}' is defined twice",
                    region_data.name
                )));
            }
            let region = world.add_region(&region_data.name);
            world.region_mut(region).hints = region_data.hints.clone();
            world.region_mut(region).dark_rooms = region_data
                .dark_rooms
                .iter()
                .map(|room| {
                    let id = room.value()?;
                    u16::try_from(id).map_err(|_| {
                        RandomiserError::WorldData(format!(
                            "dark room {id:#X} of '{}' is not a room id",
                            region_data.name
                        ))
                    })
                })
                .collect::<Result<Vec<u16>>>()?;

            let restricted = region_data
                .restricted
                .iter()
                .map(|r| (Some(r.requires.as_str()), &r.source));
            let plain = region_data.sources.iter().map(|s| (None, s));

            for (requires, data) in plain.chain(restricted) {
                let (kind, addresses) = match &data.kind {
                    SourceKindData::Chest { chest_id } => {
                        let id = chest_id.value()?;
                        let chest_id = u8::try_from(id).map_err(|_| {
                            RandomiserError::WorldData(format!(
                                "chest id {id:#X} of '{}' does not fit in a byte",
                                data.name
                            ))
                        })?;
                        (SourceKind::Chest { chest_id }, Vec::new())
                    }
                    SourceKindData::Ground { addresses } => {
                        (SourceKind::Ground, parse_addresses(addresses)?)
                    }
                    SourceKindData::Shop {
                        shop,
                        addresses,
                        allow_lifestock,
                    } => {
                        let shop = match shops.get(shop) {
                            Some(&id) => id,
                            None => {
                                let id = world.add_shop(shop);
                                shops.insert(shop.clone(), id);
                                id
                            }
                        };
                        (
                            SourceKind::Shop {
                                shop,
                                allow_lifestock: *allow_lifestock,
                            },
                            parse_addresses(addresses)?,
                        )
                    }
                    SourceKindData::NpcReward { addresses } => {
                        (SourceKind::NpcReward, parse_addresses(addresses)?)
                    }
                };

                let source = match requires {
                    Some(item) => world.add_restricted_source(
                        region,
                        item_id(item)?,
                        &data.name,
                        kind,
                        addresses,
                    ),
                    None => world.add_source(region, &data.name, kind, addresses),
                };
                world.source_mut(source).hints = data.hints.clone();
                if let Some(item) = &data.item {
                    world.set_fixed_item(source, Some(item_id(item)?));
                }
            }
        }

        let region_id = |world: &World, name: &str| -> Result<usize> {
            world
                .region_by_name(name)
                .ok_or_else(|| RandomiserError::WorldData(format!("unknown region '{name}'")))
        };

        for path in &self.paths {
            let from = region_id(&world, &path.from)?;
            let to = region_id(&world, &path.to)?;
            let required = path
                .requires
                .iter()
                .map(|name| item_id(name))
                .collect::<Result<Vec<u8>>>()?;
            if path.two_way {
                world.add_paths_between(from, to, required, path.weight);
            } else {
                world.add_path(from, to, required, path.weight);
            }
        }

        let spawn = region_id(&world, &self.spawn)?;
        world.set_spawn(spawn);
        if let Some(goal) = &self.goal {
            let goal = region_id(&world, goal)?;
            world.set_goal(goal);
        }

        let mut pools = ItemPools::default();
        for entry in &self.filler_items {
            let id = item_id(&entry.item)?;
            pools.filler.extend(std::iter::repeat(id).take(entry.count));
        }
        for name in &self.priority_items {
            pools.priority.push(item_id(name)?);
        }

        Ok((world, pools))
    }
}

fn parse_addresses(addresses: &[Number]) -> Result<Vec<u32>> {
    addresses.iter().map(Number::value).collect()
}
