use std::collections::{BTreeSet, VecDeque};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::items::{is_gold, ItemCatalog, ITEM_LANTERN, ITEM_LIFESTOCK, ITEM_LITHOGRAPH, ITEM_NONE};
use crate::rom::GameRom;
use crate::Result;

pub type RegionId = usize;
pub type SourceId = usize;
pub type PathId = usize;
pub type ShopId = usize;

pub const ITEM_TABLE_START: u32 = 0x02_9304;
pub const CHEST_TABLE_START: u32 = 0x09_EABE;

/// Ground items and shop slots store the item id with the two top bits set.
const PLACED_ITEM_MASK: u8 = 0xC0;

/// Data block listing the rooms of the darkened region.
pub const DARK_ROOMS_BLOCK: &str = "data_dark_rooms";
const DARK_ROOMS_END: u16 = 0xFFFF;

/// Key items the game can be finished without.
const OPTIONAL_KEY_ITEMS: [u8; 2] = [ITEM_LITHOGRAPH, ITEM_LANTERN];

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SourceKind {
    Chest { chest_id: u8 },
    Ground,
    Shop { shop: ShopId, allow_lifestock: bool },
    NpcReward,
}

#[derive(Clone, Debug)]
pub struct ItemSource {
    pub name: String,
    pub kind: SourceKind,
    pub item: Option<u8>,
    pub hints: Vec<String>,
    pub region: RegionId,
    pub addresses: Vec<u32>,
    /// Pre-seeded by the world data and left alone by the randomizer.
    pub fixed: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Region {
    pub name: String,
    pub sources: Vec<SourceId>,
    /// Sources only accessible once the paired item is owned.
    pub restricted: Vec<(SourceId, u8)>,
    pub outgoing: Vec<PathId>,
    pub incoming: Vec<PathId>,
    pub hints: Vec<String>,
    /// Map rooms that lose their light when this region is darkened.
    pub dark_rooms: Vec<u16>,
}

#[derive(Clone, Debug)]
pub struct Path {
    pub from: RegionId,
    pub to: RegionId,
    /// Every one of these must be owned to cross.
    pub required: Vec<u8>,
    pub weight: u16,
}

#[derive(Clone, Debug, Default)]
pub struct ShopGroup {
    pub name: String,
    pub slots: Vec<SourceId>,
}

/// Items owned during a simulated playthrough.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Inventory {
    items: BTreeSet<u8>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: u8) -> bool {
        self.items.insert(item)
    }

    pub fn contains(&self, item: u8) -> bool {
        self.items.contains(&item)
    }

    pub fn owns_all(&self, items: &[u8]) -> bool {
        items.iter().all(|i| self.items.contains(i))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.items.iter().copied()
    }
}

impl FromIterator<u8> for Inventory {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Inventory {
            items: iter.into_iter().collect(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NeededItem {
    pub item: u8,
    /// Heaviest weight among the blocked paths asking for this item.
    pub weight: u16,
}

/// Snapshot of what is accessible with a given inventory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Reachability {
    /// In discovery order.
    pub regions: Vec<RegionId>,
    pub empty_sources: Vec<SourceId>,
    /// Items gating a blocked path out of a reachable region, in discovery order.
    pub needed_items: Vec<NeededItem>,
    /// Items sitting in reachable filled sources.
    pub collected_items: Vec<u8>,
}

impl Reachability {
    pub fn contains_region(&self, region: RegionId) -> bool {
        self.regions.contains(&region)
    }
}

#[derive(Clone, Debug)]
pub struct World {
    catalog: ItemCatalog,
    regions: Vec<Region>,
    sources: Vec<ItemSource>,
    paths: Vec<Path>,
    shops: Vec<ShopGroup>,
    spawn: Option<RegionId>,
    goal: Option<RegionId>,
    dark_region: Option<RegionId>,
    /// Paths that got the Lantern requirement from the darkening.
    lantern_paths: Vec<PathId>,
}

impl World {
    pub fn new(catalog: ItemCatalog) -> Self {
        World {
            catalog,
            regions: Vec::new(),
            sources: Vec::new(),
            paths: Vec::new(),
            shops: Vec::new(),
            spawn: None,
            goal: None,
            dark_region: None,
            lantern_paths: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn add_region(&mut self, name: &str) -> RegionId {
        self.regions.push(Region {
            name: name.to_string(),
            ..Region::default()
        });
        self.regions.len() - 1
    }

    pub fn add_shop(&mut self, name: &str) -> ShopId {
        self.shops.push(ShopGroup {
            name: name.to_string(),
            slots: Vec::new(),
        });
        self.shops.len() - 1
    }

    fn push_source(
        &mut self,
        region: RegionId,
        name: &str,
        kind: SourceKind,
        addresses: Vec<u32>,
    ) -> SourceId {
        let id = self.sources.len();
        if let SourceKind::Shop { shop, .. } = kind {
            if let Some(group) = self.shops.get_mut(shop) {
                group.slots.push(id);
            }
        }
        self.sources.push(ItemSource {
            name: name.to_string(),
            kind,
            item: None,
            hints: Vec::new(),
            region,
            addresses,
            fixed: false,
        });
        id
    }

    pub fn add_source(
        &mut self,
        region: RegionId,
        name: &str,
        kind: SourceKind,
        addresses: Vec<u32>,
    ) -> SourceId {
        let id = self.push_source(region, name, kind, addresses);
        self.regions[region].sources.push(id);
        id
    }

    pub fn add_restricted_source(
        &mut self,
        region: RegionId,
        requires: u8,
        name: &str,
        kind: SourceKind,
        addresses: Vec<u32>,
    ) -> SourceId {
        let id = self.push_source(region, name, kind, addresses);
        self.regions[region].restricted.push((id, requires));
        id
    }

    pub fn add_path(&mut self, from: RegionId, to: RegionId, required: Vec<u8>, weight: u16) -> PathId {
        let id = self.paths.len();
        self.paths.push(Path {
            from,
            to,
            required,
            weight,
        });
        self.regions[from].outgoing.push(id);
        self.regions[to].incoming.push(id);
        id
    }

    /// Adds a path each way with the same requirements.
    pub fn add_paths_between(
        &mut self,
        a: RegionId,
        b: RegionId,
        required: Vec<u8>,
        weight: u16,
    ) -> (PathId, PathId) {
        let there = self.add_path(a, b, required.clone(), weight);
        let back = self.add_path(b, a, required, weight);
        (there, back)
    }

    pub fn set_spawn(&mut self, region: RegionId) {
        self.spawn = Some(region);
    }

    pub fn spawn(&self) -> Option<RegionId> {
        self.spawn
    }

    pub fn set_goal(&mut self, region: RegionId) {
        self.goal = Some(region);
    }

    pub fn goal(&self) -> Option<RegionId> {
        self.goal
    }

    pub fn darkenable_regions(&self) -> Vec<RegionId> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.dark_rooms.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn dark_region(&self) -> Option<RegionId> {
        self.dark_region
    }

    /// Darkens `region`, so that every path into it also needs the Lantern.
    /// The previous darkening, if any, is undone first.
    pub fn set_dark_region(&mut self, region: Option<RegionId>) {
        for path_id in std::mem::take(&mut self.lantern_paths) {
            self.paths[path_id].required.retain(|&i| i != ITEM_LANTERN);
        }
        self.dark_region = region;

        let Some(region) = region else {
            return;
        };
        for &path_id in &self.regions[region].incoming {
            let required = &mut self.paths[path_id].required;
            if !required.contains(&ITEM_LANTERN) {
                required.push(ITEM_LANTERN);
                self.lantern_paths.push(path_id);
            }
        }
        debug!(
            "darkened '{}', {} paths now need the Lantern",
            self.regions[region].name,
            self.lantern_paths.len()
        );
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id]
    }

    pub fn region_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id]
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn source(&self, id: SourceId) -> &ItemSource {
        &self.sources[id]
    }

    pub fn source_mut(&mut self, id: SourceId) -> &mut ItemSource {
        &mut self.sources[id]
    }

    pub fn sources(&self) -> &[ItemSource] {
        &self.sources
    }

    pub fn path(&self, id: PathId) -> &Path {
        &self.paths[id]
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn shop(&self, id: ShopId) -> &ShopGroup {
        &self.shops[id]
    }

    pub fn region_by_name(&self, name: &str) -> Option<RegionId> {
        self.regions.iter().position(|r| r.name == name)
    }

    pub fn source_by_name(&self, name: &str) -> Option<SourceId> {
        self.sources.iter().position(|s| s.name == name)
    }

    pub fn shop_by_name(&self, name: &str) -> Option<ShopId> {
        self.shops.iter().position(|s| s.name == name)
    }

    pub fn item_name(&self, item: Option<u8>) -> String {
        match item {
            Some(id) => self.catalog.name(id),
            None => "nothing".to_string(),
        }
    }

    fn shop_holds(&self, shop: ShopId, item: u8, except: SourceId) -> bool {
        self.shops.get(shop).map_or(false, |group| {
            group
                .slots
                .iter()
                .any(|&slot| slot != except && self.sources[slot].item == Some(item))
        })
    }

    /// Whether `item` may be put in `source`. `None` asks whether the source
    /// may stay empty.
    pub fn is_item_compatible(&self, source: SourceId, item: Option<u8>) -> bool {
        let src = &self.sources[source];
        match src.kind {
            SourceKind::Chest { .. } => true,
            SourceKind::Ground => item.map_or(true, |id| {
                self.catalog.get(id).map_or(false, |i| i.allowed_on_ground)
            }),
            SourceKind::Shop {
                shop,
                allow_lifestock,
            } => match item {
                None => false,
                Some(id) if id == ITEM_NONE || is_gold(id) => false,
                Some(ITEM_LIFESTOCK) if !allow_lifestock => false,
                Some(id) => !self.shop_holds(shop, id, source),
            },
            SourceKind::NpcReward => matches!(item, Some(id) if id < ITEM_NONE),
        }
    }

    pub fn place_item(&mut self, source: SourceId, item: u8) {
        let src = &mut self.sources[source];
        debug_assert!(src.item.is_none(), "'{}' is already filled", src.name);
        src.item = Some(item);
    }

    /// Pre-seeds a source that randomization must not touch.
    pub fn set_fixed_item(&mut self, source: SourceId, item: Option<u8>) {
        let src = &mut self.sources[source];
        src.item = item;
        src.fixed = true;
    }

    pub fn reset_placements(&mut self) {
        for src in self.sources.iter_mut().filter(|s| !s.fixed) {
            src.item = None;
        }
    }

    pub fn placements(&self) -> Vec<(SourceId, Option<u8>)> {
        self.sources
            .iter()
            .enumerate()
            .map(|(id, s)| (id, s.item))
            .collect()
    }

    pub fn empty_sources(&self) -> Vec<SourceId> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.item.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Breadth-first walk from `spawn`, only crossing paths whose items are
    /// all in `inventory`.
    pub fn evaluate_reachable_regions(&self, spawn: RegionId, inventory: &Inventory) -> Reachability {
        let mut reach = Reachability::default();
        let mut visited = vec![false; self.regions.len()];
        let mut queue = VecDeque::from([spawn]);
        visited[spawn] = true;

        while let Some(region_id) = queue.pop_front() {
            reach.regions.push(region_id);
            let region = &self.regions[region_id];

            let accessible = region.sources.iter().copied().chain(
                region
                    .restricted
                    .iter()
                    .filter(|(_, needs)| inventory.contains(*needs))
                    .map(|&(s, _)| s),
            );
            for source in accessible {
                match self.sources[source].item {
                    Some(item) => reach.collected_items.push(item),
                    None => reach.empty_sources.push(source),
                }
            }

            for &path_id in &region.outgoing {
                let path = &self.paths[path_id];
                if inventory.owns_all(&path.required) {
                    if !visited[path.to] {
                        visited[path.to] = true;
                        queue.push_back(path.to);
                    }
                    continue;
                }
                for &item in path.required.iter().filter(|&&i| !inventory.contains(i)) {
                    match reach.needed_items.iter_mut().find(|n| n.item == item) {
                        Some(needed) => needed.weight = needed.weight.max(path.weight),
                        None => reach.needed_items.push(NeededItem {
                            item,
                            weight: path.weight,
                        }),
                    }
                }
            }
        }
        reach
    }

    /// Backward walk from `goal`: key items that cannot be skipped, given
    /// where items currently are.
    pub fn strictly_required_items(&self, goal: RegionId) -> BTreeSet<u8> {
        let mut to_explore = BTreeSet::from([goal]);
        let mut explored = BTreeSet::new();
        let mut to_locate = BTreeSet::new();
        let mut required = BTreeSet::new();

        while let Some(region) = to_explore.pop_first() {
            explored.insert(region);

            for &path_id in &self.regions[region].incoming {
                let path = &self.paths[path_id];
                to_locate.extend(
                    path.required
                        .iter()
                        .copied()
                        .filter(|i| !OPTIONAL_KEY_ITEMS.contains(i)),
                );
                if !explored.contains(&path.from) {
                    to_explore.insert(path.from);
                }
            }

            while to_explore.is_empty() {
                let Some(item) = to_locate.pop_first() else {
                    break;
                };
                if !required.insert(item) {
                    continue;
                }
                if let Some(src) = self.sources.iter().find(|s| s.item == Some(item)) {
                    if !explored.contains(&src.region) {
                        to_explore.insert(src.region);
                    }
                }
            }
        }
        required
    }

    /// Writes item prices, every source's content and the dark room list.
    pub fn write_to_rom(&self, rom: &mut GameRom) -> Result<()> {
        for item in self.catalog.iter().filter(|i| i.id < ITEM_NONE && !is_gold(i.id)) {
            let base = ITEM_TABLE_START + u32::from(item.id) * 4;
            let verb = rom.byte(base) & 0xF0;
            rom.set_byte(base, verb | (item.max_quantity & 0x0F));
            rom.set_word(base + 2, item.gold_value);
        }

        for src in &self.sources {
            let id = src.item.unwrap_or(ITEM_NONE);
            match src.kind {
                SourceKind::Chest { chest_id } => {
                    rom.set_byte(CHEST_TABLE_START + u32::from(chest_id), id)
                }
                SourceKind::Ground | SourceKind::Shop { .. } => {
                    for &addr in &src.addresses {
                        rom.set_byte(addr, id.wrapping_add(PLACED_ITEM_MASK));
                    }
                }
                SourceKind::NpcReward => {
                    for &addr in &src.addresses {
                        rom.set_byte(addr, id);
                    }
                }
            }
        }
        debug!(
            "wrote {} sources and {} item entries",
            self.sources.len(),
            self.catalog.len()
        );

        if let Some(region) = self.dark_region {
            let rooms = &self.regions[region].dark_rooms;
            let mut bytes = Vec::with_capacity((rooms.len() + 1) * 2);
            for room in rooms.iter().copied().chain([DARK_ROOMS_END]) {
                bytes.extend_from_slice(&room.to_be_bytes());
            }
            rom.inject_data(&bytes, DARK_ROOMS_BLOCK)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::*;

    fn shop_world() -> (World, SourceId, SourceId, SourceId) {
        let mut world = World::new(ItemCatalog::landstalker());
        let town = world.add_region("Town");
        let shop = world.add_shop("Town shop");
        let kind = SourceKind::Shop {
            shop,
            allow_lifestock: false,
        };
        let a = world.add_source(town, "Shop slot 1", kind.clone(), vec![0x100]);
        let b = world.add_source(town, "Shop slot 2", kind, vec![0x108]);
        let other_shop = world.add_shop("Other shop");
        let other = world.add_source(
            town,
            "Other shop slot",
            SourceKind::Shop {
                shop: other_shop,
                allow_lifestock: true,
            },
            vec![0x110],
        );
        (world, a, b, other)
    }

    #[test]
    fn shop_rejects_duplicates_within_its_group() {
        let (mut world, a, b, other) = shop_world();
        world.place_item(a, ITEM_EKEEKE);

        assert!(!world.is_item_compatible(b, Some(ITEM_EKEEKE)));
        assert!(world.is_item_compatible(b, Some(ITEM_DETOX_GRASS)));
        assert!(world.is_item_compatible(other, Some(ITEM_EKEEKE)));
        // the holder is not its own duplicate
        assert!(world.is_item_compatible(a, Some(ITEM_EKEEKE)));
    }

    #[test]
    fn shop_slot_restrictions() {
        let (world, a, _, other) = shop_world();
        assert!(!world.is_item_compatible(a, None));
        assert!(!world.is_item_compatible(a, Some(ITEM_NONE)));
        assert!(!world.is_item_compatible(a, Some(ITEM_50_GOLDS)));
        assert!(!world.is_item_compatible(a, Some(0x42)));
        assert!(!world.is_item_compatible(a, Some(ITEM_LIFESTOCK)));
        assert!(world.is_item_compatible(other, Some(ITEM_LIFESTOCK)));
    }

    #[test]
    fn chest_ground_and_npc_compatibility() {
        let mut world = World::new(ItemCatalog::landstalker());
        let r = world.add_region("Somewhere");
        let chest = world.add_source(r, "Chest", SourceKind::Chest { chest_id: 1 }, vec![]);
        let ground = world.add_source(r, "Ground", SourceKind::Ground, vec![0x200]);
        let npc = world.add_source(r, "NPC", SourceKind::NpcReward, vec![0x300]);

        assert!(world.is_item_compatible(chest, None));
        assert!(world.is_item_compatible(chest, Some(ITEM_LIFESTOCK)));

        assert!(world.is_item_compatible(ground, None));
        assert!(world.is_item_compatible(ground, Some(ITEM_KEY)));
        assert!(!world.is_item_compatible(ground, Some(ITEM_DAHL)));
        assert!(!world.is_item_compatible(ground, Some(0x50)));

        assert!(world.is_item_compatible(npc, Some(ITEM_GARLIC)));
        assert!(!world.is_item_compatible(npc, Some(ITEM_NONE)));
        assert!(!world.is_item_compatible(npc, None));
    }

    #[test]
    fn reachability_follows_owned_gates_only() {
        let mut world = World::new(ItemCatalog::landstalker());
        let start = world.add_region("Start");
        let mid = world.add_region("Mid");
        let locked = world.add_region("Locked");
        let deep = world.add_region("Deep");
        world.add_source(start, "Start chest", SourceKind::Chest { chest_id: 0 }, vec![]);
        let filled = world.add_source(mid, "Mid chest", SourceKind::Chest { chest_id: 1 }, vec![]);
        world.add_source(locked, "Locked chest", SourceKind::Chest { chest_id: 2 }, vec![]);
        world.place_item(filled, ITEM_LOGS);

        world.add_paths_between(start, mid, vec![], 1);
        world.add_path(mid, locked, vec![ITEM_KEY], 1);
        world.add_path(start, locked, vec![ITEM_KEY, ITEM_BELL], 3);
        world.add_path(locked, deep, vec![ITEM_GARLIC], 1);

        let reach = world.evaluate_reachable_regions(start, &Inventory::new());
        assert_eq!(reach.regions, vec![start, mid]);
        assert_eq!(reach.empty_sources, vec![0]);
        assert_eq!(reach.collected_items, vec![ITEM_LOGS]);
        assert_eq!(
            reach.needed_items,
            vec![
                NeededItem { item: ITEM_KEY, weight: 3 },
                NeededItem { item: ITEM_BELL, weight: 3 },
            ]
        );

        let inventory: Inventory = [ITEM_KEY].into_iter().collect();
        let reach = world.evaluate_reachable_regions(start, &inventory);
        assert!(reach.contains_region(locked));
        assert!(!reach.contains_region(deep));
        // Bell is still wanted by the direct path
        let needed: Vec<u8> = reach.needed_items.iter().map(|n| n.item).collect();
        assert_eq!(needed, vec![ITEM_BELL, ITEM_GARLIC]);
    }

    #[test]
    fn restricted_sources_open_with_their_item() {
        let mut world = World::new(ItemCatalog::landstalker());
        let town = world.add_region("Town");
        let special = world.add_restricted_source(
            town,
            ITEM_BUYER_CARD,
            "Special shop",
            SourceKind::Chest { chest_id: 9 },
            vec![],
        );

        let reach = world.evaluate_reachable_regions(town, &Inventory::new());
        assert!(reach.empty_sources.is_empty());

        let inventory: Inventory = [ITEM_BUYER_CARD].into_iter().collect();
        let reach = world.evaluate_reachable_regions(town, &inventory);
        assert_eq!(reach.empty_sources, vec![special]);
    }

    #[test]
    fn writes_sources_in_their_own_encoding() {
        let mut world = World::new(ItemCatalog::landstalker());
        let r = world.add_region("R");
        let shop = world.add_shop("S");
        let chest = world.add_source(r, "Chest", SourceKind::Chest { chest_id: 0x10 }, vec![]);
        let ground = world.add_source(r, "Ground", SourceKind::Ground, vec![0x2000, 0x2010]);
        let slot = world.add_source(
            r,
            "Slot",
            SourceKind::Shop {
                shop,
                allow_lifestock: true,
            },
            vec![0x3000],
        );
        world.add_source(r, "NPC", SourceKind::NpcReward, vec![0x4000]);
        world.place_item(chest, ITEM_KEY);
        world.place_item(ground, ITEM_SUN_STONE);
        world.place_item(slot, ITEM_EKEEKE);

        let mut rom = GameRom::blank();
        world.write_to_rom(&mut rom).unwrap();

        assert_eq!(rom.byte(0x9EABE + 0x10), ITEM_KEY);
        assert_eq!(rom.byte(0x2000), ITEM_SUN_STONE + 0xC0);
        assert_eq!(rom.byte(0x2010), ITEM_SUN_STONE + 0xC0);
        assert_eq!(rom.byte(0x3000), 0xC0);
        // empty reward is written as "no item"
        assert_eq!(rom.byte(0x4000), ITEM_NONE);
        assert_eq!(rom.word(0x029306 + 4 * u32::from(ITEM_HYPER_BREAST)), 750);
        assert_eq!(rom.byte(0x029304 + 4 * u32::from(ITEM_EKEEKE)), 9);
        assert_eq!(rom.stored_address(DARK_ROOMS_BLOCK), None);
    }

    fn cave_world() -> (World, RegionId, RegionId, RegionId) {
        let mut world = World::new(ItemCatalog::landstalker());
        let town = world.add_region("Town");
        let cave = world.add_region("Cave");
        let shrine = world.add_region("Shrine");
        world.region_mut(cave).dark_rooms = vec![0x10, 0x2EE];
        world.add_paths_between(town, cave, vec![], 1);
        world.add_path(shrine, cave, vec![ITEM_LANTERN, ITEM_KEY], 1);
        world.add_path(town, shrine, vec![], 1);
        (world, town, cave, shrine)
    }

    #[test]
    fn darkening_gates_incoming_paths_on_the_lantern() {
        let (mut world, town, cave, _) = cave_world();
        assert_eq!(world.darkenable_regions(), vec![cave]);

        world.set_dark_region(Some(cave));
        assert_eq!(world.dark_region(), Some(cave));
        for &path in &world.region(cave).incoming {
            assert!(world.path(path).required.contains(&ITEM_LANTERN));
        }
        assert_eq!(world.path(0).required, vec![ITEM_LANTERN]);
        // leaving the dark region needs no light
        assert!(world.path(1).required.is_empty());

        let reach = world.evaluate_reachable_regions(town, &Inventory::new());
        assert!(!reach.contains_region(cave));
        assert_eq!(reach.needed_items[0].item, ITEM_LANTERN);

        world.set_dark_region(None);
        assert!(world.path(0).required.is_empty());
        // requirements from the world data stay
        assert_eq!(world.path(2).required, vec![ITEM_LANTERN, ITEM_KEY]);
        assert!(world
            .evaluate_reachable_regions(town, &Inventory::new())
            .contains_region(cave));
    }

    #[test]
    fn darkening_twice_does_not_stack_requirements() {
        let (mut world, _, cave, shrine) = cave_world();
        world.region_mut(shrine).dark_rooms = vec![0x20];
        world.set_dark_region(Some(cave));
        world.set_dark_region(Some(cave));
        assert_eq!(world.path(0).required, vec![ITEM_LANTERN]);

        world.set_dark_region(Some(shrine));
        assert!(world.path(0).required.is_empty());
        assert_eq!(world.path(3).required, vec![ITEM_LANTERN]);
    }

    #[test]
    fn dark_rooms_are_written_with_a_terminator() {
        let (mut world, _, cave, _) = cave_world();
        world.set_dark_region(Some(cave));

        let mut rom = GameRom::blank();
        world.write_to_rom(&mut rom).unwrap();
        let addr = rom.stored_address(DARK_ROOMS_BLOCK).unwrap();
        assert_eq!(rom.chunk(addr, 6), vec![0x00, 0x10, 0x02, 0xEE, 0xFF, 0xFF]);
    }

    #[test]
    fn strictly_required_items_walk_backwards() {
        let mut world = World::new(ItemCatalog::landstalker());
        let start = world.add_region("Start");
        let side = world.add_region("Side");
        let end = world.add_region("End");
        let side_chest = world.add_source(side, "Side chest", SourceKind::Chest { chest_id: 0 }, vec![]);
        let start_chest = world.add_source(start, "Start chest", SourceKind::Chest { chest_id: 1 }, vec![]);
        world.add_path(start, side, vec![ITEM_KEY], 1);
        world.add_path(start, end, vec![ITEM_GOLA_FANG, ITEM_LANTERN], 1);
        world.place_item(side_chest, ITEM_GOLA_FANG);
        world.place_item(start_chest, ITEM_KEY);

        let required = world.strictly_required_items(end);
        assert_eq!(required, BTreeSet::from([ITEM_KEY, ITEM_GOLA_FANG]));
    }

    #[test]
    fn reset_keeps_fixed_sources() {
        let mut world = World::new(ItemCatalog::landstalker());
        let r = world.add_region("R");
        let fixed = world.add_source(r, "Fixed", SourceKind::Ground, vec![1]);
        let free = world.add_source(r, "Free", SourceKind::Ground, vec![2]);
        world.set_fixed_item(fixed, Some(ITEM_IDOL_STONE));
        world.place_item(free, ITEM_EKEEKE);

        world.reset_placements();
        assert_eq!(world.source(fixed).item, Some(ITEM_IDOL_STONE));
        assert_eq!(world.source(free).item, None);
        assert_eq!(world.empty_sources(), vec![free]);
    }
}
