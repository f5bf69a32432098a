pub const ITEM_EKEEKE: u8 = 0x00;
pub const ITEM_MAGIC_SWORD: u8 = 0x01;
pub const ITEM_ICE_SWORD: u8 = 0x02;
pub const ITEM_THUNDER_SWORD: u8 = 0x03;
pub const ITEM_GAIA_SWORD: u8 = 0x04;
pub const ITEM_FIREPROOF_BOOTS: u8 = 0x05;
pub const ITEM_IRON_BOOTS: u8 = 0x06;
pub const ITEM_HEALING_BOOTS: u8 = 0x07;
pub const ITEM_SPIKE_BOOTS: u8 = 0x08;
pub const ITEM_STEEL_BREAST: u8 = 0x09;
pub const ITEM_CHROME_BREAST: u8 = 0x0A;
pub const ITEM_SHELL_BREAST: u8 = 0x0B;
pub const ITEM_HYPER_BREAST: u8 = 0x0C;
pub const ITEM_MARS_STONE: u8 = 0x0D;
pub const ITEM_MOON_STONE: u8 = 0x0E;
pub const ITEM_SATURN_STONE: u8 = 0x0F;
pub const ITEM_VENUS_STONE: u8 = 0x10;
pub const ITEM_AWAKENING_BOOK: u8 = 0x11;
pub const ITEM_DETOX_GRASS: u8 = 0x12;
pub const ITEM_GAIA_STATUE: u8 = 0x13;
pub const ITEM_GOLDEN_STATUE: u8 = 0x14;
pub const ITEM_MIND_REPAIR: u8 = 0x15;
pub const ITEM_CASINO_TICKET: u8 = 0x16;
pub const ITEM_AXE_MAGIC: u8 = 0x17;
pub const ITEM_BLUE_RIBBON: u8 = 0x18;
pub const ITEM_BUYER_CARD: u8 = 0x19;
pub const ITEM_LANTERN: u8 = 0x1A;
pub const ITEM_GARLIC: u8 = 0x1B;
pub const ITEM_ANTI_PARALYZE: u8 = 0x1C;
pub const ITEM_STATUE_JYPTA: u8 = 0x1D;
pub const ITEM_SUN_STONE: u8 = 0x1E;
pub const ITEM_ARMLET: u8 = 0x1F;
pub const ITEM_EINSTEIN_WHISTLE: u8 = 0x20;
pub const ITEM_BLUE_JEWEL: u8 = 0x21;
pub const ITEM_YELLOW_JEWEL: u8 = 0x22;
pub const ITEM_RECORD_BOOK: u8 = 0x23;
pub const ITEM_SPELL_BOOK: u8 = 0x24;
pub const ITEM_HOTEL_REGISTER: u8 = 0x25;
pub const ITEM_ISLAND_MAP: u8 = 0x26;
pub const ITEM_LITHOGRAPH: u8 = 0x27;
pub const ITEM_RED_JEWEL: u8 = 0x28;
pub const ITEM_PAWN_TICKET: u8 = 0x29;
pub const ITEM_PURPLE_JEWEL: u8 = 0x2A;
pub const ITEM_GOLA_EYE: u8 = 0x2B;
pub const ITEM_DEATH_STATUE: u8 = 0x2C;
pub const ITEM_DAHL: u8 = 0x2D;
pub const ITEM_RESTORATION: u8 = 0x2E;
pub const ITEM_LOGS: u8 = 0x2F;
pub const ITEM_ORACLE_STONE: u8 = 0x30;
pub const ITEM_IDOL_STONE: u8 = 0x31;
pub const ITEM_KEY: u8 = 0x32;
pub const ITEM_SAFETY_PASS: u8 = 0x33;
pub const ITEM_GREEN_JEWEL: u8 = 0x34;
pub const ITEM_BELL: u8 = 0x35;
pub const ITEM_SHORT_CAKE: u8 = 0x36;
pub const ITEM_GOLA_NAIL: u8 = 0x37;
pub const ITEM_GOLA_HORN: u8 = 0x38;
pub const ITEM_GOLA_FANG: u8 = 0x39;
pub const ITEM_5_GOLDS: u8 = 0x3A;
pub const ITEM_20_GOLDS: u8 = 0x3B;
pub const ITEM_50_GOLDS: u8 = 0x3C;
pub const ITEM_200_GOLDS: u8 = 0x3D;
pub const ITEM_LIFESTOCK: u8 = 0x3E;
/// Written into sources that end up empty.
pub const ITEM_NONE: u8 = 0x3F;
/// Ids from here up are gold amounts.
pub const ITEM_GOLDS_START: u8 = 0x40;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Item {
    pub id: u8,
    pub name: &'static str,
    pub max_quantity: u8,
    pub gold_value: u16,
    pub allowed_on_ground: bool,
}

const fn item(id: u8, name: &'static str, max_quantity: u8, gold_value: u16) -> Item {
    Item {
        id,
        name,
        max_quantity,
        gold_value,
        allowed_on_ground: true,
    }
}

const fn heavy(id: u8, name: &'static str, max_quantity: u8, gold_value: u16) -> Item {
    Item {
        id,
        name,
        max_quantity,
        gold_value,
        allowed_on_ground: false,
    }
}

pub const CATALOG: &[Item] = &[
    item(ITEM_EKEEKE, "EkeEke", 9, 20),
    item(ITEM_MAGIC_SWORD, "Magic Sword", 1, 300),
    item(ITEM_ICE_SWORD, "Sword of Ice", 1, 300),
    item(ITEM_THUNDER_SWORD, "Thunder Sword", 1, 500),
    item(ITEM_GAIA_SWORD, "Sword of Gaia", 1, 300),
    item(ITEM_FIREPROOF_BOOTS, "Fireproof", 1, 150),
    item(ITEM_IRON_BOOTS, "Iron Boots", 1, 150),
    item(ITEM_HEALING_BOOTS, "Healing Boots", 1, 300),
    item(ITEM_SPIKE_BOOTS, "Snow Spikes", 1, 400),
    item(ITEM_STEEL_BREAST, "Steel Breast", 1, 300),
    item(ITEM_CHROME_BREAST, "Chrome Breast", 1, 400),
    item(ITEM_SHELL_BREAST, "Shell Breast", 1, 500),
    item(ITEM_HYPER_BREAST, "Hyper Breast", 1, 750),
    item(ITEM_MARS_STONE, "Mars Stone", 1, 150),
    item(ITEM_MOON_STONE, "Moon Stone", 1, 150),
    item(ITEM_SATURN_STONE, "Saturn Stone", 1, 200),
    item(ITEM_VENUS_STONE, "Venus Stone", 1, 300),
    item(ITEM_AWAKENING_BOOK, "Awakening Book", 1, 15),
    item(ITEM_DETOX_GRASS, "Detox Grass", 9, 20),
    item(ITEM_GAIA_STATUE, "Statue of Gaia", 9, 100),
    heavy(ITEM_GOLDEN_STATUE, "Golden Statue", 9, 200),
    item(ITEM_MIND_REPAIR, "Mind Repair", 9, 20),
    item(ITEM_CASINO_TICKET, "Casino Ticket", 1, 50),
    item(ITEM_AXE_MAGIC, "Axe Magic", 1, 400),
    item(ITEM_BLUE_RIBBON, "Blue Ribbon", 1, 50),
    item(ITEM_BUYER_CARD, "Buyer's Card", 1, 150),
    item(ITEM_LANTERN, "Lantern", 1, 100),
    item(ITEM_GARLIC, "Garlic", 1, 200),
    item(ITEM_ANTI_PARALYZE, "Anti Paralyze", 9, 20),
    item(ITEM_STATUE_JYPTA, "Statue of Jypta", 1, 250),
    item(ITEM_SUN_STONE, "Sun Stone", 1, 300),
    item(ITEM_ARMLET, "Armlet", 1, 300),
    item(ITEM_EINSTEIN_WHISTLE, "Einstein Whistle", 1, 200),
    item(ITEM_BLUE_JEWEL, "Blue Jewel", 1, 500),
    item(ITEM_YELLOW_JEWEL, "Yellow Jewel", 1, 500),
    item(ITEM_RECORD_BOOK, "Record Book", 1, 200),
    item(ITEM_SPELL_BOOK, "Spell Book", 1, 200),
    item(ITEM_HOTEL_REGISTER, "Hotel Register", 1, 15),
    item(ITEM_ISLAND_MAP, "Island Map", 0, 0),
    item(ITEM_LITHOGRAPH, "Lithograph", 1, 250),
    item(ITEM_RED_JEWEL, "Red Jewel", 1, 500),
    item(ITEM_PAWN_TICKET, "Pawn Ticket", 9, 100),
    item(ITEM_PURPLE_JEWEL, "Purple Jewel", 1, 500),
    item(ITEM_GOLA_EYE, "Gola's Eye", 1, 400),
    item(ITEM_DEATH_STATUE, "Death Statue", 9, 150),
    heavy(ITEM_DAHL, "Dahl", 9, 100),
    item(ITEM_RESTORATION, "Restoration", 9, 40),
    item(ITEM_LOGS, "Logs", 1, 200),
    item(ITEM_ORACLE_STONE, "Oracle Stone", 1, 250),
    item(ITEM_IDOL_STONE, "Idol Stone", 1, 200),
    item(ITEM_KEY, "Key", 1, 150),
    item(ITEM_SAFETY_PASS, "Safety Pass", 1, 300),
    item(ITEM_GREEN_JEWEL, "Green Jewel", 1, 500),
    item(ITEM_BELL, "Bell", 1, 200),
    heavy(ITEM_SHORT_CAKE, "Short Cake", 9, 150),
    item(ITEM_GOLA_NAIL, "Gola's Nail", 1, 800),
    item(ITEM_GOLA_HORN, "Gola's Horn", 1, 800),
    item(ITEM_GOLA_FANG, "Gola's Fang", 1, 800),
    item(ITEM_5_GOLDS, "5 Golds", 1, 5),
    item(ITEM_20_GOLDS, "20 Golds", 1, 20),
    item(ITEM_50_GOLDS, "50 Golds", 1, 50),
    item(ITEM_200_GOLDS, "200 Golds", 1, 200),
    heavy(ITEM_LIFESTOCK, "Life Stock", 1, 250),
    item(ITEM_NONE, "No Item", 0, 0),
];

pub fn is_gold(id: u8) -> bool {
    (ITEM_5_GOLDS..=ITEM_200_GOLDS).contains(&id) || id >= ITEM_GOLDS_START
}

/// Id-indexed view over the item table.
#[derive(Clone, Debug)]
pub struct ItemCatalog {
    items: Vec<Item>,
}

impl ItemCatalog {
    pub fn landstalker() -> Self {
        let mut items = CATALOG.to_vec();
        items.sort_by_key(|i| i.id);
        ItemCatalog { items }
    }

    pub fn get(&self, id: u8) -> Option<&Item> {
        self.items
            .binary_search_by_key(&id, |i| i.id)
            .ok()
            .map(|idx| &self.items[idx])
    }

    /// Case-insensitive, so hand-written data files can be a bit sloppy.
    pub fn by_name(&self, name: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(&self, id: u8) -> String {
        match self.get(id) {
            Some(item) => item.name.to_string(),
            None if id >= ITEM_GOLDS_START => format!("Golds #{id:#04X}"),
            None => format!("Item {id:#04X}"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for ItemCatalog {
    fn default() -> Self {
        Self::landstalker()
    }
}
