use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use rust_decimal::Decimal;

use super::record::Record;
use crate::normalize::{composite_key, normalize_digits};

pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Immutable record set with the enumerations that drive the selection menus.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    records: Vec<Record>,
    buildings: Vec<String>,
    blocks_by_building: BTreeMap<String, Vec<String>>,
    keys: HashMap<String, Vec<usize>>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        let mut blocks: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut keys: HashMap<String, Vec<usize>> = HashMap::new();

        for (position, record) in records.iter().enumerate() {
            let building = record.building.trim();
            if !building.is_empty() {
                let entry = blocks.entry(building.to_owned()).or_default();
                let block = record.block.trim();
                if !block.is_empty() {
                    entry.insert(block.to_owned());
                }
            }
            keys.entry(record.key()).or_default().push(position);
        }

        let buildings = blocks.keys().cloned().collect();
        let blocks_by_building = blocks
            .into_iter()
            .map(|(building, set)| {
                let mut sorted: Vec<String> = set.into_iter().collect();
                sorted.sort_by(|a, b| block_order(a, b));
                (building, sorted)
            })
            .collect();

        Self { records, buildings, blocks_by_building, keys }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn distinct_buildings(&self) -> &[String] {
        &self.buildings
    }

    /// Sorted blocks of `building`; unknown buildings and buildings without blocks yield an
    /// empty slice.
    pub fn distinct_blocks(&self, building: &str) -> &[String] {
        if let Some(blocks) = self.blocks_by_building.get(building.trim()) {
            return blocks;
        }
        self.blocks_by_building
            .iter()
            .find(|(name, _)| same_building(name, building))
            .map(|(_, blocks)| blocks.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_building(&self, building: &str) -> bool {
        self.buildings.iter().any(|name| same_building(name, building))
    }

    pub fn filter_by_building_and_block(&self, building: &str, block: &str) -> Vec<&Record> {
        let matcher = BlockMatcher::new(block);
        self.records
            .iter()
            .filter(|record| same_building(&record.building, building))
            .filter(|record| matcher.matches(&record.block))
            .collect()
    }

    /// Exact lookup on the `building_block_unit` composite key.
    pub fn lookup_key(&self, building: &str, block: &str, unit: &str) -> Vec<&Record> {
        self.keys
            .get(&composite_key(building, block, unit))
            .map(|positions| positions.iter().map(|&position| &self.records[position]).collect())
            .unwrap_or_default()
    }
}

/// Building names compare trimmed and case-insensitively everywhere a user names one.
pub fn same_building(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

/// Numeric blocks first, by value, then the rest as strings: `1, 2, 10, B2`.
fn block_order(left: &str, right: &str) -> Ordering {
    match (Decimal::from_str(left), Decimal::from_str(right)) {
        (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| left.cmp(right)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => left.cmp(right),
    }
}

/// Narrows `subset` by unit number (all-digit terms) or by name substring, keeping the first
/// `limit` matches in dataset order.
pub fn search<'a>(subset: &[&'a Record], term: &str, limit: usize) -> Vec<&'a Record> {
    match SearchTerm::parse(term) {
        Some(SearchTerm::Unit(unit)) => subset
            .iter()
            .copied()
            .filter(|record| record.unit.trim() == unit)
            .take(limit)
            .collect(),
        Some(SearchTerm::Name(needle)) => subset
            .iter()
            .copied()
            .filter(|record| record.full_name.to_lowercase().contains(&needle))
            .take(limit)
            .collect(),
        None => Vec::new(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchTerm {
    Unit(String),
    Name(String),
}

impl SearchTerm {
    pub fn parse(term: &str) -> Option<Self> {
        let term = normalize_digits(term.trim());
        if term.is_empty() {
            return None;
        }
        if term.chars().all(|ch| ch.is_ascii_digit()) {
            Some(Self::Unit(term))
        } else {
            Some(Self::Name(term.to_lowercase()))
        }
    }
}

enum BlockMatcher {
    Numeric(Decimal),
    Exact(String),
}

impl BlockMatcher {
    fn new(block: &str) -> Self {
        let block = block.trim();
        match Decimal::from_str(block) {
            Ok(value) => Self::Numeric(value),
            Err(_) => Self::Exact(block.to_owned()),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        match self {
            Self::Numeric(value) => {
                Decimal::from_str(candidate).map(|parsed| parsed == *value).unwrap_or(false)
            }
            Self::Exact(value) => candidate == value,
        }
    }
}
