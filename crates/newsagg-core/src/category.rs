//! Static translation tables from upstream section taxonomies into
//! [`StandardCategory`].

use crate::StandardCategory::{self, *};

/// Upstream taxonomies with a mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Taxonomy {
    Guardian,
    NyTimes,
}

const GUARDIAN_SECTIONS: &[(&str, StandardCategory)] = &[
    ("business", Business),
    ("money", Business),
    ("technology", Technology),
    ("science", Science),
    ("environment", Science),
    ("sport", Sports),
    ("football", Sports),
    ("culture", Entertainment),
    ("film", Entertainment),
    ("music", Entertainment),
    ("books", Entertainment),
    ("artanddesign", Entertainment),
    ("stage", Entertainment),
    ("tvandradio", Entertainment),
    ("tvradio", Entertainment),
    ("games", Entertainment),
    ("lifeandstyle", General),
    ("fashion", General),
    ("food", General),
    ("travel", General),
    ("politics", General),
    ("world", General),
    ("uknews", General),
    ("usnews", General),
    ("australianews", General),
    ("society", General),
    ("education", General),
    ("media", General),
    ("law", General),
    ("globaldevelopment", General),
    ("cities", General),
    ("commentisfree", General),
    ("opinion", General),
];

const NYTIMES_SECTIONS: &[(&str, StandardCategory)] = &[
    ("business", Business),
    ("businessday", Business),
    ("realestate", Business),
    ("technology", Technology),
    ("science", Science),
    ("climate", Science),
    ("environment", Science),
    ("sports", Sports),
    ("arts", Entertainment),
    ("movies", Entertainment),
    ("music", Entertainment),
    ("books", Entertainment),
    ("theater", Entertainment),
    ("tmagazine", Entertainment),
    ("health", Health),
    ("well", Health),
    ("style", General),
    ("fashion", General),
    ("food", General),
    ("travel", General),
    ("politics", General),
    ("world", General),
    ("us", General),
    ("nyregion", General),
    ("opinion", General),
    ("education", General),
    ("magazine", General),
    ("sundayreview", General),
    ("automobiles", General),
    ("obituaries", General),
];

impl Taxonomy {
    fn table(self) -> &'static [(&'static str, StandardCategory)] {
        match self {
            Taxonomy::Guardian => GUARDIAN_SECTIONS,
            Taxonomy::NyTimes => NYTIMES_SECTIONS,
        }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Maps an upstream section name into the standard set.
///
/// A missing or empty section yields `None`; any other section absent from
/// the taxonomy's table, whitespace-only included, falls back to
/// [`StandardCategory::General`].
pub fn map_section(section: Option<&str>, taxonomy: Taxonomy) -> Option<StandardCategory> {
    let section = section.filter(|s| !s.is_empty())?;
    let key = normalize_key(section);
    let mapped = taxonomy
        .table()
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, category)| *category);
    Some(mapped.unwrap_or(General))
}

pub fn standard_categories() -> &'static [StandardCategory] {
    &StandardCategory::ALL
}

pub fn is_standard_category(value: &str) -> bool {
    StandardCategory::ALL.iter().any(|c| c.as_str() == value)
}
