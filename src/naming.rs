//! Table name normalization
//!
//! Spreadsheet and PDF imports get machine-generated physical names while
//! users edit a separate logical name. Join inference has to recognise
//! `customer_id` as a reference to a table physically called `tbl_0142` but
//! labelled "Customers - crm_export.xlsx", so every table is registered under
//! all of its aliases:
//! 1. Physical name (lowercased) with singular/plural variants
//! 2. Cleaned logical name (file suffixes stripped)
//! 3. Whitespace, underscore and separator-free forms of each
//!
//! Collisions keep the first registration. Physical names of every table are
//! registered before any logical alias.

use crate::schema::TableSchema;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
];

const FILE_EXTENSIONS: &str = "csv|tsv|xlsx|xls|json|pdf|parquet|txt";

fn file_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)\s+-\s+\S.*\.({})$", FILE_EXTENSIONS)).expect("valid regex")
    })
}

fn file_extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"(?i)\.({})$", FILE_EXTENSIONS)).expect("valid regex"))
}

/// Strip `" - export.xlsx"` suffixes and trailing file extensions
pub fn clean_logical_name(name: &str) -> String {
    let trimmed = name.trim();
    let without_suffix = file_suffix_regex().replace(trimmed, "");
    let without_ext = file_extension_regex().replace(without_suffix.trim(), "");
    without_ext.trim().to_string()
}

/// Lowercase, treat `_`, `-` and runs of whitespace as a single space
pub fn spaced_form(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn underscore_form(name: &str) -> String {
    spaced_form(name).replace(' ', "_")
}

pub fn compact_form(name: &str) -> String {
    spaced_form(name).replace(' ', "")
}

/// Split off the last word so suffix rules apply to "order items" as well as "items"
fn split_last_word(name: &str) -> (&str, &str) {
    match name.rfind(|c: char| c == '_' || c == ' ') {
        Some(idx) => name.split_at(idx + 1),
        None => ("", name),
    }
}

fn is_sibilant(stem: &str) -> bool {
    stem.ends_with('s')
        || stem.ends_with('x')
        || stem.ends_with('z')
        || stem.ends_with("ch")
        || stem.ends_with("sh")
}

pub fn singularize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let (head, word) = split_last_word(&lowered);

    if let Some((_, singular)) = IRREGULAR_PLURALS.iter().find(|(plural, _)| *plural == word) {
        return format!("{}{}", head, singular);
    }

    let singular = if word.len() > 3 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3 && word.ends_with("es") && is_sibilant(&word[..word.len() - 2]) {
        word[..word.len() - 2].to_string()
    } else if word.len() > 1 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    };

    format!("{}{}", head, singular)
}

pub fn is_plural(name: &str) -> bool {
    singularize(name) != name.to_lowercase()
}

pub fn pluralize(name: &str) -> String {
    let lowered = name.to_lowercase();
    if is_plural(&lowered) {
        return lowered;
    }
    let (head, word) = split_last_word(&lowered);

    if let Some((plural, _)) = IRREGULAR_PLURALS.iter().find(|(_, singular)| *singular == word) {
        return format!("{}{}", head, plural);
    }

    let consonant_y = word.len() > 1
        && word.ends_with('y')
        && !matches!(word.as_bytes()[word.len() - 2], b'a' | b'e' | b'i' | b'o' | b'u');

    let plural = if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if is_sibilant(word) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    };

    format!("{}{}", head, plural)
}

/// Every lookup key a name should be reachable under, in registration order
pub fn name_variants(name: &str) -> Vec<String> {
    let spaced = spaced_form(name);
    if spaced.is_empty() {
        return Vec::new();
    }

    let mut variants: Vec<String> = Vec::new();
    for base in [spaced.clone(), singularize(&spaced), pluralize(&spaced)] {
        for form in [base.clone(), base.replace(' ', "_"), base.replace(' ', "")] {
            if !variants.contains(&form) {
                variants.push(form);
            }
        }
    }
    variants
}

/// Alias lookup over one schema snapshot. Values are indexes into the table slice.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    physical: HashMap<String, usize>,
    aliases: HashMap<String, usize>,
    physical_singulars: Vec<String>,
    singular_names: Vec<Vec<String>>,
}

impl NameIndex {
    pub fn build(tables: &[TableSchema]) -> Self {
        let mut index = NameIndex::default();

        for (idx, table) in tables.iter().enumerate() {
            let physical = table.table_name.to_lowercase();
            index.physical.entry(physical.clone()).or_insert(idx);
            index.physical_singulars.push(singularize(&physical));
        }

        // Physical aliases first, so a logical label never shadows a real table name
        for (idx, table) in tables.iter().enumerate() {
            for variant in name_variants(&table.table_name) {
                index.register(variant, idx);
            }
        }

        for (idx, table) in tables.iter().enumerate() {
            let logical = clean_logical_name(table.display_name());
            for variant in name_variants(&logical) {
                index.register(variant, idx);
            }

            let mut singulars = vec![singularize(&underscore_form(&table.table_name))];
            let logical_singular = singularize(&underscore_form(&logical));
            if !logical_singular.is_empty() && !singulars.contains(&logical_singular) {
                singulars.push(logical_singular);
            }
            index.singular_names.push(singulars);
        }

        debug!(
            "Built name index: {} tables, {} aliases",
            tables.len(),
            index.aliases.len()
        );
        index
    }

    fn register(&mut self, key: String, idx: usize) {
        if let Some(existing) = self.aliases.get(&key) {
            if *existing != idx {
                debug!("Alias '{}' already maps to table #{}, keeping first", key, existing);
            }
            return;
        }
        self.aliases.insert(key, idx);
    }

    /// Resolve a column-derived token (`order` from `order_id`) against
    /// physical names only: exact, `+s`, or singularized on either side
    pub fn resolve_physical(&self, token: &str) -> Option<usize> {
        let token = token.to_lowercase();
        let singular = singularize(&token);
        [token.clone(), format!("{}s", token), singular.clone()]
            .iter()
            .find_map(|candidate| self.physical.get(candidate).copied())
            .or_else(|| {
                self.physical_singulars
                    .iter()
                    .position(|s| *s == token || *s == singular)
            })
    }

    /// Resolve against the logical alias map: exact, singular, plural,
    /// with or without underscores
    pub fn resolve_alias(&self, name: &str) -> Option<usize> {
        let spaced = spaced_form(name);
        if spaced.is_empty() {
            return None;
        }
        if let Some(idx) = self.aliases.get(&name.trim().to_lowercase()) {
            return Some(*idx);
        }
        name_variants(&spaced)
            .iter()
            .find_map(|variant| self.aliases.get(variant).copied())
    }

    /// Physical names first, then the alias map
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.resolve_physical(name).or_else(|| self.resolve_alias(name))
    }

    /// Singular forms of the physical and logical names of a table, used by
    /// rules such as `id` ↔ `<table>_id`
    pub fn singular_names(&self, idx: usize) -> &[String] {
        self.singular_names
            .get(idx)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
