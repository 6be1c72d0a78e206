//! Store name grammar and name allocation

use std::sync::OnceLock;

use regex_lite::Regex;

use super::StoreError;

/// Width of the zero-padded numeric suffix in generated names.
const SUFFIX_WIDTH: usize = 5;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9._-]*$").expect("store name pattern is valid"))
}

/// Check a store name against `[a-z][a-z0-9._-]*`, returning it unchanged.
pub fn validate_name(name: &str) -> Result<&str, StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "name is empty",
        });
    }
    if name.contains(['/', ':']) {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "name contains a path or coordinate separator",
        });
    }
    if !name_pattern().is_match(name) {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "name must match [a-z][a-z0-9._-]*",
        });
    }
    Ok(name)
}

/// Next free name `<prefix>-NNNNN` given the existing sibling names.
///
/// Only names of the exact form `<prefix>-<digits>` count: the part before
/// the last `-` must equal the prefix. `p-other-00007` does not advance the
/// sequence for prefix `p`.
///
/// Returns `None` once the suffix space is exhausted.
pub fn next_store_name<'a, I>(prefix: &str, existing: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing
        .into_iter()
        .filter_map(|name| {
            let (head, tail) = name.rsplit_once('-')?;
            if head != prefix || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            tail.parse::<u64>().ok()
        })
        .max()
        .unwrap_or(0);

    let next = max.checked_add(1)?;
    Some(format!("{}-{:0width$}", prefix, next, width = SUFFIX_WIDTH))
}
