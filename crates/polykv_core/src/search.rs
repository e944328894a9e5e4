//! Pattern search over keys.

use crate::dbm::Dbm;
use crate::error::{Error, Result};

/// Key matching mode for [`Dbm::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Keys starting with the pattern.
    Begin,
    /// Keys containing the pattern.
    Contain,
    /// Keys ending with the pattern.
    End,
    /// Keys whose UTF-8 text partially matches the pattern as a regular
    /// expression. Non-UTF-8 key bytes are replaced lossily before
    /// matching.
    Regex,
    /// Keys ranked by edit distance to the pattern, over characters.
    Edit,
    /// Keys ranked by edit distance to the pattern, over raw bytes.
    EditBin,
}

impl SearchMode {
    /// Parses a mode name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the unknown mode.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "begin" => Ok(Self::Begin),
            "contain" => Ok(Self::Contain),
            "end" => Ok(Self::End),
            "regex" => Ok(Self::Regex),
            "edit" => Ok(Self::Edit),
            "editbin" => Ok(Self::EditBin),
            other => Err(Error::invalid_argument(format!(
                "unknown search mode: {other}"
            ))),
        }
    }

    /// Returns the name of this mode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Contain => "contain",
            Self::End => "end",
            Self::Regex => "regex",
            Self::Edit => "edit",
            Self::EditBin => "editbin",
        }
    }
}

/// Searches the database's keys.
///
/// `capacity` bounds the result count; 0 means unlimited. The filter
/// modes return keys in backend enumeration order; the edit-distance
/// modes return the nearest keys first.
pub(crate) fn search(
    db: &Dbm,
    mode: &str,
    pattern: &[u8],
    capacity: usize,
) -> Result<Vec<Vec<u8>>> {
    let mode = SearchMode::parse(mode)?;
    match mode {
        SearchMode::Begin => filter(db, capacity, |key| key.starts_with(pattern)),
        SearchMode::Contain => filter(db, capacity, |key| contains(key, pattern)),
        SearchMode::End => filter(db, capacity, |key| key.ends_with(pattern)),
        SearchMode::Regex => {
            let text = std::str::from_utf8(pattern)
                .map_err(|_| Error::invalid_argument("regex pattern is not UTF-8"))?;
            let re = regex::Regex::new(text)
                .map_err(|e| Error::invalid_argument(format!("bad regex pattern: {e}")))?;
            filter(db, capacity, |key| {
                re.is_match(&String::from_utf8_lossy(key))
            })
        }
        SearchMode::Edit => rank(db, capacity, |key| {
            let key_chars: Vec<char> = String::from_utf8_lossy(key).chars().collect();
            let pattern_chars: Vec<char> = String::from_utf8_lossy(pattern).chars().collect();
            levenshtein(&key_chars, &pattern_chars)
        }),
        SearchMode::EditBin => rank(db, capacity, |key| levenshtein(key, pattern)),
    }
}

fn filter(db: &Dbm, capacity: usize, mut matches: impl FnMut(&[u8]) -> bool) -> Result<Vec<Vec<u8>>> {
    let mut found = Vec::new();
    db.scan(&mut |key, _| {
        if matches(key) {
            found.push(key.to_vec());
            if capacity != 0 && found.len() >= capacity {
                return Ok(false);
            }
        }
        Ok(true)
    })?;
    Ok(found)
}

fn rank(db: &Dbm, capacity: usize, mut distance: impl FnMut(&[u8]) -> usize) -> Result<Vec<Vec<u8>>> {
    let mut scored: Vec<(usize, Vec<u8>)> = Vec::new();
    db.scan(&mut |key, _| {
        scored.push((distance(key), key.to_vec()));
        Ok(true)
    })?;
    // Stable by distance, so equally distant keys keep enumeration order.
    scored.sort_by_key(|(d, _)| *d);
    if capacity != 0 {
        scored.truncate(capacity);
    }
    Ok(scored.into_iter().map(|(_, key)| key).collect())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Levenshtein distance over any comparable elements, two-row DP.
fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, item_a) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, item_b) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(item_a != item_b);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendClass, OpenOptions};

    fn db_with(keys: &[&str]) -> Dbm {
        let db = Dbm::open_in_memory(OpenOptions::default().class(BackendClass::MemTree)).unwrap();
        for key in keys {
            db.set(key.as_bytes(), b"v").unwrap();
        }
        db
    }

    fn names(found: Vec<Vec<u8>>) -> Vec<String> {
        found
            .into_iter()
            .map(|k| String::from_utf8(k).unwrap())
            .collect()
    }

    #[test]
    fn begin_contain_end() {
        let db = db_with(&["apple", "apricot", "banana", "grape"]);

        assert_eq!(names(db.search("begin", b"ap", 0).unwrap()), ["apple", "apricot"]);
        assert_eq!(names(db.search("contain", b"an", 0).unwrap()), ["banana"]);
        assert_eq!(names(db.search("end", b"e", 0).unwrap()), ["apple", "grape"]);
    }

    #[test]
    fn capacity_bounds_results() {
        let db = db_with(&["a1", "a2", "a3", "a4"]);
        assert_eq!(db.search("begin", b"a", 2).unwrap().len(), 2);
        assert_eq!(db.search("begin", b"a", 0).unwrap().len(), 4);
    }

    #[test]
    fn regex_is_partial_match() {
        let db = db_with(&["user:1", "user:22", "group:1"]);
        assert_eq!(
            names(db.search("regex", b"user:[0-9]+$", 0).unwrap()),
            ["user:1", "user:22"]
        );
        // Unanchored: matches anywhere in the key.
        assert_eq!(names(db.search("regex", b":1", 0).unwrap()), ["group:1", "user:1"]);
    }

    #[test]
    fn bad_regex_is_invalid_argument() {
        let db = db_with(&["a"]);
        assert!(matches!(
            db.search("regex", b"(unclosed", 0),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn unknown_mode_is_invalid_argument() {
        let db = db_with(&["a"]);
        let err = db.search("fuzzy", b"a", 0).unwrap_err();
        assert!(err.to_string().contains("fuzzy"));
    }

    #[test]
    fn edit_ranks_by_distance() {
        let db = db_with(&["hello", "help", "world"]);
        let found = names(db.search("edit", b"hell", 2).unwrap());
        assert_eq!(found, ["hello", "help"]);

        // Capacity 0 returns everything, nearest first.
        let all = names(db.search("edit", b"hell", 0).unwrap());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], "hello");
    }

    #[test]
    fn editbin_ranks_over_bytes() {
        let db = db_with(&["abc", "abd", "xyz"]);
        let found = names(db.search("editbin", b"abe", 1).unwrap());
        assert!(found == ["abc"] || found == ["abd"]);
    }

    #[test]
    fn levenshtein_reference_values() {
        assert_eq!(levenshtein(b"kitten", b"sitting"), 3);
        assert_eq!(levenshtein(b"", b"abc"), 3);
        assert_eq!(levenshtein(b"same", b"same"), 0);
    }
}
