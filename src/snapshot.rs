use std::collections::HashMap;
use std::fmt;

/// Full flattened key/value capture of the config at one poll instant
pub type Snapshot = HashMap<String, String>;

/// Keys of two snapshots, partitioned by how they changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delta {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl Delta {
    /// No keys were added, updated or removed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Sort keys within each category, for callers that need a stable order
    pub fn sorted(mut self) -> Self {
        self.added.sort();
        self.updated.sort();
        self.removed.sort();
        self.unchanged.sort();
        self
    }

    /// Changed keys in application order: Added, Updated, Removed
    pub fn changes(&self) -> impl Iterator<Item = (Change, &String)> {
        let added = self.added.iter().map(|k| (Change::Added, k));
        let updated = self.updated.iter().map(|k| (Change::Updated, k));
        let removed = self.removed.iter().map(|k| (Change::Removed, k));
        added.chain(updated).chain(removed)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Delta added={} updated={} removed={} unchanged={}>",
            self.added.len(),
            self.updated.len(),
            self.removed.len(),
            self.unchanged.len()
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Added,
    Updated,
    Removed,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            Change::Added => "Added",
            Change::Updated => "Updated",
            Change::Removed => "Removed",
        };
        write!(f, "{}", word)
    }
}

/// Compare two snapshots by key. Values are opaque strings.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Delta {
    let mut delta = Delta::default();
    for (key, last) in previous.iter() {
        match current.get(key) {
            None => delta.removed.push(key.clone()),
            Some(curr) if curr != last => delta.updated.push(key.clone()),
            Some(_) => delta.unchanged.push(key.clone()),
        }
    }
    delta.added.extend(
        current
            .keys()
            .filter(|key| !previous.contains_key(*key))
            .cloned(),
    );
    delta
}

#[cfg(test)]
pub(crate) fn snapshot_from(pairs: &[(&str, &str)]) -> Snapshot {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
