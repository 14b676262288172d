use std::path::Path;

pub const NOT_MAPPED: &str = "Not mapped";

/// Class index to human-readable name.
///
/// The two tables use different conventions and different out-of-range
/// behaviour, matching the model each one ships with:
///
/// * `Fixed`: 0-indexed, out of range yields a synthetic `Class_<i>`.
/// * `OneIndexed`: line `k - 1` of a label file names class `k`, out of range
///   (including `k <= 0`) yields [`NOT_MAPPED`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelTable {
    Fixed(Vec<String>),
    OneIndexed(Vec<String>),
}

impl LabelTable {
    pub fn fixed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelTable::Fixed(names.into_iter().map(Into::into).collect())
    }

    /// Reads one label per line. Line terminators are dropped.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        log::debug!("Read {} labels from {}", raw.lines().count(), path.display());
        Ok(Self::from_lines(&raw))
    }

    pub fn from_lines(raw: &str) -> Self {
        LabelTable::OneIndexed(raw.lines().map(str::to_string).collect())
    }

    pub fn resolve(&self, index: i64) -> String {
        match self {
            LabelTable::Fixed(names) => usize::try_from(index)
                .ok()
                .and_then(|i| names.get(i))
                .cloned()
                .unwrap_or_else(|| format!("Class_{index}")),
            LabelTable::OneIndexed(lines) => index
                .checked_sub(1)
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| lines.get(i))
                .cloned()
                .unwrap_or_else(|| NOT_MAPPED.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LabelTable::Fixed(names) | LabelTable::OneIndexed(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
