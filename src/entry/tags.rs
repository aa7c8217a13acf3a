use std::fmt;

/// Separator used by the textual form of a tag set.
pub const TAG_SEPARATOR: char = '|';

/// Sorted, de-duplicated set of tags.
///
/// Kept as a `Vec` so that a pooled record can clear it without giving back
/// its capacity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `a|b|c`; blanks are ignored.
    pub fn parse(text: &str) -> Self {
        let mut set = TagSet::new();
        set.extend_from_str(text);
        set
    }

    pub fn extend_from_str(
        &mut self,
        text: &str,
    ) {
        for tag in text.split(TAG_SEPARATOR) {
            self.insert_one(tag);
        }
    }

    /// Adds `tag`; a tag containing the separator is split, so that the set
    /// survives its `a|b` text form. Returns whether anything was added.
    pub fn insert(
        &mut self,
        tag: &str,
    ) -> bool {
        let mut added = false;
        for part in tag.split(TAG_SEPARATOR) {
            added |= self.insert_one(part);
        }
        added
    }

    fn insert_one(
        &mut self,
        tag: &str,
    ) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        match self.tags.binary_search_by(|t| t.as_str().cmp(tag)) {
            Ok(_) => false,
            Err(pos) => {
                self.tags.insert(pos, tag.to_string());
                true
            }
        }
    }

    pub fn contains(
        &self,
        tag: &str,
    ) -> bool {
        self.tags.binary_search_by(|t| t.as_str().cmp(tag)).is_ok()
    }

    /// True when every tag of `other` is in `self`.
    pub fn is_superset_of(
        &self,
        other: &TagSet,
    ) -> bool {
        other.tags.iter().all(|t| self.contains(t))
    }

    pub fn overlaps(
        &self,
        other: &TagSet,
    ) -> bool {
        other.tags.iter().any(|t| self.contains(t))
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }
}

impl fmt::Display for TagSet {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                write!(f, "{TAG_SEPARATOR}")?;
            }
            f.write_str(tag)?;
        }
        Ok(())
    }
}

impl<'a> FromIterator<&'a str> for TagSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}
