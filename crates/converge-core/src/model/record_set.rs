// ── Hash-identified unordered record sets ──
//
// Collections the remote side treats as unordered (taints, labels, ACL
// entries, access grants) are stored as multisets keyed by a CRC-32 of
// each record's user-settable fields. Iteration order is canonical
// (hash, then record order), so two sets built from the same records in
// any order compare and serialize identically.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Incremental CRC-32 over named fields.
///
/// Every field is written as `name:len:value;` so adjacent fields can
/// never run together into the same byte stream.
pub struct FieldHasher(crc32fast::Hasher);

impl FieldHasher {
    pub fn new() -> Self {
        Self(crc32fast::Hasher::new())
    }

    pub fn field(&mut self, name: &str, value: &str) -> &mut Self {
        self.0.update(name.as_bytes());
        self.0.update(b":");
        self.0.update(value.len().to_string().as_bytes());
        self.0.update(b":");
        self.0.update(value.as_bytes());
        self.0.update(b";");
        self
    }

    pub fn optional(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.field(name, v),
            None => {
                self.0.update(name.as_bytes());
                self.0.update(b":-;");
                self
            }
        }
    }

    /// Hash a list of values. Callers pass unordered lists pre-sorted.
    pub fn list<'a, I>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut count = 0usize;
        for value in values {
            self.field(name, value);
            count += 1;
        }
        self.field(name, &format!("#{count}"))
    }

    pub fn finish(self) -> u32 {
        self.0.finalize()
    }
}

impl Default for FieldHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Records that live in a [`RecordSet`].
///
/// Implementors write exactly their user-settable fields; server-computed
/// fields must stay out of the hash or every refresh would churn.
pub trait StructuralHash {
    fn hash_fields(&self, hasher: &mut FieldHasher);

    fn structural_hash(&self) -> u32 {
        let mut hasher = FieldHasher::new();
        self.hash_fields(&mut hasher);
        hasher.finish()
    }
}

/// Unordered multiset of records identified by structural hash.
#[derive(Clone, PartialEq, Eq)]
pub struct RecordSet<T> {
    records: Vec<(u32, T)>,
}

impl<T> RecordSet<T> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter().map(|(_, r)| r)
    }

    pub fn hashes(&self) -> impl Iterator<Item = u32> + '_ {
        self.records.iter().map(|(h, _)| *h)
    }
}

impl<T: StructuralHash + Ord> RecordSet<T> {
    pub fn insert(&mut self, record: T) {
        let entry = (record.structural_hash(), record);
        let pos = self
            .records
            .binary_search_by(|probe| compare(probe, &entry))
            .unwrap_or_else(|p| p);
        self.records.insert(pos, entry);
    }

    pub fn contains(&self, record: &T) -> bool {
        let hash = record.structural_hash();
        self.records
            .iter()
            .any(|(h, r)| *h == hash && r == record)
    }

    /// Multiset difference: `(only in self, only in other)`.
    pub fn difference<'a>(&'a self, other: &'a Self) -> (Vec<&'a T>, Vec<&'a T>) {
        let mut ours = Vec::new();
        let mut theirs = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.records.len() && j < other.records.len() {
            match compare(&self.records[i], &other.records[j]) {
                Ordering::Less => {
                    ours.push(&self.records[i].1);
                    i += 1;
                }
                Ordering::Greater => {
                    theirs.push(&other.records[j].1);
                    j += 1;
                }
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
            }
        }
        ours.extend(self.records[i..].iter().map(|(_, r)| r));
        theirs.extend(other.records[j..].iter().map(|(_, r)| r));

        (ours, theirs)
    }
}

fn compare<T: Ord>(a: &(u32, T), b: &(u32, T)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

impl<T> Default for RecordSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for RecordSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: StructuralHash + Ord> FromIterator<T> for RecordSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut records: Vec<(u32, T)> = iter
            .into_iter()
            .map(|r| (r.structural_hash(), r))
            .collect();
        records.sort_by(compare);
        Self { records }
    }
}

impl<T: StructuralHash + Ord> Extend<T> for RecordSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl<T> IntoIterator for RecordSet<T> {
    type Item = T;
    type IntoIter = std::iter::Map<std::vec::IntoIter<(u32, T)>, fn((u32, T)) -> T>;

    fn into_iter(self) -> Self::IntoIter {
        let record: fn((u32, T)) -> T = |(_, r)| r;
        self.records.into_iter().map(record)
    }
}

impl<T: Serialize> Serialize for RecordSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, T> Deserialize<'de> for RecordSet<T>
where
    T: Deserialize<'de> + StructuralHash + Ord,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer).map(|v| v.into_iter().collect())
    }
}
