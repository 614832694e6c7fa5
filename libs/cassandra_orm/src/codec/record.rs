use super::PlainValue;

/// Ordered name → value mapping.
///
/// Used both for decoded rows (column name → value, in result column order)
/// and for associative hydration (field name → value, in mapping order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, PlainValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert a value, replacing any previous value under the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: PlainValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PlainValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Remove and return the value stored under `name`.
    pub fn take(&mut self, name: &str) -> Option<PlainValue> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Value of the first entry, if any.
    pub fn first(&self) -> Option<&PlainValue> {
        self.entries.first().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlainValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl FromIterator<(String, PlainValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, PlainValue)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, PlainValue);
    type IntoIter = std::vec::IntoIter<(String, PlainValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_replaces() {
        let mut record = Record::new();
        record.insert("b", PlainValue::Int(1));
        record.insert("a", PlainValue::Int(2));
        record.insert("b", PlainValue::Int(3));

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(record.get("b"), Some(&PlainValue::Int(3)));
        assert_eq!(record.first(), Some(&PlainValue::Int(3)));
        assert!(!record.contains("c"));
    }
}
