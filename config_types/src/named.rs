use serde::{Deserialize, Serialize};

/// Anything addressed by a case-insensitive display name.
pub trait Named {
    fn name(&self) -> &str;
}

/// Insertion-ordered collection keyed by case-insensitive name.
///
/// Configurations hold tens of entries, so lookups are linear scans. Order is
/// significant: it is the display order of groups and the precedence order of
/// attached components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedList<T> {
    items: Vec<T>,
}

impl<T> Default for NamedList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Named> NamedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.position(name).map(|idx| &self.items[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        let idx = self.position(name)?;
        Some(&mut self.items[idx])
    }

    /// Insert or replace in place. A replaced entry keeps its position.
    pub fn insert(&mut self, item: T) -> Option<T> {
        match self.position(item.name()) {
            Some(idx) => Some(std::mem::replace(&mut self.items[idx], item)),
            None => {
                self.items.push(item);
                None
            }
        }
    }

    /// Insert only if the name is absent. Returns false if it was already present.
    pub fn insert_new(&mut self, item: T) -> bool {
        if self.contains(item.name()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.position(name).map(|idx| self.items.remove(idx))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name().to_string()).collect()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.name().eq_ignore_ascii_case(name))
    }
}

impl<T: Named> FromIterator<T> for NamedList<T> {
    /// Later duplicates (by case-insensitive name) are dropped.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = NamedList::new();
        for item in iter {
            list.insert_new(item);
        }
        list
    }
}

impl<'a, T> IntoIterator for &'a NamedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for NamedList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
