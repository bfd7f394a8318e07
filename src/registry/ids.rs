use std::collections::BTreeMap;

/// Placeholder id for configurations whose names yield no usable characters.
pub const CONFIG_PLACEHOLDER: &str = "CONFIG";
/// Placeholder id for components whose names yield no usable characters.
pub const COMPONENT_PLACEHOLDER: &str = "COMPONENT";

/// Derive a public identifier from a display name.
///
/// The name is upper-cased, spaces become `_` and every other character
/// outside `[A-Za-z0-9_]` is dropped. A result that is empty or made only of
/// digits and underscores is replaced by `placeholder`. Collisions with
/// `taken` (compared case-insensitively) get the smallest free numeric
/// suffix: `BASE`, `BASE0`, `BASE1`, ...
pub fn create_pv_name<'a, I>(name: &str, taken: I, placeholder: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut base: String = name
        .to_uppercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if !base.chars().any(|c| c.is_ascii_alphabetic()) {
        base = placeholder.to_string();
    }

    let taken: Vec<String> = taken.into_iter().map(|t| t.to_ascii_uppercase()).collect();
    let is_taken = |candidate: &str| taken.iter().any(|t| t == &candidate.to_ascii_uppercase());

    let mut candidate = base.clone();
    let mut suffix = 0u32;
    while is_taken(&candidate) {
        candidate = format!("{}{}", base, suffix);
        suffix += 1;
    }
    candidate
}

/// Assigns public ids within one namespace.
///
/// An id, once handed out for a name, is kept for the life of the allocator,
/// including after the name is deleted.
#[derive(Debug, Clone)]
pub(crate) struct IdAllocator {
    placeholder: &'static str,
    ids: BTreeMap<String, String>,
}

impl IdAllocator {
    pub(crate) fn new(placeholder: &'static str) -> Self {
        Self {
            placeholder,
            ids: BTreeMap::new(),
        }
    }

    pub(crate) fn id_for(&mut self, name: &str) -> String {
        let key = name.to_ascii_lowercase();
        if let Some(id) = self.ids.get(&key) {
            return id.clone();
        }
        let id = create_pv_name(name, self.ids.values().map(String::as_str), self.placeholder);
        self.ids.insert(key, id.clone());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_and_uppercases() {
        assert_eq!(create_pv_name("my config", [], "CONFIG"), "MY_CONFIG");
        assert_eq!(create_pv_name("a-b.c!", [], "CONFIG"), "ABC");
        assert_eq!(create_pv_name("Test_1", [], "CONFIG"), "TEST_1");
    }

    #[test]
    fn unusable_names_get_placeholder() {
        assert_eq!(create_pv_name("", [], "CONFIG"), "CONFIG");
        assert_eq!(create_pv_name("!!!", [], "COMPONENT"), "COMPONENT");
        assert_eq!(create_pv_name("123", [], "CONFIG"), "CONFIG");
        assert_eq!(create_pv_name("_1 2_", [], "CONFIG"), "CONFIG");
    }

    #[test]
    fn collisions_get_smallest_suffix() {
        assert_eq!(create_pv_name("test", ["TEST"], "CONFIG"), "TEST0");
        assert_eq!(create_pv_name("test", ["TEST", "TEST0"], "CONFIG"), "TEST1");
        assert_eq!(create_pv_name("test", ["test"], "CONFIG"), "TEST0");
        assert_eq!(create_pv_name("!", ["CONFIG"], "CONFIG"), "CONFIG0");
    }

    #[test]
    fn allocator_is_stable() {
        let mut ids = IdAllocator::new(CONFIG_PLACEHOLDER);
        assert_eq!(ids.id_for("test"), "TEST");
        assert_eq!(ids.id_for("TEST!"), "TEST0");
        assert_eq!(ids.id_for("Test"), "TEST");
        assert_eq!(ids.id_for("test!"), "TEST0");
    }
}
