use rustc_hash::FxHashMap;

/// Interned key of a repeat family (the annotation's repeat name, e.g. `LTR7`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FamilyId(pub u32);

/// The fixed set of families seen while loading annotations.
/// Ids are assigned in first-seen order and never change afterwards.
#[derive(Debug, Default)]
pub struct FamilyIndex {
    name_to_id: FxHashMap<String, FamilyId>,
    names: Vec<String>,
}

impl FamilyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_id(&mut self, name: &str) -> FamilyId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = FamilyId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.name_to_id.insert(name.to_string(), id);
        id
    }

    pub fn get_name(&self, id: FamilyId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable() {
        let mut index = FamilyIndex::new();
        let a = index.get_or_insert_id("LTR7");
        let b = index.get_or_insert_id("HERVH-int");
        assert_eq!(index.get_or_insert_id("LTR7"), a);
        assert_ne!(a, b);
        assert_eq!(index.get_name(b), Some("HERVH-int"));
        assert_eq!(index.get_name(FamilyId(7)), None);
        assert_eq!(index.len(), 2);
    }
}
