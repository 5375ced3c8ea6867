use std::collections::HashMap;

// == Unbounded Storage ==
/// Plain map storage with no capacity limit.
#[derive(Debug, Default)]
pub struct UnboundedStorage {
    data: HashMap<Vec<u8>, Vec<u8>>,
}

impl UnboundedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.data.insert(key.to_vec(), value.to_vec());
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
