/// Injected `<script>` elements whose load has not succeeded yet.
///
/// A tag is tracked from injection until it either loads (then the bundle
/// owns it and it is forgotten) or is taken back for removal.
pub struct PendingScripts<T> {
    next_id: u64,
    entries: Vec<(u64, String, T)>,
}

impl<T> PendingScripts<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Start tracking `element`, injected for `src`. The returned id settles
    /// this one injection even when several share a `src`.
    pub fn track(&mut self, src: &str, element: T) -> u64 {
        self.next_id += 1;
        self.entries.push((self.next_id, src.to_string(), element));
        self.next_id
    }

    /// The injection `id` loaded; stop tracking it.
    pub fn loaded(&mut self, id: u64) {
        self.entries.retain(|(entry, _, _)| *entry != id);
    }

    /// Hand back every tracked element for `src`.
    pub fn take(&mut self, src: &str) -> Vec<T> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(_, entry, _)| entry == src);
        self.entries = kept;
        taken.into_iter().map(|(_, _, element)| element).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for PendingScripts<T> {
    fn default() -> Self {
        Self::new()
    }
}
