/// Engine-level knobs. Application config layers on top of this in the
/// binary crate.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Fallback entry cap applied when a break draft asks for 0.
    pub default_max_entries_per_user: u32,
    /// Persist the catalog snapshot after every shape-changing mutation.
    pub persist_on_mutation: bool,
}

impl MarketConfig {
    pub fn new() -> Self {
        Self {
            default_max_entries_per_user: 4,
            persist_on_mutation: true,
        }
    }

    pub fn with_default_entry_cap(mut self, cap: u32) -> Self {
        self.default_max_entries_per_user = cap.max(1);
        self
    }

    pub fn with_persist_on_mutation(mut self, persist: bool) -> Self {
        self.persist_on_mutation = persist;
        self
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::new()
    }
}
