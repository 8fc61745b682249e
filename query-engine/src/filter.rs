use serde::{Deserialize, Serialize};

use core_types::{
    BreakStatus, Category, Cents, Condition, EnergyType, GradingCompany, SealedKind, VariantTag,
};

/// Which surface is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppScope {
    /// Everything except timed breaks.
    Marketplace,
    /// Timed breaks only.
    Breaks,
    /// No mode filter.
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchScope {
    #[default]
    All,
    Title,
    PokemonName,
    SetName,
    SellerName,
    BoosterName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    EndingSoon,
    MostBids,
}

/// Per-session discovery configuration. Mutated field-by-field by the UI and
/// never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub query: String,
    pub search_scope: SearchScope,
    pub price_min: Option<Cents>,
    pub price_max: Option<Cents>,
    // exact/equality filters, applied only when set
    pub pokemon_name: Option<String>,
    pub language: Option<String>,
    pub series: Option<String>,
    pub set_id: Option<String>,
    // multi-select facets: values OR within a facet, facets AND together
    pub conditions: Vec<Condition>,
    pub grading_companies: Vec<GradingCompany>,
    pub variant_tags: Vec<VariantTag>,
    pub energy_types: Vec<EnergyType>,
    pub categories: Vec<Category>,
    pub sealed_kinds: Vec<SealedKind>,
    pub break_statuses: Vec<BreakStatus>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the empty default shape.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
