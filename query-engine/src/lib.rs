// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Read-side projection of the catalog.
//!
//! [`project`] is a pure function: scope -> free-text -> exact filters ->
//! facets -> price range -> sort, each stage narrowing the previous one.
//! Re-running with identical inputs yields an identical ordered list; every
//! sort uses a stable comparator so tied rows keep their relative order
//! across re-renders.

pub mod filter;

use chrono::{DateTime, Utc};

use core_types::Listing;

pub use filter::{AppScope, FilterState, SearchScope, SortOrder};

pub fn project(
    catalog: &[Listing],
    scope: AppScope,
    filters: &FilterState,
    sort: SortOrder,
) -> Vec<Listing> {
    let mut rows: Vec<Listing> = catalog
        .iter()
        .filter(|l| matches_scope(l, scope))
        .filter(|l| matches_query(l, filters))
        .filter(|l| matches_exact(l, filters))
        .filter(|l| matches_facets(l, filters))
        .filter(|l| matches_price(l, filters))
        .cloned()
        .collect();
    sort_rows(&mut rows, sort);
    rows
}

fn matches_scope(listing: &Listing, scope: AppScope) -> bool {
    match scope {
        AppScope::Marketplace => !listing.is_timed_break(),
        AppScope::Breaks => listing.is_timed_break(),
        AppScope::Combined => true,
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn opt_contains_ci(haystack: &Option<String>, needle: &str) -> bool {
    haystack
        .as_deref()
        .map(|h| contains_ci(h, needle))
        .unwrap_or(false)
}

fn matches_query(listing: &Listing, filters: &FilterState) -> bool {
    let query = filters.query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    let card = &listing.card;
    match filters.search_scope {
        SearchScope::Title => contains_ci(&listing.title, &query),
        SearchScope::PokemonName => opt_contains_ci(&card.pokemon_name, &query),
        SearchScope::SetName => {
            opt_contains_ci(&card.set_name, &query) || opt_contains_ci(&card.series, &query)
        }
        SearchScope::SellerName => contains_ci(&listing.seller.display_name, &query),
        SearchScope::BoosterName => opt_contains_ci(&card.booster_name, &query),
        SearchScope::All => {
            contains_ci(&listing.title, &query)
                || opt_contains_ci(&card.pokemon_name, &query)
                || opt_contains_ci(&card.set_name, &query)
                || contains_ci(&listing.description, &query)
                || contains_ci(&listing.seller.display_name, &query)
        }
    }
}

fn matches_exact(listing: &Listing, filters: &FilterState) -> bool {
    let card = &listing.card;
    if let Some(name) = &filters.pokemon_name {
        if !opt_contains_ci(&card.pokemon_name, &name.to_lowercase()) {
            return false;
        }
    }
    if let Some(language) = &filters.language {
        if card.language.as_deref() != Some(language.as_str()) {
            return false;
        }
    }
    if let Some(series) = &filters.series {
        if card.series.as_deref() != Some(series.as_str()) {
            return false;
        }
    }
    if let Some(set_id) = &filters.set_id {
        if card.set_id.as_deref() != Some(set_id.as_str()) {
            return false;
        }
    }
    true
}

/// Facets AND together; values within one facet OR together. A facet with an
/// empty selection is inactive.
fn matches_facets(listing: &Listing, filters: &FilterState) -> bool {
    let card = &listing.card;
    if !filters.conditions.is_empty() {
        match card.condition {
            Some(c) if filters.conditions.contains(&c) => {}
            _ => return false,
        }
    }
    if !filters.grading_companies.is_empty() {
        match card.grading {
            Some(g) if filters.grading_companies.contains(&g) => {}
            _ => return false,
        }
    }
    if !filters.variant_tags.is_empty()
        && !card.variant_tags.iter().any(|t| filters.variant_tags.contains(t))
    {
        return false;
    }
    if !filters.energy_types.is_empty()
        && !card.energy_types.iter().any(|t| filters.energy_types.contains(t))
    {
        return false;
    }
    if !filters.categories.is_empty() {
        match card.category {
            Some(c) if filters.categories.contains(&c) => {}
            _ => return false,
        }
    }
    if !filters.sealed_kinds.is_empty() {
        match card.sealed_kind {
            Some(k) if filters.sealed_kinds.contains(&k) => {}
            _ => return false,
        }
    }
    if !filters.break_statuses.is_empty() {
        match listing.timed_break() {
            Some(state) if filters.break_statuses.contains(&state.status) => {}
            _ => return false,
        }
    }
    true
}

fn matches_price(listing: &Listing, filters: &FilterState) -> bool {
    if let Some(min) = filters.price_min {
        if listing.price < min {
            return false;
        }
    }
    if let Some(max) = filters.price_max {
        if listing.price > max {
            return false;
        }
    }
    true
}

fn sort_rows(rows: &mut [Listing], sort: SortOrder) {
    match sort {
        SortOrder::PriceAsc => rows.sort_by(|a, b| a.price.cmp(&b.price)),
        SortOrder::PriceDesc => rows.sort_by(|a, b| b.price.cmp(&a.price)),
        SortOrder::EndingSoon => rows.sort_by(|a, b| deadline(a).cmp(&deadline(b))),
        SortOrder::MostBids => rows.sort_by(|a, b| b.bids_count().cmp(&a.bids_count())),
        SortOrder::Newest => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

/// Missing deadlines sort last ("infinite future").
fn deadline(listing: &Listing) -> DateTime<Utc> {
    listing.ends_at().unwrap_or(DateTime::<Utc>::MAX_UTC)
}
