// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Read-only enrichment lookups.
//!
//! Card metadata and geolocation are pure request/response services: nothing
//! here touches engine state, and the whole contract is mockable behind
//! [`EnrichmentClient`].

use core_types::Cents;

#[derive(Debug, Clone, PartialEq)]
pub struct CardInfo {
    pub id: String,
    pub name: String,
    pub set_name: String,
    pub series: String,
    pub rarity: String,
    pub market_price: Option<Cents>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationInfo {
    pub query: String,
    pub city: String,
    pub region: String,
    pub country: String,
}

#[async_trait::async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn card_by_id(&self, id: &str) -> Option<CardInfo>;
    async fn location_info(&self, text: &str) -> Option<LocationInfo>;
}

/// In-process backend with a small built-in reference table.
pub struct StaticEnrichmentClient;

impl StaticEnrichmentClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StaticEnrichmentClient {
    fn default() -> Self {
        Self::new()
    }
}

const CARDS: &[(&str, &str, &str, &str, &str, Cents)] = &[
    ("base1-4", "Charizard", "Base Set", "Original", "Rare Holo", 42_500_00),
    ("base1-58", "Pikachu", "Base Set", "Original", "Common", 8_00),
    ("swsh12-186", "Giratina VSTAR", "Silver Tempest", "Sword & Shield", "Ultra Rare", 95_00),
    ("sv3pt5-199", "Charizard ex", "151", "Scarlet & Violet", "Special Illustration Rare", 120_00),
];

const LOCATIONS: &[(&str, &str, &str, &str)] = &[
    ("seattle", "Seattle", "WA", "US"),
    ("tokyo", "Tokyo", "Tokyo", "JP"),
    ("london", "London", "England", "GB"),
];

#[async_trait::async_trait]
impl EnrichmentClient for StaticEnrichmentClient {
    async fn card_by_id(&self, id: &str) -> Option<CardInfo> {
        CARDS
            .iter()
            .find(|(card_id, ..)| *card_id == id)
            .map(|(card_id, name, set_name, series, rarity, price)| CardInfo {
                id: card_id.to_string(),
                name: name.to_string(),
                set_name: set_name.to_string(),
                series: series.to_string(),
                rarity: rarity.to_string(),
                market_price: Some(*price),
            })
    }

    async fn location_info(&self, text: &str) -> Option<LocationInfo> {
        let needle = text.trim().to_lowercase();
        LOCATIONS
            .iter()
            .find(|(key, ..)| needle.contains(key))
            .map(|(_, city, region, country)| LocationInfo {
                query: text.to_string(),
                city: city.to_string(),
                region: region.to_string(),
                country: country.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn card_lookup_hits_and_misses() {
        let client = StaticEnrichmentClient::new();
        let card = client.card_by_id("base1-4").await.unwrap();
        assert_eq!(card.name, "Charizard");
        assert_eq!(card.set_name, "Base Set");
        assert!(client.card_by_id("nope-0").await.is_none());
    }

    #[tokio::test]
    async fn location_lookup_is_substring_based() {
        let client = StaticEnrichmentClient::new();
        let location = client.location_info("Seattle, WA").await.unwrap();
        assert_eq!(location.city, "Seattle");
        assert_eq!(location.country, "US");
        assert!(client.location_info("nowhere").await.is_none());
    }
}
