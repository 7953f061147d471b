use crate::layers::MapLayer;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchEntry {
    pub id: String,
    pub name: String,
    pub layer: String,
    pub lon: f64,
    pub lat: f64,
    pub popup: Option<String>,
}

/// Where the map goes when a search hit is chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchTarget {
    pub layer: String,
    pub lon: f64,
    pub lat: f64,
    pub zoom: u8,
    pub popup: Option<String>,
}

/// Identifier and name lookup over the features of searchable layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchIndex {
    entries: Vec<SearchEntry>,
    zoom: u8,
}

impl SearchIndex {
    pub fn build(layers: &[MapLayer], zoom: u8) -> Self {
        let entries = layers
            .iter()
            .filter(|layer| layer.searchable)
            .flat_map(|layer| {
                layer.features.iter().map(move |feature| {
                    let (lon, lat) = feature.anchor();
                    SearchEntry {
                        id: feature.id.clone(),
                        name: feature.name.clone(),
                        layer: layer.name.clone(),
                        lon,
                        lat,
                        popup: feature.popup.clone(),
                    }
                })
            })
            .collect();
        Self { entries, zoom }
    }

    pub fn entries(&self) -> &[SearchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive match on id or name. Exact matches rank first, then
    /// prefix matches, then substring matches; ties keep index order.
    pub fn search(&self, query: &str) -> Vec<&SearchEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<(u8, &SearchEntry)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                [entry.id.to_lowercase(), entry.name.to_lowercase()]
                    .iter()
                    .filter_map(|field| {
                        if *field == needle {
                            Some(0)
                        } else if field.starts_with(&needle) {
                            Some(1)
                        } else if field.contains(&needle) {
                            Some(2)
                        } else {
                            None
                        }
                    })
                    .min()
                    .map(|rank| (rank, entry))
            })
            .collect();

        hits.sort_by_key(|(rank, _)| *rank);
        hits.into_iter().map(|(_, entry)| entry).collect()
    }

    pub fn resolve(&self, query: &str) -> Option<SearchTarget> {
        self.search(query).first().map(|entry| SearchTarget {
            layer: entry.layer.clone(),
            lon: entry.lon,
            lat: entry.lat,
            zoom: self.zoom,
            popup: entry.popup.clone(),
        })
    }
}
