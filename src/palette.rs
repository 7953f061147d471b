use crate::error::{MapError, Result};
use palette::{FromColor, IntoColor, LinSrgb, Mix, Oklab, Srgb};
use serde::Serialize;
use std::collections::BTreeSet;

/// ColorBrewer Spectral, 11 classes
pub const SPECTRAL: &[&str] = &[
    "#9e0142", "#d53e4f", "#f46d43", "#fdae61", "#fee08b",
    "#ffffbf", "#e6f598", "#abdda4", "#66c2a5", "#3288bd", "#5e4fa2",
];

/// Convert a CSS color name/value to hex format.
pub fn color_to_hex(value: &str) -> Result<String> {
    csscolorparser::parse(value)
        .map(|c| c.to_css_hex())
        .map_err(|e| MapError::InvalidColor {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorScale {
    entries: Vec<(String, String)>,
}

impl ColorScale {
    pub fn from_categories<'a, I>(categories: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = categories.into_iter().collect();
        let colors = interpolate_colors(SPECTRAL, distinct.len());
        let entries = distinct
            .into_iter()
            .zip(colors)
            .map(|(category, color)| (category.to_string(), color))
            .collect();
        Self { entries }
    }

    pub fn color_for(&self, category: &str) -> Option<&str> {
        self.entries
            .binary_search_by(|(c, _)| c.as_str().cmp(category))
            .ok()
            .map(|i| self.entries[i].1.as_str())
    }

    /// `(category, color)` pairs in category order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `count` evenly spaced colors along the given stops, interpolated in Oklab.
pub fn interpolate_colors(colors: &[&str], count: usize) -> Vec<String> {
    let stops: Vec<Oklab<f32>> = colors
        .iter()
        .filter_map(|c| parse_to_srgb(c))
        .map(|c| Oklab::from_color(LinSrgb::from(c)))
        .collect();

    let Some(first) = stops.first() else {
        return Vec::new();
    };

    if count == 1 || stops.len() == 1 {
        let lin: LinSrgb<f32> = (*first).into_color();
        return vec![srgb_to_hex(&Srgb::from(lin)); count];
    }

    let num_segments = stops.len() - 1;
    let mut result = Vec::with_capacity(count);

    for i in 0..count {
        let t = i as f32 / (count - 1) as f32;
        let segment_float = t * num_segments as f32;
        let segment = (segment_float.floor() as usize).min(num_segments - 1);
        let segment_t = segment_float - segment as f32;

        let interpolated = stops[segment].mix(stops[segment + 1], segment_t);
        let lin: LinSrgb<f32> = interpolated.into_color();
        result.push(srgb_to_hex(&Srgb::from(lin)));
    }

    result
}

fn parse_to_srgb(color: &str) -> Option<Srgb<f32>> {
    let parsed = csscolorparser::parse(color).ok()?;
    Some(Srgb::new(parsed.r as f32, parsed.g as f32, parsed.b as f32))
}

fn srgb_to_hex(color: &Srgb<f32>) -> String {
    let r = (color.red.clamp(0.0, 1.0) * 255.0).round() as u8;
    let g = (color.green.clamp(0.0, 1.0) * 255.0).round() as u8;
    let b = (color.blue.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}
