//! Layer visibility state.
//!
//! Base layers are mutually exclusive; overlays toggle independently. Visible
//! overlays are kept in the order they were enabled so the most recently
//! enabled one is drawn on top and answers clicks first. Transitions are pure
//! and return a new state.

use crate::error::{MapError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerControl {
    base_layers: Vec<String>,
    active_base: String,
    overlays: Vec<String>,
    // Visible overlays, oldest first
    enable_order: Vec<String>,
}

impl LayerControl {
    /// `overlays` pairs each overlay name with its default visibility; default
    /// visible overlays are enabled in the order given.
    pub fn new(
        base_layers: Vec<String>,
        overlays: Vec<(String, bool)>,
        active_base: Option<&str>,
    ) -> Result<Self> {
        let active_base = match active_base {
            Some(name) if base_layers.iter().any(|b| b == name) => name.to_string(),
            Some(name) => return Err(MapError::UnknownLayer(name.to_string())),
            None => base_layers.first().cloned().ok_or(MapError::NoBaseLayer)?,
        };

        let enable_order = overlays
            .iter()
            .filter(|(_, visible)| *visible)
            .map(|(name, _)| name.clone())
            .collect();

        Ok(Self {
            base_layers,
            active_base,
            overlays: overlays.into_iter().map(|(name, _)| name).collect(),
            enable_order,
        })
    }

    pub fn base_layers(&self) -> &[String] {
        &self.base_layers
    }

    pub fn active_base(&self) -> &str {
        &self.active_base
    }

    /// All overlays in declaration order.
    pub fn overlays(&self) -> &[String] {
        &self.overlays
    }

    /// Visible overlays from bottom to top.
    pub fn enable_order(&self) -> &[String] {
        &self.enable_order
    }

    pub fn topmost(&self) -> Option<&str> {
        self.enable_order.last().map(String::as_str)
    }

    /// The active base layer followed by visible overlays, bottom to top.
    pub fn visible_layers(&self) -> Vec<&str> {
        std::iter::once(self.active_base.as_str())
            .chain(self.enable_order.iter().map(String::as_str))
            .collect()
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.active_base == name || self.enable_order.iter().any(|n| n == name)
    }

    pub fn select_base(&self, name: &str) -> Result<Self> {
        if !self.base_layers.iter().any(|b| b == name) {
            return Err(MapError::UnknownLayer(name.to_string()));
        }
        let mut next = self.clone();
        next.active_base = name.to_string();
        Ok(next)
    }

    /// Enables an overlay and moves it to the top. Showing an already visible
    /// overlay leaves the stack unchanged.
    pub fn show(&self, name: &str) -> Result<Self> {
        self.require_overlay(name)?;
        let mut next = self.clone();
        if !next.enable_order.iter().any(|n| n == name) {
            next.enable_order.push(name.to_string());
        }
        Ok(next)
    }

    pub fn hide(&self, name: &str) -> Result<Self> {
        self.require_overlay(name)?;
        let mut next = self.clone();
        next.enable_order.retain(|n| n != name);
        Ok(next)
    }

    pub fn toggle(&self, name: &str) -> Result<Self> {
        if self.is_visible(name) {
            self.hide(name)
        } else {
            self.show(name)
        }
    }

    fn require_overlay(&self, name: &str) -> Result<()> {
        if self.overlays.iter().any(|o| o == name) {
            Ok(())
        } else {
            Err(MapError::UnknownLayer(name.to_string()))
        }
    }
}
