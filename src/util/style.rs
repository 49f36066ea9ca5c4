//! Global CSS custom-property surface.
//!
//! Writes `--name: value` pairs on the `<html>` element's inline style so any
//! stylesheet rule using `var(--name)` picks them up. Only the preferences
//! store writes here; components read the variables through CSS.
//!
//! TRADE-OFFS
//! ==========
//! Without `hydrate` there is no document, so [`document_surface`] hands back a
//! [`MemoryStyle`] and SSR output stays deterministic.

#[cfg(test)]
#[path = "style_test.rs"]
mod style_test;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const COMPANY_TEXT_COLOR_VAR: &str = "--company-text-color";
pub const NAVBAR_BG_COLOR_VAR: &str = "--navbar-bg-color";
pub const BASE_FONT_SIZE_VAR: &str = "--base-font-size";
pub const HEADING_FONT_SIZE_VAR: &str = "--heading-font-size";

/// Target for style-variable projection.
pub trait StyleSurface: Send + Sync {
    /// Set custom property `name` to `value`.
    fn set_property(&self, name: &str, value: &str);

    /// Current value of custom property `name`, if set.
    fn property(&self, name: &str) -> Option<String>;
}

/// Format a pixel size the way CSS expects it.
#[must_use]
pub fn px(size: u32) -> String {
    format!("{size}px")
}

/// In-memory style surface for SSR and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStyle {
    properties: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStyle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.properties.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StyleSurface for MemoryStyle {
    fn set_property(&self, name: &str, value: &str) {
        self.lock().insert(name.to_owned(), value.to_owned());
    }

    fn property(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }
}

/// The document root element's inline style.
#[cfg(feature = "hydrate")]
#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentStyle;

#[cfg(feature = "hydrate")]
impl DocumentStyle {
    fn root_style() -> Option<web_sys::CssStyleDeclaration> {
        use wasm_bindgen::JsCast;

        let el = web_sys::window()?.document()?.document_element()?;
        el.dyn_into::<web_sys::HtmlElement>().ok().map(|html| html.style())
    }
}

#[cfg(feature = "hydrate")]
impl StyleSurface for DocumentStyle {
    fn set_property(&self, name: &str, value: &str) {
        if let Some(style) = Self::root_style() {
            if let Err(e) = style.set_property(name, value) {
                leptos::logging::warn!("failed to set style {name}: {e:?}");
            }
        }
    }

    fn property(&self, name: &str) -> Option<String> {
        let value = Self::root_style()?.get_property_value(name).ok()?;
        (!value.is_empty()).then_some(value)
    }
}

/// Style surface for the current page.
#[must_use]
pub fn document_surface() -> Arc<dyn StyleSurface> {
    #[cfg(feature = "hydrate")]
    {
        Arc::new(DocumentStyle)
    }
    #[cfg(not(feature = "hydrate"))]
    {
        Arc::new(MemoryStyle::new())
    }
}
