//! Branding/display preferences shared by every page of the portal.
//!
//! SYSTEM CONTEXT
//! ==============
//! The navbar, headings, and company banner read these through CSS custom
//! properties; the settings page edits them through the `update_*` methods.
//! This store is the only writer of those custom properties.
//!
//! DESIGN
//! ======
//! Each update persists first, then applies the value to the signal and the
//! style surface, then broadcasts on the storage bus. A failed write changes
//! nothing, so memory, storage, and style never disagree.

#[cfg(test)]
#[path = "preferences_test.rs"]
mod preferences_test;

use std::sync::Arc;

use leptos::prelude::{GetUntracked, ReadSignal, RwSignal, Update};

use crate::config::PreferenceDefaults;
use crate::config::keys::{
    BASE_FONT_SIZE, COMPANY_NAME, COMPANY_TEXT_COLOR, HEADING_FONT_SIZE, NAVBAR_BG_COLOR,
};
use crate::util::storage::{KeyedStorage, StorageError, StorageSet};
use crate::util::storage_listener::StorageBus;
use crate::util::style::{
    BASE_FONT_SIZE_VAR, COMPANY_TEXT_COLOR_VAR, HEADING_FONT_SIZE_VAR, NAVBAR_BG_COLOR_VAR,
    StyleSurface, px,
};

/// Current display preferences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preferences {
    pub company_name: String,
    pub company_text_color: String,
    pub navbar_bg_color: String,
    /// Body text size in px.
    pub base_font_size: u32,
    /// Heading text size in px.
    pub heading_font_size: u32,
}

impl From<&PreferenceDefaults> for Preferences {
    fn from(defaults: &PreferenceDefaults) -> Self {
        Self {
            company_name: defaults.company_name.clone(),
            company_text_color: defaults.company_text_color.clone(),
            navbar_bg_color: defaults.navbar_bg_color.clone(),
            base_font_size: defaults.base_font_size,
            heading_font_size: defaults.heading_font_size,
        }
    }
}

/// Reactive preference store backed by the persistent store.
#[derive(Clone)]
pub struct PreferencesStore {
    state: RwSignal<Preferences>,
    storage: KeyedStorage,
    style: Arc<dyn StyleSurface>,
    bus: StorageBus,
    defaults: PreferenceDefaults,
}

impl PreferencesStore {
    /// Load preferences from the persistent store and project them.
    ///
    /// Stored values are adopted and projected. Missing values fall back to
    /// `defaults`; of those only the font sizes are projected, colors keep
    /// whatever the stylesheet declares.
    pub fn new(
        storages: &StorageSet,
        style: Arc<dyn StyleSurface>,
        bus: StorageBus,
        defaults: PreferenceDefaults,
    ) -> Self {
        let storage = storages.persistent.clone();

        let company_name = storage
            .get_raw(COMPANY_NAME)
            .unwrap_or_else(|| defaults.company_name.clone());
        let company_text_color =
            load_color(&storage, &*style, COMPANY_TEXT_COLOR, COMPANY_TEXT_COLOR_VAR)
                .unwrap_or_else(|| defaults.company_text_color.clone());
        let navbar_bg_color = load_color(&storage, &*style, NAVBAR_BG_COLOR, NAVBAR_BG_COLOR_VAR)
            .unwrap_or_else(|| defaults.navbar_bg_color.clone());
        let base_font_size =
            load_font_size(&storage, BASE_FONT_SIZE).unwrap_or(defaults.base_font_size);
        let heading_font_size =
            load_font_size(&storage, HEADING_FONT_SIZE).unwrap_or(defaults.heading_font_size);
        style.set_property(BASE_FONT_SIZE_VAR, &px(base_font_size));
        style.set_property(HEADING_FONT_SIZE_VAR, &px(heading_font_size));

        let prefs = Preferences {
            company_name,
            company_text_color,
            navbar_bg_color,
            base_font_size,
            heading_font_size,
        };
        Self { state: RwSignal::new(prefs), storage, style, bus, defaults }
    }

    /// Read-only signal for views.
    #[must_use]
    pub fn state(&self) -> ReadSignal<Preferences> {
        self.state.read_only()
    }

    /// Current preferences without tracking.
    #[must_use]
    pub fn snapshot(&self) -> Preferences {
        self.state.get_untracked()
    }

    /// # Errors
    ///
    /// Returns the storage error if the value could not be persisted; state is unchanged.
    pub fn update_company_name(&self, name: &str) -> Result<(), StorageError> {
        self.apply(COMPANY_NAME, name, None, |p| p.company_name = name.to_owned())
    }

    /// # Errors
    ///
    /// Returns the storage error if the value could not be persisted; state is unchanged.
    pub fn update_company_text_color(&self, color: &str) -> Result<(), StorageError> {
        let projection = Some((COMPANY_TEXT_COLOR_VAR, color.to_owned()));
        self.apply(COMPANY_TEXT_COLOR, color, projection, |p| {
            p.company_text_color = color.to_owned();
        })
    }

    /// # Errors
    ///
    /// Returns the storage error if the value could not be persisted; state is unchanged.
    pub fn update_navbar_bg_color(&self, color: &str) -> Result<(), StorageError> {
        let projection = Some((NAVBAR_BG_COLOR_VAR, color.to_owned()));
        self.apply(NAVBAR_BG_COLOR, color, projection, |p| {
            p.navbar_bg_color = color.to_owned();
        })
    }

    /// # Errors
    ///
    /// Returns the storage error if the value could not be persisted; state is unchanged.
    pub fn update_base_font_size(&self, size: u32) -> Result<(), StorageError> {
        let projection = Some((BASE_FONT_SIZE_VAR, px(size)));
        self.apply(BASE_FONT_SIZE, &size.to_string(), projection, |p| {
            p.base_font_size = size;
        })
    }

    /// # Errors
    ///
    /// Returns the storage error if the value could not be persisted; state is unchanged.
    pub fn update_heading_font_size(&self, size: u32) -> Result<(), StorageError> {
        let projection = Some((HEADING_FONT_SIZE_VAR, px(size)));
        self.apply(HEADING_FONT_SIZE, &size.to_string(), projection, |p| {
            p.heading_font_size = size;
        })
    }

    /// Restore every preference to its configured default.
    ///
    /// # Errors
    ///
    /// Stops at the first preference that fails to persist; earlier ones stay reset.
    pub fn reset_to_defaults(&self) -> Result<(), StorageError> {
        let d = self.defaults.clone();
        self.update_company_name(&d.company_name)?;
        self.update_company_text_color(&d.company_text_color)?;
        self.update_navbar_bg_color(&d.navbar_bg_color)?;
        self.update_base_font_size(d.base_font_size)?;
        self.update_heading_font_size(d.heading_font_size)
    }

    fn apply(
        &self,
        key: &str,
        stored: &str,
        projection: Option<(&str, String)>,
        change: impl FnOnce(&mut Preferences),
    ) -> Result<(), StorageError> {
        if let Err(e) = self.storage.set_raw(key, stored) {
            leptos::logging::warn!("preference `{key}` not saved: {e}");
            return Err(e);
        }
        self.state.update(change);
        if let Some((var, value)) = projection {
            self.style.set_property(var, &value);
        }
        self.bus.trigger_storage_update(key, Some(stored));
        Ok(())
    }
}

fn load_color(
    storage: &KeyedStorage,
    style: &dyn StyleSurface,
    key: &str,
    var: &str,
) -> Option<String> {
    let color = storage.get_raw(key)?;
    style.set_property(var, &color);
    Some(color)
}

fn load_font_size(storage: &KeyedStorage, key: &str) -> Option<u32> {
    let raw = storage.get_raw(key)?;
    let parsed = raw.trim().parse::<u32>().ok();
    if parsed.is_none() {
        leptos::logging::warn!("ignoring unparseable `{key}` value: {raw:?}");
    }
    parsed
}
