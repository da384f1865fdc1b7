//! Preferences Storage
//!
//! Key-value preference storage backed by the platform (shared prefs,
//! UserDefaults, encrypted storage). The engine persists the selected-list
//! URL here and scans per-book display records during orphan cleanup.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::settings::SettingsStore;
///
/// async fn save_selection(store: &dyn SettingsStore) -> bridge_traits::Result<()> {
///     store.set_string("shelves.selected_list", "/lists/OL123L").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn remove(&self, key: &str) -> Result<()>;

    /// List all stored keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}
