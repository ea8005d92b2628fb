//! Container recipe management.
//!
//! The active recipe is the Dockerfile text the next image build uses. Two
//! presets ship built in: `unity`, which preinstalls the shared libraries a
//! Unity dedicated server expects, and `binary`, which only installs the
//! uploaded build. The active recipe is persisted under the home directory so
//! it survives restarts; preset files are written out on first use so
//! operators can inspect them.

use std::path::PathBuf;

use tokio::fs;

use crate::{utils, validate::validate_recipe, LudocoreError, LudocoreResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The names of the built-in presets.
pub const PRESET_NAMES: &[&str] = &["unity", "binary"];

const UNITY_RECIPE: &str = r#"FROM --platform=linux/amd64 debian:13-slim

RUN apt-get update && apt-get install -y \
    libxss1 \
    libgtk-3-0 \
    libxrandr2 \
    libasound2 \
    libpangocairo-1.0-0 \
    libatk1.0-0 \
    libcairo-gobject2 \
    libgdk-pixbuf-xlib-2.0-0 \
    libnss3 \
    && rm -rf /var/lib/apt/lists/*

RUN useradd -m -u 10001 appuser

COPY staging/ /app/
RUN chown -R appuser:appuser /app && \
    find /app -type f \( -name "*.x86_64" -o -name "*.exe" \) -exec chmod +x {} \;

WORKDIR /app
USER appuser

EXPOSE 7777
"#;

const BINARY_RECIPE_TEMPLATE: &str = r#"FROM --platform={platform} debian:13-slim

RUN useradd -m -u 10001 appuser

COPY staging/ /app/
RUN chown -R appuser:appuser /app && \
    find /app -type f -exec chmod +x {} \;

WORKDIR /app
USER appuser

EXPOSE 7777
"#;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Stores the active recipe and exposes the preset set.
#[derive(Debug, Clone)]
pub struct RecipeManager {
    dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RecipeManager {
    /// Creates a manager over the default recipes directory.
    pub fn new() -> Self {
        Self {
            dir: utils::recipes_dir_path(),
        }
    }

    /// Creates a manager over an explicit directory. Used by tests.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the available preset names.
    pub fn list_presets(&self) -> &'static [&'static str] {
        PRESET_NAMES
    }

    /// Returns the recipe text for a preset name.
    pub fn get_preset(&self, name: &str) -> Option<String> {
        match name {
            "unity" => Some(UNITY_RECIPE.to_string()),
            "binary" => Some(binary_recipe()),
            _ => None,
        }
    }

    /// Returns the active recipe text, falling back to the `binary` preset
    /// when none has been set.
    pub async fn get_active(&self) -> LudocoreResult<String> {
        match fs::read_to_string(self.active_path()).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(binary_recipe()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the name of the active recipe: a preset name, `custom`, or
    /// `binary (default)` when nothing has been set yet.
    pub async fn active_name(&self) -> String {
        let content = match fs::read_to_string(self.active_path()).await {
            Ok(content) => content,
            Err(_) => return "binary (default)".to_string(),
        };

        for name in PRESET_NAMES {
            if self.get_preset(name).as_deref() == Some(content.as_str()) {
                return name.to_string();
            }
        }
        "custom".to_string()
    }

    /// Validates and persists new active recipe text. The caller is expected
    /// to invalidate the cached image tag afterwards so the next start
    /// rebuilds.
    pub async fn set_active_text(&self, content: &str) -> LudocoreResult<()> {
        validate_recipe(content)?;
        self.ensure_dir().await?;
        fs::write(self.active_path(), content).await?;
        Ok(())
    }

    /// Sets the active recipe from a preset name.
    pub async fn set_active_from_preset(&self, name: &str) -> LudocoreResult<()> {
        let content = self
            .get_preset(name)
            .ok_or_else(|| LudocoreError::Validation(format!("unknown preset: {}", name)))?;
        self.set_active_text(&content).await
    }

    /// Creates the recipes directory and writes the preset files if missing.
    pub async fn ensure_dir(&self) -> LudocoreResult<()> {
        fs::create_dir_all(&self.dir).await?;

        for name in PRESET_NAMES {
            let path = self.dir.join(format!("{}.Dockerfile", name));
            if !fs::try_exists(&path).await? {
                let content = self.get_preset(name).expect("preset names are closed");
                fs::write(&path, content).await?;
            }
        }
        Ok(())
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(utils::ACTIVE_RECIPE_FILENAME)
    }
}

impl Default for RecipeManager {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the `binary` preset for the host architecture.
fn binary_recipe() -> String {
    let platform = if std::env::consts::ARCH == "aarch64" {
        "linux/arm64"
    } else {
        "linux/amd64"
    };
    BINARY_RECIPE_TEMPLATE.replace("{platform}", platform)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_presets_are_total_and_valid() {
        let manager = RecipeManager::with_dir("/nonexistent");
        for name in manager.list_presets() {
            let content = manager.get_preset(name).expect("advertised preset exists");
            validate_recipe(&content).expect("preset recipes validate");
        }
        assert!(manager.get_preset("mystery").is_none());
    }

    #[tokio::test]
    async fn test_active_defaults_to_binary_preset() {
        let dir = tempdir().unwrap();
        let manager = RecipeManager::with_dir(dir.path());

        assert_eq!(manager.get_active().await.unwrap(), binary_recipe());
        assert_eq!(manager.active_name().await, "binary (default)");
    }

    #[tokio::test]
    async fn test_set_active_from_preset_round_trip() {
        let dir = tempdir().unwrap();
        let manager = RecipeManager::with_dir(dir.path());

        manager.set_active_from_preset("unity").await.unwrap();
        assert_eq!(manager.get_active().await.unwrap(), UNITY_RECIPE);
        assert_eq!(manager.active_name().await, "unity");

        assert!(manager.set_active_from_preset("mystery").await.is_err());
    }

    #[tokio::test]
    async fn test_set_active_text_validates() {
        let dir = tempdir().unwrap();
        let manager = RecipeManager::with_dir(dir.path());

        manager
            .set_active_text("FROM alpine:3\nCOPY staging/ /app/\n")
            .await
            .unwrap();
        assert_eq!(manager.active_name().await, "custom");

        assert!(manager.set_active_text("RUN echo no-base-image").await.is_err());
        assert!(manager.set_active_text("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_dir_writes_preset_files() {
        let dir = tempdir().unwrap();
        let manager = RecipeManager::with_dir(dir.path());
        manager.ensure_dir().await.unwrap();

        for name in PRESET_NAMES {
            assert!(dir.path().join(format!("{}.Dockerfile", name)).exists());
        }
    }
}
