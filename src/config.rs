// Hoerbuch - Narrated audiobooks from text documents
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Run configuration
//!
//! Everything the pipeline needs to know about a run is collected into a
//! [`NarratorConfig`] once, in the binary, and handed down explicitly. Nothing
//! in the library reads process-wide state after that point.
//!
//! # Voice model discovery
//! 1. Explicit `--voice` path (falls back to the defaults with a warning if missing)
//! 2. `$HOERBUCH_MODEL_DIR/<default model>`
//! 3. `<executable dir>/models/<default model>`
//! 4. `<platform data dir>/hoerbuch/models/<default model>`
//!
//! # Translations
//! User-facing text goes through [`Messages`], a flat msgid → translation
//! catalog loaded from `<locale dir>/<lang>.json`.

use crate::error::{HoerbuchError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Voice model used when `--voice` is not given
pub const DEFAULT_MODEL_NAME: &str = "de_DE-thorsten-high.onnx";

/// Artist written into tags when the document has no author
pub const DEFAULT_ARTIST: &str = "Piper TTS";

/// Environment variable overriding the model search directory
pub const MODEL_DIR_ENV: &str = "HOERBUCH_MODEL_DIR";

/// Environment variable overriding the locale directory
pub const LOCALE_DIR_ENV: &str = "HOERBUCH_LOCALE_DIR";

/// Fixed silence written around the narrated audio
///
/// Lead-in precedes the first segment and lead-out follows the last one.
/// Neither carries a marker. The estimator uses the same values to subtract
/// padding from a container's total duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    /// Seconds of silence before the first segment
    pub lead_in: f64,
    /// Seconds of silence after the last segment
    pub lead_out: f64,
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            lead_in: 0.5,
            lead_out: 5.0,
        }
    }
}

impl Padding {
    /// Combined padding in seconds
    pub fn total(&self) -> f64 {
        self.lead_in + self.lead_out
    }
}

/// Configuration for one narration run
#[derive(Debug, Clone)]
pub struct NarratorConfig {
    /// Path to the Piper `.onnx` voice model
    pub voice_model: PathBuf,

    /// Speech rate multiplier (1.0 = unmodified engine rate)
    pub speed: f32,

    /// Convert the OGG output to MP3 with chapter tags
    pub convert_to_mp3: bool,

    /// Lead-in / lead-out silence
    pub padding: Padding,

    /// User-facing message catalog
    pub messages: Messages,
}

impl NarratorConfig {
    pub fn new(voice_model: PathBuf) -> Self {
        Self {
            voice_model,
            speed: 1.0,
            convert_to_mp3: false,
            padding: Padding::default(),
            messages: Messages::default(),
        }
    }

    /// Validate values that clap cannot check on its own
    pub fn validate(&self) -> Result<()> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(HoerbuchError::invalid_input(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

/// Default directories searched for the voice model, in priority order
pub fn default_model_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV) {
        dirs.push(PathBuf::from(dir));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir.join("models"));
    }

    if let Some(data_dir) = dirs::data_dir() {
        dirs.push(data_dir.join("hoerbuch").join("models"));
    }

    dirs
}

/// Locate the voice model
///
/// An explicit path that does not exist is not fatal on its own: the default
/// model is searched for in `search_dirs` instead.
pub fn find_voice_model(explicit: Option<&Path>, search_dirs: &[PathBuf]) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!(
            "Explicit voice file not found at '{}'. Trying defaults...",
            path.display()
        );
    }

    for dir in search_dirs {
        let candidate = dir.join(DEFAULT_MODEL_NAME);
        debug!("Looking for voice model at {}", candidate.display());
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(HoerbuchError::VoiceModelNotFound(DEFAULT_MODEL_NAME.to_string()))
}

/// Translation catalog for user-facing messages
///
/// Messages are looked up by their English text. Missing entries fall back
/// to the msgid itself, so an empty catalog is a valid English catalog.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    catalog: HashMap<String, String>,
}

impl Messages {
    /// Build a catalog from msgid → translation pairs
    pub fn from_map(catalog: HashMap<String, String>) -> Self {
        Self { catalog }
    }

    /// Load `<dir>/<lang>.json` from the first directory that has it
    ///
    /// Returns the identity catalog when no file is found or the file is
    /// malformed; translations are never worth aborting a run for.
    pub fn load(dirs: &[PathBuf], lang: &str) -> Self {
        for dir in dirs {
            let path = dir.join(format!("{}.json", lang));
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(HoerbuchError::from)
                .and_then(|raw| Ok(serde_json::from_str::<HashMap<String, String>>(&raw)?))
            {
                Ok(catalog) => {
                    debug!("Loaded {} translations from {}", catalog.len(), path.display());
                    return Self { catalog };
                }
                Err(e) => warn!("Ignoring translation catalog {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    /// Translate a message
    pub fn tr<'a>(&'a self, msgid: &'a str) -> &'a str {
        self.catalog.get(msgid).map(String::as_str).unwrap_or(msgid)
    }

    /// Translate a message and fill `{name}` placeholders
    pub fn fill(&self, msgid: &str, args: &[(&str, &dyn std::fmt::Display)]) -> String {
        let mut text = self.tr(msgid).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{}}}", name), &value.to_string());
        }
        text
    }
}

/// Default locale search directories
pub fn default_locale_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = std::env::var_os(LOCALE_DIR_ENV) {
        dirs.push(PathBuf::from(dir));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir.join("locales"));
    }
    dirs
}

/// Two-letter language code from a POSIX locale string (`de_DE.UTF-8` → `de`)
pub fn language_from_locale(locale: &str) -> Option<String> {
    let lang: String = locale
        .split(['_', '.', '@'])
        .next()
        .unwrap_or("")
        .to_lowercase();
    if lang.is_empty() || lang == "c" || lang == "posix" {
        None
    } else {
        Some(lang)
    }
}

/// Language of the current process environment
pub fn current_language() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| language_from_locale(&value))
        .unwrap_or_else(|| "en".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_padding_default() {
        let padding = Padding::default();
        assert_eq!(padding.lead_in, 0.5);
        assert_eq!(padding.lead_out, 5.0);
        assert_eq!(padding.total(), 5.5);
    }

    #[test]
    fn test_validate_speed() {
        let mut config = NarratorConfig::new(PathBuf::from("voice.onnx"));
        assert!(config.validate().is_ok());
        config.speed = 0.0;
        assert!(config.validate().is_err());
        config.speed = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_find_voice_model_explicit() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("custom.onnx");
        std::fs::write(&model, b"onnx").unwrap();

        let found = find_voice_model(Some(&model), &[]).unwrap();
        assert_eq!(found, model);
    }

    #[test]
    fn test_find_voice_model_falls_back_to_search_dirs() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join(DEFAULT_MODEL_NAME);
        std::fs::write(&model, b"onnx").unwrap();

        let missing = dir.path().join("missing.onnx");
        let found = find_voice_model(Some(&missing), &[dir.path().to_path_buf()]).unwrap();
        assert_eq!(found, model);
    }

    #[test]
    fn test_find_voice_model_missing_everywhere() {
        let dir = TempDir::new().unwrap();
        let err = find_voice_model(None, &[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, HoerbuchError::VoiceModelNotFound(_)));
        assert!(err.is_fatal_setup());
    }

    #[test]
    fn test_messages_identity_fallback() {
        let messages = Messages::default();
        assert_eq!(messages.tr("Your choice: "), "Your choice: ");
        assert_eq!(
            messages.fill("Segment {n}", &[("n", &3)]),
            "Segment 3"
        );
    }

    #[test]
    fn test_messages_load_catalog() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("de.json"),
            r#"{"Segment {n}": "Abschnitt {n}"}"#,
        )
        .unwrap();

        let messages = Messages::load(&[dir.path().to_path_buf()], "de");
        assert_eq!(messages.fill("Segment {n}", &[("n", &2)]), "Abschnitt 2");

        let fallback = Messages::load(&[dir.path().to_path_buf()], "fr");
        assert_eq!(fallback.tr("Segment {n}"), "Segment {n}");
    }

    #[test]
    fn test_language_from_locale() {
        assert_eq!(language_from_locale("de_DE.UTF-8"), Some("de".to_string()));
        assert_eq!(language_from_locale("en"), Some("en".to_string()));
        assert_eq!(language_from_locale("C"), None);
        assert_eq!(language_from_locale(""), None);
    }
}
