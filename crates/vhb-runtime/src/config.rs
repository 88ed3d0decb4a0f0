#![forbid(unsafe_code)]

//! Root configuration and configuration changes.
//!
//! Both arrive from the host as JSON objects with camelCase keys. Missing
//! keys take defaults; only a payload that is not an object is rejected.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use vhb_core::{DynamicValue, Size, ViewportMode, properties_to_host, to_engine_value};

use crate::engine::{
    AudioPlayerFactory, EmbedRequestHandler, MediaPlayerFactory, PackageLoader,
};
use crate::error::PayloadError;
use crate::text::TextMeasure;

/// Data-source providers the bridge registers with every root.
pub const KNOWN_DATA_SOURCES: [&str; 2] = ["dynamicIndexList", "dynamicTokenList"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenMode {
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "high-contrast")]
    HighContrast,
}

impl ScreenMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(Self::Normal),
            "high-contrast" => Some(Self::HighContrast),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum AnimationQuality {
    None,
    Slow,
    #[default]
    Normal,
}

impl From<i32> for AnimationQuality {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Slow,
            _ => Self::Normal,
        }
    }
}

impl From<AnimationQuality> for i32 {
    fn from(quality: AnimationQuality) -> Self {
        match quality {
            AnimationQuality::None => 0,
            AnimationQuality::Slow => 1,
            AnimationQuality::Normal => 2,
        }
    }
}

/// Host-provided settings for a root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RootSettings {
    pub agent_name: String,
    pub agent_version: String,
    pub allow_open_url: bool,
    pub disallow_video: bool,
    pub animation_quality: AnimationQuality,
    pub font_scale: f64,
    pub screen_mode: ScreenMode,
    pub screen_reader: bool,
    /// Milliseconds since the epoch.
    pub utc_time: f64,
    pub local_time_adjustment: f64,
    /// Extension URIs the host supports.
    pub extensions: Vec<String>,
    pub extension_environments: BTreeMap<String, serde_json::Value>,
    /// Free-form environment values exposed to the document.
    pub environment: BTreeMap<String, serde_json::Value>,
    /// Names of live data objects.
    pub live_data: Vec<String>,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            agent_name: "vhb".to_owned(),
            agent_version: env!("CARGO_PKG_VERSION").to_owned(),
            allow_open_url: false,
            disallow_video: false,
            animation_quality: AnimationQuality::Normal,
            font_scale: 1.0,
            screen_mode: ScreenMode::Normal,
            screen_reader: false,
            utc_time: 0.0,
            local_time_adjustment: 0.0,
            extensions: Vec::new(),
            extension_environments: BTreeMap::new(),
            environment: BTreeMap::new(),
            live_data: Vec::new(),
        }
    }
}

/// Engine-facing callbacks supplied with a root.
#[derive(Clone, Default)]
pub struct HostServices {
    pub documents: Option<Rc<dyn EmbedRequestHandler>>,
    pub packages: Option<Rc<dyn PackageLoader>>,
    pub media: Option<Rc<dyn MediaPlayerFactory>>,
    pub audio: Option<Rc<dyn AudioPlayerFactory>>,
    pub text: Option<Rc<dyn TextMeasure>>,
}

impl core::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostServices")
            .field("documents", &self.documents.is_some())
            .field("packages", &self.packages.is_some())
            .field("media", &self.media.is_some())
            .field("audio", &self.audio.is_some())
            .field("text", &self.text.is_some())
            .finish()
    }
}

/// Everything the engine needs besides metrics and content.
#[derive(Debug, Clone)]
pub struct RootConfig {
    pub settings: RootSettings,
    pub data_sources: Vec<String>,
    pub services: HostServices,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self::new(RootSettings::default())
    }
}

impl RootConfig {
    pub fn new(settings: RootSettings) -> Self {
        Self {
            settings,
            data_sources: KNOWN_DATA_SOURCES.iter().map(|s| (*s).to_owned()).collect(),
            services: HostServices::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        let settings: RootSettings = serde_json::from_str(json)?;
        if !settings.font_scale.is_finite() || settings.font_scale <= 0.0 {
            return Err(PayloadError::InvalidField {
                field: "fontScale",
                reason: format!("{} is not a positive number", settings.font_scale),
            });
        }
        Ok(Self::new(settings))
    }

    #[must_use]
    pub fn with_services(mut self, services: HostServices) -> Self {
        self.services = services;
        self
    }

    pub fn is_known_data_source(&self, kind: &str) -> bool {
        self.data_sources.iter().any(|known| known == kind)
    }

    /// Environment value `name` in engine form.
    pub fn environment_value(&self, name: &str) -> Option<DynamicValue> {
        self.settings.environment.get(name).map(to_engine_value)
    }

    /// Environment values for the host. No viewport exists for settings, so
    /// nothing is scaled.
    pub fn environment_to_host(&self) -> serde_json::Map<String, serde_json::Value> {
        let values: BTreeMap<&String, DynamicValue> = self
            .settings
            .environment
            .iter()
            .map(|(name, value)| (name, to_engine_value(value)))
            .collect();
        properties_to_host(values.iter().map(|(name, value)| (*name, value)), None)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfigurationChange {
    width: Option<f64>,
    height: Option<f64>,
    theme: Option<String>,
    viewport_mode: Option<String>,
    font_scale: Option<f64>,
    screen_mode: Option<String>,
    screen_reader: Option<bool>,
    disallow_video: Option<bool>,
    environment: BTreeMap<String, serde_json::Value>,
}

/// Runtime change applied to a live root. Unset fields are left alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigurationChange {
    /// New viewport in engine pixels.
    pub size: Option<Size>,
    pub theme: Option<String>,
    pub viewport_mode: Option<ViewportMode>,
    pub font_scale: Option<f64>,
    pub screen_mode: Option<ScreenMode>,
    pub screen_reader: Option<bool>,
    pub disallow_video: Option<bool>,
    pub environment: BTreeMap<String, DynamicValue>,
}

impl ConfigurationChange {
    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        let raw: RawConfigurationChange = serde_json::from_str(json)?;
        let size = match (raw.width, raw.height) {
            (Some(width), Some(height)) => Some(Size::new(width, height)),
            (None, None) => None,
            (None, Some(_)) => return Err(PayloadError::MissingField("width")),
            (Some(_), None) => return Err(PayloadError::MissingField("height")),
        };
        let viewport_mode = raw
            .viewport_mode
            .map(|name| {
                ViewportMode::parse(&name).ok_or(PayloadError::InvalidField {
                    field: "viewportMode",
                    reason: format!("unknown mode {name:?}"),
                })
            })
            .transpose()?;
        let screen_mode = raw
            .screen_mode
            .map(|name| {
                ScreenMode::parse(&name).ok_or(PayloadError::InvalidField {
                    field: "screenMode",
                    reason: format!("unknown mode {name:?}"),
                })
            })
            .transpose()?;
        Ok(Self {
            size,
            theme: raw.theme,
            viewport_mode,
            font_scale: raw.font_scale,
            screen_mode,
            screen_reader: raw.screen_reader,
            disallow_video: raw.disallow_video,
            environment: raw
                .environment
                .iter()
                .map(|(name, value)| (name.clone(), to_engine_value(value)))
                .collect(),
        })
    }

    #[must_use]
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Some(Size::new(width, height));
        self
    }

    /// Overlay `other` onto `self`; fields set in `other` win.
    pub fn merge(&mut self, other: &Self) {
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.theme.is_some() {
            self.theme.clone_from(&other.theme);
        }
        if other.viewport_mode.is_some() {
            self.viewport_mode = other.viewport_mode;
        }
        if other.font_scale.is_some() {
            self.font_scale = other.font_scale;
        }
        if other.screen_mode.is_some() {
            self.screen_mode = other.screen_mode;
        }
        if other.screen_reader.is_some() {
            self.screen_reader = other.screen_reader;
        }
        if other.disallow_video.is_some() {
            self.disallow_video = other.disallow_video;
        }
        for (name, value) in &other.environment {
            self.environment.insert(name.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn settings_defaults_fill_missing_keys() {
        let config = RootConfig::from_json(r#"{"agentName":"shell","allowOpenUrl":true}"#)
            .expect("valid settings");
        assert_eq!(config.settings.agent_name, "shell");
        assert!(config.settings.allow_open_url);
        assert_eq!(config.settings.font_scale, 1.0);
        assert_eq!(config.settings.animation_quality, AnimationQuality::Normal);
        assert!(config.is_known_data_source("dynamicIndexList"));
        assert!(!config.is_known_data_source("liveFeed"));
    }

    #[test]
    fn settings_reject_non_object_and_bad_scale() {
        assert!(matches!(
            RootConfig::from_json("[1]"),
            Err(PayloadError::Json(_))
        ));
        assert!(matches!(
            RootConfig::from_json(r#"{"fontScale":0}"#),
            Err(PayloadError::InvalidField { field: "fontScale", .. })
        ));
    }

    #[test]
    fn environment_marshals_unscaled() {
        let config = RootConfig::from_json(r#"{"environment":{"width":100,"tag":"x"}}"#)
            .expect("valid settings");
        let host = config.environment_to_host();
        assert_eq!(host.get("width"), Some(&serde_json::json!(100.0)));
        assert_eq!(config.environment_value("tag"), Some(DynamicValue::from("x")));
    }

    #[test]
    fn configuration_change_parses_and_merges() {
        let mut change = ConfigurationChange::from_json(
            r#"{"width":800,"height":600,"theme":"light","viewportMode":"TV"}"#,
        )
        .expect("valid change");
        assert_eq!(change.size, Some(Size::new(800.0, 600.0)));
        assert_eq!(change.viewport_mode, Some(ViewportMode::Tv));

        let other = ConfigurationChange::from_json(
            r#"{"theme":"dark","screenMode":"high-contrast","environment":{"a":true}}"#,
        )
        .expect("valid change");
        change.merge(&other);
        assert_eq!(change.theme.as_deref(), Some("dark"));
        assert_eq!(change.screen_mode, Some(ScreenMode::HighContrast));
        assert_eq!(change.size, Some(Size::new(800.0, 600.0)));
        assert_eq!(change.environment.get("a"), Some(&DynamicValue::Boolean(true)));
    }

    #[test]
    fn configuration_change_rejects_half_size_and_unknown_modes() {
        assert_eq!(
            ConfigurationChange::from_json(r#"{"width":10}"#),
            Err(PayloadError::MissingField("height"))
        );
        assert!(matches!(
            ConfigurationChange::from_json(r#"{"viewportMode":"WATCH"}"#),
            Err(PayloadError::InvalidField { field: "viewportMode", .. })
        ));
        assert!(ConfigurationChange::from_json("{}").expect("empty").is_empty());
    }
}
