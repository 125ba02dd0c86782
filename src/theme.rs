use serde::{Deserialize, Serialize};

/// UI preferences the front-end reads at startup. Immutable from the UI's
/// point of view: changing them goes through `prefs.set`, which persists a
/// whole new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPrefs {
    pub theme: ThemePrefs,
    pub font: FontPrefs,
}

impl Default for UiPrefs {
    fn default() -> Self {
        UiPrefs {
            theme: ThemePrefs::default(),
            font: FontPrefs::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemePrefs {
    pub mode: ThemeMode,
    pub accent: String,
}

impl Default for ThemePrefs {
    fn default() -> Self {
        ThemePrefs {
            mode: ThemeMode::Light,
            accent: "#2563eb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontPrefs {
    pub family: String,
    pub scale: f64,
}

impl Default for FontPrefs {
    fn default() -> Self {
        FontPrefs {
            family: "Inter".to_string(),
            scale: 1.0,
        }
    }
}

/// Partial update sent by the UI. Absent sections keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefsPatch {
    pub theme: Option<ThemePrefs>,
    pub font: Option<FontPrefs>,
}

impl UiPrefs {
    pub fn apply(&self, patch: PrefsPatch) -> UiPrefs {
        UiPrefs {
            theme: patch.theme.unwrap_or_else(|| self.theme.clone()),
            font: patch.font.unwrap_or_else(|| self.font.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_light_inter() {
        let prefs = UiPrefs::default();
        assert_eq!(prefs.theme.mode, ThemeMode::Light);
        assert_eq!(prefs.font.family, "Inter");
        assert_eq!(prefs.font.scale, 1.0);
    }

    #[test]
    fn patch_replaces_only_named_sections() {
        let prefs = UiPrefs::default();
        let patch: PrefsPatch = serde_json::from_value(json!({
            "theme": { "mode": "dark", "accent": "#f59e0b" }
        }))
        .expect("parse patch");
        let next = prefs.apply(patch);
        assert_eq!(next.theme.mode, ThemeMode::Dark);
        assert_eq!(next.theme.accent, "#f59e0b");
        assert_eq!(next.font, FontPrefs::default());
    }

    #[test]
    fn roundtrips_through_json() {
        let prefs = UiPrefs {
            theme: ThemePrefs {
                mode: ThemeMode::Dark,
                accent: "#111111".to_string(),
            },
            font: FontPrefs {
                family: "Georgia".to_string(),
                scale: 1.25,
            },
        };
        let value = serde_json::to_value(&prefs).expect("serialize");
        assert_eq!(value["theme"]["mode"], "dark");
        let back: UiPrefs = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, prefs);
    }
}
