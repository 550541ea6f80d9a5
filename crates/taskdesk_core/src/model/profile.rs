use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// The profile is a singleton; this is its key inside the cache.
pub const PROFILE_KEY: &str = "profile";
pub const PROFILE_IMAGE_KEY: &str = "profile_image";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Maps loosely written theme names ("dark-mode", "Vanilla", ...) onto a theme.
    pub fn from_name(raw: &str) -> Option<Self> {
        match crate::config::canonical_theme_name(raw).as_deref() {
            Some("default") => Some(Self::Light),
            Some("noir") => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Dark => "Dark",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
    pub address: String,
    pub theme: Theme,
}

impl Profile {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        full.trim().to_string()
    }
}

/// The profile picture as the backend stores it: an encoded source such as a
/// `data:` URL. It is cached on its own, apart from the profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileImage {
    pub source: String,
}

impl ProfileImage {
    pub fn new<S: Into<String>>(source: S) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.source.trim().is_empty() {
            return Err(AppError::validation("image is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Profile, ProfileImage, Theme};

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"first_name": "Ada"}"#).unwrap();
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.theme, Theme::Light);
        assert_eq!(profile.display_name(), "Ada");
    }

    #[test]
    fn theme_names_are_canonicalised() {
        assert_eq!(Theme::from_name("Dark"), Some(Theme::Dark));
        assert_eq!(Theme::from_name("dark-mode"), Some(Theme::Dark));
        assert_eq!(Theme::from_name("light"), Some(Theme::Light));
        assert_eq!(Theme::from_name("solarized"), None);
    }

    #[test]
    fn image_is_stored_as_a_bare_string() {
        let image = ProfileImage::new("data:image/png;base64,AAAA");
        assert_eq!(
            serde_json::to_string(&image).unwrap(),
            "\"data:image/png;base64,AAAA\""
        );
        assert!(image.validate().is_ok());
        assert_eq!(
            ProfileImage::new("  ").validate().unwrap_err().code(),
            "validation_error"
        );
    }
}
