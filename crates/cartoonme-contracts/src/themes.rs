use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ThemeColor {
    pub const PURPLE: ThemeColor = ThemeColor::rgb(175, 82, 222);
    pub const BLUE: ThemeColor = ThemeColor::rgb(0, 122, 255);
    pub const PINK: ThemeColor = ThemeColor::rgb(255, 45, 85);
    pub const RED: ThemeColor = ThemeColor::rgb(255, 59, 48);
    pub const ORANGE: ThemeColor = ThemeColor::rgb(255, 149, 0);
    pub const TEAL: ThemeColor = ThemeColor::rgb(48, 176, 199);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// A named visual style shown in the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub name: &'static str,
    pub color: ThemeColor,
    pub sample_image: &'static str,
    pub logo: Option<&'static str>,
}

const CATALOG: &[Theme] = &[
    Theme {
        name: "Studio Ghibli",
        color: ThemeColor::PURPLE,
        sample_image: "ghibli_sample",
        logo: Some("ghibli_logo"),
    },
    Theme {
        name: "Disney",
        color: ThemeColor::BLUE,
        sample_image: "disney_sample",
        logo: Some("disney_logo"),
    },
    Theme {
        name: "Anime Style",
        color: ThemeColor::PINK,
        sample_image: "anime_sample",
        logo: None,
    },
    Theme {
        name: "Comic Book",
        color: ThemeColor::RED,
        sample_image: "comic_sample",
        logo: None,
    },
    Theme {
        name: "Realistic Cartoon",
        color: ThemeColor::ORANGE,
        sample_image: "realistic_sample",
        logo: None,
    },
    Theme {
        name: "Classic Cartoon",
        color: ThemeColor::TEAL,
        sample_image: "cartoon_sample",
        logo: None,
    },
];

pub fn catalog() -> &'static [Theme] {
    CATALOG
}

pub fn find_theme(name: &str) -> Option<&'static Theme> {
    let wanted = name.trim();
    CATALOG
        .iter()
        .find(|theme| theme.name.eq_ignore_ascii_case(wanted))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{catalog, find_theme, ThemeColor};

    #[test]
    fn catalog_names_are_unique_ignoring_case() {
        let mut seen = HashSet::new();
        for theme in catalog() {
            assert!(
                seen.insert(theme.name.to_ascii_lowercase()),
                "duplicate theme {}",
                theme.name
            );
            assert!(!theme.sample_image.is_empty());
        }
    }

    #[test]
    fn find_theme_trims_and_ignores_case() {
        let theme = find_theme("  studio GHIBLI \n").map(|theme| theme.name);
        assert_eq!(theme, Some("Studio Ghibli"));
        assert!(find_theme("Pixel Art").is_none());
        assert!(find_theme("").is_none());
    }

    #[test]
    fn color_hex_is_uppercase_rrggbb() {
        assert_eq!(ThemeColor::PURPLE.hex(), "#AF52DE");
        assert_eq!(ThemeColor::rgb(1, 2, 3).hex(), "#010203");
    }
}
