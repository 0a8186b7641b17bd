use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" | "image/png" => Some(Self::Png),
            "jpeg" | "jpg" | "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// Generation parameters resolved from a theme name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartoonThemeParameters {
    pub control_strength: f64,
    pub output_format: OutputFormat,
    pub positive_prompt_enhancers: String,
    pub negative_prompt: String,
}

struct ThemeEntry {
    key: &'static str,
    control_strength: f64,
    output_format: OutputFormat,
    enhancers: &'static str,
    negative_suffix: &'static str,
}

impl ThemeEntry {
    fn parameters(&self) -> CartoonThemeParameters {
        CartoonThemeParameters {
            control_strength: self.control_strength,
            output_format: self.output_format,
            positive_prompt_enhancers: self.enhancers.to_string(),
            negative_prompt: format!("{BASE_NEGATIVE_PROMPT} {}", self.negative_suffix),
        }
    }
}

pub const BASE_NEGATIVE_PROMPT: &str = "photorealistic, 3D render, photography, hyperrealistic, \
deformed, disfigured, ugly, bad anatomy, extra limbs, missing limbs, fused fingers, too many \
fingers, mutated hands, poorly drawn hands, poorly drawn face, blurry, pixelated, grainy, low \
resolution, low quality, watermark, signature, text, words, jpeg artifacts, noise, tiling, out of \
frame, cropped, inaccurate age, different hairstyle, wrong hair color, missing facial hair, \
different facial hair.";

const THEME_TABLE: &[ThemeEntry] = &[
    ThemeEntry {
        key: "studio ghibli",
        control_strength: 0.6,
        output_format: OutputFormat::Png,
        enhancers: "Lush, painterly, and enchanting illustration in the style of Studio Ghibli. \
Whimsical, nostalgic atmosphere. Soft, warm lighting, often golden hour or gentle daylight. \
Beautifully detailed natural backgrounds or charming, slightly rustic architecture. Expressive, \
large eyes with a gentle quality. Watercolor textures, subtle cel-shading. Art by Hayao Miyazaki, \
Joe Hisaishi inspired mood.",
        negative_suffix: "harsh shadows, overly saturated colors, modern anime, digital art look, \
photo, dark, scary.",
    },
    ThemeEntry {
        key: "disney",
        control_strength: 0.8,
        output_format: OutputFormat::Jpeg,
        enhancers: "Classic Disney animation style. Polished, clean visuals. Expressive characters \
with large, emotive eyes and well-defined features. Smooth, clean outlines. Vibrant, warm, and \
appealing color palette. Dynamic poses if applicable. Think classic Disney renaissance or modern \
expressive 2D Disney style.",
        negative_suffix: "anime, manga, gritty, dark, horror, too realistic, flat colors, \
unexpressive, different background, changed setting, wrong environment, incorrect number of \
people, gender swap, wrong age.",
    },
    ThemeEntry {
        key: "anime style",
        control_strength: 0.65,
        output_format: OutputFormat::Jpeg,
        enhancers: "Vibrant and dynamic contemporary anime art style. Sharp, clean lines. \
Expressive characters with large, detailed, and often colorful eyes. Dynamic cell shading, bold \
color choices, and impactful lighting. Stylized hair. Could be shonen, shojo, or slice-of-life \
anime aesthetic. High detail, professional anime illustration.",
        negative_suffix: "western cartoon, Disney, 3D, photorealistic, chibi, super deformed, \
sketch, unfinished.",
    },
    ThemeEntry {
        key: "comic book",
        control_strength: 0.7,
        output_format: OutputFormat::Jpeg,
        enhancers: "Dynamic American comic book art style. Bold ink lines, dramatic shading \
(cross-hatching, cel shading). Vibrant or moody color palette depending on the genre (e.g. \
superhero, noir). Expressive characters, action poses. Ben Day dots if retro. Modern comic \
illustration.",
        negative_suffix: "anime, manga, disney, photorealistic, painterly, soft, muted.",
    },
    ThemeEntry {
        key: "realistic cartoon",
        control_strength: 0.75,
        output_format: OutputFormat::Png,
        enhancers: "Subtly stylized cartoon version of the photo. Clean lines, smooth shading, \
naturalistic but simplified features. Focus on retaining character and expression with a touch \
of artistic flair. Appealing, well-lit, high-quality illustration. Not overly exaggerated.",
        negative_suffix: "overtly cartoonish, chibi, anime, disney, flat, abstract, painterly, \
sketch.",
    },
];

const DEFAULT_ENTRY: ThemeEntry = ThemeEntry {
    key: "default",
    control_strength: 0.7,
    output_format: OutputFormat::Jpeg,
    enhancers: "A beautiful, high-quality modern digital cartoon style. Clean lines, vibrant \
colors, appealing character design with expressive eyes. Smooth shading and highlights. \
Professional illustration quality.",
    negative_suffix: "sketch, messy, unfinished, too simplistic, abstract.",
};

/// Table key for a theme name: surrounding whitespace trimmed, lowercased.
pub fn normalize_theme_key(theme: &str) -> String {
    theme.trim().to_lowercase()
}

pub fn known_theme_keys() -> impl Iterator<Item = &'static str> {
    THEME_TABLE.iter().map(|entry| entry.key)
}

/// Theme-specific parameters, or `None` when the table has no entry for `theme`.
pub fn lookup_theme_parameters(theme: &str) -> Option<CartoonThemeParameters> {
    let key = normalize_theme_key(theme);
    THEME_TABLE
        .iter()
        .find(|entry| entry.key == key)
        .map(ThemeEntry::parameters)
}

pub fn default_theme_parameters() -> CartoonThemeParameters {
    DEFAULT_ENTRY.parameters()
}

pub fn theme_parameters(theme: &str) -> CartoonThemeParameters {
    lookup_theme_parameters(theme).unwrap_or_else(default_theme_parameters)
}

/// The override wins when present and finite. The result is kept inside `[0, 1]`.
pub fn effective_control_strength(
    params: &CartoonThemeParameters,
    strength_override: Option<f64>,
) -> f64 {
    strength_override
        .filter(|value| value.is_finite())
        .unwrap_or(params.control_strength)
        .clamp(0.0, 1.0)
}

pub fn format_control_strength(value: f64) -> String {
    format!("{value:.2}")
}
