use serde::Serialize;

use crate::params::CartoonThemeParameters;

/// What the person detector concluded about the source photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Person,
    Scene,
}

impl Subject {
    pub fn from_detection(person_present: bool) -> Self {
        if person_present {
            Self::Person
        } else {
            Self::Scene
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Scene => "scene",
        }
    }
}

const PERSON_FOCUSED_TEMPLATE: &str = r#"
High-quality, detailed cartoon transformation of the subject(s) and their environment in the provided image.
Faithfully preserve all subjects' distinct facial features (eyes, nose, mouth, shape), clothing, pose, expression, and overall likeness, ensuring the cartoon is instantly recognizable as the same individuals from the photo.
The generated image should depict the person(s) as the same age as in the photo.
Retain any facial hair, such as beards or mustaches, exactly as they appear.
Maintain the original hairstyle and hair color accurately.
The original background, all elements of the scene composition, and the number of subjects from the photo must be preserved and transformed into the cartoon style.
If multiple people are present, maintain their relative positions and interactions.
The style should be applied consistently across the entire image.
Ensure the final image is a CARTOON and NOT a photorealistic image or a simple photo filter.
"#;

const SCENE_FOCUSED_TEMPLATE: &str = r#"
High-quality, detailed cartoon transformation of the provided image.
Transform all visible elements, objects, animals, and scenery into a consistent cartoon style.
Preserve the original composition, arrangement of elements, and the overall scene depicted in the photo.
If animals are present, maintain their species, features, and pose in the cartoon version.
The lighting and color palette of the original image should inform the cartoon transformation, unless overridden by a specific theme.
Do NOT add any human figures or human-like characters if they are not present in the original image.
The style should be applied consistently across the entire image.
Ensure the final image is a CARTOON and NOT a photorealistic image or a simple photo filter.
"#;

const GENERIC_TEMPLATE: &str = r#"
High-quality, detailed cartoon transformation of the provided image.
Preserve the original composition, subjects, and scene.
Ensure the final image is a CARTOON and NOT a photorealistic image or a simple photo filter.
"#;

/// Trims the template and collapses every whitespace run to one space.
pub fn normalize_template(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<&str>>().join(" ")
}

pub fn person_focused_base_prompt() -> String {
    normalize_template(PERSON_FOCUSED_TEMPLATE)
}

pub fn scene_focused_base_prompt() -> String {
    normalize_template(SCENE_FOCUSED_TEMPLATE)
}

pub fn generic_base_prompt() -> String {
    normalize_template(GENERIC_TEMPLATE)
}

/// `None` means no detector ran, so the generic template applies.
pub fn base_prompt(subject: Option<Subject>) -> String {
    match subject {
        Some(Subject::Person) => person_focused_base_prompt(),
        Some(Subject::Scene) => scene_focused_base_prompt(),
        None => generic_base_prompt(),
    }
}

pub fn compose_prompt(subject: Option<Subject>, params: &CartoonThemeParameters) -> String {
    let base = base_prompt(subject);
    let enhancers = params.positive_prompt_enhancers.trim();
    if enhancers.is_empty() {
        return base;
    }
    format!("{base} {enhancers}")
}
