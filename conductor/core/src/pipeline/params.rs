//! Request Parameters
//!
//! Numeric parameters for image requests. Edit parameters come from keyword
//! cues in the prompt; each dimension scans its cue list in a fixed order and
//! the first cue present wins, so "subtle but dramatic" is dramatic.

use serde::{Deserialize, Serialize};

use crate::backend::ImageFormat;

/// Strength / guidance / steps of an edit request
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditParams {
    /// How far to move from the source (0.0-1.0)
    pub strength: f32,
    /// Classifier-free guidance scale
    pub guidance_scale: f32,
    /// Diffusion steps
    pub steps: u32,
}

/// First attempt of the edit chain when the prompt has no cues
pub const STANDARD_EDIT: EditParams = EditParams {
    strength: 0.7,
    guidance_scale: 8.0,
    steps: 20,
};

/// Last attempt of the edit chain
pub const RELAXED_EDIT: EditParams = EditParams {
    strength: 0.5,
    guidance_scale: 5.0,
    steps: 15,
};

/// Scale factor for upscale requests
pub const UPSCALE_FACTOR: u32 = 2;

const STRENGTH_CUES: &[(&str, f32)] = &[
    ("dramatic", 0.9),
    ("major", 0.9),
    ("subtle", 0.5),
    ("slight", 0.5),
];

const GUIDANCE_CUES: &[(&str, f32)] = &[
    ("precise", 10.0),
    ("detailed", 10.0),
    ("creative", 6.0),
    ("artistic", 6.0),
];

const STEP_CUES: &[(&str, u32)] = &[("high quality", 30), ("detailed", 30)];

fn first_cue<T: Copy>(prompt: &str, cues: &[(&str, T)]) -> Option<T> {
    cues.iter()
        .find(|(cue, _)| prompt.contains(cue))
        .map(|(_, value)| *value)
}

/// Caller-supplied values that beat the keyword heuristics
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamOverrides {
    /// Explicit strength
    pub strength: Option<f32>,
    /// Explicit guidance scale
    pub guidance_scale: Option<f32>,
    /// Explicit step count
    pub steps: Option<u32>,
}

/// A `/params` argument that couldn't be used
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// Not one of `strength`, `guidance`, `steps`
    #[error("unknown parameter '{0}' (use strength, guidance or steps)")]
    UnknownKey(String),
    /// Not `key=value`, or the value doesn't parse or is out of range
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Parameter name
        key: String,
        /// Offending value
        value: String,
    },
}

impl ParamOverrides {
    /// Parse `key=value` arguments (`strength=0.4 guidance=6 steps=25`)
    ///
    /// # Errors
    ///
    /// Returns the first argument that is unknown or malformed.
    pub fn from_args(args: &[String]) -> Result<Self, ParamError> {
        let mut overrides = Self::default();
        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                return Err(ParamError::InvalidValue {
                    key: arg.clone(),
                    value: String::new(),
                });
            };
            let invalid = || ParamError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key.to_lowercase().as_str() {
                "strength" => {
                    let strength: f32 = value.parse().map_err(|_| invalid())?;
                    if !(0.0..=1.0).contains(&strength) {
                        return Err(invalid());
                    }
                    overrides.strength = Some(strength);
                }
                "guidance" | "guidance_scale" => {
                    let guidance: f32 = value.parse().map_err(|_| invalid())?;
                    if guidance <= 0.0 {
                        return Err(invalid());
                    }
                    overrides.guidance_scale = Some(guidance);
                }
                "steps" => {
                    let steps: u32 = value.parse().map_err(|_| invalid())?;
                    if steps == 0 {
                        return Err(invalid());
                    }
                    overrides.steps = Some(steps);
                }
                _ => return Err(ParamError::UnknownKey(key.to_string())),
            }
        }
        Ok(overrides)
    }

    /// Whether no dimension is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strength.is_none() && self.guidance_scale.is_none() && self.steps.is_none()
    }

    /// Short form for messages, e.g. `strength=0.40 steps=25`
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(strength) = self.strength {
            parts.push(format!("strength={strength:.2}"));
        }
        if let Some(guidance) = self.guidance_scale {
            parts.push(format!("guidance={guidance:.1}"));
        }
        if let Some(steps) = self.steps {
            parts.push(format!("steps={steps}"));
        }
        parts.join(" ")
    }
}

impl EditParams {
    /// Derive parameters from keyword cues, falling back to [`STANDARD_EDIT`]
    #[must_use]
    pub fn from_prompt(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        Self {
            strength: first_cue(&lower, STRENGTH_CUES).unwrap_or(STANDARD_EDIT.strength),
            guidance_scale: first_cue(&lower, GUIDANCE_CUES)
                .unwrap_or(STANDARD_EDIT.guidance_scale),
            steps: first_cue(&lower, STEP_CUES).unwrap_or(STANDARD_EDIT.steps),
        }
    }

    /// Replace any dimension the caller set explicitly
    #[must_use]
    pub fn with_overrides(self, overrides: &ParamOverrides) -> Self {
        Self {
            strength: overrides.strength.unwrap_or(self.strength).clamp(0.0, 1.0),
            guidance_scale: overrides.guidance_scale.unwrap_or(self.guidance_scale),
            steps: overrides.steps.unwrap_or(self.steps),
        }
    }

    /// Short form for logs
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "strength={:.2} guidance={:.1} steps={}",
            self.strength, self.guidance_scale, self.steps
        )
    }
}

/// Settings the pipeline supplies for text-to-image requests
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Output format
    pub format: ImageFormat,
    /// Diffusion steps
    pub steps: u32,
    /// Guidance scale
    pub guidance_scale: f32,
    /// Negative prompt sent with every generation
    pub negative_prompt: String,
    /// Default style preset
    pub style: Option<String>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            format: ImageFormat::Png,
            steps: 30,
            guidance_scale: 7.0,
            negative_prompt: "blurry, low quality, distorted, deformed, watermark, text"
                .to_string(),
            style: None,
        }
    }
}
