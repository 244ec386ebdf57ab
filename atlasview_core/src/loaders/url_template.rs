//! Templated tile URLs (`https://{s}.tiles.example/{z}/{x}/{y}.png`).

use crate::descriptor::{full_extent, rect_from_degrees, Credits, LayerDescriptor, TilingScheme, UrlTemplateParams};
use crate::error::ConstructionError;
use geo::Rect;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z][A-Za-z0-9_]*)\}").expect("static token pattern"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrlTemplateSource {
    pub template: String,
    pub pick_features_template: Option<String>,
    pub subdomains: Vec<String>,
    /// Token name to padding pattern, e.g. `x -> "0000"`
    pub zero_padding: BTreeMap<String, String>,
    pub custom_tags: BTreeMap<String, String>,
    pub minimum_level: u32,
    pub maximum_level: Option<u32>,
    pub rectangle: Rect<f64>,
    pub tiling_scheme: TilingScheme,
    pub tile_width: u32,
    pub tile_height: u32,
    pub has_alpha_channel: bool,
    pub enable_pick_features: bool,
    pub credit: Option<Credits>,
}

impl UrlTemplateSource {
    /// URL of one tile, `None` outside the level range or the grid.
    pub fn tile_url(&self, x: u64, y: u64, level: u32) -> Option<String> {
        self.expand(&self.template, x, y, level, None)
    }

    /// Feature-picking URL for pixel `(i, j)` of a tile; only when picking
    /// is enabled and a pick template is configured.
    pub fn pick_url(&self, x: u64, y: u64, level: u32, i: u32, j: u32) -> Option<String> {
        if !self.enable_pick_features {
            return None;
        }
        let template = self.pick_features_template.as_ref()?;
        self.expand(template, x, y, level, Some((i, j)))
    }

    fn expand(&self, template: &str, x: u64, y: u64, level: u32, pixel: Option<(u32, u32)>) -> Option<String> {
        if level < self.minimum_level || self.maximum_level.is_some_and(|max| level > max) {
            return None;
        }
        let cols = self.tiling_scheme.tiles_x(level);
        let rows = self.tiling_scheme.tiles_y(level);
        if x >= cols || y >= rows {
            return None;
        }

        let url = token_pattern().replace_all(template, |caps: &Captures| {
            let token = &caps[1];
            let value = match token {
                "x" => Some(x.to_string()),
                "y" => Some(y.to_string()),
                "z" => Some(level.to_string()),
                "reverseX" => Some((cols - 1 - x).to_string()),
                "reverseY" => Some((rows - 1 - y).to_string()),
                "reverseZ" => self.maximum_level.map(|max| (max - level).to_string()),
                "s" => self.subdomain(x, y, level).map(str::to_string),
                "i" => pixel.map(|(i, _)| i.to_string()),
                "j" => pixel.map(|(_, j)| j.to_string()),
                other => self.custom_tags.get(other).cloned(),
            };
            match value {
                Some(value) => self.pad(token, value),
                None => caps[0].to_string(),
            }
        });
        Some(url.into_owned())
    }

    fn subdomain(&self, x: u64, y: u64, level: u32) -> Option<&str> {
        if self.subdomains.is_empty() {
            return None;
        }
        let index = (x + y + u64::from(level)) % self.subdomains.len() as u64;
        self.subdomains.get(index as usize).map(String::as_str)
    }

    /// Left-pads `value` with the leading characters of the token's pattern.
    fn pad(&self, token: &str, value: String) -> String {
        let Some(pattern) = self.zero_padding.get(token) else {
            return value;
        };
        let missing = pattern.chars().count().saturating_sub(value.chars().count());
        let mut padded: String = pattern.chars().take(missing).collect();
        padded.push_str(&value);
        padded
    }
}

pub fn build(desc: &LayerDescriptor, params: &UrlTemplateParams) -> Result<UrlTemplateSource, ConstructionError> {
    let key = desc.key.as_str();
    let template = desc
        .url
        .as_deref()
        .ok_or_else(|| ConstructionError::missing(key, "url"))?;

    let minimum_level = params.minimum_level.unwrap_or(0);
    // A maximum level of 0 means "unbounded" in descriptor documents.
    let maximum_level = params.maximum_level.filter(|max| *max > 0);
    if let Some(max) = maximum_level {
        if max < minimum_level {
            return Err(ConstructionError::invalid(
                key,
                "maximumLevel",
                format!("{max} is below minimumLevel {minimum_level}"),
            ));
        }
    }
    if template.contains("{reverseZ}") && maximum_level.is_none() {
        return Err(ConstructionError::invalid(
            key,
            "url",
            "{reverseZ} requires maximumLevel",
        ));
    }
    let rectangle = match params.rectangle {
        Some(extent) => {
            rect_from_degrees(extent).map_err(|e| ConstructionError::invalid(key, "rectangle", e))?
        }
        None => full_extent(),
    };

    Ok(UrlTemplateSource {
        template: template.to_string(),
        pick_features_template: params.pick_features_url.clone(),
        subdomains: params.subdomains.clone().unwrap_or_default().to_vec(),
        zero_padding: params.url_scheme_zero_padding.clone().unwrap_or_default(),
        custom_tags: params.custom_tags.clone().unwrap_or_default(),
        minimum_level,
        maximum_level,
        rectangle,
        tiling_scheme: params.tiling_scheme.unwrap_or_default(),
        tile_width: params.tile_width.unwrap_or(256),
        tile_height: params.tile_height.unwrap_or(256),
        has_alpha_channel: params.has_alpha_channel.unwrap_or(false),
        enable_pick_features: params.enable_pick_features.unwrap_or(false),
        credit: desc.credits.clone(),
    })
}
