//! Legend specs and the active-legend selector.

use crate::descriptor::LayerKey;
use atlasview_env::{AssetFetcher, EnvError, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Legend container dimension: CSS length or pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegendDimension {
    Pixels(f64),
    Css(String),
}

fn default_background() -> bool {
    true
}

/// Path legend with presentation hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendSource {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<LegendDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<LegendDimension>,
    #[serde(default = "default_background")]
    pub background: bool,
}

/// One positioned label along a gradient bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientLabel {
    pub value: String,
    /// Percentage along the bar, 0..=100
    pub position: f64,
}

/// Inline gradient legend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientLegend {
    /// CSS gradient expression
    pub gradient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub labels: Vec<GradientLabel>,
}

/// A descriptor's `legend` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegendSpec {
    Path(String),
    Source(LegendSource),
    Gradient(GradientLegend),
}

/// How a path legend is presented, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendKind {
    Image,
    Iframe,
    /// JSON gradient document, fetched on demand
    GradientDocument,
    Inline,
    Unknown,
}

impl LegendSpec {
    /// The path of a path-style legend.
    pub fn path(&self) -> Option<&str> {
        match self {
            LegendSpec::Path(path) => Some(path),
            LegendSpec::Source(source) => Some(&source.path),
            LegendSpec::Gradient(_) => None,
        }
    }

    pub(crate) fn path_mut(&mut self) -> Option<&mut String> {
        match self {
            LegendSpec::Path(path) => Some(path),
            LegendSpec::Source(source) => Some(&mut source.path),
            LegendSpec::Gradient(_) => None,
        }
    }

    pub fn kind(&self) -> LegendKind {
        let path = match self.path() {
            Some(path) => path,
            None => return LegendKind::Inline,
        };
        // Ignore query and fragment when sniffing the extension.
        let bare = path.split(['?', '#']).next().unwrap_or(path);
        let ext = bare
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "gif" | "svg" | "bmp" | "tif" | "tiff" => {
                LegendKind::Image
            }
            "html" | "htm" => LegendKind::Iframe,
            "json" => LegendKind::GradientDocument,
            _ => LegendKind::Unknown,
        }
    }

    /// Whether the legend container gets a background panel.
    pub fn background(&self) -> bool {
        match self {
            LegendSpec::Source(source) => source.background,
            _ => true,
        }
    }
}

/// Fetches and decodes a gradient legend document.
pub async fn fetch_gradient(
    fetcher: &dyn AssetFetcher,
    url: &Url,
) -> Result<GradientLegend, EnvError> {
    let body = fetcher.fetch_text(url).await?;
    serde_json::from_str(&body).map_err(|e| EnvError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// The legend currently on screen and the layer it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveLegend {
    pub key: LayerKey,
    pub spec: LegendSpec,
}

/// Tracks which legend is shown as layers are activated and deactivated.
///
/// Each activation gets a sequence number; when the owner of the shown
/// legend goes inactive, the still-active layer with a legend and the highest
/// sequence number takes over.
#[derive(Debug, Default)]
pub struct LegendSelector {
    active: Option<ActiveLegend>,
    activated_at: HashMap<LayerKey, u64>,
    next_seq: u64,
}

impl LegendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveLegend> {
        self.active.as_ref()
    }

    /// Records that `key` became visible; its legend (if any) is shown.
    pub fn on_activated(&mut self, key: &LayerKey, legend: Option<&LegendSpec>) {
        self.next_seq += 1;
        self.activated_at.insert(key.clone(), self.next_seq);
        if let Some(spec) = legend {
            debug!(layer = %key, "legend activated");
            self.active = Some(ActiveLegend {
                key: key.clone(),
                spec: spec.clone(),
            });
        }
    }

    /// Records that `key` went inactive.
    ///
    /// # Arguments
    /// * `still_active` - the layers that remain visible with their legends
    pub fn on_deactivated<'a, I>(&mut self, key: &LayerKey, still_active: I)
    where
        I: IntoIterator<Item = (&'a LayerKey, &'a LegendSpec)>,
    {
        self.activated_at.remove(key);
        let owns_active = self.active.as_ref().is_some_and(|a| &a.key == key);
        if !owns_active {
            return;
        }

        self.active = still_active
            .into_iter()
            .filter(|(k, _)| *k != key)
            .max_by_key(|(k, _)| self.activated_at.get(*k).copied().unwrap_or(0))
            .map(|(k, spec)| ActiveLegend {
                key: k.clone(),
                spec: spec.clone(),
            });
        match &self.active {
            Some(a) => debug!(layer = %a.key, "legend fell back"),
            None => debug!("no active legend"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> LegendSpec {
        LegendSpec::Path(p.to_string())
    }

    #[test]
    fn test_legend_forms_deserialize() {
        let a: LegendSpec = serde_json::from_str(r#""legend.png""#).unwrap();
        assert_eq!(a, path("legend.png"));

        let b: LegendSpec =
            serde_json::from_str(r#"{"path": "legend.html", "width": 320, "height": "12rem"}"#)
                .unwrap();
        match &b {
            LegendSpec::Source(s) => {
                assert!(s.background);
                assert_eq!(s.width, Some(LegendDimension::Pixels(320.0)));
                assert_eq!(s.height, Some(LegendDimension::Css("12rem".into())));
            }
            other => panic!("unexpected {:?}", other),
        }

        let c: LegendSpec = serde_json::from_str(
            r#"{"gradient": "linear-gradient(#000, #fff)", "title": "K",
                "labels": [{"value": "0", "position": 0}, {"value": "10", "position": 100}]}"#,
        )
        .unwrap();
        assert_eq!(c.kind(), LegendKind::Inline);
        assert!(c.path().is_none());
    }

    #[test]
    fn test_kind_inference() {
        assert_eq!(path("a/b/Legend.PNG").kind(), LegendKind::Image);
        assert_eq!(path("a/legend.svg?v=2").kind(), LegendKind::Image);
        assert_eq!(path("legend.html").kind(), LegendKind::Iframe);
        assert_eq!(path("legend.json").kind(), LegendKind::GradientDocument);
        assert_eq!(path("legend").kind(), LegendKind::Unknown);
    }

    #[test]
    fn test_background_flag() {
        let no_bg = LegendSpec::Source(LegendSource {
            path: "x.png".into(),
            width: None,
            height: None,
            background: false,
        });
        assert!(!no_bg.background());
        assert!(path("x.png").background());
    }

    #[test]
    fn test_selector_fallback_order() {
        let (a, b, c) = (LayerKey::from("a"), LayerKey::from("b"), LayerKey::from("c"));
        let (l1, l2) = (path("l1.png"), path("l2.png"));
        let mut sel = LegendSelector::new();

        sel.on_activated(&a, Some(&l1));
        sel.on_activated(&b, Some(&l2));
        sel.on_activated(&c, None);
        assert_eq!(sel.active().unwrap().spec, l2);

        sel.on_deactivated(&b, [(&a, &l1)]);
        assert_eq!(sel.active().unwrap().key, a);

        sel.on_deactivated(&a, std::iter::empty());
        assert!(sel.active().is_none());
    }

    #[test]
    fn test_deactivating_non_owner_keeps_legend() {
        let (a, b) = (LayerKey::from("a"), LayerKey::from("b"));
        let (l1, l2) = (path("l1.png"), path("l2.png"));
        let mut sel = LegendSelector::new();

        sel.on_activated(&a, Some(&l1));
        sel.on_activated(&b, Some(&l2));
        sel.on_deactivated(&a, [(&b, &l2)]);
        assert_eq!(sel.active().unwrap().key, b);
    }

    #[test]
    fn test_reactivation_moves_to_front() {
        let (a, b, c) = (LayerKey::from("a"), LayerKey::from("b"), LayerKey::from("c"));
        let (l1, l2, l3) = (path("l1.png"), path("l2.png"), path("l3.png"));
        let mut sel = LegendSelector::new();

        sel.on_activated(&a, Some(&l1));
        sel.on_activated(&b, Some(&l2));
        sel.on_deactivated(&a, [(&b, &l2)]);
        sel.on_activated(&a, Some(&l1));
        sel.on_activated(&c, Some(&l3));

        sel.on_deactivated(&c, [(&b, &l2), (&a, &l1)]);
        assert_eq!(sel.active().unwrap().key, a);
    }
}
