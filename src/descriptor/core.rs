use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node identifier, unique within one instance. Zero is never a valid tag.
pub type Tag = u32;

/// Tag of the pre-seeded root descriptor and of the first surface.
pub const ROOT_TAG: Tag = 1;

/// Opaque key/value payload used for props and state.
pub type PropMap = Map<String, Value>;

/// Position and size of a node as last reported by the native layout pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutMetrics {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutMetrics {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn apply(&mut self, delta: &LayoutDelta) {
        if let Some(x) = delta.x {
            self.x = x;
        }
        if let Some(y) = delta.y {
            self.y = y;
        }
        if let Some(width) = delta.width {
            self.width = width;
        }
        if let Some(height) = delta.height {
            self.height = height;
        }
    }
}

/// Partial layout update; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl LayoutDelta {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.width.is_none() && self.height.is_none()
    }

    pub fn frame(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            width: Some(width),
            height: Some(height),
        }
    }
}

/// Host-side record of one UI node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub tag: Tag,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parent_tag: Option<Tag>,
    #[serde(default)]
    pub children_tags: Vec<Tag>,
    #[serde(default)]
    pub props: PropMap,
    #[serde(default)]
    pub state: PropMap,
    #[serde(default)]
    pub layout_metrics: LayoutMetrics,
}

impl Descriptor {
    pub fn new(tag: Tag, kind: impl Into<String>) -> Self {
        Self {
            tag,
            kind: kind.into(),
            parent_tag: None,
            children_tags: Vec::new(),
            props: PropMap::new(),
            state: PropMap::new(),
            layout_metrics: LayoutMetrics::default(),
        }
    }

    pub fn with_props(mut self, props: PropMap) -> Self {
        self.props = props;
        self
    }

    pub fn is_root(&self) -> bool {
        self.tag == ROOT_TAG
    }
}

/// The root descriptor every instance starts with: zero-sized, no children.
pub fn root_descriptor() -> Descriptor {
    let mut props = PropMap::new();
    for key in ["top", "left", "width", "height"] {
        props.insert(key.to_string(), Value::from(0));
    }
    Descriptor::new(ROOT_TAG, "RootView").with_props(props)
}

/// Shallow merge: keys present in `delta` overwrite, everything else is kept.
pub fn merge_props(target: &mut PropMap, delta: &PropMap) {
    for (key, value) in delta {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_untouched_keys() {
        let mut props = PropMap::new();
        props.insert("a".into(), json!(1));
        let mut delta = PropMap::new();
        delta.insert("b".into(), json!(2));
        merge_props(&mut props, &delta);

        let mut overwrite = PropMap::new();
        overwrite.insert("a".into(), json!(3));
        merge_props(&mut props, &overwrite);

        assert_eq!(props.get("a"), Some(&json!(3)));
        assert_eq!(props.get("b"), Some(&json!(2)));
    }

    #[test]
    fn layout_delta_only_touches_present_fields() {
        let mut metrics = LayoutMetrics::new(1.0, 2.0, 30.0, 40.0);
        metrics.apply(&LayoutDelta {
            width: Some(100.0),
            ..LayoutDelta::default()
        });
        assert_eq!(metrics, LayoutMetrics::new(1.0, 2.0, 100.0, 40.0));
    }

    #[test]
    fn root_descriptor_is_zero_sized_and_empty() {
        let root = root_descriptor();
        assert!(root.is_root());
        assert!(root.children_tags.is_empty());
        assert_eq!(root.layout_metrics, LayoutMetrics::default());
        assert_eq!(root.props.get("width"), Some(&json!(0)));
    }

    #[test]
    fn descriptor_uses_type_key_on_the_wire() {
        let encoded = serde_json::to_value(Descriptor::new(5, "View")).unwrap();
        assert_eq!(encoded["type"], json!("View"));
        assert_eq!(encoded["childrenTags"], json!([]));
    }
}
