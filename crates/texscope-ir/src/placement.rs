//! Device placement descriptors.
//!
//! A [`Placement`] says where a value lives: which kind of device, which
//! instance of it, which compilation [`Target`], and which memory region on
//! that device (the storage scope).

use std::collections::BTreeMap;

/// The kind of device a value is placed on.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    OpenCl,
    Vulkan,
    Metal,
}

/// A target attribute value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

/// A compilation target: a kind name plus free-form attributes.
///
/// Attributes this workspace reads:
/// - `device` (string): the concrete device family, e.g. `"adreno"`.
/// - `texture_spatial_limit` (int): largest texture extent per axis.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Target {
    pub kind: String,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Target {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Returns a string attribute; `None` if absent or not a string.
    pub fn str_attr(&self, key: &str) -> Option<&str> {
        match self.attrs.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The `device` attribute, if set.
    pub fn device(&self) -> Option<&str> {
        self.str_attr("device")
    }
}

/// Where a value lives.
///
/// The default value is *fully unconstrained*: no device, no target and an
/// empty memory scope.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Placement {
    pub device: Option<DeviceKind>,
    pub device_index: Option<u32>,
    pub target: Option<Target>,
    /// Storage scope, e.g. `"global"` or `"global.texture-nhwc"`. Empty when
    /// no stage has chosen one.
    pub memory_scope: String,
}

impl Placement {
    /// The fully unconstrained placement.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// A placement on a device instance for a target, with no memory scope.
    pub fn on(device: DeviceKind, device_index: u32, target: Target) -> Self {
        Self {
            device: Some(device),
            device_index: Some(device_index),
            target: Some(target),
            memory_scope: String::new(),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.device.is_none()
            && self.device_index.is_none()
            && self.target.is_none()
            && self.memory_scope.is_empty()
    }

    /// Returns `true` if a device or target has been chosen, whatever the
    /// memory scope.
    pub fn is_on_device(&self) -> bool {
        self.device.is_some() || self.device_index.is_some() || self.target.is_some()
    }

    /// Returns a copy of this placement with the memory scope replaced.
    pub fn with_memory_scope(&self, scope: impl Into<String>) -> Self {
        Self {
            memory_scope: scope.into(),
            ..self.clone()
        }
    }
}
