//! Typed shader parameter storage.
//!
//! A [`UniformSet`] is the host-side source of truth for one logical shader's
//! tunables. Cells are kept in declaration order with a name lookup table, so
//! generic editors can iterate by name while linked programs address cells by
//! index (see [`crate::program`]).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::UniformError;

/// Kind of a uniform cell. Fixed at declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    /// RGB color, stored as linear floats.
    Color,
    Mat4,
    Bool,
    /// Opaque texture reference; not part of the uniform buffer.
    Texture,
}

impl UniformKind {
    /// Whether values of this kind live in the uniform buffer.
    pub fn is_buffer_backed(&self) -> bool {
        !matches!(self, UniformKind::Texture)
    }
}

/// Opaque handle to a texture owned by the GPU texture pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Runtime value of a uniform cell.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Color([f32; 3]),
    /// Column-major 4x4 matrix.
    Mat4([[f32; 4]; 4]),
    Bool(bool),
    /// `None` until the asset behind it finishes loading.
    Texture(Option<TextureHandle>),
}

impl UniformValue {
    pub fn color(r: f32, g: f32, b: f32) -> Self {
        UniformValue::Color([r, g, b])
    }

    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Color(_) => UniformKind::Color,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Bool(_) => UniformKind::Bool,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }

    /// Size in bytes when packed into a uniform buffer.
    pub fn byte_size(&self) -> usize {
        match self {
            UniformValue::Float(_) | UniformValue::Int(_) | UniformValue::Bool(_) => 4,
            UniformValue::Vec2(_) => 8,
            UniformValue::Vec3(_) | UniformValue::Color(_) => 12,
            UniformValue::Vec4(_) => 16,
            UniformValue::Mat4(_) => 64,
            UniformValue::Texture(_) => 0,
        }
    }

    /// Write the packed representation into `out`, which must be at least
    /// [`byte_size`](Self::byte_size) bytes long. Booleans are encoded as `u32`.
    pub fn write_bytes(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => out[..4].copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => out[..4].copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Bool(v) => out[..4].copy_from_slice(bytemuck::bytes_of(&(*v as u32))),
            UniformValue::Vec2(v) => out[..8].copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Vec3(v) | UniformValue::Color(v) => {
                out[..12].copy_from_slice(bytemuck::cast_slice(v))
            }
            UniformValue::Vec4(v) => out[..16].copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Mat4(m) => out[..64].copy_from_slice(bytemuck::cast_slice(m)),
            UniformValue::Texture(_) => {}
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            UniformValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<glam::Vec2> {
        match self {
            UniformValue::Vec2(v) => Some(glam::Vec2::from_array(*v)),
            _ => None,
        }
    }

    /// Vec3 or Color as a vector.
    pub fn as_vec3(&self) -> Option<glam::Vec3> {
        match self {
            UniformValue::Vec3(v) | UniformValue::Color(v) => Some(glam::Vec3::from_array(*v)),
            _ => None,
        }
    }

    pub fn as_mat4(&self) -> Option<glam::Mat4> {
        match self {
            UniformValue::Mat4(m) => Some(glam::Mat4::from_cols_array_2d(m)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            UniformValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<TextureHandle> {
        match self {
            UniformValue::Texture(t) => *t,
            _ => None,
        }
    }

    /// Parse a JSON value as the given kind.
    ///
    /// Numbers map to scalars, arrays to vectors/colors, a 16-element array or
    /// an array of 4 columns to a matrix. Integers accept whole floats.
    pub fn from_json(kind: UniformKind, value: &JsonValue) -> Option<Self> {
        fn floats<const N: usize>(value: &JsonValue) -> Option<[f32; N]> {
            let arr = value.as_array()?;
            if arr.len() != N {
                return None;
            }
            let mut out = [0.0; N];
            for (slot, v) in out.iter_mut().zip(arr) {
                *slot = v.as_f64()? as f32;
            }
            Some(out)
        }

        match kind {
            UniformKind::Float => value.as_f64().map(|v| UniformValue::Float(v as f32)),
            UniformKind::Int => {
                let v = value.as_f64()?;
                (v.fract() == 0.0).then(|| UniformValue::Int(v as i32))
            }
            UniformKind::Bool => value.as_bool().map(UniformValue::Bool),
            UniformKind::Vec2 => floats::<2>(value).map(UniformValue::Vec2),
            UniformKind::Vec3 => floats::<3>(value).map(UniformValue::Vec3),
            UniformKind::Vec4 => floats::<4>(value).map(UniformValue::Vec4),
            UniformKind::Color => floats::<3>(value).map(UniformValue::Color),
            UniformKind::Mat4 => {
                if let Some(flat) = floats::<16>(value) {
                    return Some(UniformValue::Mat4(glam::Mat4::from_cols_array(&flat).to_cols_array_2d()));
                }
                let cols = value.as_array()?;
                if cols.len() != 4 {
                    return None;
                }
                let mut m = [[0.0; 4]; 4];
                for (col, v) in m.iter_mut().zip(cols) {
                    *col = floats::<4>(v)?;
                }
                Some(UniformValue::Mat4(m))
            }
            UniformKind::Texture => None,
        }
    }

    /// JSON representation, used for parameter dumps.
    pub fn to_json(&self) -> JsonValue {
        match self {
            UniformValue::Float(v) => serde_json::json!(v),
            UniformValue::Int(v) => serde_json::json!(v),
            UniformValue::Bool(v) => serde_json::json!(v),
            UniformValue::Vec2(v) => serde_json::json!(v),
            UniformValue::Vec3(v) | UniformValue::Color(v) => serde_json::json!(v),
            UniformValue::Vec4(v) => serde_json::json!(v),
            UniformValue::Mat4(m) => serde_json::json!(m),
            UniformValue::Texture(t) => match t {
                Some(handle) => serde_json::json!(handle.raw()),
                None => JsonValue::Null,
            },
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<glam::Vec2> for UniformValue {
    fn from(v: glam::Vec2) -> Self {
        UniformValue::Vec2(v.to_array())
    }
}

impl From<glam::Vec3> for UniformValue {
    fn from(v: glam::Vec3) -> Self {
        UniformValue::Vec3(v.to_array())
    }
}

impl From<glam::Vec4> for UniformValue {
    fn from(v: glam::Vec4) -> Self {
        UniformValue::Vec4(v.to_array())
    }
}

impl From<glam::Mat4> for UniformValue {
    fn from(m: glam::Mat4) -> Self {
        UniformValue::Mat4(m.to_cols_array_2d())
    }
}

/// One declared parameter.
#[derive(Clone, Debug)]
pub struct UniformCell {
    pub value: UniformValue,
    pub default: UniformValue,
    /// Suggested editing range for scalar parameters.
    pub range: Option<(f32, f32)>,
    pub description: String,
}

impl UniformCell {
    pub fn kind(&self) -> UniformKind {
        self.default.kind()
    }

    pub fn with_range(&mut self, min: f32, max: f32) -> &mut Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_description(&mut self, desc: impl Into<String>) -> &mut Self {
        self.description = desc.into();
        self
    }
}

/// Ordered, typed parameter table for one logical shader.
#[derive(Clone, Debug)]
pub struct UniformSet {
    name: String,
    cells: Vec<(String, UniformCell)>,
    index: HashMap<String, usize>,
}

impl UniformSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a parameter. Its kind is the kind of `default`.
    pub fn declare(
        &mut self,
        key: impl Into<String>,
        default: UniformValue,
    ) -> Result<&mut UniformCell, UniformError> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(UniformError::DuplicateKey { key });
        }
        let slot = self.cells.len();
        self.index.insert(key.clone(), slot);
        self.cells.push((
            key,
            UniformCell {
                value: default.clone(),
                default,
                range: None,
                description: String::new(),
            },
        ));
        Ok(&mut self.cells[slot].1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&UniformValue> {
        self.cell(key).map(|c| &c.value)
    }

    pub fn cell(&self, key: &str) -> Option<&UniformCell> {
        self.index.get(key).map(|&i| &self.cells[i].1)
    }

    pub fn kind_of(&self, key: &str) -> Option<UniformKind> {
        self.cell(key).map(UniformCell::kind)
    }

    /// Position of `key` in declaration order.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Value by declaration index.
    ///
    /// # Panics
    /// If `index` is out of range; indices come from [`index_of`](Self::index_of).
    pub fn value_at(&self, index: usize) -> &UniformValue {
        &self.cells[index].1.value
    }

    /// Overwrite a declared parameter. The kind must match the declaration.
    pub fn set(&mut self, key: &str, value: UniformValue) -> Result<(), UniformError> {
        let Some(&i) = self.index.get(key) else {
            return Err(UniformError::UnknownKey { key: key.to_string() });
        };
        let cell = &mut self.cells[i].1;
        let expected = cell.kind();
        if value.kind() != expected {
            return Err(UniformError::TypeMismatch {
                key: key.to_string(),
                expected,
                found: value.kind(),
            });
        }
        cell.value = value;
        Ok(())
    }

    pub fn set_texture(&mut self, key: &str, handle: Option<TextureHandle>) -> Result<(), UniformError> {
        self.set(key, UniformValue::Texture(handle))
    }

    /// `(key, cell)` pairs in declaration order. Each call starts a fresh pass.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &UniformCell)> + '_ {
        self.cells.iter().map(|(k, c)| (k.as_str(), c))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn reset(&mut self, key: &str) -> Result<(), UniformError> {
        let Some(&i) = self.index.get(key) else {
            return Err(UniformError::UnknownKey { key: key.to_string() });
        };
        let cell = &mut self.cells[i].1;
        cell.value = cell.default.clone();
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for (_, cell) in &mut self.cells {
            cell.value = cell.default.clone();
        }
    }

    /// Copy values for every key declared here and in `other` with the same
    /// kind, skipping texture cells. Returns the number of values copied.
    pub fn copy_matching_from(&mut self, other: &UniformSet) -> usize {
        let mut copied = 0;
        for (key, cell) in &mut self.cells {
            if cell.kind() == UniformKind::Texture {
                continue;
            }
            if let Some(src) = other.cell(key) {
                if src.kind() == cell.kind() {
                    cell.value = src.value.clone();
                    copied += 1;
                }
            }
        }
        copied
    }

    /// Current values as a JSON object keyed by parameter name.
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .cells
            .iter()
            .map(|(k, c)| (k.clone(), c.value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn sample_set() -> UniformSet {
        let mut set = UniformSet::new("sample");
        set.declare("scale", UniformValue::Float(120.0)).unwrap().with_range(1.0, 200.0);
        set.declare("offset", UniformValue::Vec3([0.0; 3])).unwrap();
        set.declare("tint", UniformValue::color(1.0, 0.5, 0.0)).unwrap();
        set.declare("noise", UniformValue::Texture(None)).unwrap();
        set
    }

    #[test]
    fn test_declare_and_get() {
        let set = sample_set();
        assert_eq!(set.len(), 4);
        assert_eq!(set.get("scale"), Some(&UniformValue::Float(120.0)));
        assert_eq!(set.cell("scale").unwrap().range, Some((1.0, 200.0)));
        assert_eq!(set.kind_of("tint"), Some(UniformKind::Color));
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut set = sample_set();
        let err = set.declare("scale", UniformValue::Float(1.0)).unwrap_err();
        assert_eq!(err, UniformError::DuplicateKey { key: "scale".into() });
    }

    #[test]
    fn test_set_checks_kind() {
        let mut set = sample_set();
        set.set("scale", UniformValue::Float(50.0)).unwrap();
        assert_eq!(set.get("scale").and_then(UniformValue::as_float), Some(50.0));

        let err = set.set("scale", UniformValue::Vec2([1.0, 2.0])).unwrap_err();
        assert!(matches!(err, UniformError::TypeMismatch { expected: UniformKind::Float, .. }));

        // Color and Vec3 share a layout but are distinct kinds.
        assert!(set.set("tint", UniformValue::Vec3([1.0; 3])).is_err());

        let err = set.set("nope", UniformValue::Float(1.0)).unwrap_err();
        assert_eq!(err, UniformError::UnknownKey { key: "nope".into() });
    }

    #[test]
    fn test_entries_is_restartable() {
        let set = sample_set();
        let first: Vec<_> = set.entries().map(|(k, _)| k).collect();
        let second: Vec<_> = set.entries().map(|(k, _)| k).collect();
        assert_eq!(first, vec!["scale", "offset", "tint", "noise"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unset_texture_is_legal() {
        let mut set = sample_set();
        assert_eq!(set.get("noise").and_then(UniformValue::as_texture), None);
        set.set_texture("noise", Some(TextureHandle::from_raw(3))).unwrap();
        assert_eq!(
            set.get("noise").and_then(UniformValue::as_texture),
            Some(TextureHandle::from_raw(3))
        );
    }

    #[test]
    fn test_reset() {
        let mut set = sample_set();
        set.set("scale", UniformValue::Float(3.0)).unwrap();
        set.set("offset", UniformValue::Vec3([1.0, 2.0, 3.0])).unwrap();
        set.reset("scale").unwrap();
        assert_eq!(set.get("scale"), Some(&UniformValue::Float(120.0)));
        set.reset_all();
        assert_eq!(set.get("offset"), Some(&UniformValue::Vec3([0.0; 3])));
    }

    #[test]
    fn test_copy_matching_from() {
        let mut a = sample_set();
        let mut b = UniformSet::new("other");
        b.declare("scale", UniformValue::Float(7.0)).unwrap();
        b.declare("tint", UniformValue::Vec3([0.0; 3])).unwrap();
        b.declare("noise", UniformValue::Texture(Some(TextureHandle::from_raw(1)))).unwrap();

        let copied = a.copy_matching_from(&b);
        assert_eq!(copied, 1);
        assert_eq!(a.get("scale"), Some(&UniformValue::Float(7.0)));
        // Kind differs, left untouched.
        assert_eq!(a.get("tint"), Some(&UniformValue::color(1.0, 0.5, 0.0)));
        // Textures are never carried over.
        assert_eq!(a.get("noise"), Some(&UniformValue::Texture(None)));
    }

    #[test]
    fn test_write_bytes() {
        let mut buf = [0u8; 64];
        UniformValue::Bool(true).write_bytes(&mut buf);
        assert_eq!(&buf[..4], &1u32.to_ne_bytes());

        UniformValue::Vec3([1.0, 2.0, 3.0]).write_bytes(&mut buf);
        assert_eq!(read_floats(&buf[..12]), vec![1.0, 2.0, 3.0]);

        let m = glam::Mat4::from_translation(glam::vec3(4.0, 5.0, 6.0));
        UniformValue::from(m).write_bytes(&mut buf);
        assert_eq!(&read_floats(&buf[..64])[12..15], &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_from_json() {
        use serde_json::json;
        assert_eq!(
            UniformValue::from_json(UniformKind::Float, &json!(2.5)),
            Some(UniformValue::Float(2.5))
        );
        assert_eq!(
            UniformValue::from_json(UniformKind::Int, &json!(4)),
            Some(UniformValue::Int(4))
        );
        assert_eq!(UniformValue::from_json(UniformKind::Int, &json!(4.5)), None);
        assert_eq!(
            UniformValue::from_json(UniformKind::Color, &json!([1.0, 0.0, 0.5])),
            Some(UniformValue::color(1.0, 0.0, 0.5))
        );
        assert_eq!(UniformValue::from_json(UniformKind::Vec3, &json!([1.0, 0.0])), None);
        assert_eq!(UniformValue::from_json(UniformKind::Texture, &json!(1)), None);
    }
}
