//! Fan-out view over several uniform sets.
//!
//! Several passes compile their own program from the same parameter table.
//! [`SharedUniforms`] lets one configuration surface edit a parameter once and
//! have it land in every set that declares it: writes go to all declaring
//! sets, reads come from the first one.
//!
//! Writes are applied set by set and are not atomic. If a write fails part
//! way through (kind mismatch in a later set) the earlier sets keep the new
//! value. All callers are single-threaded configuration edits.

use serde_json::Value as JsonValue;

use crate::error::UniformError;
use crate::uniforms::{UniformSet, UniformValue};

pub struct SharedUniforms<'a> {
    sets: Vec<&'a mut UniformSet>,
}

impl<'a> SharedUniforms<'a> {
    /// Earlier sets take precedence for reads.
    pub fn new(sets: Vec<&'a mut UniformSet>) -> Self {
        Self { sets }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sets.iter().any(|s| s.contains(key))
    }

    /// Value from the first set declaring `key`.
    pub fn get(&self, key: &str) -> Option<&UniformValue> {
        self.sets.iter().find_map(|s| s.get(key))
    }

    /// Write `value` to every set declaring `key`.
    ///
    /// Returns `Ok(false)` when no set declares the key.
    pub fn set(&mut self, key: &str, value: UniformValue) -> Result<bool, UniformError> {
        let mut written = false;
        for set in self.sets.iter_mut().filter(|s| s.contains(key)) {
            set.set(key, value.clone())?;
            written = true;
        }
        Ok(written)
    }

    /// Push the first set's value for `key` to every other declaring set.
    pub fn sync(&mut self, key: &str) -> Result<bool, UniformError> {
        match self.get(key).cloned() {
            Some(value) => self.set(key, value),
            None => Ok(false),
        }
    }

    /// Union of declared keys, in order of first appearance.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for set in &self.sets {
            for key in set.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Apply a JSON object of `key: value` overrides.
    ///
    /// Unknown keys are logged and skipped. Values are parsed against the kind
    /// declared by the first set holding the key. Returns the number of keys
    /// that were written.
    pub fn apply_json(&mut self, overrides: &serde_json::Map<String, JsonValue>) -> Result<usize, UniformError> {
        let mut applied = 0;
        for (key, raw) in overrides {
            let Some(kind) = self.sets.iter().find_map(|s| s.kind_of(key)) else {
                log::warn!("Ignoring unknown uniform '{}' in configuration", key);
                continue;
            };
            let value = UniformValue::from_json(kind, raw).ok_or_else(|| UniformError::InvalidJson {
                key: key.clone(),
                expected: kind,
                value: raw.to_string(),
            })?;
            if self.set(key, value)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::UniformKind;

    fn set_with(name: &str, entries: &[(&str, UniformValue)]) -> UniformSet {
        let mut set = UniformSet::new(name);
        for (k, v) in entries {
            set.declare(*k, v.clone()).unwrap();
        }
        set
    }

    #[test]
    fn test_write_fans_out_to_all_declaring_sets() {
        let mut a = set_with("a", &[("cloudsScale", UniformValue::Float(1.0)), ("onlyA", UniformValue::Int(0))]);
        let mut b = set_with("b", &[("cloudsScale", UniformValue::Float(2.0))]);
        let mut c = set_with("c", &[("other", UniformValue::Float(0.0))]);

        {
            let mut shared = SharedUniforms::new(vec![&mut a, &mut b, &mut c]);
            assert_eq!(shared.set("cloudsScale", UniformValue::Float(42.0)), Ok(true));
            assert_eq!(shared.get("cloudsScale"), Some(&UniformValue::Float(42.0)));
        }

        assert_eq!(a.get("cloudsScale"), Some(&UniformValue::Float(42.0)));
        assert_eq!(b.get("cloudsScale"), Some(&UniformValue::Float(42.0)));
        assert!(!c.contains("cloudsScale"));
    }

    #[test]
    fn test_read_prefers_first_set() {
        let mut a = set_with("a", &[("x", UniformValue::Float(1.0))]);
        let mut b = set_with("b", &[("x", UniformValue::Float(2.0)), ("y", UniformValue::Float(3.0))]);
        let shared = SharedUniforms::new(vec![&mut a, &mut b]);
        assert_eq!(shared.get("x"), Some(&UniformValue::Float(1.0)));
        // Later sets act as fallback read sources.
        assert_eq!(shared.get("y"), Some(&UniformValue::Float(3.0)));
    }

    #[test]
    fn test_unknown_key_is_noop() {
        let mut a = set_with("a", &[("x", UniformValue::Float(1.0))]);
        let mut shared = SharedUniforms::new(vec![&mut a]);
        assert_eq!(shared.set("missing", UniformValue::Float(5.0)), Ok(false));
        assert!(shared.get("missing").is_none());
        assert_eq!(shared.get("x"), Some(&UniformValue::Float(1.0)));
    }

    #[test]
    fn test_partial_write_on_kind_mismatch() {
        let mut a = set_with("a", &[("x", UniformValue::Float(1.0))]);
        let mut b = set_with("b", &[("x", UniformValue::Int(1))]);
        {
            let mut shared = SharedUniforms::new(vec![&mut a, &mut b]);
            let err = shared.set("x", UniformValue::Float(9.0)).unwrap_err();
            assert!(matches!(err, UniformError::TypeMismatch { expected: UniformKind::Int, .. }));
        }
        assert_eq!(a.get("x"), Some(&UniformValue::Float(9.0)));
        assert_eq!(b.get("x"), Some(&UniformValue::Int(1)));
    }

    #[test]
    fn test_sync_and_keys() {
        let mut a = set_with("a", &[("x", UniformValue::Float(7.0)), ("y", UniformValue::Float(0.0))]);
        let mut b = set_with("b", &[("x", UniformValue::Float(0.0)), ("z", UniformValue::Float(0.0))]);
        {
            let mut shared = SharedUniforms::new(vec![&mut a, &mut b]);
            assert_eq!(shared.keys(), vec!["x", "y", "z"]);
            assert_eq!(shared.sync("x"), Ok(true));
        }
        assert_eq!(b.get("x"), Some(&UniformValue::Float(7.0)));
    }

    #[test]
    fn test_apply_json() {
        let mut a = set_with(
            "a",
            &[("cloudsScale", UniformValue::Float(1.0)), ("fogColor", UniformValue::color(0.0, 0.0, 0.0))],
        );
        let mut b = set_with("b", &[("fogColor", UniformValue::color(0.0, 0.0, 0.0))]);
        {
            let mut shared = SharedUniforms::new(vec![&mut a, &mut b]);
            let overrides = serde_json::json!({
                "cloudsScale": 80.0,
                "fogColor": [0.5, 0.25, 0.0],
                "notAParameter": 1.0
            });
            let applied = shared.apply_json(overrides.as_object().unwrap()).unwrap();
            assert_eq!(applied, 2);

            let bad = serde_json::json!({ "cloudsScale": [1.0, 2.0] });
            assert!(matches!(
                shared.apply_json(bad.as_object().unwrap()),
                Err(UniformError::InvalidJson { .. })
            ));
        }
        assert_eq!(b.get("fogColor"), Some(&UniformValue::color(0.5, 0.25, 0.0)));
    }
}
