use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Variables of one tenant environment.
///
/// Keys are unique; setting an existing key replaces its value.
/// Serialized as a plain JSON/TOML table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars(BTreeMap<String, String>);

impl Vars {
    /// Create an empty variable set.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a set holding a single variable.
    pub fn single<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars = Self::new();
        vars.set(key, value);
        vars
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace a variable.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Iterate over variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; values from `other` win.
    pub fn merged(&self, other: &Vars) -> Vars {
        let mut out = self.0.clone();
        out.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Vars(out)
    }

    /// Return a copy without the listed keys.
    pub fn without<S: AsRef<str>>(&self, keys: &[S]) -> Vars {
        let mut out = self.clone();
        for key in keys {
            out.0.remove(key.as_ref());
        }
        out
    }
}

impl<K, V> FromIterator<(K, V)> for Vars
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Vars;

    #[test]
    fn set_replaces_existing_value() {
        let mut vars = Vars::new();
        vars.set("DB_HOST", "a");
        vars.set("DB_HOST", "b");

        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("DB_HOST"), Some("b"));
    }

    #[test]
    fn merged_prefers_other() {
        let common: Vars = [("APP_ENV", "production"), ("LOG", "stderr")]
            .into_iter()
            .collect();
        let tenant: Vars = [("APP_ENV", "staging"), ("DB", "t1")].into_iter().collect();

        let merged = common.merged(&tenant);
        assert_eq!(merged.get("APP_ENV"), Some("staging"));
        assert_eq!(merged.get("LOG"), Some("stderr"));
        assert_eq!(merged.get("DB"), Some("t1"));
    }

    #[test]
    fn without_drops_listed_keys_only() {
        let vars: Vars = [("A", "1"), ("B", "2"), ("C", "3")].into_iter().collect();
        let filtered = vars.without(&["A", "C", "MISSING"]);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("B"), Some("2"));
    }

    #[test]
    fn serializes_as_plain_table() {
        let vars = Vars::single("FOO", "bar");
        let json = serde_json::to_string(&vars).unwrap();
        assert_eq!(json, r#"{"FOO":"bar"}"#);

        let back: Vars = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vars);
    }
}
