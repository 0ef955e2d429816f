//! Process configuration seam.

use std::collections::HashMap;

/// Source of driver configuration overrides.
///
/// The driver only ever asks for the `ondelay` and `offdelay` keys; anything
/// it does not recognise is simply never requested.
pub trait Config {
    fn get(&self, key: &str) -> Option<&str>;
}

impl Config for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

/// No overrides; every delay keeps its default.
impl Config for () {
    fn get(&self, _key: &str) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_config() {
        let mut cfg = HashMap::new();
        cfg.insert("offdelay".to_string(), "120".to_string());
        assert_eq!(Config::get(&cfg, "offdelay"), Some("120"));
        assert_eq!(Config::get(&cfg, "ondelay"), None);
    }

    #[test]
    fn unit_config_is_empty() {
        assert_eq!(Config::get(&(), "offdelay"), None);
    }
}
