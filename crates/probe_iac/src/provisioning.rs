//! Provisioning tool seam.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::IacResult;

/// Input variables passed to an apply or destroy.
///
/// Values marked secret are masked in logs and wiped from memory on drop.
#[derive(Clone, Default)]
pub struct InputVariables {
    entries: BTreeMap<String, (Zeroizing<String>, bool)>,
}

impl InputVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(name.into(), (Zeroizing::new(value.into()), false));
        self
    }

    pub fn set_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(name.into(), (Zeroizing::new(value.into()), true));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|(v, _)| v.as_str())
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.entries.get(name).map(|(_, s)| *s).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate as `(name, value, secret)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        self.entries
            .iter()
            .map(|(k, (v, s))| (k.as_str(), v.as_str(), *s))
    }
}

impl std::fmt::Debug for InputVariables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, value, secret) in self.iter() {
            map.entry(&name, &if secret { probe_runner::MASK } else { value });
        }
        map.finish()
    }
}

/// A declarative provisioning engine that can apply, report outputs and destroy.
#[async_trait]
pub trait ProvisioningTool: Send + Sync {
    /// Create or update the resources described in `working_dir`.
    async fn apply(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<()>;

    /// Read a single declared output value, unprocessed.
    async fn output(&self, working_dir: &Path, key: &str) -> IacResult<String>;

    /// Destroy everything `apply` created.
    async fn destroy(&self, working_dir: &Path, vars: &InputVariables) -> IacResult<()>;

    /// Wait until operations abandoned mid-flight have stopped.
    async fn settle(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_secret_values() {
        let vars = InputVariables::new()
            .set("postfix", "ab12cd34")
            .set_secret("client_secret", "hunter2");

        let rendered = format!("{:?}", vars);
        assert!(rendered.contains("ab12cd34"));
        assert!(!rendered.contains("hunter2"));
        assert!(vars.is_secret("client_secret"));
        assert!(!vars.is_secret("postfix"));
    }

    #[test]
    fn test_iter_is_sorted_by_name() {
        let vars = InputVariables::new()
            .set("tenant_id", "t")
            .set("client_id", "c");

        let names: Vec<_> = vars.iter().map(|(n, _, _)| n).collect();
        assert_eq!(names, vec!["client_id", "tenant_id"]);
        assert_eq!(vars.get("tenant_id"), Some("t"));
    }
}
