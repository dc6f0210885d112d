//! Run identities: the deterministic key that names a run's result file.
//!
//! A key is an ordered list of `name=value` fields joined with `_` and
//! prefixed with `expt`. The field order is fixed per experiment family, so
//! equal configurations always yield byte-identical keys.

use crate::format::{format_int, format_sci};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// File extension of persisted result bundles.
pub const RESULT_EXTENSION: &str = "json";

/// An ordered identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    fields: Vec<(String, String)>,
}

impl IdentityKey {
    /// Start an empty key; fields render in the order they are added.
    ///
    /// ```
    /// use neuralgc_core::IdentityKey;
    ///
    /// let key = IdentityKey::builder().uint("nepoch", 1000).float("lr", 0.001).build();
    /// assert_eq!(key.to_string(), "expt_nepoch=1000_lr=1.000000e-03");
    /// ```
    pub fn builder() -> IdentityBuilder {
        IdentityBuilder::default()
    }

    /// Rendered `(name, value)` pairs in key order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Look up a rendered field value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// File name of the result bundle, e.g. `expt_nepoch=1000_lr=1.000000e-03.json`.
    pub fn file_name(&self) -> String {
        format!("{self}.{RESULT_EXTENSION}")
    }

    /// Hex SHA-256 of the key, recorded in result provenance.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.to_string().as_bytes()))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expt")?;
        for (name, value) in &self.fields {
            write!(f, "_{name}={value}")?;
        }
        Ok(())
    }
}

/// Builder that appends fields in call order.
#[derive(Debug, Default)]
pub struct IdentityBuilder {
    fields: Vec<(String, String)>,
}

impl IdentityBuilder {
    /// Append a signed integer (`%d`), used for sentinel-bearing seeds.
    pub fn int(mut self, name: &str, value: i64) -> Self {
        self.fields.push((name.to_string(), format_int(value)));
        self
    }

    /// Append an unsigned count or seed in plain decimal.
    pub fn uint(mut self, name: &str, value: u64) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Append a real value in `%e` notation with six fractional digits.
    pub fn float(mut self, name: &str, value: f64) -> Self {
        self.fields.push((name.to_string(), format_sci(value)));
        self
    }

    /// Append a text token. Tokens come from closed enums, so they never
    /// carry path separators or whitespace.
    pub fn text(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Finish the key.
    pub fn build(self) -> IdentityKey {
        IdentityKey {
            fields: self.fields,
        }
    }
}

/// Location of a run's result bundle: `<root>/<family dir>/<identity>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPath {
    family_dir: PathBuf,
    identity: IdentityKey,
}

impl ResultPath {
    /// Place `identity` under `results_root/family_dir`. Nothing is created on disk.
    pub fn new(results_root: &Path, family_dir: &str, identity: IdentityKey) -> Self {
        Self {
            family_dir: results_root.join(family_dir),
            identity,
        }
    }

    /// Directory shared by every run of the family.
    pub fn family_dir(&self) -> &Path {
        &self.family_dir
    }

    /// Key naming the result file.
    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Full path of the result bundle.
    pub fn path(&self) -> PathBuf {
        self.family_dir.join(self.identity.file_name())
    }

    /// Whether a completed result already exists.
    pub fn is_done(&self) -> bool {
        self.path().is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> IdentityKey {
        IdentityKey::builder()
            .uint("nepoch", 1000)
            .float("lr", 0.001)
            .float("lam", 0.1)
            .int("seed", 12345)
            .text("penalty", "group_lasso")
            .int("dseed", -1)
            .build()
    }

    #[test]
    fn test_identity_string() {
        assert_eq!(
            sample().to_string(),
            "expt_nepoch=1000_lr=1.000000e-03_lam=1.000000e-01_seed=12345_penalty=group_lasso_dseed=-1"
        );
    }

    #[test]
    fn test_file_name_has_extension() {
        assert!(sample().file_name().ends_with("_dseed=-1.json"));
    }

    #[test]
    fn test_get_field() {
        let key = sample();
        assert_eq!(key.get("lr"), Some("1.000000e-03"));
        assert_eq!(key.get("missing"), None);
    }

    #[test]
    fn test_digest_is_stable_and_distinct() {
        let a = sample();
        let b = IdentityKey::builder().uint("nepoch", 999).build();
        assert_eq!(a.digest(), sample().digest());
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_result_path_layout() {
        let rp = ResultPath::new(Path::new("Results"), "Long VAR MLP Encoding", sample());
        assert_eq!(
            rp.path(),
            PathBuf::from("Results")
                .join("Long VAR MLP Encoding")
                .join(sample().file_name())
        );
        assert!(!rp.is_done());
    }
}
