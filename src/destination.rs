use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::error::DeployError;

// ESXi mounts every datastore here
const VOLUMES_ROOT: &str = "/vmfs/volumes";

/// Where the converted disk ends up: `[container] path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub container: String,
    pub path: String,
}

impl Destination {
    pub fn parse(raw: &str) -> Result<Destination, DeployError> {
        static DATASTORE_RE: OnceLock<Regex> = OnceLock::new();
        let re = DATASTORE_RE
            .get_or_init(|| Regex::new(r"^\s*\[(.*?)\]\s*(.*)$").expect("valid regex"));

        let malformed = || DeployError::MalformedDestination(raw.to_string());
        let caps = re.captures(raw).ok_or_else(malformed)?;
        let container = &caps[1];
        let path = &caps[2];
        if container.is_empty() || path.is_empty() {
            return Err(malformed());
        }
        Ok(Destination {
            container: container.to_string(),
            path: path.to_string(),
        })
    }

    /// Absolute path of the final disk on the host.
    pub fn real_path(&self) -> String {
        volume_path(&self.container, &self.path)
    }

    /// Staging file on the same datastore as the final disk.
    pub fn staging(&self, relative_path: Option<&str>) -> StagingPath {
        StagingPath {
            container: self.container.clone(),
            relative_path: relative_path
                .map(str::to_string)
                .unwrap_or_else(default_staging_name),
        }
    }
}

/// Temporary upload target, deleted once the conversion succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPath {
    pub container: String,
    pub relative_path: String,
}

impl StagingPath {
    pub fn real_path(&self) -> String {
        volume_path(&self.container, &self.relative_path)
    }
}

/// `/tmp-<unix millis>.vmdk`
pub fn default_staging_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("/tmp-{millis}.vmdk")
}

// Leading slashes of `relative` are dropped so "[ds] /a" and "[ds] a" name the same file.
fn volume_path(container: &str, relative: &str) -> String {
    format!("{VOLUMES_ROOT}/{container}/{}", relative.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse() {
        let d = Destination::parse("[datastore1]  /vms/disk.vmdk").unwrap();
        assert_eq!(d.container, "datastore1");
        assert_eq!(d.path, "/vms/disk.vmdk");

        let d = Destination::parse("  [my ds]builds/a.vmdk").unwrap();
        assert_eq!(d.container, "my ds");
        assert_eq!(d.path, "builds/a.vmdk");

        // non-greedy: first closing bracket ends the container
        let d = Destination::parse("[a] [b] c").unwrap();
        assert_eq!(d.container, "a");
        assert_eq!(d.path, "[b] c");
    }

    #[test]
    fn test_parse_malformed() {
        for raw in [
            "",
            "datastore1 /vms/disk.vmdk",
            "datastore1] /vms/disk.vmdk",
            "[datastore1 /vms/disk.vmdk",
            "[] /vms/disk.vmdk",
            "[datastore1]",
            "[datastore1]   ",
            "x [datastore1] /vms/disk.vmdk",
        ] {
            let err = Destination::parse(raw).unwrap_err();
            assert!(
                matches!(err, DeployError::MalformedDestination(ref s) if s == raw),
                "{raw:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_real_paths_strip_leading_slash() {
        let d = Destination::parse("[datastore1]  /vms/disk.vmdk").unwrap();
        assert_eq!(d.real_path(), "/vmfs/volumes/datastore1/vms/disk.vmdk");

        let s = d.staging(Some("/tmp-42.vmdk"));
        assert_eq!(s.container, "datastore1");
        assert_eq!(s.real_path(), "/vmfs/volumes/datastore1/tmp-42.vmdk");

        let s = d.staging(Some("staging/up.img"));
        assert_eq!(s.real_path(), "/vmfs/volumes/datastore1/staging/up.img");

        let s = d.staging(Some("//double.vmdk"));
        assert_eq!(s.real_path(), "/vmfs/volumes/datastore1/double.vmdk");
    }

    #[test]
    fn test_default_staging_name() {
        let name = default_staging_name();
        let millis = name
            .strip_prefix("/tmp-")
            .and_then(|s| s.strip_suffix(".vmdk"))
            .unwrap();
        assert!(millis.parse::<u128>().unwrap() > 0);

        let d = Destination::parse("[ds] disk.vmdk").unwrap();
        let s = d.staging(None);
        assert!(s.relative_path.starts_with("/tmp-"));
        assert!(s.real_path().starts_with("/vmfs/volumes/ds/tmp-"));
    }

    proptest! {
        #[test]
        fn parse_extracts_container_and_path(
            lead in "[ \t]{0,3}",
            container in "[A-Za-z0-9_. -]{0,11}[A-Za-z0-9_.-]",
            gap in "[ \t]{0,4}",
            path in "[A-Za-z0-9_./-][A-Za-z0-9_./ -]{0,30}",
        ) {
            let raw = format!("{lead}[{container}]{gap}{path}");
            let d = Destination::parse(&raw).unwrap();
            prop_assert_eq!(d.container, container);
            prop_assert_eq!(d.path, path);
        }

        #[test]
        fn parse_rejects_strings_without_brackets(raw in "[^\\[\\]]{0,40}") {
            prop_assert!(Destination::parse(&raw).is_err());
        }
    }
}
