//! Restart hooks declared in the app's `app.yaml`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Commands run around a restart.
///
/// Either section may be missing; missing means "nothing to run".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(rename = "pre-restart", default)]
    pub pre_restart: Vec<String>,
    #[serde(rename = "post-restart", default)]
    pub post_restart: Vec<String>,
}

impl HookConfig {
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn commands(&self, phase: HookPhase) -> &[String] {
        match phase {
            HookPhase::PreRestart => &self.pre_restart,
            HookPhase::PostRestart => &self.post_restart,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreRestart,
    PostRestart,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::PreRestart => f.write_str("pre-restart"),
            HookPhase::PostRestart => f.write_str("post-restart"),
        }
    }
}

/// A single-word hook names a script in the unit's repository; anything
/// longer is already a shell command.
pub fn resolve_hook_command(unit_repo: &str, command: &str) -> String {
    let command = command.trim();
    if command.split_whitespace().count() == 1 && !command.starts_with('/') {
        format!("{}/{}", unit_repo.trim_end_matches('/'), command)
    } else {
        command.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_both_phases() {
        let yaml = "pre-restart:\n  - testdata/pre.sh\npost-restart:\n  - testdata/pos.sh\n  - echo done\n";

        let hooks = HookConfig::parse(yaml).unwrap();

        assert_eq!(hooks.pre_restart, ["testdata/pre.sh"]);
        assert_eq!(hooks.post_restart, ["testdata/pos.sh", "echo done"]);
    }

    #[test]
    fn missing_phase_is_empty() {
        let hooks = HookConfig::parse("pre-restart:\n  - pre.sh\nother-key: 1\n").unwrap();

        assert_eq!(hooks.commands(HookPhase::PreRestart), ["pre.sh"]);
        assert!(hooks.commands(HookPhase::PostRestart).is_empty());
    }

    #[test]
    fn empty_descriptor_has_no_hooks() {
        assert_eq!(HookConfig::parse("  \n").unwrap(), HookConfig::default());
    }

    #[test]
    fn malformed_descriptor_is_an_error() {
        assert!(HookConfig::parse("pre-restart: [unclosed").is_err());
    }

    #[rstest]
    #[case("pre.sh", "/home/application/current/pre.sh")]
    #[case("testdata/pre.sh", "/home/application/current/testdata/pre.sh")]
    #[case("python manage.py migrate", "python manage.py migrate")]
    #[case("/usr/bin/true", "/usr/bin/true")]
    fn single_word_hooks_resolve_against_the_repo(#[case] command: &str, #[case] expected: &str) {
        assert_eq!(
            resolve_hook_command("/home/application/current/", command),
            expected
        );
    }
}
