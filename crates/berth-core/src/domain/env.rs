//! Environment variables: public/private visibility, service-instance
//! scoping, and the apprc file rendered onto units.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env name pattern compiles"));

pub const APP_NAME_VAR: &str = "BERTH_APPNAME";
pub const HOST_VAR: &str = "BERTH_HOST";
pub const APP_TOKEN_VAR: &str = "BERTH_APP_TOKEN";

/// Instance that owns the storage variables written on create.
pub const STORAGE_INSTANCE: &str = "berths3";
pub const S3_ENDPOINT_VAR: &str = "BERTH_S3_ENDPOINT";
pub const S3_LOCATION_CONSTRAINT_VAR: &str = "BERTH_S3_LOCATIONCONSTRAINT";
pub const S3_ACCESS_KEY_VAR: &str = "BERTH_S3_ACCESS_KEY_ID";
pub const S3_SECRET_KEY_VAR: &str = "BERTH_S3_SECRET_KEY";
pub const S3_BUCKET_VAR: &str = "BERTH_S3_BUCKET";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
    pub public: bool,
    /// Service instance that owns the variable, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
}

impl EnvVar {
    pub fn public(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            public: true,
            instance_name: None,
        }
    }

    pub fn private(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            public: false,
            ..Self::public(name, value)
        }
    }

    pub fn scoped(mut self, instance: impl Into<String>) -> Self {
        self.instance_name = Some(instance.into());
        self
    }

    /// Owning instance, `""` for variables no service instance owns.
    pub fn instance(&self) -> &str {
        self.instance_name.as_deref().unwrap_or("")
    }

    /// Names must be usable as shell variables.
    pub fn validate_name(name: &str) -> Result<(), EngineError> {
        if ENV_NAME.is_match(name) {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "Invalid environment variable name: {name:?}."
            )))
        }
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.public {
            write!(f, "{}={}", self.name, self.value)
        } else {
            write!(f, "{}=*** (private variable)", self.name)
        }
    }
}

pub type EnvMap = BTreeMap<String, EnvVar>;

/// Writes `vars` into `env` and returns the names that were written.
///
/// With `public_only`, a variable that already exists and is private is
/// left untouched.
pub fn merge_envs(
    env: &mut EnvMap,
    vars: impl IntoIterator<Item = EnvVar>,
    public_only: bool,
) -> Vec<String> {
    let mut written = Vec::new();
    for var in vars {
        if public_only && env.get(&var.name).is_some_and(|existing| !existing.public) {
            continue;
        }
        written.push(var.name.clone());
        env.insert(var.name.clone(), var);
    }
    written
}

/// Removes `names` from `env` and returns the names that were removed.
///
/// With `public_only`, private variables survive.
pub fn remove_envs<S: AsRef<str>>(env: &mut EnvMap, names: &[S], public_only: bool) -> Vec<String> {
    let mut removed = Vec::new();
    for name in names {
        let name = name.as_ref();
        match env.get(name) {
            Some(var) if public_only && !var.public => {}
            Some(_) => {
                env.remove(name);
                removed.push(name.to_string());
            }
            None => {}
        }
    }
    removed
}

/// Variables owned by `instance`; `""` selects variables no instance owns.
pub fn instance_env(env: &EnvMap, instance: &str) -> EnvMap {
    env.iter()
        .filter(|(_, var)| var.instance() == instance)
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect()
}

/// Shell command that rewrites the apprc file with every variable.
///
/// The heredoc delimiter is quoted and values are single-quoted, so the
/// file holds the literal values and sourcing it expands nothing.
pub fn render_apprc(env: &EnvMap, path: &str, generated_at: DateTime<Utc>) -> String {
    let mut body = format!("# generated by berth at {}\n", generated_at.to_rfc3339());
    for var in env.values() {
        body.push_str(&format!("export {}={}\n", var.name, single_quote(&var.value)));
    }
    let delimiter = heredoc_delimiter(&body);
    format!("cat > {path} <<'{delimiter}'\n{body}{delimiter}\n")
}

fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

// A value line equal to the delimiter would end the heredoc early.
fn heredoc_delimiter(body: &str) -> String {
    let mut delimiter = String::from("END");
    while body.lines().any(|line| line == delimiter) {
        delimiter.push('_');
    }
    delimiter
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn env_of(vars: &[EnvVar]) -> EnvMap {
        vars.iter().map(|v| (v.name.clone(), v.clone())).collect()
    }

    #[test]
    fn display_hides_private_values() {
        assert_eq!(
            EnvVar::public("DATABASE_HOST", "localhost").to_string(),
            "DATABASE_HOST=localhost"
        );
        assert_eq!(
            EnvVar::private("DATABASE_PASSWORD", "s3cr3t").to_string(),
            "DATABASE_PASSWORD=*** (private variable)"
        );
    }

    #[test]
    fn merge_overwrites_everything_when_not_public_only() {
        let mut env = env_of(&[EnvVar::private("DATABASE_HOST", "localhost")]);

        let written = merge_envs(
            &mut env,
            [
                EnvVar::public("DATABASE_HOST", "remotehost"),
                EnvVar::public("DATABASE_PORT", "5432"),
            ],
            false,
        );

        assert_eq!(written, ["DATABASE_HOST", "DATABASE_PORT"]);
        assert_eq!(env["DATABASE_HOST"].value, "remotehost");
        assert!(env["DATABASE_HOST"].public);
    }

    #[test]
    fn merge_public_only_keeps_existing_private_vars() {
        let mut env = env_of(&[EnvVar::private("DATABASE_HOST", "localhost")]);

        let written = merge_envs(
            &mut env,
            [
                EnvVar::public("DATABASE_HOST", "remotehost"),
                EnvVar::public("DATABASE_USER", "root"),
            ],
            true,
        );

        assert_eq!(written, ["DATABASE_USER"]);
        assert_eq!(env["DATABASE_HOST"].value, "localhost");
        assert!(!env["DATABASE_HOST"].public);
    }

    #[test]
    fn remove_public_only_keeps_private_vars() {
        let mut env = env_of(&[
            EnvVar::public("DATABASE_HOST", "localhost"),
            EnvVar::private("DATABASE_PASSWORD", "secret"),
        ]);

        let removed = remove_envs(&mut env, &["DATABASE_HOST", "DATABASE_PASSWORD", "NOPE"], true);

        assert_eq!(removed, ["DATABASE_HOST"]);
        assert!(env.contains_key("DATABASE_PASSWORD"));
        assert!(!env.contains_key("DATABASE_HOST"));
    }

    #[test]
    fn instance_env_selects_by_owner() {
        let env = env_of(&[
            EnvVar::public("DATABASE_HOST", "localhost").scoped("mysql"),
            EnvVar::private("REDIS_URL", "redis://").scoped("redis"),
            EnvVar::public("DEBUG", "1"),
        ]);

        let mysql = instance_env(&env, "mysql");
        let unowned = instance_env(&env, "");

        assert_eq!(mysql.keys().collect::<Vec<_>>(), ["DATABASE_HOST"]);
        assert_eq!(unowned.keys().collect::<Vec<_>>(), ["DEBUG"]);
        assert!(instance_env(&env, "postgres").is_empty());
    }

    #[test]
    fn apprc_exports_every_variable_in_a_heredoc() {
        let env = env_of(&[
            EnvVar::public("DATABASE_HOST", "localhost"),
            EnvVar::private("DATABASE_PASSWORD", "secret"),
        ]);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let cmd = render_apprc(&env, "/home/application/apprc", at);

        assert_eq!(
            cmd,
            "cat > /home/application/apprc <<'END'\n\
             # generated by berth at 2024-01-01T12:00:00+00:00\n\
             export DATABASE_HOST='localhost'\n\
             export DATABASE_PASSWORD='secret'\n\
             END\n"
        );
    }

    #[test]
    fn apprc_quotes_single_quotes() {
        let env = env_of(&[EnvVar::public("GREETING", "it's")]);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let cmd = render_apprc(&env, "/apprc", at);

        assert!(cmd.contains(r"export GREETING='it'\''s'"));
    }

    #[test]
    fn apprc_delimiter_avoids_value_lines() {
        let env = env_of(&[EnvVar::public("NOTE", "first\nEND\nlast")]);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let cmd = render_apprc(&env, "/apprc", at);

        assert!(cmd.starts_with("cat > /apprc <<'END_'\n"));
        assert!(cmd.ends_with("\nEND_\n"));
    }

    #[cfg(unix)]
    #[rstest]
    #[case("cost $HOME `echo pwned` $(id)")]
    #[case(r#"say "hi" to \$USER's friend"#)]
    #[case("first\nEND\n'quoted'\nlast")]
    fn sourced_apprc_holds_the_literal_value(#[case] value: &str) {
        let path = std::env::temp_dir().join(format!("berth-apprc-{}", ulid::Ulid::new()));
        let path = path.to_string_lossy().into_owned();
        let env = env_of(&[EnvVar::private("GREETING", value)]);
        let cmd = render_apprc(&env, &path, Utc::now());

        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("{cmd}. {path}; printf %s \"$GREETING\""))
            .output()
            .unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(output.status.success(), "{output:?}");
        assert_eq!(String::from_utf8(output.stdout).unwrap(), value);
    }

    #[rstest]
    #[case("DATABASE_URL", true)]
    #[case("_private", true)]
    #[case("9LIVES", false)]
    #[case("MY-VAR", false)]
    #[case("A=B", false)]
    #[case("", false)]
    fn env_names_must_be_shell_identifiers(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(EnvVar::validate_name(name).is_ok(), valid);
    }
}
