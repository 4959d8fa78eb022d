//! App: the hosted application and the invariants of its record.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::env::EnvMap;
use super::hooks::HookConfig;
use super::team::Team;
use super::unit::Unit;
use crate::error::EngineError;

pub const MAX_APP_NAME_LEN: usize = 63;

static APP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,62}$").expect("app name pattern compiles"));

static CNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][\w.-]*$").expect("cname pattern compiles"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    pub platform: String,
    #[serde(default)]
    pub units: Vec<Unit>,
    /// Sorted, never empty once created.
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub env: EnvMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Loaded from the app's descriptor on demand; never persisted.
    #[serde(skip)]
    pub hooks: Option<HookConfig>,
}

impl App {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            units: Vec::new(),
            teams: Vec::new(),
            env: EnvMap::new(),
            ip: None,
            cname: None,
            hooks: None,
        }
    }

    pub fn is_valid_name(name: &str) -> bool {
        APP_NAME.is_match(name)
    }

    pub fn validate_name(name: &str) -> Result<(), EngineError> {
        if Self::is_valid_name(name) {
            Ok(())
        } else {
            Err(EngineError::Validation(
                "Invalid app name, your app should have at most 63 characters, containing only \
                 lower case letters or numbers, starting with a letter."
                    .into(),
            ))
        }
    }

    /// At least one unit is started.
    pub fn available(&self) -> bool {
        self.units.iter().any(Unit::is_available)
    }

    pub fn set_teams(&mut self, teams: &[Team]) {
        let mut names: Vec<String> = teams.iter().map(|team| team.name.clone()).collect();
        names.sort();
        names.dedup();
        self.teams = names;
    }

    pub fn has_team(&self, team: &str) -> bool {
        self.teams.binary_search_by(|t| t.as_str().cmp(team)).is_ok()
    }

    pub fn grant(&mut self, team: &str) -> Result<(), EngineError> {
        match self.teams.binary_search_by(|t| t.as_str().cmp(team)) {
            Ok(_) => Err(EngineError::Conflict(
                "This team already has access to this app".into(),
            )),
            Err(pos) => {
                self.teams.insert(pos, team.to_string());
                Ok(())
            }
        }
    }

    pub fn revoke(&mut self, team: &str) -> Result<(), EngineError> {
        let Ok(pos) = self.teams.binary_search_by(|t| t.as_str().cmp(team)) else {
            return Err(EngineError::NotFound(
                "This team does not have access to this app".into(),
            ));
        };
        if self.teams.len() == 1 {
            return Err(EngineError::Forbidden(
                "You can not revoke the access from this team, because it is the unique team \
                 with access to the app, and an app can not be orphaned"
                    .into(),
            ));
        }
        self.teams.remove(pos);
        Ok(())
    }

    /// Replaces the unit backed by the same instance, or appends.
    pub fn append_or_update(&mut self, unit: Unit) {
        match self.units.iter_mut().find(|u| u.same_instance(&unit)) {
            Some(existing) => *existing = unit,
            None => self.units.push(unit),
        }
    }

    pub fn find_unit(&self, id: &str) -> Option<usize> {
        self.units.iter().position(|unit| unit.matches(id))
    }

    /// Drops the units at `indices` and keeps the rest in their order.
    /// Out-of-range indices are ignored.
    pub fn remove_units_at(&mut self, indices: &[usize]) {
        let mut index = 0;
        self.units.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
    }

    pub fn set_cname(&mut self, cname: &str) -> Result<(), EngineError> {
        if !cname.is_empty() && !CNAME.is_match(cname) {
            return Err(EngineError::PreconditionFailed("Invalid cname".into()));
        }
        self.cname = (!cname.is_empty()).then(|| cname.to_string());
        Ok(())
    }

    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(|var| var.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UnitStatus;
    use crate::error::ErrorKind;
    use rstest::rstest;

    fn unit(name: &str, instance: &str, status: UnitStatus) -> Unit {
        Unit::new(name, instance, "10.10.10.10", status)
    }

    #[rstest]
    #[case("myappmyappmyappmyappmyappmyappmyappmyappmyappmyappmyappmyappmy", true)]
    #[case("myappmyappmyappmyappmyappmyappmyappmyappmyappmyappmyappmyappmya", true)]
    #[case("myappmyappmyappmyappmyappmyappmyappmyappmyappmyappmyappmyappmyap", false)]
    #[case("myApp", false)]
    #[case("my app", false)]
    #[case("123myapp", false)]
    #[case("myapp", true)]
    #[case("_theirapp", false)]
    #[case("my_app", false)]
    #[case("my-app", true)]
    #[case("-myapp", false)]
    #[case("my.app", false)]
    #[case("a", true)]
    #[case("", false)]
    fn app_name_rules(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(App::is_valid_name(name), valid, "{name}");
    }

    #[test]
    fn invalid_name_has_a_human_message() {
        let err = App::validate_name("123myapp").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().starts_with("Invalid app name"));
    }

    #[test]
    fn set_teams_sorts_names() {
        let mut app = App::new("myapp", "python");
        app.set_teams(&[
            Team::new("zeta", Vec::<String>::new()),
            Team::new("alpha", Vec::<String>::new()),
        ]);

        assert_eq!(app.teams, ["alpha", "zeta"]);
        assert!(app.has_team("zeta"));
    }

    #[test]
    fn grant_twice_is_a_conflict() {
        let mut app = App::new("myapp", "python");
        app.grant("cobrateam").unwrap();

        let err = app.grant("cobrateam").unwrap_err();

        assert_eq!(err.to_string(), "This team already has access to this app");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn grant_keeps_teams_sorted() {
        let mut app = App::new("myapp", "python");
        app.grant("middle").unwrap();
        app.grant("alpha").unwrap();
        app.grant("zeta").unwrap();

        assert_eq!(app.teams, ["alpha", "middle", "zeta"]);
    }

    #[test]
    fn revoke_missing_team_is_not_found() {
        let mut app = App::new("myapp", "python");
        app.grant("cobrateam").unwrap();

        let err = app.revoke("other").unwrap_err();

        assert_eq!(err.to_string(), "This team does not have access to this app");
    }

    #[test]
    fn revoke_last_team_is_forbidden() {
        let mut app = App::new("myapp", "python");
        app.grant("cobrateam").unwrap();

        let err = app.revoke("cobrateam").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(app.teams, ["cobrateam"]);
    }

    #[test]
    fn append_or_update_replaces_same_instance() {
        let mut app = App::new("myapp", "python");
        app.append_or_update(unit("myapp/0", "i-0800", UnitStatus::Pending));
        app.append_or_update(unit("myapp/1", "i-0801", UnitStatus::Pending));

        app.append_or_update(unit("myapp/0", "i-0800", UnitStatus::Started));

        assert_eq!(app.units.len(), 2);
        assert_eq!(app.units[0].status, UnitStatus::Started);
    }

    #[test]
    fn remove_units_at_is_stable() {
        let mut app = App::new("myapp", "python");
        for i in 0..5 {
            app.append_or_update(unit(&format!("myapp/{i}"), &format!("i-{i}"), UnitStatus::Started));
        }

        app.remove_units_at(&[3, 0, 42]);

        let names: Vec<&str> = app.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["myapp/1", "myapp/2", "myapp/4"]);
    }

    #[test]
    fn available_needs_a_started_unit() {
        let mut app = App::new("myapp", "python");
        assert!(!app.available());

        app.append_or_update(unit("myapp/0", "i-0", UnitStatus::Down));
        assert!(!app.available());

        app.append_or_update(unit("myapp/1", "i-1", UnitStatus::Started));
        assert!(app.available());
    }

    #[rstest]
    #[case("ktulu.mycompany.com", true)]
    #[case("ktulu-super.mycompany.com", true)]
    #[case("ktulu_super.mycompany.com", true)]
    #[case("KTULU.MYCOMPANY.COM", true)]
    #[case("ktulu", true)]
    #[case("0800.com", true)]
    #[case("", true)]
    #[case("http://ktulu.mycompany.com", false)]
    #[case("http:ktulu.mycompany.com", false)]
    #[case("/ktulu.mycompany.com", false)]
    #[case(".ktulu.mycompany.com", false)]
    #[case("-0800.com", false)]
    fn cname_rules(#[case] cname: &str, #[case] valid: bool) {
        let mut app = App::new("myapp", "python");
        app.cname = Some("old.example.com".into());

        let result = app.set_cname(cname);

        assert_eq!(result.is_ok(), valid, "{cname}");
        if !valid {
            assert_eq!(result.unwrap_err().to_string(), "Invalid cname");
            assert_eq!(app.cname.as_deref(), Some("old.example.com"));
        }
    }

    #[test]
    fn empty_cname_unsets() {
        let mut app = App::new("myapp", "python");
        app.set_cname("ktulu.mycompany.com").unwrap();

        app.set_cname("").unwrap();

        assert_eq!(app.cname, None);
    }

    #[test]
    fn hooks_are_not_serialized() {
        let mut app = App::new("myapp", "python");
        app.hooks = Some(HookConfig {
            pre_restart: vec!["pre.sh".into()],
            post_restart: vec![],
        });

        let json = serde_json::to_value(&app).unwrap();

        assert!(json.get("hooks").is_none());
        assert_eq!(json["name"], "myapp");
    }
}
