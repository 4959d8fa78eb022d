//! Team access and cname.

use super::Orchestrator;
use crate::domain::Team;
use crate::error::EngineError;

impl Orchestrator {
    /// Gives `team` access to the app and its repository.
    pub async fn grant(&self, name: &str, team: &str) -> Result<(), EngineError> {
        let team = self.find_team(team).await?;
        let mut app = self.get(name).await?;
        app.grant(&team.name)?;
        self.save(&app).await?;

        self.repository
            .grant_access(&[app.name.clone()], &team.users)
            .await
            .map_err(|err| EngineError::collaborator("Failed to grant access in the git server", err))?;
        tracing::info!(app = name, team = %team.name, "access granted");
        Ok(())
    }

    /// Takes access away from `team`. Repository access is only revoked
    /// for users that no remaining team still covers.
    pub async fn revoke(&self, name: &str, team: &str) -> Result<(), EngineError> {
        let team = self.find_team(team).await?;
        let mut app = self.get(name).await?;
        app.revoke(&team.name)?;
        self.save(&app).await?;

        let remaining = self.team_members(&app.teams).await?;
        let users: Vec<String> = team
            .users
            .iter()
            .filter(|user| remaining.binary_search(user).is_err())
            .cloned()
            .collect();
        if !users.is_empty() {
            self.repository
                .revoke_access(&[app.name.clone()], &users)
                .await
                .map_err(|err| {
                    EngineError::collaborator("Failed to revoke access in the git server", err)
                })?;
        }
        tracing::info!(app = name, team = %team.name, revoked = users.len(), "access revoked");
        Ok(())
    }

    /// Sets the app's cname; an empty one unsets it.
    pub async fn set_cname(&self, name: &str, cname: &str) -> Result<(), EngineError> {
        let mut app = self.get(name).await?;
        app.set_cname(cname)?;
        self.save(&app).await
    }

    async fn find_team(&self, name: &str) -> Result<Team, EngineError> {
        match self.teams.get_team(name).await {
            Ok(team) => Ok(team),
            Err(err) if err.is_not_found() => Err(EngineError::NotFound("Team not found".into())),
            Err(err) => Err(EngineError::collaborator("Failed to load team", err)),
        }
    }
}
