//! InMemoryServiceCatalog - サービスインスタンスのカタログ（開発用）

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::{App, EnvVar, Unit};
use crate::ports::{PortError, ServiceCatalog};

#[derive(Default, Clone)]
struct Instance {
    envs: Vec<EnvVar>,
    apps: BTreeSet<String>,
    /// unit ips currently bound
    units: BTreeSet<String>,
    unit_binds: usize,
    unit_unbinds: usize,
}

#[derive(Default)]
pub struct InMemoryServiceCatalog {
    instances: Mutex<BTreeMap<String, Instance>>,
}

impl InMemoryServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance that exposes `envs` to apps bound to it.
    pub fn add_instance(&self, name: &str, envs: Vec<EnvVar>) {
        self.lock().insert(
            name.to_string(),
            Instance {
                envs,
                ..Instance::default()
            },
        );
    }

    /// Ips of the units the instance was told about.
    pub fn bound_units(&self, instance: &str) -> Vec<String> {
        self.lock()
            .get(instance)
            .map(|i| i.units.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `(binds, unbinds)` of units seen by the instance.
    pub fn unit_calls(&self, instance: &str) -> (usize, usize) {
        self.lock()
            .get(instance)
            .map_or((0, 0), |i| (i.unit_binds, i.unit_unbinds))
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Instance>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn missing(instance: &str) -> PortError {
    PortError::NotFound(format!("service instance {instance}"))
}

#[async_trait]
impl ServiceCatalog for InMemoryServiceCatalog {
    async fn instances_for_app(&self, app: &str) -> Result<Vec<String>, PortError> {
        Ok(self
            .lock()
            .iter()
            .filter(|(_, instance)| instance.apps.contains(app))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn bind_app(&self, instance: &str, app: &App) -> Result<Vec<EnvVar>, PortError> {
        let mut instances = self.lock();
        let entry = instances.get_mut(instance).ok_or_else(|| missing(instance))?;
        entry.apps.insert(app.name.clone());
        Ok(entry.envs.clone())
    }

    async fn unbind_app(&self, instance: &str, app: &App) -> Result<(), PortError> {
        let mut instances = self.lock();
        let entry = instances.get_mut(instance).ok_or_else(|| missing(instance))?;
        if !entry.apps.remove(&app.name) {
            return Err(PortError::NotFound(format!(
                "app {} is not bound to {instance}",
                app.name
            )));
        }
        Ok(())
    }

    async fn bind_unit(&self, instance: &str, _app: &App, unit: &Unit) -> Result<(), PortError> {
        let mut instances = self.lock();
        let entry = instances.get_mut(instance).ok_or_else(|| missing(instance))?;
        entry.units.insert(unit.ip.clone());
        entry.unit_binds += 1;
        Ok(())
    }

    async fn unbind_unit(&self, instance: &str, _app: &str, unit_ip: &str) -> Result<(), PortError> {
        let mut instances = self.lock();
        let entry = instances.get_mut(instance).ok_or_else(|| missing(instance))?;
        entry.units.remove(unit_ip);
        entry.unit_unbinds += 1;
        Ok(())
    }
}
