//! FakeProvisioner - テスト用・デモ用のプロビジョナ
//!
//! ユニットはメモリ上にだけ存在し、作成直後から `started` になります。
//!
//! # テスト用の機能
//! - `prepare_failure`: 次の 1 回だけ指定メソッドを失敗させる
//! - `prepare_output` / `prepare_stderr` / `prepare_chunks`: 次の
//!   `execute_command` が書き出す出力を用意する
//! - `commands` / `restarts`: 呼び出し履歴の確認

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::domain::{App, Unit, UnitStatus, unit_name};
use crate::ports::{OutputWriter, ProvisionError, Provisioner, UnitReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub app: String,
    pub cmd: String,
    pub args: Vec<String>,
}

/// One write of a prepared command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

#[derive(Default)]
struct ProvisionedApp {
    units: Vec<Unit>,
    next_index: usize,
    restarts: usize,
}

#[derive(Default)]
struct FakeState {
    apps: BTreeMap<String, ProvisionedApp>,
    failures: HashMap<&'static str, VecDeque<ProvisionError>>,
    outputs: VecDeque<Vec<OutputChunk>>,
    commands: Vec<RecordedCommand>,
}

#[derive(Default)]
pub struct FakeProvisioner {
    state: Mutex<FakeState>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call to `method` (e.g. `"provision"`, `"remove_unit"`) fails.
    pub fn prepare_failure(&self, method: &'static str, error: ProvisionError) {
        self.lock()
            .failures
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Output written to stdout by the next `execute_command`.
    pub fn prepare_output(&self, output: impl Into<Vec<u8>>) {
        self.prepare_chunks(vec![OutputChunk::Stdout(output.into())]);
    }

    /// Output written to stderr by the next `execute_command`.
    pub fn prepare_stderr(&self, output: impl Into<Vec<u8>>) {
        self.prepare_chunks(vec![OutputChunk::Stderr(output.into())]);
    }

    /// Writes the next `execute_command` makes, in order.
    pub fn prepare_chunks(&self, chunks: Vec<OutputChunk>) {
        self.lock().outputs.push_back(chunks);
    }

    pub fn commands(&self, app: &str) -> Vec<RecordedCommand> {
        self.lock()
            .commands
            .iter()
            .filter(|cmd| cmd.app == app)
            .cloned()
            .collect()
    }

    pub fn restarts(&self, app: &str) -> usize {
        self.lock().apps.get(app).map_or(0, |a| a.restarts)
    }

    pub fn units(&self, app: &str) -> Vec<Unit> {
        self.lock()
            .apps
            .get(app)
            .map(|a| a.units.clone())
            .unwrap_or_default()
    }

    pub fn is_provisioned(&self, app: &str) -> bool {
        self.lock().apps.contains_key(app)
    }

    /// Simulates the backend observing a status change.
    pub fn set_unit_status(&self, app: &str, unit: &str, status: UnitStatus) {
        if let Some(provisioned) = self.lock().apps.get_mut(app)
            && let Some(u) = provisioned.units.iter_mut().find(|u| u.name == unit)
        {
            u.status = status;
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(state: &mut FakeState, method: &'static str) -> Result<(), ProvisionError> {
        match state.failures.get_mut(method).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn create_units(app: &str, provisioned: &mut ProvisionedApp, n: usize) -> Vec<Unit> {
        (0..n)
            .map(|_| {
                let index = provisioned.next_index;
                provisioned.next_index += 1;
                let unit = Unit::new(
                    unit_name(app, index),
                    format!("i-{app}-{index:04}"),
                    format!("10.10.10.{}", index + 1),
                    UnitStatus::Started,
                );
                provisioned.units.push(unit.clone());
                unit
            })
            .collect()
    }

    fn not_provisioned() -> ProvisionError {
        ProvisionError::new("App is not provisioned.")
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(&self, app: &App) -> Result<Vec<Unit>, ProvisionError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, "provision")?;
        let provisioned = state.apps.entry(app.name.clone()).or_default();
        if provisioned.units.is_empty() {
            Self::create_units(&app.name, provisioned, 1);
        }
        Ok(provisioned.units.clone())
    }

    async fn add_units(&self, app: &App, n: usize) -> Result<Vec<Unit>, ProvisionError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, "add_units")?;
        let provisioned = state
            .apps
            .get_mut(&app.name)
            .ok_or_else(Self::not_provisioned)?;
        Ok(Self::create_units(&app.name, provisioned, n))
    }

    async fn remove_unit(&self, app: &App, unit: &str) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, "remove_unit")?;
        let provisioned = state
            .apps
            .get_mut(&app.name)
            .ok_or_else(Self::not_provisioned)?;
        let index = provisioned
            .units
            .iter()
            .position(|u| u.matches(unit))
            .ok_or_else(|| ProvisionError::new("Unit not found."))?;
        provisioned.units.remove(index);
        Ok(())
    }

    async fn destroy(&self, app: &App) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, "destroy")?;
        state.apps.remove(&app.name);
        Ok(())
    }

    async fn execute_command(
        &self,
        stdout: OutputWriter<'_>,
        stderr: OutputWriter<'_>,
        app: &App,
        cmd: &str,
        args: &[String],
    ) -> Result<(), ProvisionError> {
        let (output, result) = {
            let mut state = self.lock();
            state.commands.push(RecordedCommand {
                app: app.name.clone(),
                cmd: cmd.to_string(),
                args: args.to_vec(),
            });
            let output = state.outputs.pop_front();
            (output, Self::take_failure(&mut state, "execute_command"))
        };
        for chunk in output.unwrap_or_default() {
            let written = match &chunk {
                OutputChunk::Stdout(bytes) => stdout.write_all(bytes).await,
                OutputChunk::Stderr(bytes) => stderr.write_all(bytes).await,
            };
            written.map_err(|e| ProvisionError::new(e.to_string()))?;
        }
        result
    }

    async fn restart(&self, app: &App) -> Result<(), ProvisionError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, "restart")?;
        let provisioned = state
            .apps
            .get_mut(&app.name)
            .ok_or_else(Self::not_provisioned)?;
        provisioned.restarts += 1;
        Ok(())
    }

    async fn collect_status(&self) -> Result<Vec<UnitReport>, ProvisionError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, "collect_status")?;
        Ok(state
            .apps
            .iter()
            .flat_map(|(app, provisioned)| {
                provisioned.units.iter().map(|unit| UnitReport {
                    app: app.clone(),
                    unit: unit.clone(),
                })
            })
            .collect())
    }
}
