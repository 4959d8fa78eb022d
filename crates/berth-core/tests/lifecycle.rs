use std::sync::Arc;
use std::time::Duration;

use berth_core::domain::{EnvVar, UnitStatus};
use berth_core::impls::InMemoryStack;
use berth_core::ports::ProvisionError;
use berth_core::queue::{Action, Queue};
use berth_core::{EngineBuilder, Orchestrator};

async fn settle(orchestrator: &Orchestrator) {
    for _ in 0..500 {
        let counts = orchestrator.queue().counts_by_state().await.unwrap();
        if counts.pending() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue did not settle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn app_lifecycle_runs_through_the_workers() {
    let stack = InMemoryStack::demo().unwrap();
    stack
        .services
        .add_instance("mysql", vec![EnvVar::private("DATABASE_HOST", "10.0.0.5")]);
    let engine = EngineBuilder::new(stack.orchestrator())
        .with_default_handlers()
        .unwrap()
        .expect_actions(&Action::ALL)
        .build()
        .unwrap();
    let orchestrator = Arc::clone(&engine.orchestrator);

    orchestrator
        .create_app("chemistry", "python", 2, &[stack.team()])
        .await
        .unwrap();
    orchestrator.bind_service("mysql", "chemistry").await.unwrap();
    let workers = engine.spawn_workers();
    settle(&orchestrator).await;
    orchestrator.add_units("chemistry", 2).await.unwrap();
    settle(&orchestrator).await;

    // every unit was started with its apprc and told to the service
    assert_eq!(stack.provisioner.restarts("chemistry"), 4);
    assert_eq!(stack.services.bound_units("mysql").len(), 4);
    let app = orchestrator.get("chemistry").await.unwrap();
    assert_eq!(app.units.len(), 4);
    assert_eq!(app.env["DATABASE_HOST"].instance(), "mysql");

    for (n, expected) in [
        (5, "Cannot remove 5 units from this app, it has only 4 units."),
        (4, "Cannot remove all units from an app."),
        (0, "Cannot remove zero units."),
    ] {
        let err = orchestrator.remove_units("chemistry", n).await.unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    stack
        .provisioner
        .set_unit_status("chemistry", "chemistry/3", UnitStatus::Error);
    orchestrator.collect_status().await.unwrap();
    orchestrator.remove_units("chemistry", 2).await.unwrap();
    settle(&orchestrator).await;

    let app = orchestrator.get("chemistry").await.unwrap();
    let names: Vec<&str> = app.units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["chemistry/1", "chemistry/2"]);
    assert_eq!(
        stack.services.bound_units("mysql"),
        ["10.10.10.2", "10.10.10.3"]
    );

    orchestrator.force_destroy("chemistry").await.unwrap();
    settle(&orchestrator).await;

    assert!(orchestrator.get("chemistry").await.is_err());
    assert!(stack.storage.bucket("chemistry").is_none());
    let counts = orchestrator.queue().counts_by_state().await.unwrap();
    assert_eq!(counts.dead, 0);

    workers.shutdown_and_join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_actions_are_redelivered() {
    let stack = InMemoryStack::demo().unwrap();
    let engine = EngineBuilder::new(stack.orchestrator())
        .with_default_handlers()
        .unwrap()
        .build()
        .unwrap();
    let orchestrator = Arc::clone(&engine.orchestrator);
    orchestrator
        .create_app("myapp", "python", 1, &[stack.team()])
        .await
        .unwrap();
    // the first apprc write fails; its redelivery succeeds
    stack
        .provisioner
        .prepare_failure("execute_command", ProvisionError::new("ssh: timeout"));

    let workers = engine.spawn_workers();
    settle(&orchestrator).await;
    workers.shutdown_and_join().await;

    let counts = orchestrator.queue().counts_by_state().await.unwrap();
    assert_eq!(counts.dead, 0);
    assert_eq!(counts.deleted, 3);
    assert_eq!(stack.provisioner.restarts("myapp"), 1);
}
