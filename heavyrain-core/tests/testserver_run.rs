use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use heavyrain_core::{
    CancellationToken, ExecutorConfig, ExecutorKind, HttpProfiler, Outcome, RunPlan,
    ScenarioError, SessionFactory, build_executor, scenario_fn,
};
use heavyrain_testserver::{INDEX_BODY, TestServer};

fn factory(base_url: &str) -> anyhow::Result<SessionFactory> {
    let config = ExecutorConfig::builder(base_url)
        .timeout_secs(5.0)
        .build()?;
    Ok(SessionFactory::new(
        Arc::new(config),
        Arc::new(HttpProfiler::new()),
    )?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_users_aggregate_by_path_tag() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let factory = factory(server.base_url())?;
    let profiler = factory.profiler().clone();
    let next_id = Arc::new(AtomicU64::new(1));

    let scenario = {
        let next_id = next_id.clone();
        scenario_fn(move |s| {
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            async move {
                s.get("/").await?.assert_ok()?.assert_is_html()?;
                let user = s
                    .request(s.with().path("/users/{id}").path_arg("id", id.to_string()))
                    .await?;
                user.assert_ok()?.assert_json_has("id", &serde_json::json!(id))?;
                Ok(())
            }
        })
    };

    let plan = RunPlan {
        kind: ExecutorKind::Concurrent,
        users: 3,
        iterations: Some(9),
        ..RunPlan::default()
    };
    let summary = build_executor(&plan, scenario, factory)?
        .execute(&CancellationToken::new())
        .await;

    anyhow::ensure!(summary.iterations == 9, "summary={summary:?}");
    anyhow::ensure!(summary.failed_iterations == 0, "summary={summary:?}");
    anyhow::ensure!(
        profiler.exception_count() == 0,
        "exceptions={:?}",
        profiler.exceptions()
    );

    let groups = profiler.aggregate();
    let keys: Vec<String> = groups.iter().map(|g| g.key.to_string()).collect();
    anyhow::ensure!(keys == vec!["GET-/", "GET-/users/{id}"], "keys={keys:?}");
    anyhow::ensure!(groups.iter().all(|g| g.stats.count == 9));
    anyhow::ensure!(groups.iter().all(|g| g.stats.min <= g.stats.median));
    anyhow::ensure!(groups.iter().all(|g| g.stats.median <= g.stats.max));

    anyhow::ensure!(server.stats().requests_total() == 18);
    anyhow::ensure!(server.stats().saw_request_id() == 18);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn assertion_failures_are_data_not_errors() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let factory = factory(server.base_url())?;
    let profiler = factory.profiler().clone();

    let scenario = scenario_fn(|s| async move {
        let res = s.get("/").await?;
        check_index_body(res.text() == Some(INDEX_BODY))?;
        // An HTML page is not JSON; this aborts the iteration.
        res.json()?;
        s.get("/never-reached").await?;
        Ok(())
    });

    let plan = RunPlan {
        kind: ExecutorKind::Sync,
        iterations: Some(2),
        ..RunPlan::default()
    };
    let summary = build_executor(&plan, scenario, factory)?
        .execute(&CancellationToken::new())
        .await;

    anyhow::ensure!(summary.failed_iterations == 2);
    let exceptions = profiler.exceptions();
    anyhow::ensure!(exceptions.len() == 2);
    anyhow::ensure!(matches!(exceptions[0].outcome, Outcome::AssertionFailure(_)));
    anyhow::ensure!(exceptions[0].path() == Some("/"));
    anyhow::ensure!(
        exceptions[0].body_excerpt.as_deref() == Some(INDEX_BODY),
        "excerpt={:?}",
        exceptions[0].body_excerpt
    );
    anyhow::ensure!(server.stats().requests_total() == 2);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn connection_refused_is_recorded_once() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let base_url = server.base_url().to_string();
    server.shutdown().await;

    let factory = factory(&base_url)?;
    let profiler = factory.profiler().clone();
    let scenario = scenario_fn(|s| async move {
        s.get("/json").await?.assert_ok()?;
        Ok(())
    });

    let summary = build_executor(&RunPlan::default(), scenario, factory)?
        .execute(&CancellationToken::new())
        .await;

    anyhow::ensure!(summary.failed_iterations == 1, "summary={summary:?}");
    let results = profiler.all_results();
    anyhow::ensure!(results.len() == 1);
    anyhow::ensure!(matches!(results[0].outcome, Outcome::TransportFailure(_)));
    anyhow::ensure!(profiler.exceptions().is_empty());
    Ok(())
}

fn check_index_body(ok: bool) -> Result<(), ScenarioError> {
    if ok {
        Ok(())
    } else {
        Err(ScenarioError::msg("unexpected index body"))
    }
}
