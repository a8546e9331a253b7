// ABOUTME: Fleet-wide uptest sweep, run on a schedule rather than after a deploy.
// ABOUTME: Checks every instance on every active host and stores the run.

use crate::events::{Event, tag};
use crate::model::TestRun;

use super::uptest::check_instances;
use super::{FleetSnapshot, SwarmContext, SwarmError};

const SWEEP_TITLE: &str = "Scheduled uptests";

/// Check every instance the fleet reports, whichever swarm it belongs to.
/// Failures are reported through the event sink, not as an error.
pub async fn uptest_all(ctx: &SwarmContext) -> Result<TestRun, SwarmError> {
    let mut run = TestRun::start();
    let snapshot = FleetSnapshot::capture(ctx).await?;
    let results = check_instances(ctx, &snapshot.hosts, &snapshot.instances).await?;
    run.finish(results);

    tracing::info!(
        run = run.id.as_str(),
        instances = run.results.len(),
        failed = run.failures().count(),
        "uptest sweep finished"
    );
    ctx.store.save_test_run(run.clone()).await?;

    if run.has_failures() {
        ctx.publish(
            Event::new(SWEEP_TITLE, run.format_failures()).tags(&[tag::SCHEDULED, tag::UPTEST, tag::FAILED]),
        );
    } else {
        ctx.publish(
            Event::new(SWEEP_TITLE, format!("{} instances passed", run.results.len()))
                .tags(&[tag::SCHEDULED, tag::UPTEST]),
        );
    }

    Ok(run)
}
