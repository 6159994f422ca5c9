use chrono::Utc;

use dealflow_core::{NewCallNote, NewExpense, OpportunityDraft};
use dealflow_engine::{ActivityReport, Period, PipelineError, PipelineSummary};
use dealflow_harness::TestWorld;
use dealflow_storage::ActivityStore;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::test]
async fn summary_follows_the_live_board() -> TestResult {
    let world = TestWorld::new().await?;
    world.pipeline.load().await?;
    let big = world
        .pipeline
        .create(OpportunityDraft::new("Excavator", "Acme").with_value_cents(18_000_000))
        .await?;
    world
        .pipeline
        .create(OpportunityDraft::new("Mini loader", "Acme").with_value_cents(2_500_000))
        .await?;

    let (new, won) = (world.status("new"), world.status("won"));
    world.pipeline.move_opportunity(big.id, &new, &won).await?;

    let summary = PipelineSummary::from_board(&world.pipeline.board());
    assert_eq!(summary.get(&won).map(|t| (t.count, t.value_cents)), Some((1, 18_000_000)));
    assert_eq!(summary.get(&new).map(|t| (t.count, t.value_cents)), Some((1, 2_500_000)));
    assert_eq!(summary.total_value_cents(), 20_500_000);
    Ok(())
}

#[tokio::test]
async fn weekly_report_counts_pipeline_activity() -> TestResult {
    let world = TestWorld::new().await?;
    world.sign_in(&world.submitter);
    world.pipeline.load().await?;

    let opp = world
        .pipeline
        .create(OpportunityDraft::new("Backhoe", "Initech"))
        .await?;
    world
        .pipeline
        .move_opportunity(opp.id, &world.status("new"), &world.status("proposal"))
        .await?;

    let rep = world.submitter.principal();
    world
        .store
        .insert_call_note(
            &rep,
            &NewCallNote {
                opportunity_id: opp.id,
                summary: "Walked the yard, wants a quote by Friday".into(),
                occurred_at: Utc::now(),
            },
        )
        .await?;
    world
        .store
        .insert_expense(
            &rep,
            &NewExpense {
                opportunity_id: Some(opp.id),
                category: "mileage".into(),
                amount_cents: 3_120,
                description: Some("site visit".into()),
                incurred_on: Utc::now().date_naive(),
            },
        )
        .await?;

    let period = Period::containing_week(Utc::now().date_naive());
    let report = ActivityReport::build(world.store.as_ref(), &world.admin.principal(), period).await?;
    assert_eq!(report.created, 1);
    assert_eq!(report.moves_into.get(&world.status("proposal")), Some(&1));
    assert_eq!(report.call_notes_by_author.get(&world.submitter.id), Some(&1));
    assert_eq!(report.expenses_by_category.get("mileage"), Some(&3_120));
    assert_eq!(report.expenses_by_owner.get(&world.submitter.id), Some(&3_120));
    Ok(())
}

#[tokio::test]
async fn report_store_failure_is_a_fetch_error() -> TestResult {
    let world = TestWorld::new().await?;
    world.store.fail_next(1);

    let period = Period::Day(Utc::now().date_naive());
    let err = ActivityReport::build(world.store.as_ref(), &world.admin.principal(), period)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Fetch { ref code, .. } if code == "unavailable"));
    Ok(())
}

#[tokio::test]
async fn report_rejects_impossible_week() -> TestResult {
    let world = TestWorld::new().await?;
    let period = Period::IsoWeek { year: 2025, week: 60 };

    let err = ActivityReport::build(world.store.as_ref(), &world.admin.principal(), period)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(world.store.call_count(), 0);
    Ok(())
}
