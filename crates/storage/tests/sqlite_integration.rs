use chrono::Duration;
use quiz_core::model::{ConfidenceHistogram, QuestionId, QuizMode, ReaskLevel, SessionReport, TopicId};
use quiz_core::time::fixed_now;
use storage::repository::{
    KeyValueStore, ReaskEntry, ReaskRepository, ReaskUpdate, SessionReportRepository, Storage,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn report(topic: &str, score: f64, minutes: i64) -> SessionReport {
    SessionReport::from_persisted(
        TopicId::new(topic),
        QuizMode::Exam,
        score,
        3,
        4,
        360,
        ConfidenceHistogram {
            low: 1,
            medium: 0,
            high: 2,
        },
        fixed_now() + Duration::minutes(minutes),
    )
    .unwrap()
}

#[tokio::test]
async fn sqlite_kv_store_round_trips() {
    let repo = connect("memdb_kv").await;

    assert_eq!(repo.get("quiz.session.copd").await.unwrap(), None);
    repo.set("quiz.session.copd", "{\"v\":1}").await.unwrap();
    repo.set("quiz.session.copd", "{\"v\":2}").await.unwrap();
    assert_eq!(
        repo.get("quiz.session.copd").await.unwrap().as_deref(),
        Some("{\"v\":2}")
    );
    repo.remove("quiz.session.copd").await.unwrap();
    assert_eq!(repo.get("quiz.session.copd").await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_reask_batch_applies_upserts_and_removals() {
    let repo = connect("memdb_reask").await;
    let topic = TopicId::new("heart-failure");
    let q1 = QuestionId::new("hf-1");
    let q2 = QuestionId::new("hf-2");

    repo.upsert_reask(&topic, &q1, ReaskEntry::new(ReaskLevel::Low, 1, fixed_now()))
        .await
        .unwrap();
    repo.apply_reask_updates(
        &topic,
        &[
            ReaskUpdate::upsert(q1.clone(), ReaskEntry::new(ReaskLevel::Medium, 2, fixed_now())),
            ReaskUpdate::upsert(q2.clone(), ReaskEntry::new(ReaskLevel::Low, 1, fixed_now())),
        ],
    )
    .await
    .unwrap();

    let entries = repo.reask_entries(&topic).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[&q1].level, ReaskLevel::Medium);
    assert_eq!(entries[&q1].attempts, 2);
    assert_eq!(entries[&q1].updated_at, fixed_now());

    repo.remove_reask(&topic, &q1).await.unwrap();
    let entries = repo.reask_entries(&topic).await.unwrap();
    assert_eq!(entries.keys().collect::<Vec<_>>(), vec![&q2]);

    assert!(repo.reask_entries(&TopicId::custom()).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_reports_are_listed_newest_first_and_pruned() {
    let repo = connect("memdb_reports").await;

    let first = repo.append_report(&report("copd", 0.5, 0)).await.unwrap();
    repo.append_report(&report("cad", 0.75, 1)).await.unwrap();
    let last = repo.append_report(&report("copd", 1.0, 2)).await.unwrap();

    let copd = repo
        .list_reports(Some(&TopicId::new("copd")), 10)
        .await
        .unwrap();
    assert_eq!(copd.len(), 2);
    assert_eq!(copd[0].id, last);
    assert_eq!(copd[1].id, first);
    assert_eq!(copd[0].report.confidence_histogram().high, 2);
    assert_eq!(copd[0].report.elapsed_seconds(), 360);

    let removed = repo.prune_reports(2).await.unwrap();
    assert_eq!(removed, 1);
    let all = repo.list_reports(None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|row| row.id != first));
}

#[tokio::test]
async fn storage_sqlite_wires_every_repository() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage?mode=memory&cache=shared")
        .await
        .expect("storage");

    storage.kv.set("k", "v").await.unwrap();
    storage
        .reask
        .upsert_reask(
            &TopicId::new("t"),
            &QuestionId::new("q"),
            ReaskEntry::new(ReaskLevel::Low, 1, fixed_now()),
        )
        .await
        .unwrap();
    storage.reports.append_report(&report("t", 0.25, 0)).await.unwrap();

    assert_eq!(storage.kv.get("k").await.unwrap().as_deref(), Some("v"));
    assert_eq!(storage.reask.reask_entries(&TopicId::new("t")).await.unwrap().len(), 1);
    assert_eq!(storage.reports.list_reports(None, 5).await.unwrap().len(), 1);
}
