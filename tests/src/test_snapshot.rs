//! 快照 + tail + swap的端到端场景（S3/S6的mock版）

use common::schema::column_value::ColumnValue;
use clickhouse::target::TargetStore;

use crate::fixtures::*;
use crate::mock::{MockSource, MockTarget};

const CREATE_USERS: &str =
    "CREATE TABLE `users` (`id` int NOT NULL, `name` varchar(50) DEFAULT NULL, PRIMARY KEY (`id`))";

fn source_rows(n: i64) -> Vec<Vec<Option<String>>> {
    (1..=n)
        .map(|i| vec![Some(i.to_string()), Some(format!("user{}", i))])
        .collect()
}

/// 快照into staging，tail覆盖写，完成后swap为live
#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_then_tail_then_swap() {
    let context = scratch_context("snapshot_swap_test", |c| {
        c.initial_replication_threads = 4;
    });

    // 快照开始后到达的live更新（位点 >= C₀，必然覆盖快照版本）
    write_events(
        &context,
        vec![update(
            8,
            "d",
            "users",
            vec![ColumnValue::SignedInt(1), ColumnValue::String("user1".to_string())],
            vec![ColumnValue::SignedInt(1), ColumnValue::String("live1".to_string())],
        )],
    );
    // resume点C₀固定在更新事件之前
    spool::checkpoint::IngestCheckpoint::new(&context.config.data_dir)
        .store(common::model::coordinate::Coordinate::new(1, 4))
        .unwrap();

    let target = MockTarget::new();
    let factory = MockSource::factory(vec![(
        "users".to_string(),
        CREATE_USERS.to_string(),
        source_rows(100),
    )]);

    run_applier_until(context.clone(), "d", target.clone(), factory, |t| {
        t.database_names().iter().any(|n| n.starts_with("d_old_") || n == "d")
            && !t.database_names().iter().any(|n| n == "d_tmp")
    })
    .await
    .unwrap();

    // swap完成：live库叫d，staging消失
    let names = target.database_names();
    assert!(names.contains(&"d".to_string()));
    assert!(!names.contains(&"d_tmp".to_string()));

    // 快照行齐全，被live事件覆盖的行取后值
    let rows = target.final_rows("d", "users", "id");
    assert_eq!(rows.len(), 100);
    let updated = rows.iter().find(|r| r["id"] == 1).unwrap();
    assert_eq!(updated["name"], "live1");
    let untouched = rows.iter().find(|r| r["id"] == 50).unwrap();
    assert_eq!(untouched["name"], "user50");

    cleanup(&context);
}

/// S6：上一轮留下的stale live库在swap时被让位成d_old_*
#[tokio::test(flavor = "multi_thread")]
async fn test_swap_demotes_stale_database() {
    let context = scratch_context("snapshot_stale_test", |_| {});

    let target = MockTarget::new();
    // 残留的旧d
    target.execute("CREATE DATABASE IF NOT EXISTS `d`").await.unwrap();
    target
        .execute("CREATE TABLE IF NOT EXISTS `d`.`users` (`id` Int32)")
        .await
        .unwrap();
    target
        .insert_rows(
            "d",
            "users",
            vec![serde_json::json!({"id": 999, "name": "stale", "_version": 1, "_is_deleted": 0})],
        )
        .await
        .unwrap();

    let factory = MockSource::factory(vec![(
        "users".to_string(),
        CREATE_USERS.to_string(),
        source_rows(3),
    )]);

    run_applier_until(context.clone(), "d", target.clone(), factory, |t| {
        t.database_names().iter().any(|n| n.starts_with("d_old_"))
    })
    .await
    .unwrap();

    let names = target.database_names();
    assert!(names.iter().any(|n| n.starts_with("d_old_")));
    assert!(names.contains(&"d".to_string()));
    assert!(!names.contains(&"d_tmp".to_string()));

    // stale行在新d里不可见
    let rows = target.final_rows("d", "users", "id");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["id"] != 999));

    // 旧库整体挪进了d_old_*
    let old = names.iter().find(|n| n.starts_with("d_old_")).unwrap();
    let stale = target.final_rows(old, "users", "id");
    assert_eq!(stale.len(), 1);

    cleanup(&context);
}

/// 分片中断后从key checkpoint续传：预置进度文件，
/// 已拷过的区段不会重复插入
#[tokio::test(flavor = "multi_thread")]
async fn test_shard_resume_from_checkpoint() {
    let context = scratch_context("snapshot_resume_test", |_| {});

    // 伪造"分片0已拷到id=2"的进度
    let dir = std::path::PathBuf::from(&context.config.data_dir)
        .join("snapshot")
        .join("d");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("users.0.json"),
        serde_json::to_vec(&serde_json::json!({"last_key": ["2"], "done": false})).unwrap(),
    )
    .unwrap();

    let target = MockTarget::new();
    let factory = MockSource::factory(vec![(
        "users".to_string(),
        CREATE_USERS.to_string(),
        source_rows(5),
    )]);

    run_applier_until(context.clone(), "d", target.clone(), factory, |t| {
        t.database_names().iter().any(|n| n == "d")
    })
    .await
    .unwrap();

    // id 1、2在checkpoint之前，不再拷贝
    let rows = target.final_rows("d", "users", "id");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["id"] != 1 && r["id"] != 2));

    cleanup(&context);
}
