//! applier端到端场景：DDL镜像、批量flush、replay幂等、checkpoint单调

use common::model::coordinate::Coordinate;
use common::schema::column_value::ColumnValue;
use spool::checkpoint::{ConsumerCheckpoint, Phase};

use crate::fixtures::*;
use crate::mock::MockTarget;

fn iv(i: i64) -> ColumnValue {
    ColumnValue::SignedInt(i)
}

fn sv(s: &str) -> ColumnValue {
    ColumnValue::String(s.to_string())
}

const CREATE_T: &str = "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(50))";

/// S1：建表、插入、更新、删除；merge-final读为空，
/// 但引擎层历史保留了全部三次操作
#[tokio::test(flavor = "multi_thread")]
async fn test_insert_update_delete() {
    let context = scratch_context("applier_s1_test", |_| {});
    seed_live_state(&context, "d");
    write_events(
        &context,
        vec![
            ddl(4, "d", CREATE_T),
            insert(8, "d", "t", vec![vec![iv(1), sv("a")]]),
            update(12, "d", "t", vec![iv(1), sv("a")], vec![iv(1), sv("b")]),
            delete(16, "d", "t", vec![vec![iv(1), sv("b")]]),
        ],
    );

    let target = MockTarget::new();
    run_applier_until(
        context.clone(),
        "d",
        target.clone(),
        no_snapshot_factory(),
        |t| t.raw_rows("d", "t").len() >= 3,
    )
    .await
    .unwrap();

    // 表结构来自translator投影
    let create = target
        .statements
        .lock()
        .unwrap()
        .iter()
        .find(|s| s.starts_with("CREATE TABLE"))
        .cloned()
        .unwrap();
    assert!(create.contains("`id` Int32"));
    assert!(create.contains("`name` Nullable(String)"));

    // merge-final为空
    assert!(target.final_rows("d", "t", "id").is_empty());

    // 历史上三个版本都在
    let raw = target.raw_rows("d", "t");
    assert_eq!(raw.len(), 3);
    assert_eq!(raw[2]["_is_deleted"], 1);

    cleanup(&context);
}

/// S2：LIVE状态下ALTER加列，后续行带新列落地
#[tokio::test(flavor = "multi_thread")]
async fn test_ddl_during_replication() {
    let context = scratch_context("applier_s2_test", |_| {});
    seed_live_state(&context, "d");
    write_events(
        &context,
        vec![
            ddl(4, "d", CREATE_T),
            insert(8, "d", "t", vec![vec![iv(1), sv("a")]]),
            ddl(12, "d", "ALTER TABLE t ADD COLUMN age INT DEFAULT 0"),
            insert(16, "d", "t", vec![vec![iv(2), sv("c"), iv(30)]]),
        ],
    );

    let target = MockTarget::new();
    run_applier_until(
        context.clone(),
        "d",
        target.clone(),
        no_snapshot_factory(),
        |t| t.raw_rows("d", "t").len() >= 2,
    )
    .await
    .unwrap();

    let alter = target
        .statements
        .lock()
        .unwrap()
        .iter()
        .find(|s| s.contains("ADD COLUMN"))
        .cloned()
        .unwrap();
    assert!(alter.contains("`age`"));

    let rows = target.final_rows("d", "t", "id");
    assert_eq!(rows.len(), 2);
    let with_age = rows.iter().find(|r| r["id"] == 2).unwrap();
    assert_eq!(with_age["age"], 30);

    cleanup(&context);
}

/// 不变量2：全量replay后的最终状态与单次干净跑一致
#[tokio::test(flavor = "multi_thread")]
async fn test_replay_idempotence() {
    let context = scratch_context("applier_replay_test", |_| {});
    seed_live_state(&context, "d");
    write_events(
        &context,
        vec![
            ddl(4, "d", CREATE_T),
            insert(8, "d", "t", vec![vec![iv(1), sv("a")], vec![iv(2), sv("b")]]),
            update(12, "d", "t", vec![iv(1), sv("a")], vec![iv(1), sv("a2")]),
        ],
    );

    let target = MockTarget::new();
    run_applier_until(
        context.clone(),
        "d",
        target.clone(),
        no_snapshot_factory(),
        |t| t.raw_rows("d", "t").len() >= 3,
    )
    .await
    .unwrap();
    let clean: Vec<_> = target.final_rows("d", "t", "id");

    // 模拟checkpoint丢失后的整段replay：事件重放，目标端不清
    reset_consumer_state(&context, "d");
    seed_live_state(&context, "d");
    run_applier_until(
        context.clone(),
        "d",
        target.clone(),
        no_snapshot_factory(),
        |t| t.raw_rows("d", "t").len() >= 6,
    )
    .await
    .unwrap();

    let replayed = target.final_rows("d", "t", "id");
    assert_eq!(clean, replayed);
    assert_eq!(replayed.len(), 2);
    let updated = replayed.iter().find(|r| r["id"] == 1).unwrap();
    assert_eq!(updated["name"], "a2");

    cleanup(&context);
}

/// 不变量3：consumer checkpoint跨重启只进不退
#[tokio::test(flavor = "multi_thread")]
async fn test_checkpoint_monotonic() {
    let context = scratch_context("applier_ckpt_test", |_| {});
    seed_live_state(&context, "d");
    write_events(
        &context,
        vec![ddl(4, "d", CREATE_T), insert(8, "d", "t", vec![vec![iv(1), sv("a")]])],
    );

    let target = MockTarget::new();
    run_applier_until(
        context.clone(),
        "d",
        target.clone(),
        no_snapshot_factory(),
        |t| !t.raw_rows("d", "t").is_empty(),
    )
    .await
    .unwrap();

    let ckpt = ConsumerCheckpoint::new(&context.config.data_dir, "d");
    let first = ckpt.load().unwrap().unwrap();
    assert_eq!(first.coordinate, Coordinate::new(1, 8));
    assert_eq!(first.phase, Phase::Live);
    // 描述符随状态持久化
    assert_eq!(first.descriptors.len(), 1);

    // 无新事件重启，位点不动
    run_applier_for(context.clone(), "d", target.clone(), no_snapshot_factory(), 500)
        .await
        .unwrap();
    let second = ckpt.load().unwrap().unwrap();
    assert_eq!(second.coordinate, first.coordinate);

    cleanup(&context);
}

/// ignore_deletes：DELETE被略去，不建staging库，直接写live
#[tokio::test(flavor = "multi_thread")]
async fn test_ignore_deletes() {
    let context = scratch_context("applier_ignore_del_test", |c| {
        c.ignore_deletes = true;
    });
    write_events(
        &context,
        vec![
            ddl(4, "d", CREATE_T),
            insert(8, "d", "t", vec![vec![iv(1), sv("a")]]),
            delete(12, "d", "t", vec![vec![iv(1), sv("a")]]),
        ],
    );

    // resume点放在事件之前，整段事件走tail路径
    spool::checkpoint::IngestCheckpoint::new(&context.config.data_dir)
        .store(Coordinate::new(1, 0))
        .unwrap();

    let target = MockTarget::new();
    // 空源：快照无表可拷，直接进live tail
    let factory = crate::mock::MockSource::factory(vec![]);
    run_applier_until(context.clone(), "d", target.clone(), factory, |t| {
        !t.raw_rows("d", "t").is_empty()
    })
    .await
    .unwrap();

    // DELETE整体消失，行还在
    let rows = target.final_rows("d", "t", "id");
    assert_eq!(rows.len(), 1);

    // 全程没有staging库
    assert!(!target.database_names().iter().any(|n| n.ends_with("_tmp")));

    // 位点仍推进过DELETE事件
    let st = ConsumerCheckpoint::new(&context.config.data_dir, "d")
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(st.coordinate, Coordinate::new(1, 12));

    cleanup(&context);
}

/// 目标端瞬时故障：重试退避后成功，不丢批次
#[tokio::test(flavor = "multi_thread")]
async fn test_transient_target_error_retried() {
    let context = scratch_context("applier_retry_test", |_| {});
    seed_live_state(&context, "d");
    write_events(&context, vec![ddl(4, "d", CREATE_T)]);

    let target = MockTarget::new();
    // 先跑起来建好表
    run_applier_until(
        context.clone(),
        "d",
        target.clone(),
        no_snapshot_factory(),
        |t| !t.table_names("d").is_empty(),
    )
    .await
    .unwrap();

    write_events(&context, vec![insert(8, "d", "t", vec![vec![iv(7), sv("x")]])]);
    target.set_fail_writes(true);

    let ctx = context.clone();
    let tgt = target.clone();
    let runner = tokio::spawn(async move {
        run_applier_until(ctx, "d", tgt.clone(), no_snapshot_factory(), |t| {
            !t.raw_rows("d", "t").is_empty()
        })
        .await
    });

    // 第一轮重试窗口内恢复
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    target.set_fail_writes(false);
    runner.await.unwrap().unwrap();

    assert_eq!(target.final_rows("d", "t", "id").len(), 1);

    cleanup(&context);
}
