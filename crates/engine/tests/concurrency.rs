use std::{sync::Arc, time::Duration};

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::task::JoinSet;

use engine::{Engine, EngineError, Money, NewUser, RetryPolicy, TransactionKind};
use migration::MigratorTrait;
use uuid::Uuid;

async fn shared_engine() -> (Arc<Engine>, DatabaseConnection, std::path::PathBuf) {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();

    let path = root.join(format!("concurrency_{}.db", Uuid::new_v4()));
    let mut options = ConnectOptions::new(format!("sqlite:{}?mode=rwc", path.display()));
    options.max_connections(4).sqlx_logging(false);

    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let contended = RetryPolicy::new(40, Duration::from_millis(2), Duration::from_millis(50));
    let engine = Engine::builder()
        .database(db.clone())
        .write_retry(contended)
        .read_retry(contended)
        .build()
        .await
        .unwrap();

    (Arc::new(engine), db, path)
}

async fn register(engine: &Engine, email: &str) -> Uuid {
    let (user, _wallet) = engine
        .register_user(NewUser::new(email, "Ada", "Lovelace"))
        .await
        .unwrap();
    user.id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_concurrent_credits_serialize() {
    let (engine, db, path) = shared_engine().await;
    let user = register(&engine, "ada@example.com").await;

    let (first, second) = tokio::join!(
        {
            let engine = engine.clone();
            tokio::spawn(async move { engine.credit(user, Money::major(100)).await })
        },
        {
            let engine = engine.clone();
            tokio::spawn(async move { engine.credit(user, Money::major(100)).await })
        }
    );
    first.unwrap().unwrap();
    second.unwrap().unwrap();

    assert_eq!(engine.balance(user).await.unwrap(), Money::major(200));
    let mut entries = engine.ledger_entries(user, 10).await.unwrap();
    entries.reverse();
    let snapshots: Vec<(Money, Money)> = entries
        .iter()
        .map(|e| (e.previous_balance, e.new_balance))
        .collect();
    assert_eq!(
        snapshots,
        vec![
            (Money::ZERO, Money::major(100)),
            (Money::major(100), Money::major(200)),
        ]
    );
    assert_eq!(engine.transactions(user, 10).await.unwrap().len(), 2);

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_credits_converge() {
    let (engine, db, path) = shared_engine().await;
    let user = register(&engine, "ada@example.com").await;
    engine.credit(user, Money::new(1_001)).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let engine = engine.clone();
        tasks.spawn(async move { engine.credit(user, Money::new(2_550)).await });
    }
    let mut references = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        references.push(joined.unwrap().unwrap().reference);
    }

    assert_eq!(
        engine.balance(user).await.unwrap(),
        Money::new(1_001 + 16 * 2_550)
    );
    references.sort();
    references.dedup();
    assert_eq!(references.len(), 16);
    assert!(engine.audit_wallet(user).await.unwrap().is_consistent());

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let (engine, db, path) = shared_engine().await;
    let user = register(&engine, "ada@example.com").await;
    engine.credit(user, Money::major(1_000)).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let engine = engine.clone();
        tasks.spawn(async move { engine.debit(user, Money::major(100)).await });
    }

    let mut succeeded = 0;
    let mut refused = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => succeeded += 1,
            Err(EngineError::InsufficientFunds { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(refused, 10);
    assert_eq!(engine.balance(user).await.unwrap(), Money::ZERO);

    let audit = engine.audit_wallet(user).await.unwrap();
    assert!(audit.is_consistent(), "{:?}", audit.violations);
    assert_eq!(audit.entries, 11);

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_credits_and_debits_keep_the_chain() {
    let (engine, db, path) = shared_engine().await;
    let user = register(&engine, "ada@example.com").await;
    engine.credit(user, Money::major(100)).await.unwrap();

    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let engine = engine.clone();
        tasks.spawn(async move {
            if i % 2 == 0 {
                engine.credit(user, Money::major(50)).await
            } else {
                engine.debit(user, Money::major(70)).await
            }
        });
    }

    let mut debited = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(receipt) if receipt.kind == TransactionKind::Debit => debited += 1,
            Ok(_) => {}
            Err(EngineError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let expected = Money::major(100 + 10 * 50 - debited * 70);
    assert_eq!(engine.balance(user).await.unwrap(), expected);

    let mut entries = engine.ledger_entries(user, 1_000).await.unwrap();
    entries.reverse();
    assert_eq!(entries.first().unwrap().previous_balance, Money::ZERO);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].previous_balance, pair[0].new_balance);
    }
    assert!(entries.iter().all(|e| !e.new_balance.is_negative()));
    assert!(engine.audit_wallet(user).await.unwrap().is_consistent());

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wallets_of_different_users_do_not_interfere() {
    let (engine, db, path) = shared_engine().await;
    let mut users = Vec::new();
    for i in 0..4 {
        users.push(register(&engine, &format!("user{i}@example.com")).await);
    }

    let mut tasks = JoinSet::new();
    for &user in &users {
        for _ in 0..5 {
            let engine = engine.clone();
            tasks.spawn(async move { engine.credit(user, Money::major(10)).await });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    for &user in &users {
        assert_eq!(engine.balance(user).await.unwrap(), Money::major(50));
        assert_eq!(engine.transactions(user, 100).await.unwrap().len(), 5);
    }

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_with_the_same_email_create_one_user() {
    let (engine, db, path) = shared_engine().await;

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let engine = engine.clone();
        tasks.spawn(async move {
            engine
                .register_user(NewUser::new("ada@example.com", "Ada", "Lovelace"))
                .await
        });
    }

    let mut created = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => created += 1,
            Err(EngineError::ExistingKey(key)) => assert_eq!(key, "ada@example.com"),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(created, 1);

    drop(engine);
    drop(db);
    let _ = std::fs::remove_file(path);
}
