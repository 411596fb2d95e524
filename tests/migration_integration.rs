use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{TimeZone, Utc};
use healthcheck::config::Config;
use healthcheck::migrate::payment_meta::billing_address_key;
use healthcheck::migrate::{DONOR_EMAIL_KEY, DONOR_ID_KEY, PaymentMetaSplitTask, recover_meta};
use healthcheck::model::{CUSTOMER_ID_META_KEY, Donation, Donor, PaymentSource};
use healthcheck::observe::{EventCategory, MemorySink};
use healthcheck::payment::PaymentApi;
use healthcheck::payment::memory::InMemoryPaymentApi;
use healthcheck::store::StoreAdapter;
use healthcheck::store::sqlite::SqliteStore;
use healthcheck::tasks::default_registry;
use healthcheck::upgrade::driver::{RunOutcome, TaskDriver};

fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn donation(store: &SqliteStore, id: u64, day: u32, pairs: &[(&str, &str)]) {
    store
        .insert_donation(
            &Donation {
                id,
                donor_id: None,
                created_at: Utc.with_ymd_and_hms(2019, 3, day, 12, 0, 0).unwrap(),
            },
            &meta(pairs),
        )
        .unwrap();
}

fn seed(store: &SqliteStore) {
    store
        .insert_donor(
            &Donor {
                id: 7,
                email: Some("grace@example.org".into()),
                payment_ids: vec![100, 101],
                external_customer_id: None,
            },
            &BTreeMap::new(),
        )
        .unwrap();
    donation(
        store,
        100,
        1,
        &[
            (
                "_give_payment_meta",
                r#"{"key":"pk_100","email":"grace@example.org","currency":"USD","user_info":{"first_name":"Grace"}}"#,
            ),
            ("_give_payment_user_ip", "192.0.2.1"),
        ],
    );
    donation(
        store,
        101,
        2,
        &[
            ("_give_payment_meta", "not json"),
            ("_give_payment_user_email", "grace@example.org"),
            (CUSTOMER_ID_META_KEY, "cus_grace"),
        ],
    );
    donation(store, 102, 3, &[(DONOR_ID_KEY, "3"), (DONOR_EMAIL_KEY, "x@example.org")]);
    donation(
        store,
        103,
        4,
        &[
            ("_give_payment_customer_id", "7"),
            ("_give_donor_billing_address1", "12 Lab Row"),
            ("_give_donor_billing_city", "Arlington"),
            ("_give_donor_billing_country", "US"),
        ],
    );
    store.insert_legacy_meta(101, "_give_payment_total", "40.00").unwrap();
    store.insert_legacy_meta(101, "_give_payment_mode", "").unwrap();
    store.insert_postmeta(102, "_give_payment_gateway", "manual").unwrap();
    store.insert_postmeta(102, DONOR_EMAIL_KEY, "old@example.org").unwrap();
    store.insert_postmeta(102, "_give_payment_meta", "{}").unwrap();
}

fn drain(driver: &TaskDriver<'_>) -> Vec<RunOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let outcome = driver.run_once().unwrap();
        let more = outcome.has_more();
        outcomes.push(outcome);
        if !more {
            return outcomes;
        }
    }
}

#[test]
fn full_catalog_repairs_records_and_sources() {
    let store = SqliteStore::open_memory().unwrap();
    seed(&store);
    let api = Rc::new(InMemoryPaymentApi::new());
    api.add_customer(
        "cus_grace",
        vec![
            PaymentSource::new("src_1", "fp"),
            PaymentSource::new("src_2", "fp"),
        ],
    );
    let shared: Rc<dyn PaymentApi> = api.clone();
    let mut config = Config::default();
    config.batch.donation_page_size = 2;
    let registry = default_registry(&config, Some(shared));
    let sink = MemorySink::default();
    let driver = TaskDriver::new(&registry, &store, &sink);

    let outcomes = drain(&driver);
    assert_eq!(outcomes.last(), Some(&RunOutcome::Idle));
    for task in registry.tasks() {
        assert!(store.get_completion(&task.id).unwrap(), "{} incomplete", task.id);
    }
    assert!(store.get_completion(recover_meta::SUPERSEDED_TASK_ID).unwrap());

    // Blob split and deprecated keys.
    let get = |id: u64, key: &str| store.get_donation_meta(id, key).unwrap();
    assert_eq!(get(100, "_give_payment_purchase_key").as_deref(), Some("pk_100"));
    assert_eq!(get(100, "_give_donor_billing_first_name").as_deref(), Some("Grace"));
    assert_eq!(get(100, "_give_payment_donor_ip").as_deref(), Some("192.0.2.1"));
    assert_eq!(get(101, DONOR_EMAIL_KEY).as_deref(), Some("grace@example.org"));
    assert_eq!(sink.count(EventCategory::Migration), 1);

    // Donor links by email; existing links are untouched.
    assert_eq!(get(100, DONOR_ID_KEY).as_deref(), Some("7"));
    assert_eq!(get(101, DONOR_ID_KEY).as_deref(), Some("7"));
    assert_eq!(get(102, DONOR_ID_KEY).as_deref(), Some("3"));
    assert_eq!(get(103, DONOR_ID_KEY).as_deref(), Some("7"));

    // Billing address carried to the donor named by the legacy customer id.
    let address = |part: &str| store.get_donor_meta(7, &billing_address_key(part, 0)).unwrap();
    assert_eq!(address("line1").as_deref(), Some("12 Lab Row"));
    assert_eq!(address("city").as_deref(), Some("Arlington"));
    assert_eq!(address("state").as_deref(), Some(""));

    // Post meta fills gaps only.
    assert_eq!(get(102, "_give_payment_gateway").as_deref(), Some("manual"));
    assert_eq!(get(102, DONOR_EMAIL_KEY).as_deref(), Some("x@example.org"));
    assert!(get(102, "_give_payment_meta").is_none());

    // Legacy recovery skips empty values.
    assert_eq!(get(101, "_give_payment_total").as_deref(), Some("40.00"));
    assert!(get(101, "_give_payment_mode").is_none());

    // Customer found through the latest donation.
    assert_eq!(api.source_ids("cus_grace"), vec!["src_1"]);
}

#[test]
fn replayed_split_page_writes_nothing_new() {
    let store = SqliteStore::open_memory().unwrap();
    seed(&store);
    let mut config = Config::default();
    config.batch.donation_page_size = 2;
    let registry = default_registry(&config, None);
    let sink = MemorySink::default();
    let driver = TaskDriver::new(&registry, &store, &sink);
    let split = registry.tasks()[0].id.clone();

    assert!(matches!(
        driver.run_task(&split).unwrap(),
        RunOutcome::Progressed { .. }
    ));
    let currency = store.get_donation_meta(100, "_give_payment_currency").unwrap();
    assert_eq!(currency.as_deref(), Some("USD"));

    // Losing the cursor mid-task makes the next run repeat the first page.
    store.delete_cursor(&split).unwrap();
    match driver.run_task(&split).unwrap() {
        RunOutcome::Progressed { result, cursor, .. } => {
            assert_eq!(result.items_seen, 2);
            assert_eq!(cursor.step, 2);
        }
        other => panic!("expected the first page again, got {other:?}"),
    }
    assert_eq!(
        store.get_donation_meta(100, "_give_payment_currency").unwrap(),
        currency
    );
    for id in [100, 101] {
        let (summary, _) = PaymentMetaSplitTask::rewrite_donation(&store, id).unwrap();
        assert_eq!(summary.written, 0, "donation {id}");
    }
}

#[test]
fn completion_survives_cursor_reset() {
    let store = SqliteStore::open_memory().unwrap();
    seed(&store);
    let registry = default_registry(&Config::default(), None);
    let sink = MemorySink::default();
    let driver = TaskDriver::new(&registry, &store, &sink);
    let split = registry.tasks()[0].id.clone();

    assert!(matches!(
        driver.run_task(&split).unwrap(),
        RunOutcome::Completed { .. }
    ));

    // An operator reset after completion does not reopen the task.
    store.delete_cursor(&split).unwrap();
    assert_eq!(
        driver.run_task(&split).unwrap(),
        RunOutcome::AlreadyComplete {
            task_id: split.clone()
        }
    );
}

#[test]
fn cleanup_without_client_fails_after_migrations() {
    let store = SqliteStore::open_memory().unwrap();
    seed(&store);
    let registry = default_registry(&Config::default(), None);
    let sink = MemorySink::default();
    let driver = TaskDriver::new(&registry, &store, &sink);

    for _ in 0..4 {
        assert!(matches!(
            driver.run_once().unwrap(),
            RunOutcome::Completed { .. }
        ));
    }
    let err = driver.run_once().unwrap_err();
    assert_eq!(err.code(), "configuration_error");
    assert!(store.get_cursor(healthcheck::reconcile::TASK_ID).unwrap().is_none());
}
