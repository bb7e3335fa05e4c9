mod common;

use common::{FakeDriver, Reply};
use singlestoredb::driver::{RawColumn, ResultSetData, ScrollMode};
use singlestoredb::field_type;
use singlestoredb::prelude::*;

fn numbers(driver: &FakeDriver) {
    driver.rows(
        "SELECT n, label FROM numbers",
        vec![
            RawColumn::new("n", field_type::LONG),
            RawColumn::new("label", field_type::VAR_STRING),
        ],
        vec![
            vec![Value::Text("1".into()), Value::Text("one".into())],
            vec![Value::Text("2".into()), Value::Text("two".into())],
            vec![Value::Text("3".into()), Value::Text("three".into())],
        ],
    );
}

#[tokio::test]
async fn execute_resets_position_and_describes_columns() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;

    assert_eq!(cur.rownumber(), None);
    assert_eq!(cur.state(), CursorState::Idle);

    cur.execute("SELECT n, label FROM numbers", None).await?;
    assert_eq!(cur.rownumber(), Some(0));
    assert_eq!(cur.state(), CursorState::Active);
    let names: Vec<_> = cur
        .description()
        .unwrap()
        .iter()
        .map(|d| d.name.clone())
        .collect();
    assert_eq!(names, vec!["n", "label"]);

    let first = cur.fetchone().await?.unwrap();
    assert_eq!(
        first.as_tuple().unwrap(),
        &[Value::Int(1), Value::Text("one".into())]
    );
    assert_eq!(cur.rownumber(), Some(1));

    let rest = cur.fetchall().await?;
    assert_eq!(rest.len(), 2);
    assert_eq!(cur.rownumber(), Some(3));
    assert!(cur.fetchone().await?.is_none());
    assert_eq!(cur.rowcount()?, 3);
    Ok(())
}

#[tokio::test]
async fn statements_without_rows_have_no_description() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    driver.reply(
        "INSERT INTO t VALUES (?)",
        Reply::Sets(vec![ResultSetData::affected(1, Some(17))]),
    );
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;

    cur.execute(
        "INSERT INTO t VALUES (:1)",
        Some(Params::from(vec![Value::Int(5)])),
    )
    .await?;
    assert!(cur.description().is_none());
    assert_eq!(cur.state(), CursorState::Idle);
    assert_eq!(cur.rownumber(), Some(0));
    assert_eq!(cur.rowcount()?, 1);
    assert_eq!(cur.lastrowid()?, Some(17));
    assert!(cur.fetchall().await?.is_empty());

    let log = driver.log();
    assert_eq!(log[0].0, "INSERT INTO t VALUES (?)");
    assert_eq!(log[0].1, Some(Params::Positional(vec![Value::Int(5)])));
    Ok(())
}

#[tokio::test]
async fn named_params_are_bound_into_driver_style() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;

    cur.execute(
        "UPDATE t SET a = :a WHERE id = :id AND note = ':a'",
        Some(Params::named([("a", Value::from("x")), ("id", Value::Int(3))])),
    )
    .await?;
    let log = driver.log();
    assert_eq!(log[0].0, "UPDATE t SET a = ? WHERE id = ? AND note = ':a'");
    assert_eq!(
        log[0].1,
        Some(Params::Positional(vec![Value::from("x"), Value::Int(3)]))
    );

    let err = cur
        .execute("SELECT :missing", Some(Params::named([("id", 1)])))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    Ok(())
}

#[tokio::test]
async fn sql_without_params_is_sent_verbatim() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT '%s', ':x', 100 % 7", None).await?;
    assert_eq!(driver.statements(), vec!["SELECT '%s', ':x', 100 % 7"]);
    Ok(())
}

#[tokio::test]
async fn fetchmany_of_one_never_repeats_a_row() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT n, label FROM numbers", None).await?;

    let mut seen = Vec::new();
    loop {
        let batch = cur.fetchmany(Some(1)).await?;
        if batch.is_empty() {
            break;
        }
        assert_eq!(batch.len(), 1);
        seen.push(batch[0].get_by_index(0).cloned().unwrap());
    }
    assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(cur.rownumber(), Some(3));
    Ok(())
}

#[tokio::test]
async fn fetchmany_defaults_to_arraysize() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.arraysize = 2;
    cur.execute("SELECT n, label FROM numbers", None).await?;

    assert_eq!(cur.fetchmany(None).await?.len(), 2);
    assert_eq!(cur.fetchmany(None).await?.len(), 1);
    assert!(cur.fetchmany(None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn result_formats_shape_rows() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    let conn = common::connect(&driver, ResultFormat::Dict).await?;
    let mut cur = conn.cursor()?;
    assert_eq!(cur.results_format(), ResultFormat::Dict);

    cur.execute("SELECT n, label FROM numbers", None).await?;
    let row = cur.fetchone().await?.unwrap();
    assert!(matches!(row, Row::Dict(_)));
    assert_eq!(row.get("n"), Some(&Value::Int(1)));
    assert_eq!(row.get("label"), Some(&Value::Text("one".into())));

    cur.set_results_format(ResultFormat::NamedTuple);
    let rows = cur.fetchall().await?;
    assert_eq!(rows[0].get("label"), Some(&Value::Text("two".into())));
    assert_eq!(rows[1].get_by_index(0), Some(&Value::Int(3)));
    Ok(())
}

#[tokio::test]
async fn converters_decode_by_column_type() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    driver.rows(
        "SELECT * FROM typed",
        vec![
            RawColumn::new("d", field_type::DATE),
            RawColumn::new("s", field_type::STRING).with_flags(field_type::flags::SET),
            RawColumn::new("j", field_type::JSON),
            RawColumn::new("f", field_type::DOUBLE),
        ],
        vec![vec![
            Value::Text("2024-02-29".into()),
            Value::Text("b,a".into()),
            Value::Text(r#"{"k": [1, 2]}"#.into()),
            Value::Null,
        ]],
    );
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT * FROM typed", None).await?;
    let values = cur.fetchone().await?.unwrap().into_values().unwrap();

    assert_eq!(
        values[0].as_date(),
        chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
    );
    let set = values[1].as_set().unwrap();
    assert!(set.contains("a") && set.contains("b"));
    assert_eq!(
        values[2].as_json(),
        Some(&serde_json::json!({"k": [1, 2]}))
    );
    assert_eq!(values[3], Value::Null);
    Ok(())
}

#[tokio::test]
async fn bad_values_surface_as_data_errors() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    driver.rows(
        "SELECT n FROM broken",
        vec![RawColumn::new("n", field_type::LONGLONG)],
        vec![vec![Value::Text("not a number".into())]],
    );
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT n FROM broken", None).await?;
    let err = cur.fetchall().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Data);
    Ok(())
}

#[tokio::test]
async fn nextset_walks_sets_and_ends_with_false() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    driver.reply(
        "CALL two_sets()",
        Reply::Sets(vec![
            ResultSetData::rows(
                vec![RawColumn::new("a", field_type::LONG)],
                vec![vec![Value::Int(1)]],
            ),
            ResultSetData::rows(
                vec![RawColumn::new("b", field_type::VAR_STRING)],
                vec![vec![Value::from("x")], vec![Value::from("y")]],
            ),
        ]),
    );
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.callproc("two_sets", None).await?;
    assert_eq!(driver.statements(), vec!["CALL two_sets()"]);
    assert_eq!(cur.fetchall().await?.len(), 1);

    assert!(cur.nextset().await?);
    assert_eq!(cur.rownumber(), Some(0));
    assert_eq!(cur.description().unwrap()[0].name, "b");
    assert_eq!(cur.fetchall().await?.len(), 2);

    assert!(!cur.nextset().await?);
    assert_eq!(cur.rownumber(), None);
    assert!(cur.description().is_none());
    assert!(!cur.nextset().await?);
    Ok(())
}

#[tokio::test]
async fn failure_in_a_later_statement_surfaces_at_nextset() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    driver.reply(
        "SELECT a FROM t; SELECT * FROM missing",
        Reply::SetsThenFail(
            vec![ResultSetData::rows(
                vec![RawColumn::new("a", field_type::LONG)],
                vec![vec![Value::Int(1)], vec![Value::Int(2)]],
            )],
            1146,
            "Table 'missing' doesn't exist".to_string(),
        ),
    );
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT a FROM t; SELECT * FROM missing", None).await?;
    assert_eq!(cur.fetchall().await?.len(), 2);

    let err = cur.nextset().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert_eq!(err.errno(), Some(1146));
    assert!(!cur.nextset().await?);
    Ok(())
}

#[tokio::test]
async fn no_result_set_signal_is_not_an_error() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    driver.nextset_errors(ER_NO_RESULT_SET);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("DELETE FROM t", None).await?;
    assert!(!cur.nextset().await?);
    Ok(())
}

#[tokio::test]
async fn other_nextset_errors_propagate_translated() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    driver.nextset_errors(1146);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT 1", None).await?;
    let err = cur.nextset().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert_eq!(err.errno(), Some(1146));
    Ok(())
}

#[tokio::test]
async fn executemany_runs_one_set_per_nextset() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;

    let sets = vec![
        Params::from(vec![Value::Int(1)]),
        Params::from(vec![Value::Int(2)]),
        Params::from(vec![Value::Int(3)]),
    ];
    cur.executemany("INSERT INTO t VALUES (:1)", sets).await?;
    assert_eq!(driver.log().len(), 1);
    assert_eq!(cur.rownumber(), Some(0));

    assert!(cur.nextset().await?);
    assert_eq!(cur.rownumber(), Some(0));
    assert!(cur.nextset().await?);
    assert_eq!(cur.rownumber(), Some(0));
    assert_eq!(driver.log().len(), 3);
    assert!(!cur.nextset().await?);
    assert_eq!(cur.rownumber(), None);
    assert_eq!(cur.state(), CursorState::ExhaustedMany);

    let sent: Vec<_> = driver.log().into_iter().map(|(_, p)| p).collect();
    assert_eq!(
        sent,
        vec![
            Some(Params::Positional(vec![Value::Int(1)])),
            Some(Params::Positional(vec![Value::Int(2)])),
            Some(Params::Positional(vec![Value::Int(3)])),
        ]
    );

    cur.execute("SELECT 1", None).await?;
    assert_eq!(cur.state(), CursorState::Idle);
    Ok(())
}

#[tokio::test]
async fn executemany_rejects_mixed_sets_before_running() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    let sets = vec![
        Params::from(vec![Value::Int(1)]),
        Params::named([("a", 2)]),
    ];
    let err = cur
        .executemany("INSERT INTO t VALUES (:1)", sets)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert!(driver.log().is_empty());

    cur.executemany("TRUNCATE t", Vec::new()).await?;
    assert_eq!(driver.statements(), vec!["TRUNCATE t"]);
    Ok(())
}

#[tokio::test]
async fn executemany_with_empty_first_set_checks_every_set() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;

    let sets = vec![
        Params::Positional(Vec::new()),
        Params::from(vec![Value::Int(2)]),
    ];
    let err = cur
        .executemany("INSERT INTO t VALUES (:1)", sets)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    assert!(driver.log().is_empty());
    assert!(!cur.nextset().await?);

    // Sets without values still run once each.
    let sets = vec![Params::Positional(Vec::new()), Params::Positional(Vec::new())];
    cur.executemany("INSERT INTO t VALUES (1)", sets).await?;
    assert!(cur.nextset().await?);
    assert!(!cur.nextset().await?);
    assert_eq!(driver.log().len(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_execute_leaves_cursor_open() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    driver.fail("INSERT INTO t VALUES (1)", 1062, "Duplicate entry '1'");
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT n, label FROM numbers", None).await?;

    let err = cur
        .execute("INSERT INTO t VALUES (1)", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert_eq!(err.errno(), Some(1062));
    assert!(cur.description().is_none());
    assert_eq!(cur.state(), CursorState::Idle);

    cur.execute("SELECT n, label FROM numbers", None).await?;
    assert_eq!(cur.fetchall().await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn scroll_moves_rownumber() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT n, label FROM numbers", None).await?;

    cur.scroll(2, ScrollMode::Absolute).await?;
    assert_eq!(cur.rownumber(), Some(2));
    let row = cur.fetchone().await?.unwrap();
    assert_eq!(row.get_by_index(0), Some(&Value::Int(3)));

    cur.scroll(-2, ScrollMode::Relative).await?;
    assert_eq!(cur.rownumber(), Some(1));

    let err = cur.scroll(10, ScrollMode::Relative).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);
    Ok(())
}

#[tokio::test]
async fn closed_cursor_rejects_everything() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT n, label FROM numbers", None).await?;
    cur.close().await?;
    assert_eq!(cur.state(), CursorState::Closed);
    assert!(!cur.is_connected().await);
    assert!(cur.connection().is_none());

    let errors = vec![
        cur.execute("SELECT 1", None).await.unwrap_err(),
        cur.executemany("SELECT 1", Vec::new()).await.unwrap_err(),
        cur.callproc("p", None).await.unwrap_err(),
        cur.fetchone().await.unwrap_err(),
        cur.fetchmany(Some(2)).await.unwrap_err(),
        cur.fetchall().await.unwrap_err(),
        cur.next_row().await.unwrap_err(),
        cur.nextset().await.unwrap_err(),
        cur.scroll(0, ScrollMode::Absolute).await.unwrap_err(),
        cur.rowcount().unwrap_err(),
        cur.lastrowid().unwrap_err(),
        cur.setinputsizes(&[]).unwrap_err(),
        cur.setoutputsize(1, None).unwrap_err(),
        cur.close().await.unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.kind(), ErrorKind::Interface, "{err}");
        assert_eq!(err.errno(), Some(ER_CLOSED), "{err}");
    }
    Ok(())
}

#[tokio::test]
async fn cursor_outliving_its_connection_closes_quietly() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    numbers(&driver);
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;
    cur.execute("SELECT n, label FROM numbers", None).await?;

    conn.close().await?;
    drop(conn);

    let err = cur.fetchone().await.unwrap_err();
    assert!(err.is_closed());
    assert!(!cur.is_connected().await);
    cur.close().await?;
    assert_eq!(cur.state(), CursorState::Closed);
    Ok(())
}

#[tokio::test]
async fn procedure_names_are_validated() -> Result<(), DbError> {
    let driver = FakeDriver::new();
    let conn = common::connect(&driver, ResultFormat::Tuple).await?;
    let mut cur = conn.cursor()?;

    let err = cur.callproc("p; DROP TABLE t", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);

    cur.callproc("add_user", Some(vec![Value::from("ann"), Value::Int(30)]))
        .await?;
    let log = driver.log();
    assert_eq!(log[0].0, "CALL add_user(?, ?)");
    assert_eq!(
        log[0].1,
        Some(Params::Positional(vec![Value::from("ann"), Value::Int(30)]))
    );
    Ok(())
}
