//! End-to-end scenarios over composed operators and CSV files.

mod test_data_gen;

use std::sync::Arc;

use reltab_core::prelude::*;
use reltab_io::{write_csv, CsvSource};
use reltab_operators::map::FieldRule;
use reltab_operators::{
    distinct, fold, interval_lookup, intersection, select, select_expr, select_field, sort, FieldMap,
    IntervalSpec,
};
use test_data_gen::{create_temp_spill_dir, table};

#[test]
fn select_by_field_value() {
    let t = table(&["foo", "bar"], vec![row!["a", 4], row!["a", 2], row!["b", 1]]);
    assert_eq!(
        to_rows(&select_field(t, "foo", |v| v.as_str() == Some("a"))).unwrap(),
        vec![row!["foo", "bar"], row!["a", 4], row!["a", 2]]
    );
}

#[test]
fn interval_search_respects_include_stop() {
    let t = table(
        &["start", "stop", "name"],
        vec![row![1, 4, "foo"], row![3, 7, "bar"], row![4, 9, "baz"]],
    );
    let half_open = interval_lookup(t.as_ref(), &IntervalSpec::default(), Some("name".into())).unwrap();
    assert_eq!(half_open.search(2, 4), vec![&Value::from("foo"), &Value::from("bar")]);

    let inclusive = interval_lookup(
        t.as_ref(),
        &IntervalSpec::default().include_stop(true),
        Some("name".into()),
    )
    .unwrap();
    assert_eq!(
        inclusive.search(2, 4),
        vec![&Value::from("foo"), &Value::from("bar"), &Value::from("baz")]
    );
}

#[test]
fn fold_sums_per_key() {
    let t = table(&["id", "n"], vec![row![1, 3], row![1, 5], row![2, 4]]);
    let summed = fold(t, "id", "n", |a, b| {
        Ok(Value::Int(a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0)))
    });
    assert_eq!(data_rows(&summed).unwrap(), vec![row![1, 8], row![2, 4]]);
}

#[test]
fn csv_pipeline_round_trip() {
    let dir = create_temp_spill_dir();
    let input = dir.path().join("orders.csv");
    std::fs::write(
        &input,
        "customer,amount\nbob,12\nalice,7.5\nbob,3\ncarol,40\nalice,7.5\n",
    )
    .unwrap();

    let orders = Arc::new(CsvSource::new(&input).infer_types(true));
    let pipeline = sort(
        distinct(select_expr(orders, "{amount} > 5").unwrap().into_ref()).into_ref(),
        "customer",
    );

    let output = dir.path().join("out.csv");
    assert_eq!(write_csv(&pipeline, &output).unwrap(), 3);
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "customer,amount\nalice,7.5\nbob,12\ncarol,40\n"
    );

    let back = CsvSource::new(&output).infer_types(true);
    assert_eq!(data_rows(&back).unwrap(), data_rows(&pipeline).unwrap());
}

#[test]
fn composed_operators_are_reiterable() {
    let a = table(&["k"], (0..50).map(|i| row![i % 7]).collect());
    let b = table(&["k"], (0..20).map(|i| row![i % 5]).collect());
    let pipeline = select(intersection(a, b).into_ref(), |r| r["k"].as_i64() != Some(3));
    let first = to_rows(&pipeline).unwrap();
    assert_eq!(to_rows(&pipeline).unwrap(), first);
    assert_eq!(pipeline.name(), "select");
}

#[test]
fn field_map_error_policies() {
    let t = table(&["x"], vec![row![1], row!["oops"], row![3]]);
    let double = FieldRule::convert("x", |v| {
        v.as_i64()
            .map(|i| Value::Int(i * 2))
            .ok_or_else(|| Error::value(format!("not a number: {v}")))
    });

    let substituted = FieldMap::new(Arc::clone(&t))
        .field("y", double.clone())
        .error_value(Value::Int(-1));
    assert_eq!(
        data_rows(&substituted).unwrap(),
        vec![row![2], row![-1], row![6]]
    );

    let strict = FieldMap::new(t)
        .field("y", double)
        .fail_on_error(FailOnError::Propagate);
    assert!(data_rows(&strict).is_err());
}

#[test]
fn config_loads_from_partial_json() {
    let cfg: EngineConfig =
        serde_json::from_str(r#"{"buffer_rows": 5, "fail_on_error": "propagate"}"#).unwrap();
    assert_eq!(cfg.buffer_rows, 5);
    assert_eq!(cfg.fail_on_error, FailOnError::Propagate);
    assert_eq!(cfg.merge_fan_in, EngineConfig::default().merge_fan_in);
    cfg.validate().unwrap();
}
