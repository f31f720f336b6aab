#[path = "common/mod.rs"]
mod common;

use common::*;
use modalytics::{
    build_star, calendar_rows, parse_date, write_calendar, CalendarRow, Layout, OutputFormat, SampleError, Sampler,
    DEFAULT_CALENDAR_END, DEFAULT_CALENDAR_START,
};
use std::collections::BTreeSet;
use std::path::Path;

#[test]
fn calendar_covers_the_range_inclusively() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("dims").join("d_date.csv");

    let n = write_calendar(&out, parse_date("2020-02-27").unwrap(), parse_date("2020-03-02").unwrap()).unwrap();
    assert_eq!(n, 5);

    let (headers, rows) = read_csv(&out);
    assert_eq!(headers, vec!["datekey", "fulldate", "year", "month", "monthname", "week", "day"]);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[2], vec!["20200229", "2020-02-29", "2020", "2", "February", "9", "29"]);
    assert_eq!(rows[4][0], "20200302");
    assert_eq!(rows[4][4], "March");
}

#[test]
fn calendar_iso_weeks_cross_year_boundaries() {
    let rows = calendar_rows(parse_date("2018-12-31").unwrap(), parse_date("2021-01-03").unwrap()).unwrap();
    let first = &rows[0];
    assert_eq!((first.datekey, first.week), (20181231, 1));
    let last = rows.last().unwrap();
    assert_eq!((last.datekey, last.week), (20210103, 53));
}

#[test]
fn default_calendar_range() {
    let rows = calendar_rows(DEFAULT_CALENDAR_START, DEFAULT_CALENDAR_END).unwrap();
    assert_eq!(rows.first().map(|r| r.datekey), Some(20180920));
    assert_eq!(rows.last().map(|r| r.datekey), Some(20200922));
    // 2018-09-20..2019-09-19 (365) + 2019-09-20..2020-09-19 (366, leap) + 3 days.
    assert_eq!(rows.len(), 734);
    let keys: BTreeSet<i32> = rows.iter().map(|r: &CalendarRow| r.datekey).collect();
    assert_eq!(keys.len(), rows.len());
}

#[test]
fn inverted_calendar_range_is_a_config_error() {
    let err = calendar_rows(parse_date("2020-02-02").unwrap(), parse_date("2020-02-01").unwrap()).unwrap_err();
    assert!(matches!(err, SampleError::Config(_)));
}

fn sample(raw: &Path, out: &Path, format: OutputFormat, layout: Layout) {
    Sampler::new()
        .data_dir(raw)
        .out_dir(out)
        .format(format)
        .layout(layout)
        .window(parse_date("2020-01-01").ok(), None)
        .progress(false)
        .run()
        .unwrap();
}

#[test]
fn star_tables_from_a_csv_sample() {
    let (tmp, raw, out) = make_dataset_basic();
    sample(&raw, &out, OutputFormat::Csv, Layout::Single);
    let star = tmp.path().join("star");

    let report = build_star(&out, &star).unwrap();
    assert_eq!(report.channels, 2);
    assert_eq!(report.articles, 9);
    assert_eq!(report.customers, 7);
    assert_eq!(report.facts, 27);
    assert_eq!(report.dropped_facts, 0);

    let (_, channels) = read_csv(&star.join("d_channel.csv"));
    assert_eq!(channels, vec![vec!["1", "1", "Store"], vec!["2", "2", "Online"]]);

    let (headers, articles) = read_csv(&star.join("d_article.csv"));
    assert_eq!(headers[..2], ["article_key", "article_id"]);
    let keys: Vec<&str> = articles.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(keys, vec!["1", "2", "3", "4", "5", "6", "7", "8", "9"]);

    let (headers, facts) = read_csv(&star.join("f_transactions.csv"));
    assert_eq!(headers, vec!["date_key", "article_key", "customer_key", "channel_key", "price", "quantity"]);
    assert_eq!(facts.len(), 27);
    // First source row: 2020-01-03, cust00, first article, Store.
    assert_eq!(facts[0][..4], ["20200103", "1", "1", "1"]);
    assert!(facts.iter().all(|f| f[5] == "1"));
}

#[test]
fn star_tables_from_a_monthly_parquet_sample() {
    let (tmp, raw, out) = make_dataset_basic();
    sample(&raw, &out, OutputFormat::Parquet, Layout::ByMonth);
    let star = tmp.path().join("star");

    let report = build_star(&out, &star).unwrap();
    assert_eq!((report.articles, report.customers, report.facts, report.dropped_facts), (9, 7, 27, 0));

    let (_, facts) = read_csv(&star.join("f_transactions.csv"));
    let date_keys: Vec<&str> = facts.iter().map(|f| f[0].as_str()).collect();
    let mut sorted = date_keys.clone();
    sorted.sort();
    assert_eq!(date_keys, sorted, "monthly files are loaded in period order");
}

#[test]
fn unresolved_facts_are_dropped_and_counted() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("sample");
    write_text(
        &dir.join("transactions_sample.csv"),
        "t_dat,customer_id,article_id,price,sales_channel_id\n\
         2020-05-01,c1,11,0.5,1\n\
         2020-05-02,nobody,11,0.5,2\n\
         2020-05-03,c1,99,0.5,2\n\
         2020-05-04,c2,12,0.5,3\n\
         2020-05-05,c2,12,0.25,2\n",
    );
    // An identical duplicate row is dropped; a second distinct row for id 11 gets its
    // own key but facts resolve to the first.
    write_text(
        &dir.join("articles_filtered.csv"),
        "article_id,prod_name\n0000000011,tee\n0000000011,tee\n0000000012,dress\n0000000011,tee v2\n",
    );
    write_text(&dir.join("customers_filtered.csv"), "customer_id,age\nc1,30\nc2,41\n");
    let star = tmp.path().join("star");

    let report = build_star(&dir, &star).unwrap();
    assert_eq!(report.articles, 3);
    assert_eq!(report.facts, 2);
    assert_eq!(report.dropped_facts, 3);

    let (_, articles) = read_csv(&star.join("d_article.csv"));
    assert_eq!(articles[2], vec!["3", "0000000011", "tee v2"]);

    let (_, facts) = read_csv(&star.join("f_transactions.csv"));
    assert_eq!(facts, vec![
        vec!["20200501", "1", "1", "1", "0.5", "1"],
        vec!["20200505", "2", "2", "2", "0.25", "1"],
    ]);
}

#[test]
fn star_requires_a_complete_sample() {
    let tmp = tempfile::tempdir().unwrap();
    write_text(&tmp.path().join("customers_filtered.csv"), "customer_id\n");

    let err = build_star(tmp.path(), &tmp.path().join("star")).unwrap_err();
    assert!(matches!(sample_error(&err), Some(SampleError::MissingSource { .. })));
}
