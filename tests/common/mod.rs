#![allow(dead_code)]

use arrow::array::{Array, Date32Array, Float64Array, Int64Array, Int8Array, StringArray};
use modalytics::{days_to_date, parse_date, SampleError, Transaction};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One source transaction row as it appears in `transactions_train.csv`.
#[derive(Clone, Debug)]
pub struct Txn {
    pub date: String,
    pub customer: String,
    pub article: i64,
    pub price: f64,
    pub channel: i8,
}

impl Txn {
    pub fn new(date: &str, customer: &str, article: i64, price: f64, channel: i8) -> Self {
        Self { date: date.to_string(), customer: customer.to_string(), article, price, channel }
    }

    pub fn to_transaction(&self) -> Transaction {
        Transaction {
            t_dat: parse_date(&self.date).unwrap(),
            customer_id: self.customer.clone(),
            article_id: self.article,
            price: self.price,
            sales_channel_id: self.channel,
        }
    }
}

const PRICES: [f64; 5] = [0.0169, 0.0508, 0.0305, 0.0152, 0.0338];
pub const FIRST_ARTICLE: i64 = 108_775_000;

/// Nine months of 2020 (Jan..Sep), three days each (3rd, 14th, 22nd), one row per day.
/// Newest row is 2020-09-22. References customers `cust00..cust06` and articles
/// `FIRST_ARTICLE..FIRST_ARTICLE+8`.
pub fn basic_txns() -> Vec<Txn> {
    let mut out = Vec::new();
    let mut idx = 0usize;
    for month in 1..=9 {
        for day in [3, 14, 22] {
            out.push(Txn::new(
                &format!("2020-{month:02}-{day:02}"),
                &format!("cust{:02}", idx % 7),
                FIRST_ARTICLE + (idx % 9) as i64,
                PRICES[idx % PRICES.len()],
                1 + (idx % 2) as i8,
            ));
            idx += 1;
        }
    }
    out
}

/// `per_month` rows for each of the given months, spread over the month's first 28 days.
pub fn bulk_txns(months: &[(i32, u8)], per_month: usize) -> Vec<Txn> {
    let mut out = Vec::new();
    for &(year, month) in months {
        for i in 0..per_month {
            out.push(Txn::new(
                &format!("{year}-{month:02}-{:02}", 1 + i % 28),
                &format!("cust{:02}", i % 10),
                FIRST_ARTICLE + (i % 12) as i64,
                PRICES[i % PRICES.len()],
                1 + (i % 2) as i8,
            ));
        }
    }
    out
}

/// Catalog article ids: everything the fixtures reference plus a few unreferenced ones.
pub fn catalog_articles() -> Vec<i64> {
    (0..12).map(|i| FIRST_ARTICLE + i).collect()
}

pub fn catalog_customers() -> Vec<String> {
    (0..10).map(|i| format!("cust{i:02}")).collect()
}

pub fn transactions_csv(txns: &[Txn]) -> String {
    let mut s = String::from("t_dat,customer_id,article_id,sales_channel_id,price\n");
    for t in txns {
        // Zero-padded ids and a column order differing from the output order.
        s.push_str(&format!("{},{},{:010},{},{}\n", t.date, t.customer, t.article, t.channel, t.price));
    }
    s
}

pub fn articles_csv(ids: &[i64]) -> String {
    let mut s = String::from("article_id,prod_name,product_type_no,colour_group_name,list_price\n");
    for id in ids {
        let colour = if id % 2 == 0 { "Black" } else { "Light Beige" };
        s.push_str(&format!("{id:010},\"Strap top, {id}\",{},{colour},{}.5\n", 250 + id % 7, id % 40));
    }
    s
}

pub fn customers_csv(ids: &[String]) -> String {
    let mut s = String::from("customer_id,FN,Active,club_member_status,age,postal_code\n");
    for (i, id) in ids.iter().enumerate() {
        let fn_flag = if i % 3 == 0 { "1.0" } else { "" };
        s.push_str(&format!("{id},{fn_flag},,ACTIVE,{},postal{i}\n", 20 + i));
    }
    s
}

pub fn write_text(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// Write a compressed `.zst` file with the given content.
pub fn write_zst(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap();
}

/// Lay out the three sources under `dir` with the full catalogs.
pub fn write_dataset(dir: &Path, txns: &[Txn]) {
    write_text(&dir.join("transactions_train.csv"), &transactions_csv(txns));
    write_text(&dir.join("articles.csv"), &articles_csv(&catalog_articles()));
    write_text(&dir.join("customers.csv"), &customers_csv(&catalog_customers()));
}

/// A temp dir holding `raw/` (the basic dataset); outputs go to `sample/`.
pub fn make_dataset_basic() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let raw = tmp.path().join("raw");
    write_dataset(&raw, &basic_txns());
    let sample = tmp.path().join("sample");
    (tmp, raw, sample)
}

/// Header and rows of a CSV file.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let headers = rdr.headers().unwrap().iter().map(str::to_string).collect();
    let rows = rdr.records().map(|r| r.unwrap().iter().map(str::to_string).collect()).collect();
    (headers, rows)
}

pub fn read_csv_transactions(path: &Path) -> Vec<Transaction> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    rdr.deserialize().map(|r| r.unwrap()).collect()
}

pub fn read_parquet_transactions(path: &Path) -> Vec<Transaction> {
    let file = File::open(path).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.unwrap();
        let col = |name: &str| batch.column(batch.schema().index_of(name).unwrap()).clone();
        let t_dat = col("t_dat");
        let customer = col("customer_id");
        let article = col("article_id");
        let price = col("price");
        let channel = col("sales_channel_id");
        let t_dat = t_dat.as_any().downcast_ref::<Date32Array>().unwrap();
        let customer = customer.as_any().downcast_ref::<StringArray>().unwrap();
        let article = article.as_any().downcast_ref::<Int64Array>().unwrap();
        let price = price.as_any().downcast_ref::<Float64Array>().unwrap();
        let channel = channel.as_any().downcast_ref::<Int8Array>().unwrap();
        for i in 0..batch.num_rows() {
            out.push(Transaction {
                t_dat: days_to_date(t_dat.value(i)).unwrap(),
                customer_id: customer.value(i).to_string(),
                article_id: article.value(i),
                price: price.value(i),
                sales_channel_id: channel.value(i),
            });
        }
    }
    out
}

/// Read a transaction output file of either format.
pub fn read_transactions(path: &Path) -> Vec<Transaction> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => read_parquet_transactions(path),
        _ => read_csv_transactions(path),
    }
}

pub fn read_all_transactions(paths: &[PathBuf]) -> Vec<Transaction> {
    paths.iter().flat_map(|p| read_transactions(p)).collect()
}

/// Comparable form of a row multiset (order-insensitive).
pub fn sorted_keys(rows: &[Transaction]) -> Vec<String> {
    let mut keys: Vec<String> = rows
        .iter()
        .map(|r| format!("{}|{}|{}|{}|{}", r.t_dat, r.customer_id, r.article_id, r.price, r.sales_channel_id))
        .collect();
    keys.sort();
    keys
}

/// Names of the regular files directly under `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// The classified error somewhere in an `anyhow` chain, if any.
pub fn sample_error(err: &anyhow::Error) -> Option<&SampleError> {
    err.chain().find_map(|e| e.downcast_ref::<SampleError>())
}
