use crate::config::OutputFormat;
use crate::date::YearMonth;
use crate::error::SampleError;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const TXN_FILE: &str = "transactions_train.csv";
pub const ART_FILE: &str = "articles.csv";
pub const CUS_FILE: &str = "customers.csv";

pub const TXN_OUT_STEM: &str = "transactions_sample";
pub const ART_OUT_STEM: &str = "articles_filtered";
pub const CUS_OUT_FILE: &str = "customers_filtered.csv";
pub const MANIFEST_FILE: &str = "sample_manifest.json";
pub const STAGING_DIR: &str = "_staging";

/// The three raw inputs of a run. Each may be plain or `.zst`-compressed.
#[derive(Clone, Debug)]
pub struct SourcePaths {
    pub transactions: PathBuf,
    pub articles: PathBuf,
    pub customers: PathBuf,
}

fn locate(dir: &Path, name: &str) -> Option<PathBuf> {
    let plain = dir.join(name);
    if plain.is_file() {
        return Some(plain);
    }
    let zst = dir.join(format!("{name}.zst"));
    zst.is_file().then_some(zst)
}

/// Resolve all required sources, reporting every missing one at once.
pub fn resolve_sources(data_dir: &Path) -> Result<SourcePaths, SampleError> {
    match (locate(data_dir, TXN_FILE), locate(data_dir, ART_FILE), locate(data_dir, CUS_FILE)) {
        (Some(transactions), Some(articles), Some(customers)) => Ok(SourcePaths { transactions, articles, customers }),
        (t, a, c) => {
            let names = [(TXN_FILE, t), (ART_FILE, a), (CUS_FILE, c)]
                .into_iter()
                .filter(|(_, p)| p.is_none())
                .map(|(n, _)| n.to_string())
                .collect();
            Err(SampleError::MissingSource { dir: data_dir.to_path_buf(), names })
        }
    }
}

/// `transactions_sample.csv` or `transactions_sample_month=2020-03.parquet`.
pub fn transactions_file_name(format: OutputFormat, period: Option<YearMonth>) -> String {
    match period {
        Some(ym) => format!("{TXN_OUT_STEM}_month={ym}.{}", format.extension()),
        None => format!("{TXN_OUT_STEM}.{}", format.extension()),
    }
}

pub fn articles_file_name(format: OutputFormat) -> String {
    format!("{ART_OUT_STEM}.{}", format.extension())
}

/// Output files of a finished sampling run, as found on disk.
#[derive(Clone, Debug)]
pub struct SampleFiles {
    /// Per-month files in period order, or the single flat file.
    pub transactions: Vec<PathBuf>,
    pub articles: PathBuf,
    pub customers: PathBuf,
}

pub fn discover_sample(dir: &Path) -> Result<SampleFiles, SampleError> {
    let re = Regex::new(r"^transactions_sample(?:_month=(\d{4}-\d{2}))?\.(csv|parquet)$")
        .map_err(|e| SampleError::config(e.to_string()))?;

    let mut monthly = BTreeMap::<YearMonth, PathBuf>::new();
    let mut single = None;
    for ent in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().flatten() {
        let Some(name) = ent.file_name().to_str() else { continue };
        let Some(caps) = re.captures(name) else { continue };
        match caps.get(1).and_then(|m| m.as_str().parse::<YearMonth>().ok()) {
            Some(ym) => {
                monthly.insert(ym, ent.path().to_path_buf());
            }
            None => single = Some(ent.path().to_path_buf()),
        }
    }

    let transactions: Vec<PathBuf> = if monthly.is_empty() {
        single.into_iter().collect()
    } else {
        monthly.into_values().collect()
    };
    let articles = [OutputFormat::Parquet, OutputFormat::Csv]
        .iter()
        .map(|f| dir.join(articles_file_name(*f)))
        .find(|p| p.is_file());
    let customers = Some(dir.join(CUS_OUT_FILE)).filter(|p| p.is_file());

    let mut missing = Vec::new();
    if transactions.is_empty() {
        missing.push(format!("{TXN_OUT_STEM}*"));
    }
    if articles.is_none() {
        missing.push(format!("{ART_OUT_STEM}.*"));
    }
    if customers.is_none() {
        missing.push(CUS_OUT_FILE.to_string());
    }
    match (articles, customers) {
        (Some(articles), Some(customers)) if missing.is_empty() => Ok(SampleFiles { transactions, articles, customers }),
        _ => Err(SampleError::MissingSource { dir: dir.to_path_buf(), names: missing }),
    }
}

/// Outputs of an earlier run in `dir`: transaction samples, filtered catalogs and
/// the manifest. Cleared at the start of every run.
pub fn previous_outputs(dir: &Path) -> Vec<PathBuf> {
    let Ok(re) = Regex::new(r"^(transactions_sample.*\.(csv|parquet)|articles_filtered\.(csv|parquet)|customers_filtered\.csv|sample_manifest\.json)$") else {
        return Vec::new();
    };
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|n| re.is_match(n)))
        .map(|e| e.path().to_path_buf())
        .collect()
}
