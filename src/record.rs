//! Typed transaction row. Deserialization doubles as the schema coercion step:
//! a row that does not fit these types fails the whole pass.

use crate::date::{format_date, parse_date, YearMonth};
use serde::{Deserialize, Serialize};
use time::Date;

/// Column names of the transaction log, in output order.
pub const TXN_COLUMNS: [&str; 5] = ["t_dat", "customer_id", "article_id", "price", "sales_channel_id"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "iso_date")]
    pub t_dat: Date,
    pub customer_id: String,
    pub article_id: i64,
    pub price: f64,
    pub sales_channel_id: i8,
}

impl Transaction {
    #[inline]
    pub fn period(&self) -> YearMonth {
        YearMonth::of(self.t_dat)
    }
}

mod iso_date {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Date, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_date(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(d)?;
        parse_date(&raw).map_err(|e| de::Error::custom(format!("invalid date {raw:?}: {e}")))
    }
}
