use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::{Date, Month};

/// Calendar month ("YYYY-MM") used as the period key for stratified sampling and
/// for per-month output partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32, // same range as `time::Date`
    pub month: u8, // 1..=12
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> Self {
        assert!((1..=12).contains(&month), "Month must be 1..=12");
        Self { year, month }
    }

    /// Period key of a transaction date. Pure: depends on the date alone, and
    /// distinct calendar months map to distinct keys.
    pub fn of(date: Date) -> Self {
        Self { year: date.year(), month: date.month() as u8 }
    }

    /// Months since year 0 (two's complement for earlier months); stable ordinal
    /// used to derive per-period seeds.
    pub fn ordinal(self) -> u64 {
        (self.year as i64 * 12 + (self.month as i64 - 1)) as u64
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // rsplit keeps the sign of a negative year with the year part.
        let (year, month) = s.trim().rsplit_once('-').ok_or("expected YYYY-MM")?;
        let year: i32 = year.parse().map_err(|_| "invalid year")?;
        let month: u8 = month.parse().map_err(|_| "invalid month")?;
        if !(1..=12).contains(&month) {
            return Err("month must be 01..12".into());
        }
        Ok(Self { year, month })
    }
}

/// Parse an ISO calendar date (`YYYY-MM-DD`). A trailing time part
/// (`2020-09-01 00:00:00` or `2020-09-01T00:00:00`) is accepted and ignored.
pub fn parse_date(s: &str) -> Result<Date, time::error::Parse> {
    let s = s.trim();
    let day_part = match s.as_bytes().get(10) {
        Some(b' ') | Some(b'T') => &s[..10],
        _ => s,
    };
    Date::parse(day_part, format_description!("[year]-[month]-[day]"))
}

pub fn format_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month() as u8, date.day())
}

/// `YYYYMMDD` as an integer, the warehouse date key.
pub fn date_key(date: Date) -> i32 {
    date.year() * 10_000 + (date.month() as i32) * 100 + date.day() as i32
}

/// Step back `months` calendar months, clamping the day to the target month's length
/// (2020-08-31 minus 6 months is 2020-02-29).
pub fn months_back(date: Date, months: u32) -> Date {
    let total = date.year() * 12 + (date.month() as i32 - 1) - months as i32;
    let year = total.div_euclid(12);
    let month = Month::try_from((total.rem_euclid(12) + 1) as u8).unwrap_or(Month::January);
    let day = date.day().min(time::util::days_in_year_month(year, month));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

/// Inclusive iteration over days from `start` to `end` (empty if `start` > `end`).
pub fn iter_days(start: Date, end: Date) -> impl Iterator<Item = Date> {
    let mut curr = if start <= end { Some(start) } else { None };
    std::iter::from_fn(move || {
        let ret = curr?;
        curr = ret.next_day().filter(|n| *n <= end);
        Some(ret)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn months_back_clamps_day() {
        assert_eq!(months_back(date!(2020 - 08 - 31), 6), date!(2020 - 02 - 29));
        assert_eq!(months_back(date!(2020 - 09 - 22), 6), date!(2020 - 03 - 22));
        assert_eq!(months_back(date!(2020 - 03 - 15), 6), date!(2019 - 09 - 15));
    }

    #[test]
    fn parse_date_ignores_time_part() {
        let d = date!(2020 - 09 - 01);
        assert_eq!(parse_date("2020-09-01").unwrap(), d);
        assert_eq!(parse_date("2020-09-01 00:00:00").unwrap(), d);
        assert_eq!(parse_date("2020-09-01T12:30:00").unwrap(), d);
        assert!(parse_date("2020-13-45").is_err());
        assert!(parse_date("01/09/2020").is_err());
    }

    #[test]
    fn year_month_round_trip_and_order() {
        let ym: YearMonth = "2020-03".parse().unwrap();
        assert_eq!(ym, YearMonth::of(date!(2020 - 03 - 31)));
        assert_eq!(ym.to_string(), "2020-03");
        assert!(YearMonth::new(2019, 12) < ym);
        assert_eq!(YearMonth::new(2020, 1).ordinal(), YearMonth::new(2019, 12).ordinal() + 1);
        assert!("2020-13".parse::<YearMonth>().is_err());
        assert!("2020".parse::<YearMonth>().is_err());
    }

    #[test]
    fn year_month_keeps_years_before_zero_apart() {
        let bc2 = Date::from_calendar_date(-2, Month::May, 1).unwrap();
        let bc1 = Date::from_calendar_date(-1, Month::May, 1).unwrap();
        let ad0 = Date::from_calendar_date(0, Month::May, 1).unwrap();
        let keys = [YearMonth::of(bc2), YearMonth::of(bc1), YearMonth::of(ad0)];
        assert_eq!(keys.map(|k| k.year), [-2, -1, 0]);
        assert!(keys[0] < keys[1] && keys[1] < keys[2]);
        assert_eq!(keys[1].ordinal().wrapping_add(12), keys[2].ordinal());
        assert_ne!(keys[0].ordinal(), keys[1].ordinal());

        let parsed: YearMonth = keys[1].to_string().parse().unwrap();
        assert_eq!(parsed, keys[1]);
    }

    #[test]
    fn iter_days_is_inclusive() {
        let days: Vec<_> = iter_days(date!(2020 - 02 - 28), date!(2020 - 03 - 01)).collect();
        assert_eq!(days, vec![date!(2020 - 02 - 28), date!(2020 - 02 - 29), date!(2020 - 03 - 01)]);
        assert_eq!(iter_days(date!(2020 - 03 - 01), date!(2020 - 02 - 28)).count(), 0);
        assert_eq!(date_key(date!(2020 - 02 - 29)), 20200229);
    }
}
