//! Record predicates
//!
//! Small composable filters used to pick the records each aggregation
//! sees. Every predicate is a cloneable `Fn(&Record) -> bool` so it can be
//! moved into a stream adapter.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use types::ids::InstrumentName;
use types::record::Record;

/// Records whose instrument name satisfies `pred`.
pub fn instrument<P>(pred: P) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static
where
    P: Fn(&InstrumentName) -> bool + Clone + Send + Sync + 'static,
{
    move |record| pred(record.name())
}

/// Records of any of the given instruments.
pub fn any_of<I, S>(names: I) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Arc<HashSet<String>> = Arc::new(names.into_iter().map(Into::into).collect());
    move |record| names.contains(record.name().as_str())
}

/// Records of none of the given instruments.
pub fn none_of<I, S>(names: I) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    not(any_of(names))
}

pub fn not<P>(pred: P) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static
where
    P: Fn(&Record) -> bool + Clone + Send + Sync + 'static,
{
    move |record| !pred(record)
}

/// Records whose date satisfies `pred`.
pub fn date<P>(pred: P) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static
where
    P: Fn(NaiveDate) -> bool + Clone + Send + Sync + 'static,
{
    move |record| pred(record.date())
}

/// Records dated no later than `limit`.
pub fn on_or_before(limit: NaiveDate) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static {
    date(move |d| d <= limit)
}

/// Records dated Monday through Friday.
pub fn business_day() -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static {
    date(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
}

pub fn in_month(year: i32, month: u32) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static {
    date(move |d| d.year() == year && d.month() == month)
}

/// Business-day records that are not in the future relative to `as_of`.
pub fn valid_as_of(as_of: NaiveDate) -> impl Fn(&Record) -> bool + Clone + Send + Sync + 'static {
    let not_future = on_or_before(as_of);
    let business = business_day();
    move |record| not_future(record) && business(record)
}
