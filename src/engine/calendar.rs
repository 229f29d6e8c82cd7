//! Service calendar resolution: which schedule variant runs on a given day.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use super::time::{day_order, weekday_name};
use crate::model::ServiceCalendar;

/// Distinct variants ordered by their earliest weekday.
///
/// Duplicates are detected by `(days, service_id)` value; the first
/// occurrence is kept and ties keep input order.
pub fn distinct_variants(variants: &[ServiceCalendar]) -> Vec<ServiceCalendar> {
    let mut seen = HashSet::new();
    let mut distinct: Vec<ServiceCalendar> = variants
        .iter()
        .filter(|v| seen.insert(*v))
        .cloned()
        .collect();
    distinct.sort_by_key(earliest_day);
    distinct
}

fn earliest_day(variant: &ServiceCalendar) -> u8 {
    variant.days.iter().map(|d| day_order(d)).min().unwrap_or(0)
}

/// The variant running on `day`, or the first input variant when none does.
///
/// Returns `None` only for empty input.
pub fn resolve_active_service(variants: &[ServiceCalendar], day: Weekday) -> Option<&ServiceCalendar> {
    let name = weekday_name(day);
    variants
        .iter()
        .find(|v| v.days.iter().any(|d| d.trim().to_lowercase() == name))
        .or_else(|| variants.first())
}

/// Variants to offer plus the one selected for a date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSelection {
    pub variants: Vec<ServiceCalendar>,
    pub active_service_id: Option<String>,
}

impl ServiceSelection {
    pub fn for_date(variants: &[ServiceCalendar], date: NaiveDate) -> Self {
        Self::for_weekday(variants, date.weekday())
    }

    pub fn for_weekday(variants: &[ServiceCalendar], day: Weekday) -> Self {
        Self {
            variants: distinct_variants(variants),
            active_service_id: resolve_active_service(variants, day).map(|v| v.service_id.clone()),
        }
    }
}
