//! Filter/sort/reduce chains over one patient's records.
//!
//! Every derived variable is a chain of the same shape: restrict to a codelist, maybe
//! apply an extra predicate, then take the first or last record by date and project a
//! field. [`Query`] keeps those rules legible instead of burying them in ad-hoc loops.
//!
//! Reductions are stable with respect to the order records appear in the extract: among
//! records sharing a date, `last_by_date` picks the one latest in the input and
//! `first_by_date` the one earliest. That makes reruns over the same extract
//! deterministic.

use chrono::NaiveDate;

use crate::{
    codes::{Codelist, Ctv3Code, DmdCode, SnomedCode},
    Address, ClinicalEvent, Medication, Registration,
};

/// A record with an event date.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

impl Dated for ClinicalEvent {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for Medication {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// A filterable view over one patient's records.
///
/// Cheap to clone, so a part-built chain (e.g. "prior events") can be reused as the
/// starting point for many variables.
#[derive(Clone)]
pub struct Query<'a, R> {
    records: Vec<&'a R>,
}

impl<'a, R: Dated> Query<'a, R> {
    pub fn new(records: impl IntoIterator<Item = &'a R>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    /// Keep only records matching the predicate.
    pub fn filter(mut self, pred: impl Fn(&R) -> bool) -> Self {
        self.records.retain(|r| pred(r));
        self
    }

    /// Keep only records dated on or before `date`.
    pub fn on_or_before(self, date: NaiveDate) -> Self {
        self.filter(|r| r.date() <= date)
    }

    /// Keep only records dated within `[start, end]`.
    pub fn between(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.filter(|r| (start..=end).contains(&r.date()))
    }

    pub fn exists(&self) -> bool {
        !self.records.is_empty()
    }

    /// The chronologically last record; input order breaks date ties.
    pub fn last_by_date(self) -> Option<&'a R> {
        self.records.into_iter().max_by_key(|r| r.date())
    }

    /// The chronologically first record; input order breaks date ties.
    pub fn first_by_date(self) -> Option<&'a R> {
        self.records.into_iter().min_by_key(|r| r.date())
    }
}

impl<'a> Query<'a, ClinicalEvent> {
    /// Keep events whose SNOMED-CT coding is in the codelist.
    pub fn in_codelist(self, list: &Codelist<SnomedCode>) -> Self {
        self.filter(|e| matches!(e.snomedct_code, Some(code) if list.contains(code)))
    }

    /// Keep events whose CTV3 coding is in the codelist.
    pub fn in_codelist_ctv3(self, list: &Codelist<Ctv3Code>) -> Self {
        self.filter(|e| matches!(e.ctv3_code, Some(code) if list.contains(code)))
    }
}

impl<'a> Query<'a, Medication> {
    pub fn in_codelist(self, list: &Codelist<DmdCode>) -> Self {
        self.filter(|m| list.contains(m.dmd_code))
    }
}

/// The practice registration covering `date`: `start <= date` and the end, if any, after
/// `date`. When several overlap, the earliest-starting one wins, then the earliest end
/// date (open-ended registrations last), then input order.
pub fn registration_as_of<'a>(
    registrations: impl IntoIterator<Item = &'a Registration>,
    date: NaiveDate,
) -> Option<&'a Registration> {
    registrations
        .into_iter()
        .filter(|r| r.start_date <= date && r.end_date.map_or(true, |end| end > date))
        .min_by_key(|r| (r.start_date, r.end_date.unwrap_or(NaiveDate::MAX)))
}

/// The address covering `date`, selected under the same policy as
/// [`registration_as_of`].
pub fn address_as_of<'a>(
    addresses: impl IntoIterator<Item = &'a Address>,
    date: NaiveDate,
) -> Option<&'a Address> {
    addresses
        .into_iter()
        .filter(|a| a.start_date <= date && a.end_date.map_or(true, |end| end > date))
        .min_by_key(|a| (a.start_date, a.end_date.unwrap_or(NaiveDate::MAX)))
}
