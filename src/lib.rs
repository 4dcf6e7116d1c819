pub mod codes;
pub mod dataset;
pub mod query;
mod range;
pub mod report;
mod util;

pub use anyhow::{Context, Error};
use chrono::{Datelike, NaiveDate};
use itertools::Either;
use qu::ick_use::*;
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    collections::BTreeMap,
    fmt, iter,
    ops::Deref,
    path::Path,
    sync::Arc,
};

pub use crate::{
    codes::{Ctv3Code, DmdCode, SnomedCode},
    range::{Bands, Range},
    util::{header, HtmlWriter},
};
use crate::util::{optional_finite, optional_string};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
pub type PatientId = u64;

/// Patient sex as recorded by the provider.
///
/// Ordering is arbitrary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Hash, Ord, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Intersex,
    Unknown,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sex::Male => f.write_str("male"),
            Sex::Female => f.write_str("female"),
            Sex::Intersex => f.write_str("intersex"),
            Sex::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PatientRaw {
    patient_id: PatientId,
    date_of_birth: NaiveDate,
    sex: Sex,
}

/// A row in the patients table.
///
/// In this and the other record types, `patient_id` always identifies the same patient.
#[derive(Debug, Clone)]
pub struct Patient {
    pub patient_id: PatientId,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
}

impl From<PatientRaw> for Patient {
    fn from(from: PatientRaw) -> Self {
        Self {
            patient_id: from.patient_id,
            date_of_birth: from.date_of_birth,
            sex: from.sex,
        }
    }
}

impl Patient {
    /// Age in whole years on `date` (one less until the birthday has passed).
    pub fn age_at(&self, date: NaiveDate) -> i64 {
        let dob = self.date_of_birth;
        let mut age = i64::from(date.year() - dob.year());
        if (date.month(), date.day()) < (dob.month(), dob.day()) {
            age -= 1;
        }
        age
    }
}

/// The parsed list of patients, with a pre-built index for the `patient_id` field.
pub struct Patients {
    els: Arc<Vec<Patient>>,
    id_idx: BTreeMap<PatientId, usize>,
}

impl Patients {
    pub fn new(els: Vec<Patient>) -> Self {
        let mut this = Patients {
            els: els.into(),
            id_idx: BTreeMap::new(),
        };
        this.rebuild_index();
        this
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw: Vec<PatientRaw> = load_csv(path)?;
        Ok(Self::new(raw.into_iter().map(Into::into).collect()))
    }

    pub fn find_by_id(&self, id: PatientId) -> Option<&Patient> {
        let idx = self.id_idx.get(&id)?;
        self.els.get(*idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patient> + '_ {
        self.els.iter()
    }

    fn rebuild_index(&mut self) {
        self.id_idx.clear();
        for (idx, el) in self.els.iter().enumerate() {
            self.id_idx.insert(el.patient_id, idx);
        }
    }
}

impl Deref for Patients {
    type Target = [Patient];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Patient> for Patients {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Patient>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct ClinicalEventRaw {
    patient_id: PatientId,
    date: NaiveDate,
    snomedct_code: Option<SnomedCode>,
    ctv3_code: Option<Ctv3Code>,
    #[serde(deserialize_with = "optional_finite")]
    numeric_value: Option<f64>,
}

/// A row in the clinical events table.
///
/// An event carries a SNOMED-CT coding, a CTV3 coding, or both, depending on what the
/// provider mapped. Events with neither are dropped at load time since nothing can ever
/// match them.
#[derive(Debug, Clone)]
pub struct ClinicalEvent {
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub snomedct_code: Option<SnomedCode>,
    pub ctv3_code: Option<Ctv3Code>,
    pub numeric_value: Option<f64>,
}

impl ClinicalEvent {
    fn from_raw(raw: ClinicalEventRaw) -> Option<Self> {
        if raw.snomedct_code.is_none() && raw.ctv3_code.is_none() {
            return None;
        }
        Some(ClinicalEvent {
            patient_id: raw.patient_id,
            date: raw.date,
            snomedct_code: raw.snomedct_code,
            ctv3_code: raw.ctv3_code,
            numeric_value: raw.numeric_value,
        })
    }
}

/// The parsed list of clinical events, with a pre-built index for the `patient_id` field.
pub struct Events {
    els: Arc<Vec<ClinicalEvent>>,
    id_idx: BTreeMap<PatientId, Vec<usize>>,
}

impl Events {
    pub fn new(els: Vec<ClinicalEvent>) -> Self {
        let mut this = Events {
            els: Arc::new(els),
            id_idx: BTreeMap::new(),
        };
        this.rebuild_id_map();
        this
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw: Vec<ClinicalEventRaw> = load_csv(path)?;
        Ok(Self::new(
            raw.into_iter().filter_map(ClinicalEvent::from_raw).collect(),
        ))
    }

    /// All events for a patient, in the order they appear in the extract.
    pub fn for_patient(
        &self,
        patient_id: PatientId,
    ) -> impl Iterator<Item = &ClinicalEvent> + Clone + '_ {
        let idxs = match self.id_idx.get(&patient_id) {
            Some(idxs) => idxs,
            None => return Either::Left(iter::empty()),
        };
        Either::Right(idxs.iter().map(|idx| {
            self.els
                .get(*idx)
                .expect("inconsistent event patient_id index")
        }))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClinicalEvent> + '_ {
        self.els.iter()
    }

    fn rebuild_id_map(&mut self) {
        self.id_idx.clear();
        for (idx, event) in self.els.iter().enumerate() {
            self.id_idx
                .entry(event.patient_id)
                .or_insert_with(Vec::new)
                .push(idx);
        }
    }
}

impl Deref for Events {
    type Target = [ClinicalEvent];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<ClinicalEvent> for Events {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = ClinicalEvent>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct MedicationRaw {
    patient_id: PatientId,
    date: NaiveDate,
    dmd_code: Option<DmdCode>,
}

/// A row in the medications table.
#[derive(Debug, Clone)]
pub struct Medication {
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub dmd_code: DmdCode,
}

impl Medication {
    fn from_raw(raw: MedicationRaw) -> Option<Self> {
        Some(Medication {
            patient_id: raw.patient_id,
            date: raw.date,
            dmd_code: raw.dmd_code?,
        })
    }
}

/// The parsed list of medication issues, with a pre-built index for the `patient_id` field.
pub struct Medications {
    els: Arc<Vec<Medication>>,
    id_idx: BTreeMap<PatientId, Vec<usize>>,
}

impl Medications {
    pub fn new(els: Vec<Medication>) -> Self {
        let mut this = Medications {
            els: Arc::new(els),
            id_idx: BTreeMap::new(),
        };
        this.rebuild_id_map();
        this
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw: Vec<MedicationRaw> = load_csv(path)?;
        Ok(Self::new(
            raw.into_iter().filter_map(Medication::from_raw).collect(),
        ))
    }

    /// All medication issues for a patient, in the order they appear in the extract.
    pub fn for_patient(
        &self,
        patient_id: PatientId,
    ) -> impl Iterator<Item = &Medication> + Clone + '_ {
        let idxs = match self.id_idx.get(&patient_id) {
            Some(idxs) => idxs,
            None => return Either::Left(iter::empty()),
        };
        Either::Right(idxs.iter().map(|idx| {
            self.els
                .get(*idx)
                .expect("inconsistent medication patient_id index")
        }))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Medication> + '_ {
        self.els.iter()
    }

    fn rebuild_id_map(&mut self) {
        self.id_idx.clear();
        for (idx, med) in self.els.iter().enumerate() {
            self.id_idx
                .entry(med.patient_id)
                .or_insert_with(Vec::new)
                .push(idx);
        }
    }
}

impl Deref for Medications {
    type Target = [Medication];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Medication> for Medications {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Medication>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct RegistrationRaw {
    patient_id: PatientId,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    #[serde(rename = "practice_nuts1_region_name", deserialize_with = "optional_string")]
    region: Option<ArcStr>,
}

/// A row in the practice registrations table. `end_date` is `None` for a registration
/// that is still open.
#[derive(Debug, Clone)]
pub struct Registration {
    pub patient_id: PatientId,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub region: Option<ArcStr>,
}

impl From<RegistrationRaw> for Registration {
    fn from(from: RegistrationRaw) -> Self {
        Self {
            patient_id: from.patient_id,
            start_date: from.start_date,
            end_date: from.end_date,
            region: from.region,
        }
    }
}

/// The parsed list of practice registrations, indexed by patient.
pub struct Registrations {
    els: Arc<Vec<Registration>>,
    id_idx: BTreeMap<PatientId, Vec<usize>>,
}

impl Registrations {
    pub fn new(els: Vec<Registration>) -> Self {
        let mut this = Registrations {
            els: Arc::new(els),
            id_idx: BTreeMap::new(),
        };
        this.rebuild_id_map();
        this
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw: Vec<RegistrationRaw> = load_csv(path)?;
        Ok(Self::new(raw.into_iter().map(Into::into).collect()))
    }

    pub fn for_patient(
        &self,
        patient_id: PatientId,
    ) -> impl Iterator<Item = &Registration> + Clone + '_ {
        let idxs = match self.id_idx.get(&patient_id) {
            Some(idxs) => idxs,
            None => return Either::Left(iter::empty()),
        };
        Either::Right(idxs.iter().map(|idx| {
            self.els
                .get(*idx)
                .expect("inconsistent registration patient_id index")
        }))
    }

    fn rebuild_id_map(&mut self) {
        self.id_idx.clear();
        for (idx, reg) in self.els.iter().enumerate() {
            self.id_idx
                .entry(reg.patient_id)
                .or_insert_with(Vec::new)
                .push(idx);
        }
    }
}

impl Deref for Registrations {
    type Target = [Registration];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Registration> for Registrations {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Registration>,
    {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct AddressRaw {
    patient_id: PatientId,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    imd_rounded: Option<i64>,
}

/// A row in the addresses table. The deprivation rank is pre-rounded by the provider.
#[derive(Debug, Clone)]
pub struct Address {
    pub patient_id: PatientId,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub imd_rounded: Option<i64>,
}

impl From<AddressRaw> for Address {
    fn from(from: AddressRaw) -> Self {
        Self {
            patient_id: from.patient_id,
            start_date: from.start_date,
            end_date: from.end_date,
            imd_rounded: from.imd_rounded,
        }
    }
}

/// The parsed list of patient addresses, indexed by patient.
pub struct Addresses {
    els: Arc<Vec<Address>>,
    id_idx: BTreeMap<PatientId, Vec<usize>>,
}

impl Addresses {
    pub fn new(els: Vec<Address>) -> Self {
        let mut this = Addresses {
            els: Arc::new(els),
            id_idx: BTreeMap::new(),
        };
        this.rebuild_id_map();
        this
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw: Vec<AddressRaw> = load_csv(path)?;
        Ok(Self::new(raw.into_iter().map(Into::into).collect()))
    }

    pub fn for_patient(
        &self,
        patient_id: PatientId,
    ) -> impl Iterator<Item = &Address> + Clone + '_ {
        let idxs = match self.id_idx.get(&patient_id) {
            Some(idxs) => idxs,
            None => return Either::Left(iter::empty()),
        };
        Either::Right(idxs.iter().map(|idx| {
            self.els
                .get(*idx)
                .expect("inconsistent address patient_id index")
        }))
    }

    fn rebuild_id_map(&mut self) {
        self.id_idx.clear();
        for (idx, addr) in self.els.iter().enumerate() {
            self.id_idx
                .entry(addr.patient_id)
                .or_insert_with(Vec::new)
                .push(idx);
        }
    }
}

impl Deref for Addresses {
    type Target = [Address];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl FromIterator<Address> for Addresses {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Address>,
    {
        Self::new(iter.into_iter().collect())
    }
}

/// The full cohort extract: every table the derivation reads.
pub struct Cohort {
    pub patients: Patients,
    pub events: Events,
    pub medications: Medications,
    pub registrations: Registrations,
    pub addresses: Addresses,
}

impl Cohort {
    /// Load all five tables from CSV files in `dir`, named by the provider's convention.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let cohort = Cohort {
            patients: Patients::load(dir.join("patients.csv"))?,
            events: Events::load(dir.join("clinical_events.csv"))?,
            medications: Medications::load(dir.join("medications.csv"))?,
            registrations: Registrations::load(dir.join("practice_registrations.csv"))?,
            addresses: Addresses::load(dir.join("addresses.csv"))?,
        };
        event!(
            Level::INFO,
            "loaded {} patients, {} events, {} medications",
            cohort.patients.len(),
            cohort.events.len(),
            cohort.medications.len()
        );
        Ok(cohort)
    }
}

/// Load a CSV table into memory.
fn load_csv<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("while loading \"{}\"", path.display()))
}
