//! Per-patient variable derivation, and the derived dataset file.
//!
//! [`Dataset::derive`] turns the raw cohort extract into one row per patient as of an
//! index date. Every rule is a [`Query`] chain over that patient's records, so the
//! definitions below read close to the study protocol.

use crate::{
    codes::{Codelist, Codelists, DmdCode},
    query::{address_as_of, registration_as_of, Query},
    util, Cohort, Patient, Registration,
};
use chrono::{Duration, Months, NaiveDate};
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};
use std::{fs, io, ops::Deref, path::Path};

use arrow::{
    datatypes::FieldRef,
    ipc::{reader::FileReader, writer::FileWriter},
};

/// One row of the derived dataset.
///
/// Medication columns hold the dm+d code of the last matching issue in the 90 days up to
/// the index date; a missing value means no matching issue, never "false" or an empty
/// string. The same goes for every other optional column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub patient_id: u64,
    pub age: i64,
    pub sex: String,
    pub region: Option<String>,
    /// Deprivation quintile 1 (most deprived) to 5, or 0 when unknown.
    pub imd: i64,
    /// High-level ethnicity group "1" to "5", from the categorised codelist.
    pub ethnicity: Option<String>,
    pub bmi: Option<f64>,
    pub cardiovascular_history: bool,
    pub learning_difficulties: bool,
    pub ckd5: bool,
    pub t1dm: bool,
    pub t2dm: bool,
    pub hba1c: Option<f64>,
    pub hba1c_cat: String,
    pub dpp4_inhibitors: Option<String>,
    pub glp1s: Option<String>,
    pub glp1_combined_insulin: Option<String>,
    pub glp1_not_combined: Option<String>,
    pub insulin: Option<String>,
    pub insulin_basal: Option<String>,
    pub insulin_non_basal: Option<String>,
    pub insulin_mixed_biphasic: Option<String>,
    pub metformin: Option<String>,
    pub pioglitazone: Option<String>,
    pub sglt_2_inhibitors: Option<String>,
    pub sulfonylureas: Option<String>,
}

/// The derived dataset: one row per patient in the study population.
pub struct Dataset {
    rows: Vec<DatasetRow>,
}

impl Dataset {
    pub fn new(rows: Vec<DatasetRow>) -> Self {
        Self { rows }
    }

    /// Derive the dataset for `index_date`.
    ///
    /// A patient is in the population iff their age at the index date is under 110 and a
    /// practice registration covers the index date. Everything else is a per-patient
    /// variable rule; see the chains below.
    pub fn derive(cohort: &Cohort, codelists: &Codelists, index_date: NaiveDate) -> Self {
        let mut rows = Vec::new();
        for patient in cohort.patients.iter() {
            if patient.age_at(index_date) >= 110 {
                continue;
            }
            let registration = registration_as_of(
                cohort.registrations.for_patient(patient.patient_id),
                index_date,
            );
            let Some(registration) = registration else {
                continue;
            };
            rows.push(derive_row(cohort, codelists, index_date, patient, registration));
        }
        event!(
            Level::INFO,
            "{} of {} patients in the population at {}",
            rows.len(),
            cohort.patients.len(),
            index_date
        );
        Self::new(rows)
    }

    /// Write the dataset as an Arrow IPC file (the `.arrow` extension is required).
    pub fn save(&self, path: impl AsRef<Path>) -> Result {
        fn inner(rows: &[DatasetRow], path: &Path) -> Result {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            if util::path_exists(path)? {
                event!(
                    Level::WARN,
                    "overwriting existing file at \"{}\"",
                    path.display()
                );
            }
            let fields = Vec::<FieldRef>::from_type::<DatasetRow>(TracingOptions::default())?;
            let batch = serde_arrow::to_record_batch(&fields, &rows)?;
            let out = io::BufWriter::new(fs::File::create(path)?);
            let schema = batch.schema();
            let mut writer = FileWriter::try_new(out, &schema)?;
            writer.write(&batch)?;
            writer.finish()?;
            Ok(())
        }

        let path = path.as_ref();
        util::check_extension(path, "arrow")?;
        inner(&self.rows, path)
            .with_context(|| format!("unable to save dataset to \"{}\"", path.display()))
    }

    /// Read a dataset written by [`Dataset::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fn inner(path: &Path) -> Result<Vec<DatasetRow>> {
            let file = io::BufReader::new(fs::File::open(path)?);
            let reader = FileReader::try_new(file, None)?;
            let mut rows = Vec::new();
            for batch in reader {
                let mut chunk: Vec<DatasetRow> = serde_arrow::from_record_batch(&batch?)?;
                rows.append(&mut chunk);
            }
            Ok(rows)
        }

        let path = path.as_ref();
        util::check_extension(path, "arrow")?;
        let rows = inner(path)
            .with_context(|| format!("unable to load dataset from \"{}\"", path.display()))?;
        Ok(Self::new(rows))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetRow> + '_ {
        self.rows.iter()
    }
}

impl Deref for Dataset {
    type Target = [DatasetRow];
    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

fn derive_row(
    cohort: &Cohort,
    codelists: &Codelists,
    index_date: NaiveDate,
    patient: &Patient,
    registration: &Registration,
) -> DatasetRow {
    let region = registration.region.as_ref().map(|r| r.to_string());
    let imd = imd_category(
        address_as_of(cohort.addresses.for_patient(patient.patient_id), index_date)
            .and_then(|a| a.imd_rounded),
    );

    let all_events = Query::new(cohort.events.for_patient(patient.patient_id));
    let prior_events = all_events.clone().on_or_before(index_date);
    let recent_meds = Query::new(cohort.medications.for_patient(patient.patient_id))
        .between(index_date - Duration::days(90), index_date);

    // Ethnicity is looked up over the whole record, not just prior events: a code
    // recorded after the index date is still the best available value.
    let ethnicity = all_events
        .in_codelist(&codelists.ethnicity)
        .last_by_date()
        .and_then(|e| e.snomedct_code)
        .and_then(|code| codelists.ethnicity.category(code))
        .map(|cat| cat.to_string());

    let sixteenth_birthday = patient.date_of_birth + Months::new(16 * 12);
    let bmi = prior_events
        .clone()
        .in_codelist(&codelists.bmi)
        .filter(|e| matches!(e.numeric_value, Some(v) if v > 4.0 && v < 200.0))
        .filter(|e| e.date >= sixteenth_birthday)
        .last_by_date()
        .and_then(|e| e.numeric_value);

    let cardiovascular_history = prior_events
        .clone()
        .in_codelist_ctv3(&codelists.chronic_cardiac_disease)
        .exists();
    let learning_difficulties = prior_events
        .clone()
        .in_codelist_ctv3(&codelists.learning_disabilities)
        .exists();
    let ckd5 = prior_events.clone().in_codelist(&codelists.ckd5).exists();

    let diabetes_resolved = prior_events
        .clone()
        .in_codelist(&codelists.dmres)
        .last_by_date()
        .map(|e| e.date);
    let last_t1dm = prior_events
        .clone()
        .in_codelist(&codelists.t1dm)
        .last_by_date()
        .map(|e| e.date);
    let last_t2dm = prior_events
        .clone()
        .in_codelist(&codelists.t2dm)
        .last_by_date()
        .map(|e| e.date);
    let t1dm = diagnosis_outlives_resolution(last_t1dm, diabetes_resolved);
    let t2dm = diagnosis_outlives_resolution(last_t2dm, diabetes_resolved);

    let hba1c = prior_events
        .in_codelist(&codelists.hba1c)
        .last_by_date()
        .and_then(|e| e.numeric_value);

    let last_med = |list: &Codelist<DmdCode>| {
        recent_meds
            .clone()
            .in_codelist(list)
            .last_by_date()
            .map(|m| m.dmd_code.to_string())
    };
    let insulin = last_med(&codelists.insulin);
    let insulin_basal = last_med(&codelists.insulin_basal);
    let insulin_mixed_biphasic = last_med(&codelists.insulin_mixed_biphasic);
    // Insulin that is neither long-acting basal nor mixed biphasic.
    let insulin_non_basal = match (&insulin, &insulin_basal, &insulin_mixed_biphasic) {
        (Some(code), None, None) => Some(code.clone()),
        _ => None,
    };

    DatasetRow {
        patient_id: patient.patient_id,
        age: patient.age_at(index_date),
        sex: patient.sex.to_string(),
        region,
        imd,
        ethnicity,
        bmi,
        cardiovascular_history,
        learning_difficulties,
        ckd5,
        t1dm,
        t2dm,
        hba1c,
        hba1c_cat: hba1c_category(hba1c).to_string(),
        dpp4_inhibitors: last_med(&codelists.dpp4_inhibitors),
        glp1s: last_med(&codelists.glp1s),
        glp1_combined_insulin: last_med(&codelists.glp1_combined_insulin),
        glp1_not_combined: last_med(&codelists.glp1_not_combined),
        insulin,
        insulin_basal,
        insulin_non_basal,
        insulin_mixed_biphasic,
        metformin: last_med(&codelists.metformin),
        pioglitazone: last_med(&codelists.pioglitazone),
        sglt_2_inhibitors: last_med(&codelists.sglt_2_inhibitors),
        sulfonylureas: last_med(&codelists.sulfonylureas),
    }
}

/// A diagnosis stands when it was coded after the last resolution code, or when there is
/// a diagnosis code and no resolution code at all. Comparisons against a missing date
/// are false.
fn diagnosis_outlives_resolution(
    last_diagnosis: Option<NaiveDate>,
    last_resolved: Option<NaiveDate>,
) -> bool {
    match (last_diagnosis, last_resolved) {
        (Some(diagnosis), Some(resolved)) => resolved < diagnosis,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Bucket an IMD rank into quintiles 1 (most deprived) to 5, with 0 for anything
/// missing or out of range.
fn imd_category(imd: Option<i64>) -> i64 {
    match imd {
        Some(v) if (0..6569).contains(&v) => 1,
        Some(v) if (6569..13138).contains(&v) => 2,
        Some(v) if (13138..19706).contains(&v) => 3,
        Some(v) if (19706..26275).contains(&v) => 4,
        Some(v) if (26275..32844).contains(&v) => 5,
        _ => 0,
    }
}

fn hba1c_category(value: Option<f64>) -> &'static str {
    match value {
        Some(v) if v <= 58.0 => "<=58",
        Some(v) if v <= 86.0 => "58-86",
        Some(_) => ">86",
        None => "Missing",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codes::{Ctv3Code, SnomedCode},
        Address, ClinicalEvent, Medication, Sex,
    };

    const T1DM: u64 = 101000001;
    const T2DM: u64 = 102000001;
    const DMRES: u64 = 103000001;
    const HBA1C: u64 = 104000001;
    const ETHNICITY_WHITE: u64 = 105000001;
    const ETHNICITY_BLACK: u64 = 105000002;
    const CKD5: u64 = 106000001;
    const BMI: u64 = 60621009;

    const INSULIN: u64 = 201000001;
    const INSULIN_BASAL: u64 = 202000001;
    const INSULIN_MIXED: u64 = 203000001;
    const METFORMIN: u64 = 204000001;

    fn index_date() -> NaiveDate {
        "2022-03-01".parse().unwrap()
    }

    fn snomed(codes: &[u64]) -> Codelist<SnomedCode> {
        Codelist::of(codes.iter().map(|&c| SnomedCode::new(c).unwrap()))
    }

    fn dmd(codes: &[u64]) -> Codelist<DmdCode> {
        Codelist::of(codes.iter().map(|&c| DmdCode::new(c).unwrap()))
    }

    fn ctv3(codes: &[&str]) -> Codelist<Ctv3Code> {
        Codelist::of(codes.iter().map(|c| c.parse().unwrap()))
    }

    fn codelists() -> Codelists {
        Codelists {
            t1dm: snomed(&[T1DM]),
            t2dm: snomed(&[T2DM]),
            dmres: snomed(&[DMRES]),
            hba1c: snomed(&[HBA1C]),
            ethnicity: Codelist::of_categorised([
                (SnomedCode::new(ETHNICITY_WHITE).unwrap(), "1".into()),
                (SnomedCode::new(ETHNICITY_BLACK).unwrap(), "4".into()),
            ]),
            bmi: snomed(&[BMI]),
            ckd5: snomed(&[CKD5]),
            chronic_cardiac_disease: ctv3(&["G5..."]),
            learning_disabilities: ctv3(&["Eu81."]),
            dpp4_inhibitors: dmd(&[301000001]),
            glp1s: dmd(&[302000001]),
            glp1_combined_insulin: dmd(&[303000001]),
            glp1_not_combined: dmd(&[304000001]),
            insulin: dmd(&[INSULIN, INSULIN_BASAL, INSULIN_MIXED]),
            insulin_basal: dmd(&[INSULIN_BASAL]),
            insulin_mixed_biphasic: dmd(&[INSULIN_MIXED]),
            metformin: dmd(&[METFORMIN]),
            pioglitazone: dmd(&[305000001]),
            sglt_2_inhibitors: dmd(&[306000001]),
            sulfonylureas: dmd(&[307000001]),
        }
    }

    fn patient(id: u64, dob: &str) -> Patient {
        Patient {
            patient_id: id,
            date_of_birth: dob.parse().unwrap(),
            sex: Sex::Female,
        }
    }

    fn event(id: u64, date: &str, code: u64, value: Option<f64>) -> ClinicalEvent {
        ClinicalEvent {
            patient_id: id,
            date: date.parse().unwrap(),
            snomedct_code: Some(SnomedCode::new(code).unwrap()),
            ctv3_code: None,
            numeric_value: value,
        }
    }

    fn ctv3_event(id: u64, date: &str, code: &str) -> ClinicalEvent {
        ClinicalEvent {
            patient_id: id,
            date: date.parse().unwrap(),
            snomedct_code: None,
            ctv3_code: Some(code.parse().unwrap()),
            numeric_value: None,
        }
    }

    fn med(id: u64, date: &str, code: u64) -> Medication {
        Medication {
            patient_id: id,
            date: date.parse().unwrap(),
            dmd_code: DmdCode::new(code).unwrap(),
        }
    }

    fn registration(id: u64, start: &str, end: Option<&str>) -> Registration {
        Registration {
            patient_id: id,
            start_date: start.parse().unwrap(),
            end_date: end.map(|e| e.parse().unwrap()),
            region: Some("London".into()),
        }
    }

    fn address(id: u64, imd: Option<i64>) -> Address {
        Address {
            patient_id: id,
            start_date: "2000-01-01".parse().unwrap(),
            end_date: None,
            imd_rounded: imd,
        }
    }

    fn cohort(
        patients: Vec<Patient>,
        events: Vec<ClinicalEvent>,
        medications: Vec<Medication>,
        registrations: Vec<Registration>,
        addresses: Vec<Address>,
    ) -> Cohort {
        Cohort {
            patients: patients.into_iter().collect(),
            events: events.into_iter().collect(),
            medications: medications.into_iter().collect(),
            registrations: registrations.into_iter().collect(),
            addresses: addresses.into_iter().collect(),
        }
    }

    fn derive_single(
        events: Vec<ClinicalEvent>,
        medications: Vec<Medication>,
    ) -> Option<DatasetRow> {
        let cohort = cohort(
            vec![patient(1, "1980-06-15")],
            events,
            medications,
            vec![registration(1, "2000-01-01", None)],
            vec![address(1, Some(10_000))],
        );
        let dataset = Dataset::derive(&cohort, &codelists(), index_date());
        dataset.iter().next().cloned()
    }

    #[test]
    fn population_needs_registration_covering_index_date() {
        let pats = vec![patient(1, "1980-06-15"), patient(2, "1980-06-15")];
        let regs = vec![
            // ends exactly on the index date, so does not cover it
            registration(1, "2000-01-01", Some("2022-03-01")),
            registration(2, "2022-03-01", None),
        ];
        let cohort = cohort(pats, vec![], vec![], regs, vec![]);
        let dataset = Dataset::derive(&cohort, &codelists(), index_date());
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset[0].patient_id, 2);
    }

    #[test]
    fn population_excludes_age_110_and_over() {
        let pats = vec![
            patient(1, "1912-03-01"), // turns 110 on the index date
            patient(2, "1912-03-02"), // still 109
        ];
        let regs = vec![
            registration(1, "2000-01-01", None),
            registration(2, "2000-01-01", None),
        ];
        let cohort = cohort(pats, vec![], vec![], regs, vec![]);
        let dataset = Dataset::derive(&cohort, &codelists(), index_date());
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset[0].patient_id, 2);
        assert_eq!(dataset[0].age, 109);
    }

    #[test]
    fn bmi_bounds_are_strict() {
        // the latest in-range measurement wins even when a more recent one is out of range
        let row = derive_single(
            vec![
                event(1, "2019-01-01", BMI, Some(4.1)),
                event(1, "2020-01-01", BMI, Some(4.0)),
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(row.bmi, Some(4.1));

        let row = derive_single(vec![event(1, "2020-01-01", BMI, Some(200.0))], vec![]).unwrap();
        assert_eq!(row.bmi, None);

        let row = derive_single(vec![event(1, "2020-01-01", BMI, Some(199.9))], vec![]).unwrap();
        assert_eq!(row.bmi, Some(199.9));
    }

    #[test]
    fn bmi_measured_before_age_16_is_excluded() {
        // patient born 1980-06-15; 16th birthday 1996-06-15
        let row = derive_single(
            vec![
                event(1, "1996-06-14", BMI, Some(22.0)),
                event(1, "1995-01-01", BMI, Some(21.0)),
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(row.bmi, None);

        let row = derive_single(vec![event(1, "1996-06-15", BMI, Some(22.0))], vec![]).unwrap();
        assert_eq!(row.bmi, Some(22.0));
    }

    #[test]
    fn bmi_ignores_events_after_index_date() {
        let row = derive_single(vec![event(1, "2022-03-02", BMI, Some(31.0))], vec![]).unwrap();
        assert_eq!(row.bmi, None);
    }

    #[test]
    fn diagnosis_resolution_rules() {
        let d = |s: &str| s.parse::<NaiveDate>().unwrap();
        // diagnosis after resolution stands
        assert!(diagnosis_outlives_resolution(
            Some(d("2020-02-01")),
            Some(d("2020-01-01"))
        ));
        // resolved after (or on the same day as) the diagnosis
        assert!(!diagnosis_outlives_resolution(
            Some(d("2020-01-01")),
            Some(d("2020-02-01"))
        ));
        assert!(!diagnosis_outlives_resolution(
            Some(d("2020-01-01")),
            Some(d("2020-01-01"))
        ));
        // never resolved
        assert!(diagnosis_outlives_resolution(Some(d("2020-01-01")), None));
        // never diagnosed
        assert!(!diagnosis_outlives_resolution(None, Some(d("2020-01-01"))));
        assert!(!diagnosis_outlives_resolution(None, None));
    }

    #[test]
    fn t1dm_follows_last_codes() {
        let row = derive_single(
            vec![
                event(1, "2018-01-01", T1DM, None),
                event(1, "2019-01-01", DMRES, None),
            ],
            vec![],
        )
        .unwrap();
        assert!(!row.t1dm);

        let row = derive_single(
            vec![
                event(1, "2018-01-01", T1DM, None),
                event(1, "2019-01-01", DMRES, None),
                event(1, "2020-01-01", T1DM, None),
            ],
            vec![],
        )
        .unwrap();
        assert!(row.t1dm);
        assert!(!row.t2dm);
    }

    #[test]
    fn hba1c_boundaries() {
        assert_eq!(hba1c_category(Some(58.0)), "<=58");
        assert_eq!(hba1c_category(Some(58.01)), "58-86");
        assert_eq!(hba1c_category(Some(86.0)), "58-86");
        assert_eq!(hba1c_category(Some(86.01)), ">86");
        assert_eq!(hba1c_category(None), "Missing");
    }

    #[test]
    fn imd_buckets() {
        assert_eq!(imd_category(Some(0)), 1);
        assert_eq!(imd_category(Some(6568)), 1);
        assert_eq!(imd_category(Some(6569)), 2);
        assert_eq!(imd_category(Some(19705)), 3);
        assert_eq!(imd_category(Some(32843)), 5);
        assert_eq!(imd_category(Some(32844)), 0);
        assert_eq!(imd_category(Some(-1)), 0);
        assert_eq!(imd_category(None), 0);
    }

    #[test]
    fn meds_window_is_90_days() {
        // index date 2022-03-01; window starts 2021-12-01
        let row = derive_single(
            vec![],
            vec![
                med(1, "2021-11-30", METFORMIN),
                med(1, "2022-03-02", METFORMIN),
            ],
        )
        .unwrap();
        assert_eq!(row.metformin, None);

        let row = derive_single(vec![], vec![med(1, "2021-12-01", METFORMIN)]).unwrap();
        assert_eq!(row.metformin, Some(METFORMIN.to_string()));
    }

    #[test]
    fn insulin_non_basal_requires_absence_of_basal_and_mixed() {
        let row = derive_single(vec![], vec![med(1, "2022-01-01", INSULIN)]).unwrap();
        assert_eq!(row.insulin, Some(INSULIN.to_string()));
        assert_eq!(row.insulin_non_basal, Some(INSULIN.to_string()));

        let row = derive_single(
            vec![],
            vec![med(1, "2022-01-01", INSULIN), med(1, "2022-01-02", INSULIN_BASAL)],
        )
        .unwrap();
        // the basal issue also matches the umbrella insulin list
        assert_eq!(row.insulin, Some(INSULIN_BASAL.to_string()));
        assert_eq!(row.insulin_basal, Some(INSULIN_BASAL.to_string()));
        assert_eq!(row.insulin_non_basal, None);
    }

    #[test]
    fn ethnicity_uses_whole_record_and_category_map() {
        let row = derive_single(
            vec![
                event(1, "2010-01-01", ETHNICITY_WHITE, None),
                // after the index date, but still the latest record
                event(1, "2022-06-01", ETHNICITY_BLACK, None),
            ],
            vec![],
        )
        .unwrap();
        assert_eq!(row.ethnicity.as_deref(), Some("4"));

        let row = derive_single(vec![], vec![]).unwrap();
        assert_eq!(row.ethnicity, None);
    }

    #[test]
    fn flags_and_region_and_imd() {
        let row = derive_single(
            vec![
                ctv3_event(1, "2001-05-01", "G5..."),
                event(1, "2015-01-01", CKD5, None),
                event(1, "2020-01-01", HBA1C, Some(90.0)),
            ],
            vec![],
        )
        .unwrap();
        assert!(row.cardiovascular_history);
        assert!(!row.learning_difficulties);
        assert!(row.ckd5);
        assert_eq!(row.hba1c, Some(90.0));
        assert_eq!(row.hba1c_cat, ">86");
        assert_eq!(row.region.as_deref(), Some("London"));
        assert_eq!(row.imd, 2);
        assert_eq!(row.sex, "female");
    }

    #[test]
    fn arrow_round_trip_preserves_rows_and_nulls() {
        let cohort = cohort(
            vec![patient(1, "1980-06-15"), patient(2, "1955-01-31")],
            vec![
                event(1, "2020-01-01", BMI, Some(31.5)),
                event(2, "2018-01-01", T2DM, None),
                event(2, "2021-07-01", HBA1C, Some(48.0)),
            ],
            vec![med(2, "2022-01-15", METFORMIN)],
            vec![
                registration(1, "2000-01-01", None),
                registration(2, "2010-01-01", None),
            ],
            vec![address(1, Some(10_000)), address(2, None)],
        );
        let dataset = Dataset::derive(&cohort, &codelists(), index_date());
        assert_eq!(dataset.len(), 2);

        let path = std::env::temp_dir().join("dm_prescribing_test_roundtrip.arrow");
        dataset.save(&path).unwrap();
        let loaded = Dataset::load(&path).unwrap();
        assert_eq!(loaded.len(), dataset.len());
        assert_eq!(&*loaded, &*dataset);
        // spot-check null patterns survived
        assert_eq!(loaded[0].metformin, None);
        assert_eq!(loaded[1].bmi, None);
        assert_eq!(loaded[1].metformin, Some(METFORMIN.to_string()));
    }

    #[test]
    fn save_requires_arrow_extension() {
        let dataset = Dataset::new(vec![]);
        let path = std::env::temp_dir().join("dm_prescribing_test_bad_ext.csv");
        assert!(dataset.save(&path).is_err());
    }
}
