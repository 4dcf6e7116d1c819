//! Clinical and medication coding systems, and the codelists that select from them.
//!
//! Three code systems appear in the extract: SNOMED-CT for diagnoses and test results,
//! CTV3 for the older clinical codelists, and dm+d for medications. Each gets a newtype
//! that validates on construction so a malformed code in a source file fails the load
//! rather than silently never matching.

use crate::ArcStr;
use qu::ick_use::*;
use serde::Deserialize;
use std::{
    collections::{btree_set, BTreeMap, BTreeSet},
    fmt, iter,
    path::Path,
    str::FromStr,
    sync::Arc,
};

macro_rules! numeric_code {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Concept identifiers are 6 to 18 decimal digits.
            pub fn new(raw: u64) -> Result<Self> {
                ensure!(
                    (100_000..1_000_000_000_000_000_000).contains(&raw),
                    "{} out of range for a concept identifier",
                    raw
                );
                Ok(Self(raw))
            }
        }

        impl FromStr for $name {
            type Err = Error;
            fn from_str(s: &str) -> Result<Self> {
                ensure!(
                    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()),
                    "concept identifiers contain only digits, got {:?}",
                    s
                );
                Self::new(s.parse()?)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s: &str = Deserialize::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

numeric_code! {
    /// A SNOMED-CT concept code.
    SnomedCode
}

numeric_code! {
    /// A code from the UK dictionary of medicines and devices.
    ///
    /// dm+d identifiers live in the SNOMED namespace, so the representation is shared, but
    /// keeping the type separate stops a diagnosis codelist being applied to medications.
    DmdCode
}

/// A CTV3 (Read v3) clinical code: exactly 5 characters from `[a-zA-Z0-9.]`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ctv3Code([u8; 5]);

impl Ctv3Code {
    pub fn from_bytes(v: &[u8]) -> Result<Self> {
        ensure!(
            v.len() == 5,
            "expected a 5 character CTV3 code, found {} characters",
            v.len()
        );
        ensure!(
            v.iter().copied().all(is_ctv3_ch),
            "CTV3 codes contain characters [a-zA-Z0-9.]"
        );
        Ok(Ctv3Code([v[0], v[1], v[2], v[3], v[4]]))
    }
}

impl FromStr for Ctv3Code {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Debug for Ctv3Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&String::from_utf8_lossy(&self.0), f)
    }
}

impl fmt::Display for Ctv3Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl<'de> Deserialize<'de> for Ctv3Code {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: &str = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn is_ctv3_ch(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.'
}

/// A named set of codes, optionally with a code -> category mapping.
///
/// Immutable once loaded. Category maps are only populated for lists loaded with
/// [`Codelist::load_categorised`] (ethnicity is the one categorised list in this study).
#[derive(Debug, Clone)]
pub struct Codelist<C> {
    codes: Arc<BTreeSet<C>>,
    categories: Arc<BTreeMap<C, ArcStr>>,
}

impl<C> Codelist<C>
where
    C: Copy + Ord + FromStr<Err = Error>,
{
    fn new(codes: BTreeSet<C>, categories: BTreeMap<C, ArcStr>) -> Self {
        Self {
            codes: Arc::new(codes),
            categories: Arc::new(categories),
        }
    }

    /// Build a codelist from codes known at compile time (used for the handful of inline
    /// lists that never came from a file).
    pub fn of(codes: impl IntoIterator<Item = C>) -> Self {
        Self::new(codes.into_iter().collect(), BTreeMap::new())
    }

    /// Build a categorised codelist from (code, category) pairs.
    pub fn of_categorised(pairs: impl IntoIterator<Item = (C, ArcStr)>) -> Self {
        let categories: BTreeMap<C, ArcStr> = pairs.into_iter().collect();
        let codes = categories.keys().copied().collect();
        Self::new(codes, categories)
    }

    /// Load a codelist from a headered CSV file, taking codes from the named column.
    pub fn load(path: impl AsRef<Path>, code_column: &str) -> Result<Self> {
        let path = path.as_ref();
        load_inner(path, code_column, None)
            .with_context(|| format!("loading codelist from \"{}\"", path.display()))
    }

    /// Like [`Codelist::load`], but also reads a category label for each code.
    pub fn load_categorised(
        path: impl AsRef<Path>,
        code_column: &str,
        category_column: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        load_inner(path, code_column, Some(category_column))
            .with_context(|| format!("loading codelist from \"{}\"", path.display()))
    }

    pub fn contains(&self, code: C) -> bool {
        self.codes.contains(&code)
    }

    /// The category label for a code, for categorised lists.
    pub fn category(&self, code: C) -> Option<&ArcStr> {
        self.categories.get(&code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> iter::Copied<btree_set::Iter<'_, C>> {
        self.codes.iter().copied()
    }
}

impl<C> FromIterator<C> for Codelist<C>
where
    C: Copy + Ord + FromStr<Err = Error>,
{
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = C>,
    {
        Self::of(iter)
    }
}

fn load_inner<C>(
    path: &Path,
    code_column: &str,
    category_column: Option<&str>,
) -> Result<Codelist<C>>
where
    C: Copy + Ord + FromStr<Err = Error>,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?;
    let code_idx = column_index(headers, code_column)?;
    let category_idx = category_column
        .map(|name| column_index(headers, name))
        .transpose()?;

    let mut codes = BTreeSet::new();
    let mut categories = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let raw = record
            .get(code_idx)
            .ok_or_else(|| format_err!("short record in codelist"))?;
        let code: C = raw.parse()?;
        codes.insert(code);
        if let Some(idx) = category_idx {
            let category = record
                .get(idx)
                .ok_or_else(|| format_err!("short record in codelist"))?;
            categories.insert(code, category.into());
        }
    }
    ensure!(!codes.is_empty(), "codelist is empty");
    Ok(Codelist::new(codes, categories))
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| format_err!("codelist has no \"{}\" column", name))
}

/// Every codelist the derivation uses, loaded up front.
///
/// Files are looked up in a single directory by their published names, so a codelist
/// update is a file swap. Any missing or malformed file aborts the load.
pub struct Codelists {
    pub t1dm: Codelist<SnomedCode>,
    pub t2dm: Codelist<SnomedCode>,
    pub dmres: Codelist<SnomedCode>,
    pub hba1c: Codelist<SnomedCode>,
    /// Categorised: each code maps to one of the high-level ethnicity groups "1" to "5".
    pub ethnicity: Codelist<SnomedCode>,
    /// The two BMI recording concepts. Inline because it is fixed by the study protocol.
    pub bmi: Codelist<SnomedCode>,
    pub ckd5: Codelist<SnomedCode>,
    pub chronic_cardiac_disease: Codelist<Ctv3Code>,
    pub learning_disabilities: Codelist<Ctv3Code>,
    pub dpp4_inhibitors: Codelist<DmdCode>,
    pub glp1s: Codelist<DmdCode>,
    pub glp1_combined_insulin: Codelist<DmdCode>,
    pub glp1_not_combined: Codelist<DmdCode>,
    pub insulin: Codelist<DmdCode>,
    pub insulin_basal: Codelist<DmdCode>,
    pub insulin_mixed_biphasic: Codelist<DmdCode>,
    pub metformin: Codelist<DmdCode>,
    pub pioglitazone: Codelist<DmdCode>,
    pub sglt_2_inhibitors: Codelist<DmdCode>,
    pub sulfonylureas: Codelist<DmdCode>,
}

impl Codelists {
    /// Load all codelists from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        macro_rules! snomed {
            ($file:expr) => {
                Codelist::load(dir.join($file), "code")?
            };
        }
        macro_rules! dmd {
            ($file:expr) => {
                Codelist::load(dir.join($file), "dmd_id")?
            };
        }

        Ok(Codelists {
            t1dm: snomed!("nhsd-primary-care-domain-refsets-dmtype1_cod.csv"),
            t2dm: snomed!("nhsd-primary-care-domain-refsets-dmtype2_cod.csv"),
            dmres: snomed!("nhsd-primary-care-domain-refsets-dmres_cod.csv"),
            hba1c: snomed!("opensafely-glycated-haemoglobin-hba1c-tests-numerical-value.csv"),
            ethnicity: Codelist::load_categorised(
                dir.join("opensafely-ethnicity-snomed-0removed.csv"),
                "snomedcode",
                "Grouping_6",
            )?,
            bmi: Codelist::of([
                SnomedCode::new(60_621_009)?,
                SnomedCode::new(846_931_000_000_101)?,
            ]),
            ckd5: snomed!("nhsd-primary-care-domain-refsets-ckd5_cod.csv"),
            chronic_cardiac_disease: Codelist::load(
                dir.join("opensafely-chronic-cardiac-disease.csv"),
                "CTV3ID",
            )?,
            learning_disabilities: Codelist::load(
                dir.join("opensafely-learning-disabilities.csv"),
                "CTV3Code",
            )?,
            dpp4_inhibitors: dmd!("user-alex-walker-dpp-4-inhibitors-dmd.csv"),
            glp1s: dmd!("user-alex-walker-glp1s-dmd.csv"),
            glp1_combined_insulin: dmd!("user-Andrew-glp-1s-in-combination-with-insulin-dmd.csv"),
            glp1_not_combined: dmd!("user-Andrew-glp-1s-excluding-those-combined-insulin-dmd.csv"),
            insulin: dmd!("user-alex-walker-insulin-dmd.csv"),
            insulin_basal: dmd!("user-Andrew-insulin-long-acting-basal-dmd.csv"),
            insulin_mixed_biphasic: dmd!("user-Andrew-mixed-biphasic-insulin-dmd.csv"),
            metformin: dmd!("user-alex-walker-metformin-dmd.csv"),
            pioglitazone: dmd!("user-alex-walker-pioglitazone-dmd.csv"),
            sglt_2_inhibitors: dmd!("user-alex-walker-sglt-2-inhibitors-dmd.csv"),
            sulfonylureas: dmd!("user-alex-walker-sulfonylureas-dmd.csv"),
        })
    }
}
