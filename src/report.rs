//! Stratified summary tables over the derived dataset.
//!
//! The reporting stage never goes back to the raw extract: it reads the dataset file,
//! attaches the report-only categorical columns (diabetes status, age band, obesity),
//! and counts. All published counts are rounded to the nearest 10 for disclosure
//! control.

use crate::{
    dataset::{Dataset, DatasetRow},
    range::{Bands, Range},
    util::HtmlWriter,
    ArcStr,
};
use noisy_float::prelude::*;
use qu::ick_use::*;
use std::{collections::BTreeMap, fs, path::Path};

/// Diabetes status of a dataset row. A patient with both flags is type 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiabetesStatus {
    NoDiabetes,
    T1dm,
    T2dm,
}

impl DiabetesStatus {
    pub const ALL: [Self; 3] = [Self::NoDiabetes, Self::T1dm, Self::T2dm];

    fn of(row: &DatasetRow) -> Self {
        if row.t1dm {
            Self::T1dm
        } else if row.t2dm {
            Self::T2dm
        } else {
            Self::NoDiabetes
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoDiabetes => "No diabetes",
            Self::T1dm => "t1dm",
            Self::T2dm => "t2dm",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::NoDiabetes => 0,
            Self::T1dm => 1,
            Self::T2dm => 2,
        }
    }
}

/// Which columns the report stratifies by and counts, passed in rather than baked into
/// the counting functions. [`ReportConfig::default`] is the study's fixed configuration.
pub struct ReportConfig {
    pub stratifiers: Vec<ArcStr>,
    pub medicines: Vec<ArcStr>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            stratifiers: [
                "Total",
                "diabetes",
                "hba1c_cat",
                "age_cat",
                "sex",
                "region",
                "imd",
                "ethnicity",
                "obese",
                "learning_difficulties",
                "cardiovascular_history",
                "ckd5",
            ]
            .into_iter()
            .map(Into::into)
            .collect(),
            medicines: [
                "dpp4_inhibitors",
                "glp1s",
                "glp1_combined_insulin",
                "glp1_not_combined",
                "insulin",
                "insulin_basal",
                "insulin_non_basal",
                "insulin_mixed_biphasic",
                "metformin",
                "pioglitazone",
                "sglt_2_inhibitors",
                "sulfonylureas",
            ]
            .into_iter()
            .map(Into::into)
            .collect(),
        }
    }
}

/// A dataset row with the report-only categorical columns attached.
#[derive(Clone, Copy)]
pub struct CategorisedRow<'a> {
    row: &'a DatasetRow,
    diabetes: DiabetesStatus,
    age_cat: Option<&'static str>,
    obese: Option<&'static str>,
}

/// Attach diabetes status, age band and obesity to every row.
pub fn categorise(dataset: &Dataset) -> Vec<CategorisedRow<'_>> {
    let age_bands = age_bands();
    let bmi_bands = bmi_bands();
    dataset
        .iter()
        .map(|row| CategorisedRow {
            diabetes: DiabetesStatus::of(row),
            age_cat: age_bands.classify(&row.age),
            obese: row
                .bmi
                .and_then(R64::try_new)
                .and_then(|v| bmi_bands.classify(&v)),
            row,
        })
        .collect()
}

// Band labels follow the published tables: "18" is under 18 and "75" is 75 and over.
fn age_bands() -> Bands<i64> {
    Bands::new([
        (Range::new(1, Some(18)), "18"),
        (Range::new(18, Some(30)), "18-29"),
        (Range::new(30, Some(45)), "30-44"),
        (Range::new(45, Some(60)), "45-59"),
        (Range::new(60, Some(75)), "60-74"),
        (Range::new(75, Some(121)), "75"),
    ])
}

fn bmi_bands() -> Bands<R64> {
    Bands::new([
        (Range::new(r64(0.0), Some(r64(30.0))), "Not obese"),
        (Range::new(r64(30.0), Some(r64(200.0))), "Obese"),
    ])
}

impl CategorisedRow<'_> {
    /// The row's category for a stratifier column, `None` when the underlying value is
    /// missing (such rows drop out of that stratifier's counts).
    fn stratifier_value(&self, name: &str) -> Result<Option<ArcStr>> {
        fn flag(value: bool) -> Option<ArcStr> {
            Some(if value { "true".into() } else { "false".into() })
        }

        Ok(match name {
            "Total" => Some("-".into()),
            "diabetes" => Some(self.diabetes.label().into()),
            "hba1c_cat" => Some(self.row.hba1c_cat.as_str().into()),
            "age_cat" => self.age_cat.map(Into::into),
            "sex" => Some(self.row.sex.as_str().into()),
            "region" => self.row.region.as_deref().map(Into::into),
            "imd" => Some(self.row.imd.to_string().into()),
            "ethnicity" => self.row.ethnicity.as_deref().map(Into::into),
            "obese" => self.obese.map(Into::into),
            "learning_difficulties" => flag(self.row.learning_difficulties),
            "cardiovascular_history" => flag(self.row.cardiovascular_history),
            "ckd5" => flag(self.row.ckd5),
            _ => bail!("unknown stratifier \"{}\"", name),
        })
    }

    fn medicine(&self, name: &str) -> Result<Option<&str>> {
        let row = self.row;
        Ok(match name {
            "dpp4_inhibitors" => row.dpp4_inhibitors.as_deref(),
            "glp1s" => row.glp1s.as_deref(),
            "glp1_combined_insulin" => row.glp1_combined_insulin.as_deref(),
            "glp1_not_combined" => row.glp1_not_combined.as_deref(),
            "insulin" => row.insulin.as_deref(),
            "insulin_basal" => row.insulin_basal.as_deref(),
            "insulin_non_basal" => row.insulin_non_basal.as_deref(),
            "insulin_mixed_biphasic" => row.insulin_mixed_biphasic.as_deref(),
            "metformin" => row.metformin.as_deref(),
            "pioglitazone" => row.pioglitazone.as_deref(),
            "sglt_2_inhibitors" => row.sglt_2_inhibitors.as_deref(),
            "sulfonylureas" => row.sulfonylureas.as_deref(),
            _ => bail!("unknown medicine column \"{}\"", name),
        })
    }
}

/// A stacked count table: one block of rows per stratifier, categories sorted within
/// each block.
pub struct CountTable {
    pub columns: Vec<ArcStr>,
    pub rows: Vec<CountRow>,
}

pub struct CountRow {
    pub attribute: ArcStr,
    pub category: ArcStr,
    pub counts: Vec<u64>,
}

impl CountTable {
    /// Round every count to the nearest 10 (disclosure control). Halves round up.
    pub fn round_to_10(&mut self) {
        for row in &mut self.rows {
            for count in &mut row.counts {
                *count = round10(*count);
            }
        }
    }

    /// Swap numeric category codes for their display names.
    pub fn rename_categories(&mut self) {
        const ETHNICITY_NAMES: [(&str, &str); 5] = [
            ("1", "White"),
            ("2", "Mixed"),
            ("3", "South Asian"),
            ("4", "Black"),
            ("5", "Other"),
        ];
        const IMD_NAMES: [(&str, &str); 3] = [
            ("0", "Missing"),
            ("1", "Most deprived 1"),
            ("5", "Least deprived 5"),
        ];

        for row in &mut self.rows {
            let renames: &[(&str, &str)] = match &*row.attribute {
                "ethnicity" => &ETHNICITY_NAMES,
                "imd" => &IMD_NAMES,
                _ => continue,
            };
            if let Some((_, new)) = renames.iter().find(|(old, _)| *old == &*row.category) {
                row.category = (*new).into();
            }
        }
    }

    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result {
        fn inner(table: &CountTable, path: &Path) -> Result {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut writer = csv::Writer::from_path(path)?;
            let mut header = vec!["attribute".to_string(), "category".to_string()];
            header.extend(table.columns.iter().map(|c| c.to_string()));
            writer.write_record(&header)?;
            for row in &table.rows {
                let mut record = vec![row.attribute.to_string(), row.category.to_string()];
                record.extend(row.counts.iter().map(|c| c.to_string()));
                writer.write_record(&record)?;
            }
            writer.flush()?;
            Ok(())
        }

        let path = path.as_ref();
        inner(self, path)
            .with_context(|| format!("unable to write table to \"{}\"", path.display()))
    }

    pub fn term_table(&self) -> term_data_table::Table {
        use term_data_table::{Cell, Row, Table};
        let mut header = Row::new()
            .with_cell(Cell::from("Attribute"))
            .with_cell(Cell::from("Category"));
        for col in &self.columns {
            header = header.with_cell(Cell::from(col.to_string()));
        }
        let mut table = Table::new().with_row(header);
        for row in &self.rows {
            let mut r = Row::new()
                .with_cell(Cell::from(row.attribute.to_string()))
                .with_cell(Cell::from(row.category.to_string()));
            for count in &row.counts {
                r = r.with_cell(Cell::from(count.to_string()));
            }
            table.add_row(r);
        }
        table
    }

    pub fn write_html(&self, w: &mut HtmlWriter) {
        w.table_start(
            ["Attribute", "Category"]
                .into_iter()
                .chain(self.columns.iter().map(|c| &**c)),
        );
        for row in &self.rows {
            w.row(
                [row.attribute.to_string(), row.category.to_string()]
                    .into_iter()
                    .chain(row.counts.iter().map(|c| c.to_string())),
            );
        }
        w.table_end();
    }
}

/// Cross-tabulate every stratifier against diabetes status, counting rows with a
/// non-missing stratifier value.
pub fn overall_totals(rows: &[CategorisedRow], config: &ReportConfig) -> Result<CountTable> {
    let columns = DiabetesStatus::ALL
        .iter()
        .map(|s| s.label().into())
        .collect();
    let mut out = Vec::new();
    for stratifier in &config.stratifiers {
        let mut counts: BTreeMap<ArcStr, Vec<u64>> = BTreeMap::new();
        for row in rows {
            let Some(category) = row.stratifier_value(stratifier)? else {
                continue;
            };
            counts
                .entry(category)
                .or_insert_with(|| vec![0; DiabetesStatus::ALL.len()])[row.diabetes.index()] += 1;
        }
        out.extend(counts.into_iter().map(|(category, counts)| CountRow {
            attribute: stratifier.clone(),
            category,
            counts,
        }));
    }
    Ok(CountTable {
        columns,
        rows: out,
    })
}

/// For every stratifier, count the rows in each category holding each medicine.
pub fn meds_by_stratifiers(rows: &[CategorisedRow], config: &ReportConfig) -> Result<CountTable> {
    let mut out = Vec::new();
    for stratifier in &config.stratifiers {
        let mut counts: BTreeMap<ArcStr, Vec<u64>> = BTreeMap::new();
        for row in rows {
            let Some(category) = row.stratifier_value(stratifier)? else {
                continue;
            };
            let entry = counts
                .entry(category)
                .or_insert_with(|| vec![0; config.medicines.len()]);
            for (idx, medicine) in config.medicines.iter().enumerate() {
                if row.medicine(medicine)?.is_some() {
                    entry[idx] += 1;
                }
            }
        }
        out.extend(counts.into_iter().map(|(category, counts)| CountRow {
            attribute: stratifier.clone(),
            category,
            counts,
        }));
    }
    Ok(CountTable {
        columns: config.medicines.clone(),
        rows: out,
    })
}

/// The three tables published for a reporting period.
pub struct ReportTables {
    pub totals: CountTable,
    pub prescribing: CountTable,
    pub prescribing_t2dm: CountTable,
}

/// Build all three tables, rounded and with display names applied.
pub fn build_tables(dataset: &Dataset, config: &ReportConfig) -> Result<ReportTables> {
    let rows = categorise(dataset);
    let t2dm: Vec<_> = rows
        .iter()
        .copied()
        .filter(|r| r.diabetes == DiabetesStatus::T2dm)
        .collect();

    let mut totals = overall_totals(&rows, config)?;
    let mut prescribing = meds_by_stratifiers(&rows, config)?;
    let mut prescribing_t2dm = meds_by_stratifiers(&t2dm, config)?;
    for table in [&mut totals, &mut prescribing, &mut prescribing_t2dm] {
        table.round_to_10();
        table.rename_categories();
    }
    Ok(ReportTables {
        totals,
        prescribing,
        prescribing_t2dm,
    })
}

/// Render all three tables as one HTML document.
pub fn html_report(period: &str, tables: &ReportTables) -> String {
    let mut w = HtmlWriter::new();
    w.heading(1, period);
    w.heading(3, "Population totals");
    tables.totals.write_html(&mut w);
    w.heading(3, "Whole population prescribing");
    tables.prescribing.write_html(&mut w);
    w.heading(3, "Type 2 diabetes only prescribing");
    tables.prescribing_t2dm.write_html(&mut w);
    w.finish()
}

fn round10(n: u64) -> u64 {
    (n + 5) / 10 * 10
}
