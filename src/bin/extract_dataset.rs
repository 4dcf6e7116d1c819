use chrono::NaiveDate;
use clap::Parser;
use dm_prescribing_analysis::{codes::Codelists, dataset::Dataset, Cohort};
use qu::ick_use::*;
use std::path::PathBuf;

/// Derive the per-patient dataset as of an index date.
#[derive(Parser)]
struct Opt {
    /// The date variables are derived "as of" (YYYY-MM-DD).
    #[clap(long)]
    index_date: NaiveDate,
    /// Reporting period identifier, used to name the output file.
    #[clap(long)]
    period: String,
    /// Directory containing the cohort extract CSVs.
    #[clap(long, default_value = "data/cohort")]
    cohort_dir: PathBuf,
    /// Directory containing the codelist CSVs.
    #[clap(long, default_value = "codelists")]
    codelists_dir: PathBuf,
    /// Directory the dataset file is written to.
    #[clap(long, default_value = "output")]
    output_dir: PathBuf,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let codelists = Codelists::load(&opt.codelists_dir)?;
    let cohort = Cohort::load(&opt.cohort_dir)?;

    let dataset = Dataset::derive(&cohort, &codelists, opt.index_date);
    println!("patients in population: {}", dataset.len());

    let out = opt.output_dir.join(format!("dataset_{}.arrow", opt.period));
    dataset.save(&out)?;
    println!("dataset written to \"{}\"", out.display());
    Ok(())
}
