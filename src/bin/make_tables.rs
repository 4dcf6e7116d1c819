use clap::Parser;
use dm_prescribing_analysis::{
    dataset::Dataset,
    header,
    report::{build_tables, html_report, ReportConfig},
};
use qu::ick_use::*;
use std::{fs, path::PathBuf};

/// Build the stratified count tables for a reporting period.
#[derive(Parser)]
struct Opt {
    /// Reporting period identifier, used to locate the dataset and name the outputs.
    #[clap(long)]
    period: String,
    /// Directory holding the dataset file; tables are written alongside it.
    #[clap(long, default_value = "output")]
    output_dir: PathBuf,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let dataset = Dataset::load(opt.output_dir.join(format!("dataset_{}.arrow", opt.period)))?;
    let config = ReportConfig::default();
    let tables = build_tables(&dataset, &config)?;

    header("Population totals");
    println!("{}", tables.totals.term_table());
    header("Whole population prescribing");
    println!("{}", tables.prescribing.term_table());
    header("Type 2 diabetes only prescribing");
    println!("{}", tables.prescribing_t2dm.term_table());

    let period = &opt.period;
    tables
        .totals
        .to_csv(opt.output_dir.join(format!("totals_{}.csv", period)))?;
    tables
        .prescribing
        .to_csv(opt.output_dir.join(format!("prescribing_{}.csv", period)))?;
    tables
        .prescribing_t2dm
        .to_csv(opt.output_dir.join(format!("prescribing_t2dm_{}.csv", period)))?;

    let html_path = opt.output_dir.join(format!("report_{}.html", period));
    fs::write(&html_path, html_report(period, &tables))
        .with_context(|| format!("unable to write \"{}\"", html_path.display()))?;
    println!("report written to \"{}\"", html_path.display());
    Ok(())
}
