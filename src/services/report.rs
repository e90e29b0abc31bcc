use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::models::ProcedureSummary;
use crate::utils::format_decimal;

pub const REPORT_HEADER: [&str; 5] = [
    "Procedimento",
    "Qtd Realizada",
    "Receita Total (R$)",
    "Custo Total (R$)",
    "Lucro Total (R$)",
];

pub fn write_procedure_report<W: Write>(out: W, procedures: &[ProcedureSummary]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(REPORT_HEADER)?;
    for p in procedures {
        writer.write_record([
            p.procedure.clone(),
            p.count.to_string(),
            format_decimal(p.revenue),
            format_decimal(p.cost),
            format_decimal(p.profit),
        ])?;
    }
    writer.flush().context("Flush report")?;
    Ok(())
}

pub fn export_procedure_report(path: &Path, procedures: &[ProcedureSummary]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Create report file {}", path.display()))?;
    write_procedure_report(file, procedures)?;
    tracing::info!(path = %path.display(), procedures = procedures.len(), "Report exported");
    Ok(())
}
