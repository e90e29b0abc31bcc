use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::models::{
    AppointmentTable, ClinicData, Material, MaterialConsumption, MaterialTable, PendingAppointment,
    PendingDeduction, StockLine, StockStatus, DEDUCTED_NO, DEDUCTED_YES,
};
use crate::services::finance::calculate_financials;

/// One row per material name, sorted by name. Stock is summed across
/// duplicates; unit cost and minimum stock come from the first occurrence.
/// Rows without a name are dropped.
pub fn consolidate_materials(rows: Vec<Material>) -> Vec<Material> {
    let mut groups: BTreeMap<String, Material> = BTreeMap::new();
    for row in rows {
        if row.name.trim().is_empty() {
            continue;
        }
        match groups.get_mut(&row.name) {
            Some(first) => first.stock_quantity += row.stock_quantity,
            None => {
                groups.insert(row.name.clone(), row);
            }
        }
    }
    groups.into_values().collect()
}

pub fn stock_status_of(material: &Material) -> StockStatus {
    if material.stock_quantity <= 0.0 {
        StockStatus::Critical
    } else if material.stock_quantity <= material.minimum_stock {
        StockStatus::Attention
    } else {
        StockStatus::Ok
    }
}

/// Empty when the sheet does not track stock.
pub fn stock_status(materials: &MaterialTable) -> Vec<StockLine> {
    if !materials.stock_columns {
        return Vec::new();
    }
    materials
        .rows
        .iter()
        .map(|m| StockLine {
            status: stock_status_of(m),
            material: m.name.clone(),
            stock_quantity: m.stock_quantity,
            minimum_stock: m.minimum_stock,
        })
        .collect()
}

/// Row indices of past appointments whose materials were not yet deducted.
pub fn pending_rows(appointments: &AppointmentTable, today: NaiveDate) -> Vec<usize> {
    appointments
        .rows
        .iter()
        .enumerate()
        .filter(|(_, a)| a.date.map(|d| d < today).unwrap_or(false))
        .filter(|(_, a)| a.stock_deducted.trim().to_uppercase() == DEDUCTED_NO)
        .map(|(i, _)| i)
        .collect()
}

pub fn pending_appointments(appointments: &AppointmentTable, rows: &[usize]) -> Vec<PendingAppointment> {
    rows.iter()
        .filter_map(|&row| {
            appointments.rows.get(row).map(|a| PendingAppointment {
                row,
                date: a.date,
                client: a.client.clone(),
                procedure: a.procedure.clone(),
            })
        })
        .collect()
}

/// Pending rows with the materials they would consume.
pub fn pending_deduction(data: &ClinicData, today: NaiveDate) -> (Vec<usize>, PendingDeduction) {
    let rows = pending_rows(&data.appointments, today);
    let pending = data.appointments.with_rows(
        rows.iter()
            .filter_map(|&i| data.appointments.rows.get(i).cloned())
            .collect(),
    );
    let report = calculate_financials(&pending, &data.materials, &data.recipes);
    let deduction = PendingDeduction {
        appointments: pending_appointments(&data.appointments, &rows),
        consumption: report.consumption,
    };
    (rows, deduction)
}

/// Subtracts consumed quantities from stock. Consumed materials that are not
/// in the table are skipped and returned by name.
pub fn deduct_stock(
    materials: &MaterialTable,
    consumption: &[MaterialConsumption],
) -> (MaterialTable, Vec<String>) {
    let mut updated = materials.clone();
    let mut unknown = Vec::new();
    for used in consumption {
        match updated.rows.iter_mut().find(|m| m.name == used.material) {
            Some(material) => material.stock_quantity -= used.quantity_used,
            None => unknown.push(used.material.clone()),
        }
    }
    (updated, unknown)
}

pub fn mark_deducted(appointments: &AppointmentTable, rows: &[usize]) -> AppointmentTable {
    let mut updated = appointments.clone();
    for &row in rows {
        if let Some(appointment) = updated.rows.get_mut(row) {
            appointment.stock_deducted = DEDUCTED_YES.to_string();
        }
    }
    updated
}
