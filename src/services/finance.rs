//! Cost, revenue and profit per appointment, rolled up by procedure and by
//! material.
//!
//! A procedure's cost is the sum of `quantity_used * unit_cost` over its recipe
//! lines; its sale price is the price on its first recipe line. Names that do
//! not match anything contribute zero rather than failing.

use std::collections::{BTreeMap, HashMap};

use crate::models::{
    AppointmentTable, DerivedAppointment, EnrichedAppointments, FinancialReport,
    MaterialConsumption, MaterialTable, ProcedureSummary, RecipeTable,
};

pub fn calculate_financials(
    appointments: &AppointmentTable,
    materials: &MaterialTable,
    recipes: &RecipeTable,
) -> FinancialReport {
    if appointments.is_empty() {
        return FinancialReport {
            procedures: Vec::new(),
            consumption: Vec::new(),
            appointments: EnrichedAppointments {
                columns: appointments.columns.clone(),
                rows: Vec::new(),
            },
        };
    }

    let cost_by_procedure = procedure_costs(materials, recipes);
    let price_by_procedure = procedure_prices(recipes);
    let enriched = enrich_appointments(appointments, &cost_by_procedure, &price_by_procedure);

    FinancialReport {
        procedures: summarize_procedures(&enriched),
        consumption: summarize_consumption(&enriched, materials, recipes),
        appointments: enriched,
    }
}

fn unit_costs(materials: &MaterialTable) -> HashMap<&str, f64> {
    let mut costs = HashMap::new();
    for material in &materials.rows {
        costs.entry(material.name.as_str()).or_insert(material.unit_cost);
    }
    costs
}

/// Total material cost per procedure name.
pub fn procedure_costs(materials: &MaterialTable, recipes: &RecipeTable) -> HashMap<String, f64> {
    let costs = unit_costs(materials);
    let mut totals: HashMap<String, f64> = HashMap::new();
    for line in recipes.rows.iter().filter(|line| !line.procedure.is_empty()) {
        let unit_cost = costs.get(line.material.as_str()).copied().unwrap_or(0.0);
        *totals.entry(line.procedure.clone()).or_insert(0.0) += line.quantity_used * unit_cost;
    }
    totals
}

/// Sale price per procedure name, taken from the first recipe line.
pub fn procedure_prices(recipes: &RecipeTable) -> HashMap<String, f64> {
    let mut prices = HashMap::new();
    for line in recipes.rows.iter().filter(|line| !line.procedure.is_empty()) {
        prices.entry(line.procedure.clone()).or_insert(line.sale_price);
    }
    prices
}

fn enrich_appointments(
    appointments: &AppointmentTable,
    costs: &HashMap<String, f64>,
    prices: &HashMap<String, f64>,
) -> EnrichedAppointments {
    let rows = appointments
        .rows
        .iter()
        .map(|appointment| {
            let cost = costs.get(&appointment.procedure).copied().unwrap_or(0.0);
            let sale_price = prices.get(&appointment.procedure).copied().unwrap_or(0.0);
            DerivedAppointment {
                appointment: appointment.clone(),
                cost,
                sale_price,
                profit: sale_price - cost,
            }
        })
        .collect();

    EnrichedAppointments {
        columns: appointments.columns.clone(),
        rows,
    }
}

fn summarize_procedures(enriched: &EnrichedAppointments) -> Vec<ProcedureSummary> {
    let mut groups: BTreeMap<&str, ProcedureSummary> = BTreeMap::new();
    for row in &enriched.rows {
        let procedure = row.appointment.procedure.as_str();
        if procedure.is_empty() {
            continue;
        }
        let entry = groups.entry(procedure).or_insert_with(|| ProcedureSummary {
            procedure: procedure.to_string(),
            count: 0,
            revenue: 0.0,
            cost: 0.0,
            profit: 0.0,
        });
        entry.count += 1;
        entry.revenue += row.sale_price;
        entry.cost += row.cost;
        entry.profit += row.profit;
    }
    groups.into_values().collect()
}

fn summarize_consumption(
    enriched: &EnrichedAppointments,
    materials: &MaterialTable,
    recipes: &RecipeTable,
) -> Vec<MaterialConsumption> {
    let mut lines_by_procedure: HashMap<&str, Vec<(&str, f64)>> = HashMap::new();
    for line in &recipes.rows {
        if line.material.is_empty() || line.procedure.is_empty() {
            continue;
        }
        lines_by_procedure
            .entry(line.procedure.as_str())
            .or_default()
            .push((line.material.as_str(), line.quantity_used));
    }

    let mut used: BTreeMap<&str, f64> = BTreeMap::new();
    for row in &enriched.rows {
        if let Some(lines) = lines_by_procedure.get(row.appointment.procedure.as_str()) {
            for (material, quantity) in lines {
                *used.entry(material).or_insert(0.0) += quantity;
            }
        }
    }

    used.into_iter()
        .map(|(material, quantity_used)| {
            let (unit_cost, stock_quantity, minimum_stock) = materials
                .find(material)
                .map(|m| (m.unit_cost, m.stock_quantity, m.minimum_stock))
                .unwrap_or((0.0, 0.0, 0.0));
            MaterialConsumption {
                material: material.to_string(),
                quantity_used,
                unit_cost,
                stock_quantity,
                minimum_stock,
                total_cost: quantity_used * unit_cost,
            }
        })
        .collect()
}
