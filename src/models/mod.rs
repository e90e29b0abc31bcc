use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Column headers of the clinic spreadsheet. These are the contract with the
// form and the people editing the sheet, so they stay in the sheet's language.
pub const COL_CLIENT: &str = "Nome do Cliente";
pub const COL_PROFESSIONAL: &str = "Profissional Responsável";
pub const COL_PROCEDURE: &str = "Procedimento Realizado";
pub const COL_DATE: &str = "Data do Atendimento";
pub const COL_TIME: &str = "Horário do Atendimento";
pub const COL_AGE: &str = "Idade";
pub const COL_GENDER: &str = "Genero";
pub const COL_STOCK_DEDUCTED: &str = "Estoque Deduzido";

pub const COL_MATERIAL: &str = "Material";
pub const COL_UNIT_COST: &str = "Preco Unitario (R$)";
pub const COL_STOCK_QUANTITY: &str = "Quantidade em Estoque";
pub const COL_MINIMUM_STOCK: &str = "Estoque Mínimo";

pub const COL_RECIPE_PROCEDURE: &str = "Procedimento";
pub const COL_QUANTITY_USED: &str = "Quantidade Usada";
pub const COL_SALE_PRICE: &str = "Preco de Venda (R$)";

pub const DEDUCTED_NO: &str = "NÃO";
pub const DEDUCTED_YES: &str = "SIM";

pub const MATERIAL_COLUMNS: [&str; 4] = [
    COL_MATERIAL,
    COL_UNIT_COST,
    COL_STOCK_QUANTITY,
    COL_MINIMUM_STOCK,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub client: String,
    pub professional: String,
    pub procedure: String,
    pub date: Option<NaiveDate>,
    pub time: String,
    pub age: Option<f64>,
    pub gender: Option<String>,
    pub stock_deducted: String,
    /// Sheet columns this system does not interpret, kept for write-back.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Default for Appointment {
    fn default() -> Self {
        Appointment {
            client: String::new(),
            professional: String::new(),
            procedure: String::new(),
            date: None,
            time: String::new(),
            age: None,
            gender: None,
            stock_deducted: DEDUCTED_NO.to_string(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentTable {
    /// Header order as read from the sheet (trimmed).
    pub columns: Vec<String>,
    pub rows: Vec<Appointment>,
}

impl AppointmentTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Same schema, different rows.
    pub fn with_rows(&self, rows: Vec<Appointment>) -> Self {
        AppointmentTable {
            columns: self.columns.clone(),
            rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub unit_cost: f64,
    pub stock_quantity: f64,
    pub minimum_stock: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialTable {
    pub rows: Vec<Material>,
    /// Both stock columns were present in the sheet.
    #[serde(default)]
    pub stock_columns: bool,
}

impl MaterialTable {
    pub fn find(&self, name: &str) -> Option<&Material> {
        self.rows.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureRecipe {
    pub procedure: String,
    pub material: String,
    pub quantity_used: f64,
    pub sale_price: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeTable {
    pub columns: Vec<String>,
    pub rows: Vec<ProcedureRecipe>,
}

/// The three cleaned tables of one load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicData {
    pub appointments: AppointmentTable,
    pub materials: MaterialTable,
    pub recipes: RecipeTable,
}

impl ClinicData {
    pub fn is_empty(&self) -> bool {
        self.appointments.rows.is_empty()
            && self.materials.rows.is_empty()
            && self.recipes.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedAppointment {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub cost: f64,
    pub sale_price: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedAppointments {
    pub columns: Vec<String>,
    pub rows: Vec<DerivedAppointment>,
}

impl EnrichedAppointments {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSummary {
    pub procedure: String,
    pub count: usize,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConsumption {
    pub material: String,
    pub quantity_used: f64,
    pub unit_cost: f64,
    pub stock_quantity: f64,
    pub minimum_stock: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub procedures: Vec<ProcedureSummary>,
    pub consumption: Vec<MaterialConsumption>,
    pub appointments: EnrichedAppointments,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub client: String,
    pub total_spend: f64,
    pub visits: usize,
    pub average_ticket: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub last_visit: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmReport {
    pub include_age: bool,
    pub include_gender: bool,
    pub clients: Vec<ClientSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderCount {
    pub gender: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBracketCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAnalysis {
    pub report: CrmReport,
    pub genders: Vec<GenderCount>,
    pub age_brackets: Vec<AgeBracketCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiDelta {
    pub current: f64,
    pub previous: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub revenue: KpiDelta,
    pub profit: KpiDelta,
    pub appointments: KpiDelta,
    pub revenue_goal: f64,
    pub goal_progress: f64,
    pub professionals: Vec<String>,
    pub procedures: Vec<String>,
    pub chart_months: Vec<String>,
    pub chart_revenue: Vec<f64>,
    pub chart_profit: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Critical,
    Attention,
    Ok,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLine {
    pub status: StockStatus,
    pub material: String,
    pub stock_quantity: f64,
    pub minimum_stock: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAppointment {
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub client: String,
    pub procedure: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDeduction {
    pub appointments: Vec<PendingAppointment>,
    pub consumption: Vec<MaterialConsumption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionOutcome {
    pub appointments_marked: usize,
    pub materials_updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaDay {
    pub date: NaiveDate,
    pub weekday: String,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekAgenda {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<AgendaDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Google,
    Workbook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend: Backend,
    pub spreadsheet_id: Option<String>,
    pub credentials_path: String,
    pub workbook_dir: String,
    pub appointments_sheet: String,
    pub materials_sheet: String,
    pub recipes_sheet: String,
    pub cache_ttl_secs: u64,
    pub revenue_goal: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteLogEntry {
    pub id: String,
    pub sheet: String,
    pub row_count: i64,
    pub grid_hash: String,
    pub status: String,
    pub message: Option<String>,
    pub created_at: String,
}
